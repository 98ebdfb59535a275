// Prompt templating for legal research queries.
//
// Composes the system instruction sent with every query: role framing for
// the user's institution, the requested tone and depth, and the research
// mandate (statute priority, old-act comparison, citations, formatting).

// ---------------------------------------------------------------------------
// Tone and depth parameters
// ---------------------------------------------------------------------------

/// The register the assistant should answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    Casual,
    Professional,
    #[default]
    Academic,
}

impl Tone {
    pub fn label(&self) -> &'static str {
        match self {
            Tone::Casual => "Casual",
            Tone::Professional => "Professional",
            Tone::Academic => "Academic",
        }
    }

    pub fn parse(s: &str) -> Option<Tone> {
        match s.to_ascii_lowercase().as_str() {
            "casual" => Some(Tone::Casual),
            "professional" => Some(Tone::Professional),
            "academic" => Some(Tone::Academic),
            _ => None,
        }
    }
}

/// How deep the answer should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    Summary,
    #[default]
    Detailed,
    BareAct,
}

impl Depth {
    pub fn label(&self) -> &'static str {
        match self {
            Depth::Summary => "Summary",
            Depth::Detailed => "Detailed",
            Depth::BareAct => "Bare Act",
        }
    }

    pub fn parse(s: &str) -> Option<Depth> {
        match s.to_ascii_lowercase().as_str() {
            "summary" => Some(Depth::Summary),
            "detailed" => Some(Depth::Detailed),
            "bare act" | "bareact" | "bare-act" => Some(Depth::BareAct),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Instruction composition
// ---------------------------------------------------------------------------

/// Build the full prompt for one query: system instruction followed by the
/// raw user query.
///
/// `institution` comes from the user's profile; when the profile is
/// incomplete an anonymous framing is used instead.
pub fn build_instruction(query: &str, tone: Tone, depth: Depth, institution: &str) -> String {
    let institution = if institution.trim().is_empty() {
        "independent legal researchers"
    } else {
        institution
    };

    format!(
        "ROLE: You are VidhiDesk, an elite legal research assistant for {institution}.\n\
         TONE: {tone} | DEPTH: {depth}\n\
         \n\
         MANDATE:\n\
         1. PRIORITIZE Indian Statutes: BNS (Bharatiya Nyaya Sanhita), BNSS, BSA, and Constitution.\n\
         2. COMPARE with old acts (IPC/CrPC/Evidence Act) where relevant.\n\
         3. CITE relevant Case Laws (Supreme Court/High Court) with year.\n\
         4. FORMAT using Markdown: Use '### Headers', '**Bold**' for emphasis, and '>' for blockquotes.\n\
         \n\
         USER QUERY: {query}",
        institution = institution,
        tone = tone.label(),
        depth = depth.label(),
        query = query,
    )
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_contains_all_parameters() {
        let prompt = build_instruction(
            "Explain Article 21",
            Tone::Academic,
            Depth::Detailed,
            "NLU Delhi",
        );

        assert!(prompt.contains("ROLE:"), "should have role framing");
        assert!(prompt.contains("NLU Delhi"), "should mention institution");
        assert!(prompt.contains("TONE: Academic"), "should carry tone");
        assert!(prompt.contains("DEPTH: Detailed"), "should carry depth");
        assert!(prompt.contains("MANDATE:"), "should have the mandate block");
        assert!(
            prompt.contains("USER QUERY: Explain Article 21"),
            "should end with the raw query"
        );
    }

    #[test]
    fn instruction_mentions_statute_priority() {
        let prompt = build_instruction("q", Tone::Casual, Depth::Summary, "X");
        assert!(prompt.contains("BNS"), "should prioritize new statutes");
        assert!(prompt.contains("IPC/CrPC"), "should compare with old acts");
        assert!(prompt.contains("Case Laws"), "should ask for citations");
        assert!(prompt.contains("Markdown"), "should ask for markdown formatting");
    }

    #[test]
    fn empty_institution_uses_anonymous_framing() {
        let prompt = build_instruction("q", Tone::Academic, Depth::Detailed, "");
        assert!(prompt.contains("independent legal researchers"));

        let prompt = build_instruction("q", Tone::Academic, Depth::Detailed, "   ");
        assert!(prompt.contains("independent legal researchers"));
    }

    #[test]
    fn bare_act_depth_label() {
        let prompt = build_instruction("q", Tone::Professional, Depth::BareAct, "X");
        assert!(prompt.contains("DEPTH: Bare Act"));
    }

    #[test]
    fn tone_parse_accepts_any_case() {
        assert_eq!(Tone::parse("casual"), Some(Tone::Casual));
        assert_eq!(Tone::parse("Professional"), Some(Tone::Professional));
        assert_eq!(Tone::parse("ACADEMIC"), Some(Tone::Academic));
        assert_eq!(Tone::parse("formal"), None);
    }

    #[test]
    fn depth_parse_accepts_variants() {
        assert_eq!(Depth::parse("summary"), Some(Depth::Summary));
        assert_eq!(Depth::parse("Detailed"), Some(Depth::Detailed));
        assert_eq!(Depth::parse("bare act"), Some(Depth::BareAct));
        assert_eq!(Depth::parse("bare-act"), Some(Depth::BareAct));
        assert_eq!(Depth::parse("deep"), None);
    }

    #[test]
    fn defaults_match_ui_defaults() {
        assert_eq!(Tone::default(), Tone::Academic);
        assert_eq!(Depth::default(), Depth::Detailed);
    }
}
