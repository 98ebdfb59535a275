// Per-login session state.
//
// Everything that used to live in ambient UI state is held here explicitly:
// the authenticated profile, the per-session API key override, the current
// answer preferences, and the phase of the in-flight exchange. A logout
// drops the whole session, so no credential or preference survives it.

use crate::db::UserProfile;
use crate::llm::prompt::{Depth, Tone};

// ---------------------------------------------------------------------------
// Exchange phase
// ---------------------------------------------------------------------------

/// Lifecycle of the current query/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangePhase {
    /// No exchange in flight.
    #[default]
    Idle,
    /// The user message has been persisted and the backend call is pending.
    AwaitingResponse,
    /// The last exchange produced an assistant answer.
    Completed,
    /// Every candidate model failed; a diagnostic was persisted instead.
    Failed,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// State for one authenticated user, created at login and dropped at logout.
#[derive(Debug, Clone)]
pub struct Session {
    profile: UserProfile,
    api_key_override: Option<String>,
    tone: Tone,
    depth: Depth,
    phase: ExchangePhase,
}

impl Session {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            api_key_override: None,
            tone: Tone::default(),
            depth: Depth::default(),
            phase: ExchangePhase::Idle,
        }
    }

    pub fn email(&self) -> &str {
        &self.profile.email
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Replace the cached profile after an update (e.g. profile completion).
    pub fn set_profile(&mut self, profile: UserProfile) {
        self.profile = profile;
    }

    /// Institution string for prompt framing; empty when the profile is
    /// incomplete.
    pub fn institution(&self) -> &str {
        self.profile.institution.as_deref().unwrap_or("")
    }

    /// Set a key that takes priority over the configured credential for the
    /// rest of this session. The key lives only in memory.
    pub fn set_api_key(&mut self, key: String) {
        self.api_key_override = Some(key);
    }

    pub fn clear_api_key(&mut self) {
        self.api_key_override = None;
    }

    pub fn api_key_override(&self) -> Option<&str> {
        self.api_key_override.as_deref()
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }

    pub fn set_tone(&mut self, tone: Tone) {
        self.tone = tone;
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    pub fn set_depth(&mut self, depth: Depth) {
        self.depth = depth;
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: ExchangePhase) {
        self.phase = phase;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(email: &str, institution: Option<&str>) -> UserProfile {
        UserProfile {
            email: email.to_string(),
            name: None,
            institution: institution.map(|s| s.to_string()),
            year: None,
        }
    }

    #[test]
    fn new_session_starts_idle_with_defaults() {
        let session = Session::new(profile("a@b.com", None));
        assert_eq!(session.phase(), ExchangePhase::Idle);
        assert_eq!(session.tone(), Tone::Academic);
        assert_eq!(session.depth(), Depth::Detailed);
        assert!(session.api_key_override().is_none());
    }

    #[test]
    fn api_key_override_set_and_cleared() {
        let mut session = Session::new(profile("a@b.com", None));
        session.set_api_key("session-key-123".to_string());
        assert_eq!(session.api_key_override(), Some("session-key-123"));

        session.clear_api_key();
        assert!(session.api_key_override().is_none());
    }

    #[test]
    fn institution_empty_when_profile_incomplete() {
        let session = Session::new(profile("a@b.com", None));
        assert_eq!(session.institution(), "");

        let session = Session::new(profile("a@b.com", Some("NLU Delhi")));
        assert_eq!(session.institution(), "NLU Delhi");
    }

    #[test]
    fn preferences_are_per_session() {
        let mut session = Session::new(profile("a@b.com", None));
        session.set_tone(Tone::Casual);
        session.set_depth(Depth::Summary);
        assert_eq!(session.tone(), Tone::Casual);
        assert_eq!(session.depth(), Depth::Summary);

        // A fresh session (fresh login) is back to defaults.
        let session = Session::new(profile("a@b.com", None));
        assert_eq!(session.tone(), Tone::Academic);
        assert_eq!(session.depth(), Depth::Detailed);
    }
}
