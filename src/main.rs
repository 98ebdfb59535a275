// VidhiDesk entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config (copying defaults on first run)
// 3. Open database
// 4. Build the Gemini client and the application core
// 5. Run the interactive loop: authentication, then the chat prompt

use vidhidesk::app::{AppError, Assistant, FAILURE_MARKER};
use vidhidesk::config;
use vidhidesk::db::{Database, SpaceCategory};
use vidhidesk::llm::client::GeminiClient;
use vidhidesk::llm::prompt::{Depth, Tone};
use vidhidesk::session::Session;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("VidhiDesk starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} candidate models, probe={}",
        config.llm.models.len(),
        config.llm.probe_available
    );

    // 3. Open database
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    // 4. Build the Gemini client and the application core
    if config.credentials.gemini_api_key.is_some() {
        info!("Gemini API key configured via credentials.toml");
    } else {
        info!("No configured API key; will fall back to GEMINI_API_KEY or a session key");
    }
    let assistant = Assistant::new(config, db, Box::new(GeminiClient::new()));

    // 5. Interactive loop
    let mut io = Console::new();
    io.line("⚖️  VidhiDesk — legal research assistant").await?;
    io.line("Type 'help' at any prompt.").await?;

    loop {
        match authenticate(&assistant, &mut io).await? {
            Some(session) => {
                chat_loop(&assistant, session, &mut io).await?;
            }
            None => break,
        }
    }

    info!("VidhiDesk shut down cleanly");
    Ok(())
}

// ---------------------------------------------------------------------------
// Console I/O
// ---------------------------------------------------------------------------

/// Line-oriented console wrapper around stdin/stdout.
struct Console {
    input: tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    output: tokio::io::Stdout,
}

impl Console {
    fn new() -> Self {
        Self {
            input: BufReader::new(tokio::io::stdin()).lines(),
            output: tokio::io::stdout(),
        }
    }

    async fn line(&mut self, text: &str) -> anyhow::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Print `prompt` and read one trimmed line. `None` on EOF.
    async fn ask(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        self.output.write_all(prompt.as_bytes()).await?;
        self.output.flush().await?;
        Ok(self.input.next_line().await?.map(|l| l.trim().to_string()))
    }
}

// ---------------------------------------------------------------------------
// Authentication loop
// ---------------------------------------------------------------------------

/// Prompt until a login succeeds. Returns `None` when the user quits.
async fn authenticate(
    assistant: &Assistant,
    io: &mut Console,
) -> anyhow::Result<Option<Session>> {
    loop {
        let Some(choice) = io.ask("\n[login | register | quit] > ").await? else {
            return Ok(None);
        };

        match choice.as_str() {
            "quit" | "exit" | "q" => return Ok(None),
            "help" => {
                io.line("login    — sign in with an existing account").await?;
                io.line("register — create a new account").await?;
                io.line("quit     — exit").await?;
            }
            "register" => {
                let Some(email) = io.ask("email: ").await? else {
                    return Ok(None);
                };
                let Some(password) = io.ask("password: ").await? else {
                    return Ok(None);
                };
                match assistant.register(&email, &password) {
                    Ok(()) => io.line("Account created. Now log in.").await?,
                    Err(e) => io.line(&format!("Registration failed: {e}")).await?,
                }
            }
            "login" | "" => {
                let Some(email) = io.ask("email: ").await? else {
                    return Ok(None);
                };
                let Some(password) = io.ask("password: ").await? else {
                    return Ok(None);
                };
                match assistant.login(&email, &password) {
                    Ok(session) => {
                        let name = session
                            .profile()
                            .name
                            .clone()
                            .unwrap_or_else(|| session.email().to_string());
                        io.line(&format!("Welcome, {name}.")).await?;
                        return Ok(Some(session));
                    }
                    Err(e) => io.line(&format!("Login failed: {e}")).await?,
                }
            }
            other => io.line(&format!("Unknown choice: {other}")).await?,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat loop
// ---------------------------------------------------------------------------

const CHAT_HELP: &str = "\
Anything you type is sent as a legal research query. Commands:
  /tone casual|professional|academic   answer register
  /depth summary|detailed|bareact      answer depth
  /archive research|paper|study|none   archive the next answers to a space
  /spaces <category>                   list archived entries
  /delete <id>                         delete an archived entry
  /history                             show the conversation log
  /clear                               delete the conversation log
  /profile                             complete your profile
  /key <api-key>                       set a session-only Gemini API key
  /logout                              end the session
  /quit                                exit";

/// One authenticated session: queries and slash commands until logout.
/// Returns after logout (back to the auth prompt) or propagates quit via
/// the outer loop ending on EOF.
async fn chat_loop(
    assistant: &Assistant,
    mut session: Session,
    io: &mut Console,
) -> anyhow::Result<()> {
    // Archive selection is sticky until changed, like the tone and depth.
    let mut archive: Option<SpaceCategory> = None;

    if session.profile().institution.is_none() {
        io.line("Tip: run /profile to set your name and institution.").await?;
    }

    loop {
        let prompt = format!(
            "\n[{} | {} | archive: {}]\n> ",
            session.tone().label(),
            session.depth().label(),
            archive.map(|c| c.as_str()).unwrap_or("off"),
        );
        let Some(line) = io.ask(&prompt).await? else {
            return Ok(());
        };

        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let (cmd, arg) = match rest.split_once(' ') {
                Some((c, a)) => (c, a.trim()),
                None => (rest, ""),
            };

            match cmd {
                "help" => io.line(CHAT_HELP).await?,
                "quit" | "exit" => std::process::exit(0),
                "logout" => {
                    info!(email = session.email(), "logout");
                    return Ok(());
                }
                "tone" => match Tone::parse(arg) {
                    Some(tone) => session.set_tone(tone),
                    None => io.line("Usage: /tone casual|professional|academic").await?,
                },
                "depth" => match Depth::parse(arg) {
                    Some(depth) => session.set_depth(depth),
                    None => io.line("Usage: /depth summary|detailed|bareact").await?,
                },
                "archive" => match arg {
                    "none" | "off" => archive = None,
                    other => match parse_category(other) {
                        Some(category) => archive = Some(category),
                        None => {
                            io.line("Usage: /archive research|paper|study|none").await?
                        }
                    },
                },
                "key" => {
                    if arg.is_empty() {
                        session.clear_api_key();
                        io.line("Session API key cleared.").await?;
                    } else {
                        session.set_api_key(arg.to_string());
                        io.line("Session API key set.").await?;
                    }
                }
                "history" => {
                    let history = assistant.history(&session)?;
                    if history.is_empty() {
                        io.line("No messages yet.").await?;
                    }
                    for msg in history {
                        io.line(&format!(
                            "[{}] {}: {}",
                            msg.created_at,
                            msg.role.as_str(),
                            msg.content
                        ))
                        .await?;
                    }
                }
                "clear" => {
                    assistant.clear_history(&session)?;
                    io.line("Conversation history cleared.").await?;
                }
                "spaces" => match parse_category(arg) {
                    Some(category) => {
                        let entries = assistant.space_entries(&session, category)?;
                        if entries.is_empty() {
                            io.line(&format!("No entries in the {} space.", category.as_str()))
                                .await?;
                        }
                        for entry in entries {
                            io.line(&format!(
                                "#{} [{}]\n  Q: {}\n  A: {}",
                                entry.id, entry.created_at, entry.query, entry.response
                            ))
                            .await?;
                        }
                    }
                    None => io.line("Usage: /spaces research|paper|study").await?,
                },
                "delete" => match arg.parse::<i64>() {
                    Ok(id) => {
                        assistant.delete_space_entry(&session, id)?;
                        io.line(&format!("Deleted entry #{id}.")).await?;
                    }
                    Err(_) => io.line("Usage: /delete <id>").await?,
                },
                "profile" => {
                    let Some(name) = io.ask("name: ").await? else {
                        return Ok(());
                    };
                    let Some(institution) = io.ask("institution: ").await? else {
                        return Ok(());
                    };
                    let Some(year) = io.ask("year of study: ").await? else {
                        return Ok(());
                    };
                    assistant.complete_profile(&mut session, &name, &institution, &year)?;
                    io.line("Profile saved.").await?;
                }
                other => io.line(&format!("Unknown command: /{other}")).await?,
            }
            continue;
        }

        // A plain line is a query.
        io.line("Consulting legal sources...").await?;
        match assistant.submit_query(&mut session, &line, archive).await {
            Ok(outcome) => {
                io.line("").await?;
                io.line(&outcome.assistant_text).await?;
                if outcome.archived {
                    if let Some(category) = archive {
                        io.line(&format!("(archived to the {} space)", category.as_str()))
                            .await?;
                    }
                }
                if outcome.assistant_text.starts_with(FAILURE_MARKER) {
                    io.line("(see /key to supply a different API key)").await?;
                }
            }
            Err(AppError::MissingCredential) => {
                warn!(email = session.email(), "query refused without credentials");
                io.line("No Gemini API key available. Set one with /key, in config/credentials.toml, or via GEMINI_API_KEY.")
                    .await?;
            }
            Err(e) => io.line(&format!("Query failed: {e}")).await?,
        }
    }
}

fn parse_category(s: &str) -> Option<SpaceCategory> {
    match s.to_ascii_lowercase().as_str() {
        "research" => Some(SpaceCategory::Research),
        "paper" => Some(SpaceCategory::Paper),
        "study" => Some(SpaceCategory::Study),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize tracing to log to a file (not the terminal, which is used by
/// the chat prompt).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("vidhidesk.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vidhidesk=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
