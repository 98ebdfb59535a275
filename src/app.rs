// Application orchestrator: account lifecycle, query submission, and
// archiving.
//
// Ties the stores, the prompt templating, and the model fallback resolver
// together. One `submit_query` call is one exchange: credential resolution,
// user-message persistence, the backend call (with fallback), assistant
// persistence, and optional archiving, in that order.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{Database, Message, Role, SpaceCategory, SpaceEntry, StoreError};
use crate::llm::client::{
    candidate_order, generate_with_fallback, resolve_api_key, Outcome, TextGenerator,
};
use crate::llm::prompt::build_instruction;
use crate::session::{ExchangePhase, Session};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Prefix of the diagnostic persisted in place of an answer when every
/// candidate model fails. Responses carrying it are never archived.
pub const FAILURE_MARKER: &str = "❌ **Connection Failed:**";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AppError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("no Gemini API key configured; set one in credentials.toml, the GEMINI_API_KEY environment variable, or for this session")]
    MissingCredential,

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Query outcome
// ---------------------------------------------------------------------------

/// What one `submit_query` call produced. `assistant_text` is exactly what
/// was persisted as the assistant turn, diagnostic or answer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub assistant_text: String,
    pub archived: bool,
    /// The model that answered; `None` when every candidate failed.
    pub model: Option<String>,
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

/// The application core, shared by whatever front end drives it.
pub struct Assistant {
    config: Config,
    db: Database,
    generator: Box<dyn TextGenerator>,
}

impl Assistant {
    pub fn new(config: Config, db: Database, generator: Box<dyn TextGenerator>) -> Self {
        Self {
            config,
            db,
            generator,
        }
    }

    // ------------------------------------------------------------------
    // Account lifecycle
    // ------------------------------------------------------------------

    /// Create an account. Profile fields stay empty until
    /// `complete_profile`. The password is hashed before it reaches the
    /// store and is never logged.
    pub fn register(&self, email: &str, password: &str) -> Result<(), AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::EmptyField("email"));
        }
        if password.is_empty() {
            return Err(AppError::EmptyField("password"));
        }

        self.db.register(email, password)?;
        info!(email, "account registered");
        Ok(())
    }

    /// Authenticate and start a session. The session is the only holder of
    /// login state; dropping it is the logout.
    pub fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let profile = self.db.authenticate(email.trim(), password)?;
        info!(email = %profile.email, "login succeeded");
        Ok(Session::new(profile))
    }

    /// Fill in the profile fields and refresh the session's cached copy.
    pub fn complete_profile(
        &self,
        session: &mut Session,
        name: &str,
        institution: &str,
        year: &str,
    ) -> Result<(), AppError> {
        self.db
            .complete_profile(session.email(), name, institution, year)?;

        let mut profile = session.profile().clone();
        profile.name = Some(name.to_string());
        profile.institution = Some(institution.to_string());
        profile.year = Some(year.to_string());
        session.set_profile(profile);

        info!(email = session.email(), "profile completed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Query submission
    // ------------------------------------------------------------------

    /// Run one exchange for the session's user.
    ///
    /// Order of effects:
    /// 1. An empty query is rejected before anything else happens.
    /// 2. The API key is resolved; without one the call aborts and nothing
    ///    is persisted.
    /// 3. The user message is persisted, then the candidate models are
    ///    tried in order.
    /// 4. On success the answer is persisted and, when `archive` is set and
    ///    the text carries no failure marker, archived to that space.
    /// 5. On exhaustion a diagnostic is persisted as the assistant turn and
    ///    nothing is archived.
    pub async fn submit_query(
        &self,
        session: &mut Session,
        query: &str,
        archive: Option<SpaceCategory>,
    ) -> Result<QueryOutcome, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::EmptyQuery);
        }

        let api_key = match resolve_api_key(session.api_key_override(), &self.config.credentials) {
            Ok(key) => key,
            Err(_) => {
                warn!(email = session.email(), "query rejected, no API key available");
                return Err(AppError::MissingCredential);
            }
        };

        session.set_phase(ExchangePhase::AwaitingResponse);
        self.db.append_message(session.email(), Role::User, query)?;

        let order = candidate_order(
            self.generator.as_ref(),
            &api_key,
            &self.config.llm.models,
            self.config.llm.probe_available,
        )
        .await;

        let prompt = build_instruction(query, session.tone(), session.depth(), session.institution());

        let outcome =
            generate_with_fallback(self.generator.as_ref(), &api_key, &order, &prompt).await;

        match outcome {
            Outcome::Success { model, text } => {
                self.db
                    .append_message(session.email(), Role::Assistant, &text)?;

                let archived = match archive {
                    Some(category) if !text.contains(FAILURE_MARKER) => {
                        let id = self
                            .db
                            .save_to_space(session.email(), category, query, &text)?;
                        info!(
                            email = session.email(),
                            category = category.as_str(),
                            id,
                            "exchange archived"
                        );
                        true
                    }
                    _ => false,
                };

                session.set_phase(ExchangePhase::Completed);
                info!(email = session.email(), model = %model, "exchange completed");

                Ok(QueryOutcome {
                    assistant_text: text,
                    archived,
                    model: Some(model),
                })
            }
            Outcome::Exhausted {
                last_error,
                credential_invalid,
            } => {
                let reason = if credential_invalid {
                    "Credentials Expired / Invalid Key."
                } else {
                    "Could not reach Google AI."
                };
                let diagnostic =
                    format!("{FAILURE_MARKER} {reason}\n\n**Debug Details:** {last_error}");

                self.db
                    .append_message(session.email(), Role::Assistant, &diagnostic)?;
                session.set_phase(ExchangePhase::Failed);
                warn!(
                    email = session.email(),
                    credential_invalid, "all candidate models failed"
                );

                Ok(QueryOutcome {
                    assistant_text: diagnostic,
                    archived: false,
                    model: None,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // History and spaces
    // ------------------------------------------------------------------

    pub fn history(&self, session: &Session) -> Result<Vec<Message>, AppError> {
        Ok(self.db.history(session.email())?)
    }

    pub fn clear_history(&self, session: &Session) -> Result<(), AppError> {
        self.db.clear_history(session.email())?;
        info!(email = session.email(), "history cleared");
        Ok(())
    }

    pub fn space_entries(
        &self,
        session: &Session,
        category: SpaceCategory,
    ) -> Result<Vec<SpaceEntry>, AppError> {
        Ok(self.db.space_entries(session.email(), category)?)
    }

    pub fn delete_space_entry(&self, session: &Session, id: i64) -> Result<(), AppError> {
        self.db.delete_space_entry(id)?;
        info!(email = session.email(), id, "space entry deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
