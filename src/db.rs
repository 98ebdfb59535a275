// SQLite persistence layer: user accounts, conversation history, and
// knowledge spaces (archived exchanges).

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an account with this email already exists")]
    AlreadyExists,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A registered user's profile. The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub email: String,
    pub name: Option<String>,
    pub institution: Option<String>,
    pub year: Option<String>,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One entry in a user's conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

/// The category a completed exchange is archived under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceCategory {
    Research,
    Paper,
    Study,
}

impl SpaceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceCategory::Research => "Research",
            SpaceCategory::Paper => "Paper",
            SpaceCategory::Study => "Study",
        }
    }

    pub fn parse(s: &str) -> Option<SpaceCategory> {
        match s {
            "Research" => Some(SpaceCategory::Research),
            "Paper" => Some(SpaceCategory::Paper),
            "Study" => Some(SpaceCategory::Study),
            _ => None,
        }
    }

    pub const ALL: [SpaceCategory; 3] = [
        SpaceCategory::Research,
        SpaceCategory::Paper,
        SpaceCategory::Study,
    ];
}

/// An archived query/response pair saved to a knowledge space.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceEntry {
    pub id: i64,
    pub query: String,
    pub response: String,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite-backed persistence for users, chat messages, and space entries.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                email         TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                name          TEXT,
                institution   TEXT,
                year          TEXT
            );

            CREATE TABLE IF NOT EXISTS messages (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email      TEXT NOT NULL REFERENCES users(email),
                role       TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content    TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS spaces (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email      TEXT NOT NULL REFERENCES users(email),
                category   TEXT NOT NULL CHECK (category IN ('Research', 'Paper', 'Study')),
                query      TEXT NOT NULL,
                response   TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_messages_email ON messages(email);
            CREATE INDEX IF NOT EXISTS idx_spaces_email_category ON spaces(email, category);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Credential store
    // ------------------------------------------------------------------

    /// Create an account with empty profile fields. The secret is stored
    /// only as a SHA-256 hex digest. Fails with `AlreadyExists` if the
    /// email is taken, leaving the original row untouched.
    pub fn register(&self, email: &str, password: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO users (email, password_hash) VALUES (?1, ?2)",
            params![email, hash_password(password)],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a login attempt. Succeeds iff the supplied secret hashes to
    /// the stored digest (case-sensitive, byte-exact).
    pub fn authenticate(&self, email: &str, password: &str) -> Result<UserProfile, StoreError> {
        let conn = self.conn();
        let profile = conn
            .query_row(
                "SELECT name, institution, year FROM users
                 WHERE email = ?1 AND password_hash = ?2",
                params![email, hash_password(password)],
                |row| {
                    Ok(UserProfile {
                        email: email.to_string(),
                        name: row.get(0)?,
                        institution: row.get(1)?,
                        year: row.get(2)?,
                    })
                },
            )
            .optional()?;

        profile.ok_or(StoreError::InvalidCredentials)
    }

    /// Fill in the profile fields left empty at registration. This is the
    /// only update-in-place the schema allows.
    pub fn complete_profile(
        &self,
        email: &str,
        name: &str,
        institution: &str,
        year: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET name = ?2, institution = ?3, year = ?4 WHERE email = ?1",
            params![email, name, institution, year],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conversation store
    // ------------------------------------------------------------------

    /// Append one message to the user's conversation log.
    pub fn append_message(&self, email: &str, role: Role, content: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO messages (email, role, content) VALUES (?1, ?2, ?3)",
            params![email, role.as_str(), content],
        )?;
        Ok(())
    }

    /// Load the user's full conversation history, oldest first.
    pub fn history(&self, email: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM messages WHERE email = ?1 ORDER BY id ASC",
        )?;

        let messages = stmt
            .query_map(params![email], |row| {
                let role_str: String = row.get(0)?;
                Ok((role_str, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(role_str, content, created_at)| {
                Role::parse(&role_str).map(|role| Message {
                    role,
                    content,
                    created_at,
                })
            })
            .collect();

        Ok(messages)
    }

    /// Delete the user's entire conversation history. Messages are only
    /// ever deleted in bulk, never individually.
    pub fn clear_history(&self, email: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM messages WHERE email = ?1", params![email])?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Archive store (knowledge spaces)
    // ------------------------------------------------------------------

    /// Archive a completed exchange under `category`. Returns the new
    /// entry's id.
    pub fn save_to_space(
        &self,
        email: &str,
        category: SpaceCategory,
        query: &str,
        response: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO spaces (email, category, query, response) VALUES (?1, ?2, ?3, ?4)",
            params![email, category.as_str(), query, response],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List a user's entries in one space, newest first.
    pub fn space_entries(
        &self,
        email: &str,
        category: SpaceCategory,
    ) -> Result<Vec<SpaceEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, query, response, created_at FROM spaces
             WHERE email = ?1 AND category = ?2 ORDER BY id DESC",
        )?;

        let entries = stmt
            .query_map(params![email, category.as_str()], |row| {
                Ok(SpaceEntry {
                    id: row.get(0)?,
                    query: row.get(1)?,
                    response: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Delete a single space entry by id. Deleting a nonexistent id is a
    /// no-op.
    pub fn delete_space_entry(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM spaces WHERE id = ?1", params![id])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// One-way hash used for password storage and comparison. Plaintext secrets
/// are never persisted or logged.
fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
