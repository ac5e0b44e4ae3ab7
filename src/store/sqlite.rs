use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use super::{InsertMeet, MeetStore, TurnStore, User, UserDirectory};
use crate::error::{MeetError, Result};
use crate::meet::{Meet, Speaker, Turn};
use async_trait::async_trait;

/// SQLite-backed storage for meets, turns and user lookup.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across async tasks. All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) a file-backed SQLite database at `path`.
    ///
    /// Sets WAL journal mode and enables foreign keys, then creates all
    /// tables and indexes if they don't already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .map_err(|e| MeetError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            MeetError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── helpers ────────────────────────────────────────────────────────

    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        // WAL mode for better concurrent-read performance.
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| MeetError::Storage(format!("failed to set WAL mode: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| MeetError::Storage(format!("failed to enable foreign keys: {e}")))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        store.create_tables()?;
        Ok(store)
    }

    /// Create all tables and indexes (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MeetError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meets (
                meet_code TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                started_at_ms INTEGER,
                ends_at_ms INTEGER,
                end_reason TEXT,
                created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                meet_code TEXT NOT NULL REFERENCES meets(meet_code),
                owner_id TEXT NOT NULL,
                speaker TEXT NOT NULL CHECK (speaker IN ('user', 'system')),
                content TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                user_token TEXT NOT NULL UNIQUE,
                verified INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_meets_owner ON meets(owner_id);
            CREATE INDEX IF NOT EXISTS idx_turns_meet ON turns(meet_code, created_at_ms, id);
            ",
        )
        .map_err(|e| MeetError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool. This is the primary way the trait methods
    /// interact with the database.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| MeetError::Storage(format!("failed to acquire database lock: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| MeetError::Storage(format!("task join error: {e}")))?
    }

    /// Seed a user record. The core treats users as read-only context;
    /// this exists for provisioning and tests.
    pub async fn insert_user(&self, user: &User, token: &str) -> Result<()> {
        let user = user.clone();
        let token = token.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (id, email, user_token, verified) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user.id, user.email, token, user.verified as i64],
            )
            .map_err(|e| MeetError::Storage(format!("failed to insert user: {e}")))?;
            Ok(())
        })
        .await
    }
}

fn ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_ms(value: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(value)
        .single()
        .ok_or_else(|| MeetError::Storage(format!("invalid timestamp in database: {value}")))
}

fn meet_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, Option<i64>, Option<i64>, Option<String>, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn build_meet(
    (meet_code, owner_id, started_at_ms, ends_at_ms, end_reason, created_at_ms): (
        String,
        String,
        Option<i64>,
        Option<i64>,
        Option<String>,
        i64,
    ),
) -> Result<Meet> {
    Ok(Meet {
        meet_code,
        owner_id,
        started_at: started_at_ms.map(from_ms).transpose()?,
        ends_at: ends_at_ms.map(from_ms).transpose()?,
        end_reason,
        created_at: from_ms(created_at_ms)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    // Only uniqueness counts as a retryable code collision. Other
    // constraint failures (CHECK, NOT NULL, foreign keys) share the
    // primary ConstraintViolation code and must surface as errors.
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[async_trait]
impl MeetStore for SqliteStore {
    async fn insert_meet(&self, meet: &Meet) -> Result<InsertMeet> {
        let meet = meet.clone();
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO meets (meet_code, owner_id, started_at_ms, ends_at_ms, end_reason, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    meet.meet_code,
                    meet.owner_id,
                    meet.started_at.map(ms),
                    meet.ends_at.map(ms),
                    meet.end_reason,
                    ms(meet.created_at),
                ],
            );

            match result {
                Ok(_) => Ok(InsertMeet::Created),
                Err(e) if is_unique_violation(&e) => Ok(InsertMeet::CodeTaken),
                Err(e) => Err(MeetError::Storage(format!("failed to insert meet: {e}"))),
            }
        })
        .await
    }

    async fn find_meet(&self, owner_id: &str, meet_code: &str) -> Result<Option<Meet>> {
        let owner_id = owner_id.to_string();
        let meet_code = meet_code.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT meet_code, owner_id, started_at_ms, ends_at_ms, end_reason, created_at_ms
                     FROM meets WHERE meet_code = ?1 AND owner_id = ?2",
                    rusqlite::params![meet_code, owner_id],
                    meet_from_row,
                )
                .optional()
                .map_err(|e| MeetError::Storage(format!("failed to load meet: {e}")))?;

            row.map(build_meet).transpose()
        })
        .await
    }

    async fn set_window(
        &self,
        owner_id: &str,
        meet_code: &str,
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<bool> {
        let owner_id = owner_id.to_string();
        let meet_code = meet_code.to_string();
        self.with_conn(move |conn| {
            // The IS NULL clause makes the write first-writer-wins, so a
            // racing start cannot move a window that is already open.
            let updated = conn
                .execute(
                    "UPDATE meets SET started_at_ms = ?1, ends_at_ms = ?2
                     WHERE meet_code = ?3 AND owner_id = ?4 AND started_at_ms IS NULL",
                    rusqlite::params![ms(started_at), ms(ends_at), meet_code, owner_id],
                )
                .map_err(|e| MeetError::Storage(format!("failed to set meet window: {e}")))?;
            Ok(updated > 0)
        })
        .await
    }

    async fn set_end_reason(&self, owner_id: &str, meet_code: &str, reason: &str) -> Result<bool> {
        let owner_id = owner_id.to_string();
        let meet_code = meet_code.to_string();
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE meets SET end_reason = ?1 WHERE meet_code = ?2 AND owner_id = ?3",
                    rusqlite::params![reason, meet_code, owner_id],
                )
                .map_err(|e| MeetError::Storage(format!("failed to end meet: {e}")))?;
            Ok(updated > 0)
        })
        .await
    }
}

fn last_speaker_sync(conn: &Connection, meet_code: &str) -> Result<Option<Speaker>> {
    let speaker: Option<String> = conn
        .query_row(
            "SELECT speaker FROM turns WHERE meet_code = ?1
             ORDER BY created_at_ms DESC, id DESC LIMIT 1",
            rusqlite::params![meet_code],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| MeetError::Storage(format!("failed to read last turn: {e}")))?;

    speaker
        .map(|s| {
            Speaker::parse(&s)
                .ok_or_else(|| MeetError::Storage(format!("unknown speaker in database: {s}")))
        })
        .transpose()
}

#[async_trait]
impl TurnStore for SqliteStore {
    async fn append_turn(&self, turn: &Turn, expected_last: Option<Speaker>) -> Result<()> {
        let turn = turn.clone();
        self.with_conn(move |conn| {
            // The predecessor check and the insert must be one atomic
            // unit, otherwise two racing writers could both pass the
            // check and break the alternation invariant.
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| MeetError::Storage(format!("failed to begin transaction: {e}")))?;

            let last = last_speaker_sync(&tx, &turn.meet_code)?;
            if last != expected_last {
                return Err(MeetError::OutOfOrderTurn);
            }

            tx.execute(
                "INSERT INTO turns (meet_code, owner_id, speaker, content, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    turn.meet_code,
                    turn.owner_id,
                    turn.speaker.as_str(),
                    turn.content,
                    ms(turn.created_at),
                ],
            )
            .map_err(|e| MeetError::Storage(format!("failed to insert turn: {e}")))?;

            tx.commit()
                .map_err(|e| MeetError::Storage(format!("failed to commit turn: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn history(&self, meet_code: &str) -> Result<Vec<Turn>> {
        let meet_code = meet_code.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT meet_code, owner_id, speaker, content, created_at_ms
                     FROM turns WHERE meet_code = ?1 ORDER BY created_at_ms ASC, id ASC",
                )
                .map_err(|e| MeetError::Storage(format!("failed to prepare history query: {e}")))?;

            let rows = stmt
                .query_map(rusqlite::params![meet_code], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .map_err(|e| MeetError::Storage(format!("failed to load history: {e}")))?;

            let mut turns = Vec::new();
            for row in rows {
                let (meet_code, owner_id, speaker, content, created_at_ms) =
                    row.map_err(|e| MeetError::Storage(format!("failed to read turn row: {e}")))?;
                turns.push(Turn {
                    meet_code,
                    owner_id,
                    speaker: Speaker::parse(&speaker).ok_or_else(|| {
                        MeetError::Storage(format!("unknown speaker in database: {speaker}"))
                    })?,
                    content,
                    created_at: from_ms(created_at_ms)?,
                });
            }
            Ok(turns)
        })
        .await
    }

    async fn last_speaker(&self, meet_code: &str) -> Result<Option<Speaker>> {
        let meet_code = meet_code.to_string();
        self.with_conn(move |conn| last_speaker_sync(conn, &meet_code))
            .await
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<User>> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, email, verified FROM users WHERE user_token = ?1",
                rusqlite::params![token],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        verified: row.get::<_, i64>(2)? != 0,
                    })
                },
            )
            .optional()
            .map_err(|e| MeetError::Storage(format!("failed to look up user: {e}")))
        })
        .await
    }
}
