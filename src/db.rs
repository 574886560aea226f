use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use rusqlite::{ErrorCode, params};
use tokio::sync::Mutex;

use crate::model;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("short link not found")]
    NotFound,
    #[error("token already taken: {0}")]
    Conflict(String),
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl DbError {
    fn from_insert(e: rusqlite::Error, token: &str) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref failure, _) if failure.code == ErrorCode::ConstraintViolation => {
                Self::Conflict(token.to_string())
            }
            _ => Self::Sqlite(e),
        }
    }
}

/// Durable token -> URL mapping.
///
/// Implementations must reject a second `save` for an existing token with
/// [`DbError::Conflict`] and report a lookup miss as [`DbError::NotFound`].
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save(&self, link: &model::ShortLink) -> Result<(), DbError>;

    async fn find_by_token(&self, token: &str) -> Result<model::ShortLink, DbError>;
}

#[derive(Clone, Debug)]
pub struct Db {
    connection: Arc<Mutex<rusqlite::Connection>>,
}

fn create_urls_table(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"create table if not exists urls(
    token      TEXT    PRIMARY KEY,
    full_url   TEXT    NOT NULL,
    created_at INTEGER NOT NULL -- unix seconds
);
create index if not exists idx_urls_created_at on urls(created_at);"#,
    )
}

impl Db {
    pub fn new(connection: rusqlite::Connection) -> Result<Self, DbError> {
        create_urls_table(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn open(path: &Path) -> Result<Self, DbError> {
        Self::new(rusqlite::Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, DbError> {
        Self::new(rusqlite::Connection::open_in_memory()?)
    }
}

#[async_trait]
impl TokenStore for Db {
    async fn save(&self, link: &model::ShortLink) -> Result<(), DbError> {
        let conn = self.connection.lock().await;

        conn.execute(
            r#"INSERT INTO urls (token, full_url, created_at) values (?1, ?2, ?3)"#,
            params![link.token, link.target_url, link.created.timestamp()],
        )
        .map_err(|e| DbError::from_insert(e, &link.token))?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<model::ShortLink, DbError> {
        let conn = self.connection.lock().await;

        let mut stmt = conn.prepare("SELECT token, full_url, created_at FROM urls WHERE token = ?1")?;
        let found = stmt.query_row([token], |row| {
            let created_at: i64 = row.get(2)?;
            Ok(model::ShortLink {
                token: row.get(0)?,
                target_url: row.get(1)?,
                created: chrono::DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
            })
        });

        match found {
            Ok(link) => Ok(link),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(DbError::NotFound),
            Err(e) => Err(DbError::from(e)),
        }
    }
}
