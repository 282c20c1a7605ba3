//! SQLite connection bootstrap for the record store.
//!
//! # Responsibility
//! - Open and configure SQLite connections used by the overlay.
//! - Provide the epoch-millisecond clock used for deletion timestamps.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout set.
//! - Schema installation is a separate, registry-driven step
//!   (`SchemaRegistry::install_schema`); opening never creates tables.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Storage-transport errors from the SQLite boundary.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Current wall-clock time in unix epoch milliseconds.
///
/// One value is captured at the start of each scoped read/aggregate call
/// and reused for every predicate composed within that call, so all
/// nested filters agree on "now".
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
