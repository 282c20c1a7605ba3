//! Connection open helpers.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections with required pragmas.
//! - Emit `db_open` events with duration and status.
//!
//! # Invariants
//! - Every returned connection has `foreign_keys=ON`.
//! - Open failures are logged before being returned.

use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and configures it for overlay use.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");
    let outcome = Connection::open(path)
        .map_err(Into::into)
        .and_then(configure);
    log_open_outcome("file", started_at, &outcome);
    outcome
}

/// Opens an in-memory SQLite database and configures it for overlay use.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");
    let outcome = Connection::open_in_memory()
        .map_err(Into::into)
        .and_then(configure);
    log_open_outcome("memory", started_at, &outcome);
    outcome
}

fn configure(conn: Connection) -> DbResult<Connection> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn log_open_outcome(mode: &str, started_at: Instant, outcome: &DbResult<Connection>) {
    let duration_ms = started_at.elapsed().as_millis();
    match outcome {
        Ok(_) => info!("event=db_open module=db status=ok mode={mode} duration_ms={duration_ms}"),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} duration_ms={duration_ms} error={err}"
        ),
    }
}
