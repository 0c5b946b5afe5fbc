//! SQLite database handle as a module.
//!
//! # Responsibilities
//! - Open (or adopt) a connection during `init`
//! - Hand out a cloneable [`DbHandle`] for the rest of the process
//! - Close the connection on `stop`
//!
//! # Data Flow
//! ```text
//! init:  options → open path / in-memory / adopt connection → handle
//! run:   wait for stop
//! stop:  fire done → close connection (Error::Close on failure)
//! ```
//!
//! # Design Decisions
//! - A connection is mandatory; `init` fails with `MissingDatabase` otherwise
//! - Statement tracing goes through `tracing` at debug level

mod handle;

use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::Connection;

use crate::error::{BoxError, Error, Result};
use crate::lifecycle::{Lifecycle, Module, RunEntry};
use crate::option::{apply_options, Opt, Pending};

pub use handle::DbHandle;

pub const ID: &str = "db";

enum Source {
    Path(PathBuf),
    Memory,
    Connection(Connection),
}

/// Settings filled in by database options.
#[derive(Default)]
pub struct DbSettings {
    source: Option<Source>,
    trace_statements: bool,
}

/// Option type for [`Database`].
pub type DbOpt = Opt<DbSettings>;

/// Database connection wrapped as a module.
pub struct Database {
    lifecycle: Lifecycle,
    opts: Pending<DbSettings>,
    handle: DbHandle,
}

impl Database {
    pub fn new(opts: impl IntoIterator<Item = DbOpt>) -> Self {
        Self {
            lifecycle: Lifecycle::new(ID),
            opts: Pending::new(opts),
            handle: DbHandle::default(),
        }
    }

    /// Handle to the connection. Usable once `init` succeeded.
    pub fn handle(&self) -> DbHandle {
        self.handle.clone()
    }

    fn configure(&mut self) -> Result<()> {
        let mut settings = DbSettings::default();
        apply_options(&mut settings, self.opts.take())?;

        let mut conn = match settings.source.ok_or(Error::MissingDatabase)? {
            Source::Path(path) => {
                let conn = Connection::open(&path).map_err(Error::OpenDatabase)?;
                tracing::info!(module = %self.lifecycle.id(), path = %path.display(), "Database opened");
                conn
            }
            Source::Memory => {
                let conn = Connection::open_in_memory().map_err(Error::OpenDatabase)?;
                tracing::info!(module = %self.lifecycle.id(), "In-memory database opened");
                conn
            }
            Source::Connection(conn) => conn,
        };
        if settings.trace_statements {
            conn.trace(Some(log_statement));
        }

        self.handle.install(conn);
        Ok(())
    }
}

fn log_statement(sql: &str) {
    tracing::debug!(statement = sql, "Executing statement");
}

#[async_trait]
impl Module for Database {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    async fn init(&mut self) -> Result<()> {
        self.lifecycle.begin_init()?;
        let result = self.configure();
        self.lifecycle.finish_init(result)
    }

    async fn run(&self) -> Result<()> {
        if self.lifecycle.enter_run()? == RunEntry::Start {
            self.lifecycle.stopped().await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop();
        self.handle.close()
    }
}

/// Open the database file at `path` during `init`, creating it if needed.
pub fn with_path(path: impl Into<PathBuf>) -> DbOpt {
    Opt::value(path.into(), |s: &mut DbSettings, path| {
        s.source = Some(Source::Path(path))
    })
}

/// Open a private in-memory database during `init`.
pub fn with_in_memory() -> DbOpt {
    Opt::new(|s: &mut DbSettings| {
        s.source = Some(Source::Memory);
        Ok(())
    })
}

/// Adopt an already open connection.
pub fn with_connection(conn: Connection) -> DbOpt {
    with_connection_fn(move || Ok::<_, BoxError>(conn))
}

/// Adopt the connection returned by `factory`.
pub fn with_connection_fn<F, E>(factory: F) -> DbOpt
where
    F: FnOnce() -> std::result::Result<Connection, E> + Send + 'static,
    E: Into<BoxError>,
{
    Opt::deferred(factory, |s: &mut DbSettings, conn| {
        s.source = Some(Source::Connection(conn))
    })
}

/// Log every executed statement at debug level.
pub fn with_statement_tracing() -> DbOpt {
    Opt::new(|s: &mut DbSettings| {
        s.trace_statements = true;
        Ok(())
    })
}
