//! Error taxonomy shared by every module.
//!
//! # Categories
//! ```text
//! Configuration:  Option, MissingInterval, MissingAction, MissingDatabase, MissingProvider
//! Acquisition:    Bind, Signal, OpenDatabase, Exporter
//! Run-time:       Run, Serve, Query
//! Shutdown:       ShutdownTimeout, Flush, Shutdown, Close, Joined
//! Lifecycle:      AlreadyInitialized, NotInitialized, AlreadyRunning, Closed
//! ```
//!
//! Configuration and acquisition errors come out of `init`, run-time errors
//! out of `run`, shutdown errors out of `stop`.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed error used for causes supplied by callers (option factories, actions).
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for module operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by module lifecycle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An option failed while being applied during `init`.
    #[error("failed to apply option #{index}: {source}")]
    Option {
        /// Position of the failing option in the constructor list.
        index: usize,
        source: BoxError,
    },

    /// Ticker was initialized without an interval.
    #[error("interval not set")]
    MissingInterval,

    /// Ticker was initialized without an action.
    #[error("action not set")]
    MissingAction,

    /// Database module was initialized without a connection.
    #[error("database not set")]
    MissingDatabase,

    /// Telemetry module was initialized without a provider.
    #[error("{0} provider not set")]
    MissingProvider(&'static str),

    /// Listener could not be bound.
    #[error("failed to init listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Signal handler could not be registered.
    #[error("failed to register signal handler: {0}")]
    Signal(#[source] std::io::Error),

    /// Database could not be opened.
    #[error("failed to open database: {0}")]
    OpenDatabase(#[source] rusqlite::Error),

    /// Telemetry exporter could not be created.
    #[error("failed to create {kind} exporter: {source}")]
    Exporter {
        kind: &'static str,
        source: BoxError,
    },

    /// The action of a periodic module failed. Displays the cause verbatim.
    #[error("{0}")]
    Run(#[source] BoxError),

    /// A statement run through a database handle failed.
    #[error("database query failed: {0}")]
    Query(#[source] rusqlite::Error),

    /// The serve loop failed for a reason other than requested shutdown.
    /// Displays the cause verbatim.
    #[error("{0}")]
    Serve(#[source] std::io::Error),

    /// Draining did not finish within the shutdown timeout.
    #[error("shutdown deadline of {0:?} exceeded")]
    ShutdownTimeout(Duration),

    /// Flushing buffered telemetry failed.
    #[error("failed to flush remaining telemetry: {0}")]
    Flush(#[source] BoxError),

    /// Shutting down the wrapped provider failed.
    #[error("failed to shut down provider: {0}")]
    Shutdown(#[source] BoxError),

    /// Closing the wrapped handle failed.
    #[error("failed to close {what}: {source}")]
    Close {
        what: &'static str,
        source: BoxError,
    },

    /// Several independent steps failed.
    #[error("{}", JoinedDisplay(.0))]
    Joined(Vec<Error>),

    /// `init` was called on a module that already went through it.
    #[error("module {0} already initialized")]
    AlreadyInitialized(String),

    /// `run` was called on a module whose `init` never succeeded.
    #[error("module {0} not initialized")]
    NotInitialized(String),

    /// `run` was called while another `run` is still active.
    #[error("module {0} already running")]
    AlreadyRunning(String),

    /// The wrapped handle was used after `stop`.
    #[error("{0} closed")]
    Closed(&'static str),

    /// Global registration of a telemetry component failed.
    #[error("failed to register {what}: {reason}")]
    Registry {
        what: &'static str,
        reason: String,
    },
}

struct JoinedDisplay<'a>(&'a [Error]);

impl fmt::Display for JoinedDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl Error {
    /// Combine independent failures. Returns `Ok` when every input is `Ok`,
    /// the single error when exactly one failed, `Joined` otherwise.
    pub fn join(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
        let mut errors: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Joined(errors)),
        }
    }

    /// Leaf errors: the members of `Joined` (recursively), or `self`.
    pub fn flatten(&self) -> Vec<&Error> {
        match self {
            Error::Joined(errors) => errors.iter().flat_map(Error::flatten).collect(),
            other => vec![other],
        }
    }

    /// Search the source chain, and every member of `Joined`, for an `E`.
    pub fn find<E: StdError + 'static>(&self) -> Option<&E> {
        self.flatten().into_iter().find_map(|leaf| {
            let mut current: Option<&(dyn StdError + 'static)> = Some(leaf);
            while let Some(err) = current {
                if let Some(found) = err.downcast_ref::<E>() {
                    return Some(found);
                }
                current = err.source();
            }
            None
        })
    }

    /// True when any leaf satisfies `pred`.
    pub fn any(&self, pred: impl Fn(&Error) -> bool) -> bool {
        self.flatten().into_iter().any(pred)
    }

    /// True when any leaf is a shutdown deadline.
    pub fn is_timeout(&self) -> bool {
        self.any(|e| matches!(e, Error::ShutdownTimeout(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("injected")]
    struct Injected;

    #[test]
    fn find_walks_source_chain() {
        let err = Error::Option {
            index: 0,
            source: Box::new(Injected),
        };
        assert!(err.find::<Injected>().is_some());
        assert!(err.to_string().starts_with("failed to apply option"));
    }

    #[test]
    fn find_walks_joined_members() {
        let err = Error::join([
            Err(Error::Flush(Box::new(Injected))),
            Err(Error::ShutdownTimeout(Duration::from_secs(1))),
        ])
        .unwrap_err();

        assert!(matches!(err, Error::Joined(ref v) if v.len() == 2));
        assert!(err.find::<Injected>().is_some());
        assert!(err.is_timeout());
        assert!(err.any(|e| matches!(e, Error::Flush(_))));
    }

    #[test]
    fn join_collapses_single_failure() {
        assert!(Error::join([Ok(()), Ok(())]).is_ok());
        let err = Error::join([Ok(()), Err(Error::MissingAction)]).unwrap_err();
        assert!(matches!(err, Error::MissingAction));
    }

    #[test]
    fn run_error_displays_cause_verbatim() {
        let err = Error::Run("boom".into());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn serve_error_displays_cause_verbatim() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "accept failed");
        let err = Error::Serve(io);
        assert_eq!(err.to_string(), "accept failed");
        assert!(err.find::<std::io::Error>().is_some());
    }
}
