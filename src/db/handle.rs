//! Shared access to the module's connection.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::{BoxError, Error, Result};
use crate::lifecycle::lock_slot;

const WHAT: &str = "database";

/// Cloneable handle to the connection owned by a [`super::Database`].
///
/// Every call locks the connection for the duration of the closure, so
/// statements from different clones are serialized. A closure that panics
/// leaves the connection usable for later calls and for `stop`.
#[derive(Debug, Clone, Default)]
pub struct DbHandle {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl DbHandle {
    pub(crate) fn install(&self, conn: Connection) {
        *lock_slot(&self.conn) = Some(conn);
    }

    pub(crate) fn take(&self) -> Option<Connection> {
        lock_slot(&self.conn).take()
    }

    /// Run `f` against the connection.
    ///
    /// Fails with [`Error::Closed`] before `init` and after `stop`.
    pub fn with<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let guard = lock_slot(&self.conn);
        let conn = guard.as_ref().ok_or(Error::Closed(WHAT))?;
        f(conn).map_err(Error::Query)
    }

    /// Whether the connection has been released.
    pub fn is_closed(&self) -> bool {
        lock_slot(&self.conn).is_none()
    }

    /// Close the connection. A handle that holds nothing closes trivially.
    pub(crate) fn close(&self) -> Result<()> {
        match self.take() {
            None => Ok(()),
            Some(conn) => conn.close().map_err(|(_, source)| Error::Close {
                what: WHAT,
                source: BoxError::from(source),
            }),
        }
    }
}
