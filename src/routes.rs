//! Longest-prefix route tables and the filter chain.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ServerError;
use crate::handler::{HttpFilter, HttpHandler, WebSocketHandler};
use crate::socket::Lifecycle;

/// An add-only map from URI prefixes to handlers.
pub(crate) struct PrefixTable<H: ?Sized> {
    entries: Vec<(String, Arc<H>)>,
}

impl<H: ?Sized> PrefixTable<H> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn insert(&mut self, prefix: String, handler: Arc<H>) -> Result<(), ServerError> {
        if self.entries.iter().any(|(p, _)| *p == prefix) {
            return Err(ServerError::DuplicateRoute(prefix));
        }
        self.entries.push((prefix, handler));
        Ok(())
    }

    /// Find the handler with the longest prefix of `uri`, along with the
    /// rest of the URI after that prefix.
    ///
    /// Entries are scanned in registration order and the first of the
    /// longest matches wins.
    pub(crate) fn lookup(&self, uri: &str) -> Option<(Arc<H>, String)> {
        let mut best: Option<&(String, Arc<H>)> = None;
        for entry in &self.entries {
            if !uri.starts_with(entry.0.as_str()) {
                continue;
            }
            match best {
                Some((prefix, _)) if prefix.len() >= entry.0.len() => {}
                _ => best = Some(entry),
            }
        }
        best.map(|(prefix, handler)| (handler.clone(), uri[prefix.len()..].to_owned()))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Tables {
    http: PrefixTable<dyn HttpHandler>,
    websocket: PrefixTable<dyn WebSocketHandler>,
    filters: Vec<Arc<dyn HttpFilter>>,
}

/// The routing and filter registries shared by every connection.
///
/// Reads take the shared lock, registrations the exclusive one. All
/// registrations are refused while the owning server runs.
pub(crate) struct Routes {
    tables: RwLock<Tables>,
    lifecycle: Arc<Lifecycle>,
}

impl Routes {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                http: PrefixTable::new(),
                websocket: PrefixTable::new(),
                filters: Vec::new(),
            }),
            lifecycle,
        }
    }

    fn write(&self) -> Result<parking_lot::RwLockWriteGuard<'_, Tables>, ServerError> {
        let tables = self.tables.write();
        if self.lifecycle.is_running() {
            return Err(ServerError::RegistrationWhileRunning);
        }
        Ok(tables)
    }

    pub(crate) fn add_filter(&self, filter: Arc<dyn HttpFilter>) -> Result<(), ServerError> {
        self.write()?.filters.push(filter);
        Ok(())
    }

    pub(crate) fn add_handler(
        &self,
        prefix: String,
        handler: Arc<dyn HttpHandler>,
    ) -> Result<(), ServerError> {
        self.write()?.http.insert(prefix, handler)
    }

    pub(crate) fn add_websocket_handler(
        &self,
        prefix: String,
        handler: Arc<dyn WebSocketHandler>,
    ) -> Result<(), ServerError> {
        self.write()?.websocket.insert(prefix, handler)
    }

    /// A snapshot of the filter chain in evaluation order.
    pub(crate) fn filters(&self) -> Vec<Arc<dyn HttpFilter>> {
        self.tables.read().filters.clone()
    }

    pub(crate) fn handler_for(&self, uri: &str) -> Option<(Arc<dyn HttpHandler>, String)> {
        self.tables.read().http.lookup(uri)
    }

    pub(crate) fn websocket_handler_for(
        &self,
        uri: &str,
    ) -> Option<(Arc<dyn WebSocketHandler>, String)> {
        self.tables.read().websocket.lookup(uri)
    }
}

impl fmt::Debug for Routes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("Routes")
            .field("http", &tables.http.len())
            .field("websocket", &tables.websocket.len())
            .field("filters", &tables.filters.len())
            .finish()
    }
}
