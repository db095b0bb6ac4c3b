//! Case-insensitive header map and common header names.

use std::fmt;

use indexmap::IndexMap;
use unicase::UniCase;

/// `Connection`
pub const CONNECTION: &str = "Connection";
/// `Content-Length`
pub const CONTENT_LENGTH: &str = "Content-Length";
/// `Content-Type`
pub const CONTENT_TYPE: &str = "Content-Type";
/// `Cookie`
pub const COOKIE: &str = "Cookie";
/// `Location`
pub const LOCATION: &str = "Location";
/// `Set-Cookie`
pub const SET_COOKIE: &str = "Set-Cookie";
/// `Upgrade`
pub const UPGRADE: &str = "Upgrade";
/// `Sec-WebSocket-Accept`
pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
/// `Sec-WebSocket-Key`
pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
/// `Sec-WebSocket-Protocol`
pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";
/// `Sec-WebSocket-Version`
pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";

/// An ordered header map with case-insensitive names.
///
/// Inserting an existing name replaces its value but keeps the original
/// position and spelling of the name.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    map: IndexMap<UniCase<String>, String>,
}

impl Headers {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.map.insert(UniCase::new(name.into()), value.into())
    }

    /// Look up a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map
            .get(&UniCase::new(name.to_owned()))
            .map(String::as_str)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut String> {
        self.map.get_mut(&UniCase::new(name.to_owned()))
    }

    /// Whether the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove a header, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.map.shift_remove(&UniCase::new(name.to_owned()))
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether there are no headers.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
