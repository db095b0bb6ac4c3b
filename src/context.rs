use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use unicase::UniCase;

/// Per-connection state shared between filters and handlers.
///
/// Keys are compared case-insensitively. Values are typed; a lookup with
/// the wrong type behaves like a missing key.
#[derive(Default)]
pub struct Context {
    values: HashMap<UniCase<String>, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Conventional key for a session handle installed by a filter.
    pub const SESSION: &'static str = "Session";

    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning true if it replaced an existing entry.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> bool {
        self.values
            .insert(UniCase::new(key.into()), Box::new(value))
            .is_some()
    }

    /// Borrow a value.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values
            .get(&UniCase::new(key.to_owned()))
            .and_then(|v| v.downcast_ref())
    }

    /// Mutably borrow a value.
    pub fn get_mut<T: Any + Send + Sync>(&mut self, key: &str) -> Option<&mut T> {
        self.values
            .get_mut(&UniCase::new(key.to_owned()))
            .and_then(|v| v.downcast_mut())
    }

    /// Remove a value, returning it if it had the requested type.
    pub fn remove<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        self.values
            .remove(&UniCase::new(key.to_owned()))
            .and_then(|v| v.downcast().ok())
            .map(|v| *v)
    }

    /// Whether any value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(&UniCase::new(key.to_owned()))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.values.keys().map(|k| k.as_str()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_case_insensitive_values() {
        let mut ctx = Context::new();
        assert!(!ctx.insert("User", String::from("ada")));
        assert_eq!(ctx.get::<String>("user").map(String::as_str), Some("ada"));
        assert_eq!(ctx.get::<u32>("USER"), None);

        if let Some(user) = ctx.get_mut::<String>("user") {
            user.push_str(" lovelace");
        }
        assert_eq!(ctx.remove::<String>("User").as_deref(), Some("ada lovelace"));
        assert!(!ctx.contains_key("user"));
    }
}
