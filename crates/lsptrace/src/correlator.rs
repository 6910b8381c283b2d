use std::collections::HashMap;
use std::sync::Mutex;

use tracing::warn;

/// Shared map pairing an in-flight request id with its method name.
///
/// Both directional pipelines write to the same instance: a request seen on
/// one direction is popped by the response travelling the other way. Ids are
/// kept in a single space, so a client-originated id can collide with a
/// server-originated one; see DESIGN.md.
#[derive(Debug, Default)]
pub struct RequestMap {
    inner: Mutex<HashMap<i64, String>>,
}

impl RequestMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the method of an in-flight request, silently overwriting a
    /// previous binding for the same id.
    ///
    /// # Panics
    ///
    /// Panics when `id` is negative or `method` is empty; callers classify
    /// messages before inserting, so either is a programmer error.
    pub fn insert(&self, id: i64, method: &str) {
        assert!(id >= 0, "request id must be non-negative");
        assert!(!method.is_empty(), "request method must be non-empty");
        let mut map = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        map.insert(id, method.to_string());
    }

    /// Removes and returns the method bound to `id`.
    ///
    /// A miss is tolerated: it returns an empty string and logs a warning,
    /// since servers occasionally answer ids the proxy never saw.
    pub fn pop(&self, id: i64) -> String {
        let mut map = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        match map.remove(&id) {
            Some(method) => method,
            None => {
                warn!(id, "response does not match any in-flight request");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_pop_returns_the_method() {
        let map = RequestMap::new();
        map.insert(62, "textDocument/codeLens");
        assert_eq!(map.pop(62), "textDocument/codeLens");
    }

    #[test]
    fn pop_removes_the_binding() {
        let map = RequestMap::new();
        map.insert(1, "initialize");
        map.pop(1);
        assert_eq!(map.pop(1), "");
    }

    #[test]
    fn pop_of_unknown_id_returns_empty() {
        let map = RequestMap::new();
        assert_eq!(map.pop(999), "");
    }

    #[test]
    fn insert_overwrites_silently() {
        let map = RequestMap::new();
        map.insert(5, "first");
        map.insert(5, "second");
        assert_eq!(map.pop(5), "second");
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn negative_id_panics() {
        RequestMap::new().insert(-1, "method");
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn empty_method_panics() {
        RequestMap::new().insert(1, "");
    }
}
