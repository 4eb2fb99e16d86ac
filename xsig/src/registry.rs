/*!
Connection bookkeeping.

Transports carrying token streams register here under a unique key. The
registry is a plain owned value: create it at startup and pass it to whatever
needs to enumerate connections.
*/

use crate::error::{Result, XSigError};
use std::collections::BTreeMap;
use tracing::debug;

/// Anything the registry can track
pub trait Connection: Send {
    /// Unique registry key
    fn key(&self) -> &str;

    /// Human-readable connection state
    fn status(&self) -> String;
}

/// Registry of active connections, ordered by key
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<String, Box<dyn Connection>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, rejecting duplicate keys
    pub fn register(&mut self, connection: Box<dyn Connection>) -> Result<()> {
        let key = connection.key().to_string();
        if self.connections.contains_key(&key) {
            return Err(XSigError::DuplicateConnection(key));
        }
        debug!(key = %key, "registered connection");
        self.connections.insert(key, connection);
        Ok(())
    }

    /// Remove a connection by key
    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Connection>> {
        let removed = self.connections.remove(key);
        if removed.is_some() {
            debug!(key, "removed connection");
        }
        removed
    }

    pub fn get(&self, key: &str) -> Option<&dyn Connection> {
        self.connections.get(key).map(|connection| connection.as_ref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.connections.contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// `(key, status)` for every connection, sorted by key
    pub fn statuses(&self) -> Vec<(String, String)> {
        self.connections
            .iter()
            .map(|(key, connection)| (key.clone(), connection.status()))
            .collect()
    }

    /// Console listing of every connection and its status
    pub fn status_report(&self) -> String {
        if self.connections.is_empty() {
            return "No connections registered".to_string();
        }

        let mut report = format!("{} connection(s):", self.connections.len());
        for (key, status) in self.statuses() {
            report.push_str(&format!("\n  {key}: {status}"));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeConnection {
        key: String,
        status: &'static str,
    }

    impl FakeConnection {
        fn boxed(key: &str, status: &'static str) -> Box<dyn Connection> {
            Box::new(Self {
                key: key.to_string(),
                status,
            })
        }
    }

    impl Connection for FakeConnection {
        fn key(&self) -> &str {
            &self.key
        }

        fn status(&self) -> String {
            self.status.to_string()
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ConnectionRegistry::new();
        registry.register(FakeConnection::boxed("server-7", "Waiting for connection")).unwrap();
        registry.register(FakeConnection::boxed("client-1", "Connected")).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("client-1"));
        assert_eq!(registry.get("server-7").unwrap().status(), "Waiting for connection");
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["client-1", "server-7"]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut registry = ConnectionRegistry::new();
        registry.register(FakeConnection::boxed("a", "Connected")).unwrap();
        let err = registry.register(FakeConnection::boxed("a", "Connected")).unwrap_err();
        assert!(matches!(err, XSigError::DuplicateConnection(key) if key == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut registry = ConnectionRegistry::new();
        registry.register(FakeConnection::boxed("a", "Connected")).unwrap();
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_status_report() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(registry.status_report(), "No connections registered");

        registry.register(FakeConnection::boxed("server-7", "Waiting for connection")).unwrap();
        registry.register(FakeConnection::boxed("client-1", "Connected")).unwrap();
        assert_eq!(
            registry.status_report(),
            "2 connection(s):\n  client-1: Connected\n  server-7: Waiting for connection"
        );
    }
}
