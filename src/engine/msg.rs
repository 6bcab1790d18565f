//! # Inbound Messages
//!
//! The engine consumes any stream of values implementing [`Msg`]. Headers are
//! exposed through the [`Header`] trait with `&self` receivers so that
//! handlers sharing a message can still annotate it.

use dashmap::DashMap;
use std::fmt;

/// Multi-valued, interior-mutable message headers
pub trait Header: Send + Sync {
    /// Append `value` to the values already stored under `key`
    fn add(&self, key: &str, value: &str);

    /// First value stored under `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Replace every value stored under `key`
    fn set(&self, key: &str, value: &str);

    fn del(&self, key: &str);

    /// Sorted header names
    fn keys(&self) -> Vec<String>;
}

/// A message received from an input stream
pub trait Msg: Send + Sync {
    /// Entrypoint (topic or queue name) the message arrived on
    fn entrypoint(&self) -> &str;

    fn value(&self) -> &[u8];

    fn key(&self) -> &[u8];

    fn header(&self) -> &dyn Header;
}

#[derive(Debug, Default)]
pub struct Headers {
    inner: DashMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Header for Headers {
    fn add(&self, key: &str, value: &str) {
        self.inner
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner
            .get(key)
            .and_then(|values| values.first().cloned())
    }

    fn set(&self, key: &str, value: &str) {
        self.inner.insert(key.to_string(), vec![value.to_string()]);
    }

    fn del(&self, key: &str) {
        self.inner.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl Clone for Headers {
    fn clone(&self) -> Self {
        let inner = DashMap::new();
        for entry in self.inner.iter() {
            inner.insert(entry.key().clone(), entry.value().clone());
        }
        Self { inner }
    }
}

/// Owned in-memory message
#[derive(Clone)]
pub struct Message {
    entrypoint: String,
    key: Vec<u8>,
    value: Vec<u8>,
    headers: Headers,
}

impl Message {
    pub fn new(entrypoint: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            key: Vec::new(),
            value: value.into(),
            headers: Headers::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_header(self, key: &str, value: &str) -> Self {
        self.headers.add(key, value);
        self
    }
}

impl Msg for Message {
    fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn header(&self) -> &dyn Header {
        &self.headers
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("entrypoint", &self.entrypoint)
            .field("key", &String::from_utf8_lossy(&self.key))
            .field("value_len", &self.value.len())
            .field("headers", &self.headers.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_multi_value() {
        let headers = Headers::new();
        headers.add("Accept", "json");
        headers.add("Accept", "text");
        assert_eq!(headers.get("Accept").as_deref(), Some("json"));

        headers.set("Accept", "proto");
        assert_eq!(headers.get("Accept").as_deref(), Some("proto"));

        headers.add("Authorization", "Bearer x");
        assert_eq!(headers.keys(), vec!["Accept", "Authorization"]);

        headers.del("Accept");
        assert!(headers.get("Accept").is_none());
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_message_builder() {
        let msg = Message::new("tx-crafter", br#"{"nonce":1}"#.to_vec())
            .with_key("chain-1")
            .with_header("tenant", "acme");

        assert_eq!(msg.entrypoint(), "tx-crafter");
        assert_eq!(msg.key(), b"chain-1");
        assert_eq!(msg.value(), br#"{"nonce":1}"#);
        assert_eq!(msg.header().get("tenant").as_deref(), Some("acme"));
    }
}
