//! # Transaction Envelope
//!
//! The business payload carried by a [`TxContext`](crate::engine::TxContext)
//! while a message is processed: the transaction request, routing labels and
//! every error handlers recorded along the way.

use crate::types::error::{Disposition, TxError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope identifier (UUID v4), assigned when the envelope is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    /// Headers propagated from and to the broker
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Labels shared with downstream services (tenant, job, tracing carrier)
    #[serde(default)]
    pub context_labels: HashMap<String, String>,

    /// Labels only meaningful inside this worker
    #[serde(default)]
    pub internal_labels: HashMap<String, String>,

    /// Transaction request, opaque to the engine
    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(default)]
    errors: Vec<TxError>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn set_id(&mut self, id: Uuid) -> &mut Self {
        self.id = Some(id);
        self
    }

    /// Assign a fresh identifier unless one is already set
    pub fn ensure_id(&mut self) -> Uuid {
        *self.id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn set_context_label(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.context_labels.insert(key.into(), value.into());
        self
    }

    pub fn context_label(&self, key: &str) -> Option<&str> {
        self.context_labels.get(key).map(String::as_str)
    }

    pub fn set_internal_label(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.internal_labels.insert(key.into(), value.into());
        self
    }

    pub fn internal_label(&self, key: &str) -> Option<&str> {
        self.internal_labels.get(key).map(String::as_str)
    }

    /// Record an error and return the recorded value
    pub fn append_error(&mut self, err: TxError) -> &mut TxError {
        self.errors.push(err);
        let last = self.errors.len() - 1;
        &mut self.errors[last]
    }

    pub fn append_errors(&mut self, errs: impl IntoIterator<Item = TxError>) -> &mut Self {
        self.errors.extend(errs);
        self
    }

    pub fn errors(&self) -> &[TxError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Keep only the errors matching `keep` (e.g. drop a handled nonce warning)
    pub fn retain_errors<F>(&mut self, keep: F) -> &mut Self
    where
        F: FnMut(&TxError) -> bool,
    {
        self.errors.retain(keep);
        self
    }

    /// Quoted list of recorded errors, empty when there is none
    pub fn error_string(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        let quoted: Vec<String> = self
            .errors
            .iter()
            .map(|err| format!("{:?}", err.to_string()))
            .collect();
        format!("[{}]", quoted.join(" "))
    }

    /// Whether every recorded error is a warning (vacuously true without errors)
    pub fn only_warnings(&self) -> bool {
        self.errors.iter().all(TxError::is_warning)
    }

    /// The recorded error with the most severe non-skip disposition
    pub fn most_severe_error(&self) -> Option<&TxError> {
        self.errors
            .iter()
            .filter(|err| err.disposition() != Disposition::Skip)
            .max_by_key(|err| err.disposition())
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
