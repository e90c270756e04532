// Append Request Payload
//
// CBOR map with keys `action`, `logIdentifier` and `data`. Decoding here
// only checks shape; the engine checks that the request makes sense for its
// family.

use serde::{Deserialize, Serialize};

use crate::address::{AddressError, LogId};
use crate::page::RecordError;

/// The only action the append family understands.
pub const APPEND_ACTION: &str = "append";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    pub action: String,
    pub log_identifier: String,
    pub data: String,
}

/// Caller errors. A request rejected with one of these touched no page.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unsupported action {0:?}")]
    UnsupportedAction(String),

    #[error("invalid log identifier: {0}")]
    InvalidLogId(#[from] AddressError),

    #[error("log identifier {log_id} is outside namespace {namespace}")]
    WrongNamespace { log_id: String, namespace: String },

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
}

impl AppendRequest {
    pub fn append(log_id: &LogId, data: impl Into<String>) -> Self {
        Self {
            action: APPEND_ACTION.into(),
            log_identifier: log_id.to_string(),
            data: data.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RequestError> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(self, &mut out)
            .map_err(|e| RequestError::Malformed(e.to_string()))?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RequestError> {
        ciborium::de::from_reader(bytes).map_err(|e| RequestError::Malformed(e.to_string()))
    }

    pub fn log_id(&self) -> Result<LogId, RequestError> {
        Ok(LogId::parse(&self.log_identifier)?)
    }
}
