//! MutationEvent - the message sent from the local end to the remote end.
//!
//! On the wire an event is a JSON object:
//!
//! ```text
//! { "Name": "./a/x.txt", "Op": "WRITE", "File": "aGk=" }
//! ```
//!
//! `File` is the standard base64 encoding of the file bytes, or `null` for
//! metadata-only events.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::WireError;

/// Kind of filesystem change carried by a [`MutationEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// File contents changed
    Write,
    /// Path was created
    Create,
    /// Path was removed
    Remove,
    /// Path was renamed away
    Rename,
    /// Anything else the notifier reports (permission changes, etc)
    Other,
}

impl Operation {
    /// Wire name of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Write => "WRITE",
            Operation::Create => "CREATE",
            Operation::Remove => "REMOVE",
            Operation::Rename => "RENAME",
            Operation::Other => "OTHER",
        }
    }

    /// Parse a wire name. Unknown names map to [`Operation::Other`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "WRITE" => Operation::Write,
            "CREATE" => Operation::Create,
            "REMOVE" => Operation::Remove,
            "RENAME" => Operation::Rename,
            _ => Operation::Other,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Operation::from_name(&name))
    }
}

/// One file change, as sent over the peer channel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    /// Path of the affected file, as observed on the local end
    #[serde(rename = "Name")]
    pub path: String,
    /// What happened to the path
    #[serde(rename = "Op")]
    pub operation: Operation,
    /// New file bytes (only for payload-bearing events)
    #[serde(rename = "File", default, with = "file_bytes")]
    pub content: Option<Vec<u8>>,
}

impl MutationEvent {
    /// A WRITE event carrying the full file contents.
    pub fn write(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            operation: Operation::Write,
            content: Some(content),
        }
    }

    /// An event with no payload; it describes the change but carries no bytes.
    pub fn metadata(path: impl Into<String>, operation: Operation) -> Self {
        Self {
            path: path.into(),
            operation,
            content: None,
        }
    }

    /// Whether applying this event changes file contents on the remote.
    pub fn carries_content(&self) -> bool {
        self.content.is_some()
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Decode)
    }
}

impl fmt::Debug for MutationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEvent")
            .field("path", &self.path)
            .field("operation", &self.operation)
            .field(
                "content",
                &self.content.as_ref().map(|c| format!("[{} bytes]", c.len())),
            )
            .finish()
    }
}

/// Base64 (standard alphabet, padded) for the optional `File` field.
mod file_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(D::Error::custom))
            .transpose()
    }
}
