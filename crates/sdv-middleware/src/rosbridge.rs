//! rosbridge v2 framing.
//!
//! Every frame on the bridge WebSocket is a JSON object whose `op` field
//! names the operation. The console only speaks the topic subset of the
//! protocol:
//!
//! | `op` | Direction | Fields |
//! |---|---|---|
//! | `advertise` | out | `topic`, `type` |
//! | `unadvertise` | out | `topic` |
//! | `publish` | both | `topic`, `msg` |
//! | `subscribe` | out | `topic`, `type` |
//! | `unsubscribe` | out | `topic` |
//! | `status` | in | `level`, `msg` |
//!
//! Anything else arriving from the bridge decodes as
//! [`Operation::Unsupported`] and is ignored by the session.

use sdv_types::ConsoleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One rosbridge operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Advertise {
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
    Unadvertise {
        topic: String,
    },
    Publish {
        topic: String,
        msg: Value,
    },
    Subscribe {
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
    Unsubscribe {
        topic: String,
    },
    Status {
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        msg: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

impl Operation {
    pub fn advertise(topic: &str, msg_type: &str) -> Self {
        Operation::Advertise {
            topic: topic.to_string(),
            msg_type: msg_type.to_string(),
        }
    }

    pub fn subscribe(topic: &str, msg_type: &str) -> Self {
        Operation::Subscribe {
            topic: topic.to_string(),
            msg_type: msg_type.to_string(),
        }
    }

    pub fn publish(topic: &str, msg: Value) -> Self {
        Operation::Publish {
            topic: topic.to_string(),
            msg,
        }
    }
}

/// Serialise an operation into a text frame.
pub fn encode(op: &Operation) -> Result<String, ConsoleError> {
    serde_json::to_string(op).map_err(|e| ConsoleError::Serialization(e.to_string()))
}

/// Parse a text frame received from the bridge.
///
/// # Errors
///
/// [`ConsoleError::Decode`] when the frame is not JSON or lacks a valid `op`.
pub fn decode(text: &str) -> Result<Operation, ConsoleError> {
    serde_json::from_str(text).map_err(|e| ConsoleError::Decode(format!("rosbridge frame: {e}")))
}
