//! Typed channel bindings over the [`TransportSession`].
//!
//! A [`TopicChannel`] pairs a topic name and a ROS message type with the
//! Rust payload type carried on it. It holds no connection state; every call
//! borrows the session explicitly, so the payload of each publish is built by
//! the caller and never shared between calls.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use sdv_types::ConsoleError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::transport::{MessageHandler, TransportSession};

/// A named, typed publish/subscribe stream.
pub struct TopicChannel<T> {
    name: String,
    msg_type: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> TopicChannel<T> {
    pub fn new(name: impl Into<String>, msg_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            msg_type: msg_type.into(),
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Bind `handler` to this topic on the current Connection.
    pub fn subscribe(
        &self,
        transport: &mut TransportSession,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), ConsoleError> {
        transport.subscribe(&self.name, &self.msg_type, handler)
    }

    pub fn unsubscribe(&self, transport: &mut TransportSession, handler: &Arc<dyn MessageHandler>) {
        transport.unsubscribe(&self.name, handler);
    }
}

impl<T: Serialize> TopicChannel<T> {
    /// Serialise `msg` and publish it.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotConnected`] unless the session is `Open`;
    /// [`ConsoleError::Serialization`] if `msg` cannot be encoded.
    pub fn publish(&self, transport: &mut TransportSession, msg: &T) -> Result<(), ConsoleError> {
        let body = serde_json::to_value(msg).map_err(|e| ConsoleError::Serialization(e.to_string()))?;
        transport.publish(&self.name, &self.msg_type, body)
    }
}

impl<T: DeserializeOwned> TopicChannel<T> {
    /// Decode one inbound `msg` body.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::Decode`] when required fields are missing or mistyped.
    pub fn decode(&self, msg: &Value) -> Result<T, ConsoleError> {
        <T as serde::Deserialize>::deserialize(msg).map_err(|e| ConsoleError::Decode(format!("{}: {e}", self.name)))
    }
}

impl<T> Clone for TopicChannel<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone(), self.msg_type.clone())
    }
}

impl<T> fmt::Debug for TopicChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicChannel")
            .field("name", &self.name)
            .field("msg_type", &self.msg_type)
            .finish()
    }
}
