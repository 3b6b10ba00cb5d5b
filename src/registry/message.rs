//! Client identifiers and relayed messages
//!
//! These are the values that flow through the registry, the history log and
//! the broadcast queue.

use std::borrow::Borrow;

/// Unique key for a registered client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Create a new client id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ClientId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A message relayed from one client to the others
///
/// Join and leave notices travel as messages too, with the joining or leaving
/// client as sender so they are never echoed back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Originating client
    pub sender: String,
    /// Message body
    pub text: String,
}

impl Message {
    /// Create a new message
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// History entry for a chat line: `"{sender}: {text}"`
    pub fn history_entry(&self) -> String {
        format!("{}: {}", self.sender, self.text)
    }

    /// Returns true if this message was sent by `id`
    pub fn is_from(&self, id: &ClientId) -> bool {
        self.sender == id.as_str()
    }
}

/// History entry appended when a client registers
pub fn join_entry(id: &ClientId) -> String {
    format!("User {} joined", id)
}

/// History entry appended when a client unregisters
pub fn leave_entry(id: &ClientId) -> String {
    format!("User {} left", id)
}
