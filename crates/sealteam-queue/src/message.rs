// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Task,
    Status,
    Review,
    Complete,
    Error,
    Cancel,
    AllComplete,
}

/// One envelope on the message fabric. `to == "shared"` is a logical
/// address expanded at send time into one copy per running agent, never
/// stored literally in a queue key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl QueueMessage {
    pub fn new(from: impl Into<String>, to: impl Into<String>, message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            message_type,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_unique_id() {
        let a = QueueMessage::new("bob", "worker-1", MessageType::Task, "go");
        let b = QueueMessage::new("bob", "worker-1", MessageType::Task, "go");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn serializes_to_json_round_trip() {
        let msg = QueueMessage::new("bob", "shared", MessageType::Status, "halfway done");
        let text = serde_json::to_string(&msg).unwrap();
        let back: QueueMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(msg, back);
    }
}
