//! Messages exchanged with controlled pages.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Control messages a page can post to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    /// Leave the waiting state immediately.
    SkipWaiting,
    /// Delete every partition, then notify pages.
    ClearCache,
}

impl AgentMessage {
    /// Interpret arbitrary message data. Anything that is not an object with a known
    /// `type` yields `None`.
    pub fn parse(data: &JsonValue) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Messages the agent posts to pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Sent after a `CLEAR_CACHE` request completes.
    CacheCleared,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(
            AgentMessage::parse(&json!({ "type": "SKIP_WAITING" })),
            Some(AgentMessage::SkipWaiting)
        );
        assert_eq!(
            AgentMessage::parse(&json!({ "type": "CLEAR_CACHE", "extra": 1 })),
            Some(AgentMessage::ClearCache)
        );
    }

    #[test]
    fn test_parse_ignores_unknown() {
        assert_eq!(AgentMessage::parse(&json!({ "type": "PING" })), None);
        assert_eq!(AgentMessage::parse(&json!({ "kind": "SKIP_WAITING" })), None);
        assert_eq!(AgentMessage::parse(&json!("SKIP_WAITING")), None);
        assert_eq!(AgentMessage::parse(&JsonValue::Null), None);
    }

    #[test]
    fn test_cache_cleared_wire_format() {
        assert_eq!(
            serde_json::to_value(ClientMessage::CacheCleared).unwrap(),
            json!({ "type": "CACHE_CLEARED" })
        );
    }
}
