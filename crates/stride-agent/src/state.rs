//! Append-only conversation log

use serde::{Deserialize, Serialize};
use stride_ai::{Message, ToolCall};

use crate::error::{Error, Result};

/// Ordered message log for one expert subgraph.
///
/// Messages are only ever appended. `version` counts appended messages,
/// so two logs with the same version hold the same prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
    version: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a log from a first user message
    pub fn with_user(text: impl Into<String>) -> Self {
        let mut log = Self::new();
        log.append(Message::user(text));
        log
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.version += 1;
    }

    /// Append a node's delta
    pub fn extend(&mut self, delta: impl IntoIterator<Item = Message>) {
        for message in delta {
            self.append(message);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent assistant message, if any
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }

    /// Tool calls of the trailing assistant message that have no result yet
    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        match self.messages.last() {
            Some(last) if last.is_assistant() => last.tool_calls(),
            _ => vec![],
        }
    }

    /// Check that every assistant message's tool calls are answered, in
    /// order, by the tool results that immediately follow it.
    ///
    /// Calls of a trailing assistant message are allowed to be pending.
    pub fn check_tool_results(&self) -> Result<()> {
        let mut idx = 0;
        while idx < self.messages.len() {
            let calls = self.messages[idx].tool_calls();
            idx += 1;
            if calls.is_empty() || idx == self.messages.len() {
                continue;
            }
            for call in &calls {
                match self.messages.get(idx).and_then(|m| m.tool_call_id()) {
                    Some(id) if id == call.id => idx += 1,
                    Some(id) => {
                        return Err(Error::Protocol(format!(
                            "tool result '{}' does not answer call '{}'",
                            id, call.id
                        )));
                    }
                    None => {
                        return Err(Error::Protocol(format!(
                            "tool call '{}' ({}) has no result",
                            call.id, call.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_ai::Content;

    fn two_calls() -> Message {
        Message::assistant(vec![
            Content::tool_call("a", "list_available_plots", serde_json::json!({})),
            Content::tool_call("b", "python_plotting_tool", serde_json::json!({})),
        ])
    }

    #[test]
    fn test_version_counts_appends() {
        let mut log = MessageLog::with_user("go");
        log.extend([Message::assistant(vec![Content::text("done")])]);
        assert_eq!(log.version(), 2);
        assert_eq!(log.last_assistant().unwrap().text(), "done");
    }

    #[test]
    fn test_trailing_calls_are_pending() {
        let mut log = MessageLog::with_user("go");
        log.append(two_calls());
        assert_eq!(log.pending_tool_calls().len(), 2);
        assert!(log.check_tool_results().is_ok());
    }

    #[test]
    fn test_answered_in_order() {
        let mut log = MessageLog::with_user("go");
        log.append(two_calls());
        log.append(Message::tool_result("a", "list_available_plots", "none", false));
        log.append(Message::tool_result("b", "python_plotting_tool", "ok", false));
        log.append(Message::assistant(vec![Content::text("final")]));
        assert!(log.pending_tool_calls().is_empty());
        assert!(log.check_tool_results().is_ok());
    }

    #[test]
    fn test_dangling_call_detected() {
        let mut log = MessageLog::with_user("go");
        log.append(two_calls());
        log.append(Message::tool_result("a", "list_available_plots", "none", false));
        log.append(Message::assistant(vec![Content::text("final")]));
        assert!(matches!(log.check_tool_results(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_out_of_order_detected() {
        let mut log = MessageLog::with_user("go");
        log.append(two_calls());
        log.append(Message::tool_result("b", "python_plotting_tool", "ok", false));
        log.append(Message::tool_result("a", "list_available_plots", "none", false));
        assert!(log.check_tool_results().is_err());
    }
}
