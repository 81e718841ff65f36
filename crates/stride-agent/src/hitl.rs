//! Human-communication tool vocabulary

use serde::{Deserialize, Serialize};
use stride_ai::{ToolCall, ToolDefinition};

/// The one tool name that makes a subgraph pause for a human
pub const HUMAN_TOOL_NAME: &str = "communicate_with_human";

/// Kind of message an agent sends to the human
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Question,
    Observation,
    Suggestion,
    Clarification,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Question => "question",
            MessageType::Observation => "observation",
            MessageType::Suggestion => "suggestion",
            MessageType::Clarification => "clarification",
        }
    }
}

/// Payload of a pause: what the agent wants to tell or ask the human
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanRequest {
    pub message: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub context: String,
    /// Display name of the asking agent
    #[serde(default, alias = "agent_name")]
    pub agent: String,
    /// Call the eventual answer is attached to
    #[serde(default)]
    pub tool_call_id: String,
}

impl HumanRequest {
    /// Build the payload from a human-communication tool call.
    ///
    /// Arguments the model got slightly wrong are tolerated: an unknown
    /// message type reads as a question and a missing message falls back to
    /// the raw arguments.
    pub fn from_call(call: &ToolCall, agent: &str) -> Self {
        let args = &call.arguments;
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| args.to_string());
        let message_type = args
            .get("message_type")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let context = args
            .get("context")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Self {
            message,
            message_type,
            context,
            agent: agent.to_string(),
            tool_call_id: call.id.clone(),
        }
    }
}

/// A pending pause, keyed by an id the graph assigns when the subgraph parks.
///
/// Snapshots from older checkpoints or other producers may carry the key as
/// `id`; `interrupt_id` wins when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInterrupt")]
pub struct InterruptRecord {
    pub interrupt_id: String,
    /// Node that raised the interrupt
    pub node: String,
    pub payload: HumanRequest,
}

#[derive(Deserialize)]
struct RawInterrupt {
    interrupt_id: Option<String>,
    id: Option<String>,
    #[serde(default)]
    node: String,
    #[serde(alias = "value")]
    payload: HumanRequest,
}

impl TryFrom<RawInterrupt> for InterruptRecord {
    type Error = String;

    fn try_from(raw: RawInterrupt) -> std::result::Result<Self, Self::Error> {
        let interrupt_id = raw
            .interrupt_id
            .filter(|id| !id.is_empty())
            .or(raw.id.filter(|id| !id.is_empty()))
            .ok_or_else(|| "interrupt snapshot has neither 'interrupt_id' nor 'id'".to_string())?;
        Ok(Self {
            interrupt_id,
            node: raw.node,
            payload: raw.payload,
        })
    }
}

/// Schema bound to every expert for talking to the human
pub fn human_tool_definition() -> ToolDefinition {
    ToolDefinition::new(
        HUMAN_TOOL_NAME,
        "Communicate with the athlete: ask a question, share an observation, \
         make a suggestion or request a clarification. Execution pauses until \
         the athlete replies; the reply is returned as text. Use sparingly, \
         only when the data cannot answer it.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "What to say to the athlete. Be concise and direct."
                },
                "message_type": {
                    "type": "string",
                    "enum": ["question", "observation", "suggestion", "clarification"],
                    "description": "Kind of message"
                },
                "context": {
                    "type": "string",
                    "description": "Optional context explaining why you are asking",
                    "default": ""
                }
            },
            "required": ["message", "message_type"]
        }),
    )
}

/// Turn a resume value into the answer text for the tool result.
///
/// Accepts a plain string, or a mapping whose `content`, `answer` or
/// `message` field (first non-empty, in that order) holds the answer.
/// Anything else becomes its JSON form.
pub fn unwrap_answer(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => ["content", "answer", "message"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| serde_json::to_string(value).unwrap_or_else(|_| value.to_string())),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}
