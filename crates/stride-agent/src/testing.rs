//! Scripted collaborators for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use stride_ai::{Content, Message, ModelRequest, ModelResponse, ModelSpec, Usage};

/// A model that replays canned assistant messages in order.
///
/// Scripts are keyed by system prompt so concurrent experts each get their
/// own sequence; requests without a matching key use the unkeyed script.
pub(crate) struct MockModel {
    spec: ModelSpec,
    scripts: Mutex<HashMap<String, Vec<Message>>>,
    /// Every request the model saw
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl MockModel {
    pub fn new(responses: Vec<Message>) -> Arc<Self> {
        Self::keyed(vec![("", responses)])
    }

    pub fn keyed(scripts: Vec<(&str, Vec<Message>)>) -> Arc<Self> {
        Self::with_spec(ModelSpec::anthropic("mock"), scripts)
    }

    /// Like `keyed`, reporting `spec` (and its pricing) as the model
    pub fn with_spec(spec: ModelSpec, scripts: Vec<(&str, Vec<Message>)>) -> Arc<Self> {
        Arc::new(Self {
            spec,
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(key, responses)| (key.to_string(), responses))
                    .collect(),
            ),
            requests: Mutex::new(vec![]),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl stride_ai::ChatModel for MockModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    async fn invoke(&self, request: &ModelRequest) -> stride_ai::Result<ModelResponse> {
        self.requests.lock().push(request.clone());
        let message = {
            let mut scripts = self.scripts.lock();
            let key = request.system_prompt.clone().unwrap_or_default();
            let key = if scripts.contains_key(&key) { key } else { String::new() };
            match scripts.get_mut(&key) {
                Some(responses) if !responses.is_empty() => responses.remove(0),
                _ => {
                    return Err(stride_ai::Error::UnexpectedResponse(format!(
                        "script '{key}' exhausted"
                    )));
                }
            }
        };
        let usage = Usage {
            input: 10,
            output: 5,
            ..Default::default()
        };
        Ok(ModelResponse { message, usage })
    }
}

pub(crate) fn text(t: &str) -> Message {
    Message::assistant(vec![Content::text(t)])
}

pub(crate) fn calls(calls: &[(&str, &str, serde_json::Value)]) -> Message {
    Message::assistant(
        calls
            .iter()
            .map(|(id, name, args)| Content::tool_call(*id, *name, args.clone()))
            .collect(),
    )
}

pub(crate) fn ask(id: &str, question: &str) -> Message {
    calls(&[(
        id,
        crate::hitl::HUMAN_TOOL_NAME,
        serde_json::json!({ "message": question, "message_type": "question" }),
    )])
}
