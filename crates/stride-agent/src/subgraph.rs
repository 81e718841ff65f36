//! Expert subgraph: call model, route, run tools or pause for a human

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use stride_ai::{ChatModel, Message, ModelRequest, ToolDefinition, Usage};
use tokio::sync::broadcast;

use crate::{
    config::ExpertNodeConfig,
    error::{Error, Result},
    events::AgentEvent,
    hitl::{HUMAN_TOOL_NAME, HumanRequest, human_tool_definition, unwrap_answer},
    limiter::ToolUsageLimiter,
    routing::{RouteDecision, route},
    state::MessageLog,
    tools::ToolBox,
};

/// Answer given to calls that shared a message with a human-communication call
pub const DEFERRED_MESSAGE: &str = "Deferred: not executed because this response also \
     asked the athlete a question. Issue the call again if it is still needed.";

/// Next thing a subgraph will do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    CallModel,
    Hitl,
    Tools,
    End,
}

/// Everything needed to continue a subgraph later, including after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphState {
    pub messages: MessageLog,
    pub phase: Phase,
    pub model_calls: u32,
    pub human_interactions: u32,
    pub limiter: ToolUsageLimiter,
    pub usage: Usage,
    pub elapsed_secs: f64,
}

impl SubgraphState {
    pub fn new(user_prompt: impl Into<String>, limiter: ToolUsageLimiter) -> Self {
        Self {
            messages: MessageLog::with_user(user_prompt),
            phase: Phase::CallModel,
            model_calls: 0,
            human_interactions: 0,
            limiter,
            usage: Usage::default(),
            elapsed_secs: 0.0,
        }
    }
}

/// Result of one subgraph step
#[derive(Debug, Clone)]
pub enum SubgraphOutcome {
    /// Waiting for a human answer
    Suspended {
        state: SubgraphState,
        request: HumanRequest,
    },
    /// Finished; `result` is the last assistant text
    Completed { state: SubgraphState, result: String },
}

/// One expert's agent loop
pub struct ExpertSubgraph {
    config: ExpertNodeConfig,
    model: Arc<dyn ChatModel>,
    toolbox: ToolBox,
    events: broadcast::Sender<AgentEvent>,
}

impl ExpertSubgraph {
    pub fn new(
        config: ExpertNodeConfig,
        model: Arc<dyn ChatModel>,
        toolbox: ToolBox,
        events: broadcast::Sender<AgentEvent>,
    ) -> Self {
        Self {
            config,
            model,
            toolbox,
            events,
        }
    }

    pub fn config(&self) -> &ExpertNodeConfig {
        &self.config
    }

    /// Tools bound to every model call: the human tool first, then the standard tools
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut tools = vec![human_tool_definition()];
        tools.extend(self.toolbox.definitions());
        tools
    }

    fn node(&self) -> &str {
        &self.config.node_name
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(event);
    }

    /// Run until the subgraph finishes or pauses.
    ///
    /// `resume` must be given exactly when the state is parked in the
    /// human phase; it is the human's answer in any shape
    /// [`unwrap_answer`] accepts.
    pub async fn step(
        &self,
        mut state: SubgraphState,
        resume: Option<serde_json::Value>,
    ) -> Result<SubgraphOutcome> {
        let started = Instant::now();
        self.emit(AgentEvent::NodeStart {
            node: self.node().to_string(),
        });

        match (state.phase, resume) {
            (Phase::Hitl, Some(answer)) => self.resume_hitl(&mut state, &answer)?,
            (Phase::Hitl, None) => {
                return Err(Error::Protocol(format!(
                    "node '{}' is waiting for a human answer but none was given",
                    self.node()
                )));
            }
            (phase, Some(_)) => {
                return Err(Error::Protocol(format!(
                    "node '{}' received an answer while in phase {:?}",
                    self.node(),
                    phase
                )));
            }
            (_, None) => {}
        }

        let elapsed = |mut state: SubgraphState| {
            state.elapsed_secs += started.elapsed().as_secs_f64();
            state
        };
        Ok(match self.run(state).await? {
            SubgraphOutcome::Suspended { state, request } => SubgraphOutcome::Suspended {
                state: elapsed(state),
                request,
            },
            SubgraphOutcome::Completed { state, result } => SubgraphOutcome::Completed {
                state: elapsed(state),
                result,
            },
        })
    }

    async fn run(&self, mut state: SubgraphState) -> Result<SubgraphOutcome> {
        loop {
            match state.phase {
                Phase::CallModel => self.call_model(&mut state).await?,
                Phase::Tools => self.run_tools(&mut state).await,
                Phase::Hitl => {
                    let request = self.pending_request(&state)?;
                    tracing::info!(
                        node = %self.node(),
                        tool_call_id = %request.tool_call_id,
                        "Pausing for human input"
                    );
                    return Ok(SubgraphOutcome::Suspended { state, request });
                }
                Phase::End => {
                    state.messages.check_tool_results()?;
                    let result = state
                        .messages
                        .last_assistant()
                        .map(|m| m.text())
                        .unwrap_or_default();
                    tracing::info!(node = %self.node(), "No tool calls, ending");
                    return Ok(SubgraphOutcome::Completed { state, result });
                }
            }
        }
    }

    async fn call_model(&self, state: &mut SubgraphState) -> Result<()> {
        if state.model_calls >= self.config.max_iterations {
            return Err(Error::MaxIterations {
                node: self.node().to_string(),
                limit: self.config.max_iterations,
            });
        }
        state.model_calls += 1;

        self.emit(AgentEvent::ModelCallStart {
            node: self.node().to_string(),
            call_number: state.model_calls,
        });
        tracing::debug!(
            node = %self.node(),
            messages = state.messages.len(),
            call = state.model_calls,
            "Calling model"
        );

        let mut request = ModelRequest::new(state.messages.messages().to_vec())
            .with_tools(self.tool_definitions());
        if !self.config.system_prompt.is_empty() {
            request = request.with_system(self.config.system_prompt.clone());
        }

        let response = self.model.invoke(&request).await?;
        state.usage.accumulate(&response.usage);

        let message = response.message;
        if !message.is_assistant() {
            return Err(stride_ai::Error::UnexpectedResponse(format!(
                "model returned a {} message",
                message.role()
            ))
            .into());
        }

        let budget_left = state.human_interactions < self.config.max_human_interactions;
        let decision = route(&message, budget_left);

        self.emit(AgentEvent::ModelCallEnd {
            node: self.node().to_string(),
            tool_calls: message.tool_calls().len(),
            usage: response.usage,
        });
        state.messages.append(message);

        state.phase = match decision {
            RouteDecision::End => Phase::End,
            RouteDecision::Hitl { deferred, .. } => {
                if !deferred.is_empty() {
                    tracing::info!(
                        node = %self.node(),
                        deferred = deferred.len(),
                        "Human call wins; deferring other calls"
                    );
                }
                Phase::Hitl
            }
            RouteDecision::Tools { .. } => Phase::Tools,
        };
        Ok(())
    }

    async fn run_tools(&self, state: &mut SubgraphState) {
        let calls = state.messages.pending_tool_calls();
        let mut results = Vec::with_capacity(calls.len());

        for call in &calls {
            let result = self
                .toolbox
                .execute(self.node(), call, &mut state.limiter, &self.events)
                .await;
            results.push(Message::tool_result(
                &call.id,
                &call.name,
                result.text_content(),
                result.is_error,
            ));
        }

        state.messages.extend(results);
        state.phase = Phase::CallModel;
    }

    fn pending_request(&self, state: &SubgraphState) -> Result<HumanRequest> {
        state
            .messages
            .pending_tool_calls()
            .iter()
            .find(|c| c.name == HUMAN_TOOL_NAME)
            .map(|call| HumanRequest::from_call(call, &self.config.display_name))
            .ok_or_else(|| {
                Error::Protocol(format!(
                    "node '{}' entered the human phase without a pending {} call",
                    self.node(),
                    HUMAN_TOOL_NAME
                ))
            })
    }

    /// Attach the answer to the pending human call and answer every other
    /// call of the same message as deferred, keeping call order.
    fn resume_hitl(&self, state: &mut SubgraphState, answer: &serde_json::Value) -> Result<()> {
        let request = self.pending_request(state)?;
        let answer = unwrap_answer(answer);
        tracing::info!(
            node = %self.node(),
            tool_call_id = %request.tool_call_id,
            "Resuming with human answer"
        );

        let results: Vec<Message> = state
            .messages
            .pending_tool_calls()
            .iter()
            .map(|call| {
                if call.id == request.tool_call_id {
                    Message::tool_result(&call.id, &call.name, answer.clone(), false)
                } else {
                    Message::tool_result(&call.id, &call.name, DEFERRED_MESSAGE, true)
                }
            })
            .collect();

        state.messages.extend(results);
        state.human_interactions += 1;
        state.phase = Phase::CallModel;
        Ok(())
    }
}
