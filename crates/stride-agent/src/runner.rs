//! Drives a graph to completion, asking a human whenever it pauses

use async_trait::async_trait;
use std::collections::HashSet;

use crate::{
    error::{Error, Result},
    graph::{AnalysisGraph, GraphInput, GraphState, ResumeBundle, StepInput},
    hitl::{InterruptRecord, MessageType},
};

/// A graph that can pause for human answers and be resumed by interrupt id
#[async_trait]
pub trait InterruptibleGraph: Send + Sync {
    type Input: Send;
    type Output: Send;

    async fn start(&self, thread_id: &str, input: Self::Input) -> Result<Self::Output>;

    async fn resume(&self, thread_id: &str, bundle: ResumeBundle) -> Result<Self::Output>;

    /// Interrupts waiting on the thread, in discovery order
    async fn pending_interrupts(&self, thread_id: &str) -> Result<Vec<InterruptRecord>>;
}

#[async_trait]
impl InterruptibleGraph for AnalysisGraph {
    type Input = GraphInput;
    type Output = GraphState;

    async fn start(&self, thread_id: &str, input: GraphInput) -> Result<GraphState> {
        self.step(thread_id, StepInput::Start(input)).await
    }

    async fn resume(&self, thread_id: &str, bundle: ResumeBundle) -> Result<GraphState> {
        self.step(thread_id, StepInput::Resume(bundle)).await
    }

    async fn pending_interrupts(&self, thread_id: &str) -> Result<Vec<InterruptRecord>> {
        AnalysisGraph::pending_interrupts(self, thread_id).await
    }
}

/// Where answers come from
#[async_trait]
pub trait HumanPrompt: Send + Sync {
    /// Show a formatted question and wait for the answer
    async fn ask(&self, question: &str) -> Result<String>;
}

/// Progress lines for the caller, e.g. batch headers
pub type ProgressFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T> {
    Completed(T),
    /// The human quit; parked branches were left suspended
    Cancelled,
}

impl<T> RunOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

/// Render an interrupt for a human. `index` numbers questions of a batch.
pub fn format_question(record: &InterruptRecord, index: Option<usize>) -> String {
    let payload = &record.payload;
    let mut header = match index {
        Some(i) => format!("Question {i}"),
        None => "AGENT COMMUNICATION".to_string(),
    };
    if !payload.agent.is_empty() {
        header.push_str(&format!(" [{}]", payload.agent.to_uppercase()));
    }
    if payload.message_type != MessageType::Question {
        header.push_str(&format!(" [{}]", payload.message_type.as_str().to_uppercase()));
    }

    if payload.context.is_empty() {
        format!("{header}\n\n{}", payload.message)
    } else {
        format!("{header}\n{}\n\n{}", payload.context, payload.message)
    }
}

/// Only the bare word cancels; padded text is passed on as an answer
fn is_cancel(answer: &str) -> bool {
    answer.eq_ignore_ascii_case("quit") || answer.eq_ignore_ascii_case("exit")
}

/// Start a fresh run on `thread_id` and answer interrupts until it finishes
pub async fn run_with_hitl<G: InterruptibleGraph>(
    graph: &G,
    thread_id: &str,
    input: G::Input,
    prompt: &dyn HumanPrompt,
    progress: Option<ProgressFn<'_>>,
) -> Result<RunOutcome<G::Output>> {
    let output = graph.start(thread_id, input).await?;
    drive(graph, thread_id, output, prompt, progress).await
}

/// Continue a thread from its checkpoint, answering whatever is pending
pub async fn resume_with_hitl<G: InterruptibleGraph>(
    graph: &G,
    thread_id: &str,
    prompt: &dyn HumanPrompt,
    progress: Option<ProgressFn<'_>>,
) -> Result<RunOutcome<G::Output>> {
    let output = graph.resume(thread_id, ResumeBundle::new()).await?;
    drive(graph, thread_id, output, prompt, progress).await
}

async fn drive<G: InterruptibleGraph>(
    graph: &G,
    thread_id: &str,
    mut output: G::Output,
    prompt: &dyn HumanPrompt,
    progress: Option<ProgressFn<'_>>,
) -> Result<RunOutcome<G::Output>> {
    let report = |line: &str| {
        if let Some(progress) = progress {
            progress(line);
        }
    };
    let mut answered: HashSet<String> = HashSet::new();

    loop {
        let pending = graph.pending_interrupts(thread_id).await?;
        if pending.is_empty() {
            report("Workflow completed");
            return Ok(RunOutcome::Completed(output));
        }
        if let Some(repeat) = pending.iter().find(|p| answered.contains(&p.interrupt_id)) {
            return Err(Error::Protocol(format!(
                "interrupt '{}' is pending again after it was answered",
                repeat.interrupt_id
            )));
        }

        let batch = pending.len() > 1;
        if batch {
            tracing::info!("Handling {} concurrent agent questions", pending.len());
            report(&"=".repeat(70));
            report(&format!("{} AGENT QUESTIONS", pending.len()));
            report(&"=".repeat(70));
        }

        let mut bundle = ResumeBundle::new();
        for (i, record) in pending.iter().enumerate() {
            let question = format_question(record, batch.then_some(i + 1));
            let answer = prompt.ask(&question).await?;
            if is_cancel(&answer) {
                tracing::info!(thread_id, "Workflow cancelled by user during HITL interaction");
                return Ok(RunOutcome::Cancelled);
            }
            bundle.insert(
                record.interrupt_id.clone(),
                serde_json::json!({ "content": answer }),
            );
        }

        answered.extend(bundle.keys().cloned());
        output = graph.resume(thread_id, bundle).await?;
    }
}
