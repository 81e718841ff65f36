//! Terminal prompt for agent questions

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use stride_agent::{Error, HumanPrompt, Result};

/// Prints each question and reads one line from stdin as the answer
pub struct StdinPrompt;

fn read_answer(question: &str) -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    writeln!(stdout, "\n{}\n", question)?;
    write!(stdout, "Your answer (or 'quit'): ")?;
    stdout.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

#[async_trait]
impl HumanPrompt for StdinPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        let question = question.to_string();
        let answer = tokio::task::spawn_blocking(move || read_answer(&question))
            .await
            .map_err(|e| Error::Other(format!("prompt task failed: {e}")))??;
        answer.ok_or_else(|| Error::Other("stdin closed while waiting for an answer".into()))
    }
}
