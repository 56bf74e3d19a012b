//! Terminal human participant
//!
//! Shows the prompt on stdout and reads a multi-line reply from stdin,
//! terminated by an empty line.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::core::{AgentRole, CraneError, Result};
use crate::orchestration::HumanResponder;

/// Reads human replies from the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinResponder;

impl StdinResponder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HumanResponder for StdinResponder {
    async fn respond(&self, role: AgentRole, prompt: &str) -> Result<String> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let stdout = io::stdout();
            read_reply(stdin.lock(), stdout.lock(), role, &prompt)
        })
        .await
        .map_err(|e| CraneError::Human(format!("input task failed: {}", e)))?
    }
}

/// Print `prompt` to `output` and collect lines from `input` until an empty
/// line or end of input
pub fn read_reply<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    role: AgentRole,
    prompt: &str,
) -> Result<String> {
    writeln!(output, "\n[{}] {}", role, prompt)?;
    writeln!(output, "Your answer as {} (finish with an empty line):", role)?;
    output.flush()?;

    let mut lines = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        lines.push(trimmed.to_string());
    }

    if lines.is_empty() {
        return Err(CraneError::Human(format!("no answer given for the {} role", role)));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_until_blank_line() {
        let input = Cursor::new("first line\nsecond line\n\nignored\n");
        let mut output = Vec::new();

        let reply = read_reply(input, &mut output, AgentRole::Reviewer, "Review this").unwrap();
        assert_eq!(reply, "first line\nsecond line");

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("[reviewer] Review this"));
    }

    #[test]
    fn test_end_of_input_without_blank_line() {
        let input = Cursor::new("only line");
        let reply = read_reply(input, io::sink(), AgentRole::Moderator, "p").unwrap();
        assert_eq!(reply, "only line");
    }

    #[test]
    fn test_empty_answer_is_an_error() {
        let input = Cursor::new("\n");
        let result = read_reply(input, io::sink(), AgentRole::Feedback, "p");
        assert!(matches!(result, Err(CraneError::Human(_))));
    }
}
