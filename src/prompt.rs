//! Operator Input Channel
//!
//! Connection negotiation sometimes needs a human: a password left as a
//! template placeholder, a certificate directory that was never filled in,
//! or a target database that is probably the wrong default. Those suspension
//! points go through the [`Prompter`] trait so the negotiation logic never
//! reads the terminal directly.
//!
//! - [`TerminalPrompter`] asks on the controlling terminal (dialoguer)
//! - [`ScriptedPrompter`] replays canned answers and records the questions

use std::collections::VecDeque;

use dialoguer::{Input, Password};

use crate::error::{DoctorError, Result};

/// Source of operator answers during connection negotiation
///
/// Prompts block until answered. There is no timeout.
pub trait Prompter {
    /// Ask for a secret. Input must not be echoed.
    fn secret(&mut self, prompt: &str) -> Result<String>;

    /// Ask for a line of free text. An empty answer is allowed.
    fn line(&mut self, prompt: &str) -> Result<String>;
}

/// Prompter backed by the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn secret(&mut self, prompt: &str) -> Result<String> {
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| DoctorError::prompt_failed(format!("Could not read password: {e}")))
    }

    fn line(&mut self, prompt: &str) -> Result<String> {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| DoctorError::prompt_failed(format!("Could not read input: {e}")))
    }
}

/// Prompter that replays a fixed list of answers
///
/// Every question asked is recorded so callers can assert on how many times
/// (and for what) the operator was interrupted. Running out of answers is a
/// `PromptFailed` error, the same as a closed terminal.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    /// Create a prompter that will answer with `answers` in order
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { answers: answers.into_iter().map(Into::into).collect(), asked: Vec::new() }
    }

    /// Prompts that have been shown so far, in order
    #[must_use]
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    /// Answers that were never consumed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next_answer(&mut self, prompt: &str) -> Result<String> {
        self.asked.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| DoctorError::prompt_failed(format!("No answer scripted for '{prompt}'")))
    }
}

impl Prompter for ScriptedPrompter {
    fn secret(&mut self, prompt: &str) -> Result<String> {
        self.next_answer(prompt)
    }

    fn line(&mut self, prompt: &str) -> Result<String> {
        self.next_answer(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_prompter_replays_in_order() {
        let mut prompter = ScriptedPrompter::new(["first", "second"]);
        assert_eq!(prompter.secret("pw").unwrap(), "first");
        assert_eq!(prompter.line("db").unwrap(), "second");
        assert_eq!(prompter.asked(), ["pw", "db"]);
        assert_eq!(prompter.remaining(), 0);
    }

    #[test]
    fn test_scripted_prompter_exhausted() {
        let mut prompter = ScriptedPrompter::default();
        let err = prompter.line("anything").unwrap_err();
        assert_eq!(err.error_code(), "PROMPT_FAILED");
        assert_eq!(prompter.asked().len(), 1);
    }
}
