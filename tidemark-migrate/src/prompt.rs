//! Confirmation gate for destructive actions

use crate::error::CliError;
use std::io::{self, BufRead, IsTerminal, Write};

/// How confirmation questions are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Ask on the terminal
    Terminal,
    /// Answer every question with the given value, without asking
    Assume(bool),
    /// Behave like a terminal whose operator always answers with the given
    /// value; lets callers embedding the handlers drive the prompts
    Scripted(bool),
}

impl Interaction {
    /// `Terminal` when stdin is a terminal and `--no-interaction` wasn't given
    pub fn detect(no_interaction: bool) -> Self {
        if no_interaction || !io::stdin().is_terminal() {
            Interaction::Assume(true)
        } else {
            Interaction::Terminal
        }
    }

    /// Whether destructive actions are gated behind a question
    pub fn is_interactive(self) -> bool {
        matches!(self, Interaction::Terminal | Interaction::Scripted(_))
    }

    /// # Errors
    ///
    /// Returns `CliError::Io` if the terminal can't be read or written.
    pub fn confirm(self, question: &str) -> Result<bool, CliError> {
        match self {
            Interaction::Assume(answer) | Interaction::Scripted(answer) => {
                log::debug!("{question} -> {}", if answer { "y" } else { "n" });
                Ok(answer)
            }
            Interaction::Terminal => {
                let stdin = io::stdin();
                let mut stdout = io::stdout();
                Ok(ask(&mut stdin.lock(), &mut stdout, question)?)
            }
        }
    }
}

/// Print `question` and read a yes/no answer; anything but `y`/`yes` is no
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    write!(output, "{question} ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
