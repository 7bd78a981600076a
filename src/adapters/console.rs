//! Console Prompt - Terminal Confirmation
//!
//! Implements the `Prompt` port over any line reader and writer, with a
//! stdin/stdout constructor for the binary.

use std::io::{BufRead, BufReader, Stdin, Stdout, Write};

use anyhow::{Context, Result};

use crate::ports::{Answer, Prompt};

const QUESTION: &str = "Please enter Y (Yes) or N (No) or A (Yes to All): ";

/// Asks on a writer and reads one line per answer.
pub struct ConsolePrompt<R, W> {
  input: R,
  output: W,
}

impl ConsolePrompt<BufReader<Stdin>, Stdout> {
  pub fn stdio() -> Self {
    Self::new(BufReader::new(std::io::stdin()), std::io::stdout())
  }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
  pub fn new(input: R, output: W) -> Self {
    Self { input, output }
  }
}

impl<R: BufRead + Send, W: Write + Send> Prompt for ConsolePrompt<R, W> {
  fn confirm(&mut self, description: &str) -> Result<Answer> {
    writeln!(self.output, "Open this order? {description}").context("Failed to write prompt")?;
    write!(self.output, "{QUESTION}").context("Failed to write prompt")?;
    self.output.flush().context("Failed to flush prompt")?;

    let mut line = String::new();
    // EOF reads as an empty line, which is a No
    self
      .input
      .read_line(&mut line)
      .context("Failed to read answer")?;
    Ok(Answer::parse(&line))
  }
}
