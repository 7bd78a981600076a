//! Prompt Port - Per-Order Confirmation
//!
//! Asked once for every order before it is submitted, unless a previous
//! answer was "yes to all".

/// A confirmation answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
  No,
  Yes,
  /// Yes, and stop asking for the rest of this ladder.
  YesToAll,
}

impl Answer {
  /// Interpret a typed reply by its first character; anything else is `No`.
  pub fn parse(input: &str) -> Self {
    match input.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
      Some('Y') => Self::Yes,
      Some('A') => Self::YesToAll,
      _ => Self::No,
    }
  }
}

/// Source of confirmations (terminal, tests, automation).
pub trait Prompt: Send {
  /// Ask whether `description` should be submitted.
  ///
  /// # Errors
  /// Returns error if the answer cannot be read.
  fn confirm(&mut self, description: &str) -> anyhow::Result<Answer>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_answers() {
    assert_eq!(Answer::parse("Y\n"), Answer::Yes);
    assert_eq!(Answer::parse("a"), Answer::YesToAll);
    assert_eq!(Answer::parse("yes"), Answer::Yes);
    assert_eq!(Answer::parse("all"), Answer::YesToAll);
    assert_eq!(Answer::parse("n"), Answer::No);
    assert_eq!(Answer::parse(""), Answer::No);
  }
}
