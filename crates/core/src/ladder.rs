//! Fallback ladder state machine.
//!
//! ```text
//! Generating -> Validating -> Executing -> Done
//!      ^            |             |
//!      +-- failure -+-------------+   (once)
//!
//! second failure at any stage -> PlaceholderEmitted
//! ```
//!
//! The driver in the shell feeds [`Event`]s; the ladder decides where to go.
//! Terminal stages absorb every further event.

use crate::error::DiagramError;
use crate::types::Technology;

/// Total generation attempts allowed per request: the first plus one retry.
pub const MAX_ATTEMPTS: u8 = 2;

/// Language the narrowed retry forces for title and explanation.
pub const NEUTRAL_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generating,
    Validating,
    Executing,
    Done,
    PlaceholderEmitted,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::PlaceholderEmitted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Generated,
    Validated,
    Executed,
    Failed(DiagramError),
}

/// Constraints applied to the retry prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrowing {
    pub technology: Technology,
    pub language: String,
    pub ascii_only: bool,
    /// Why the first attempt failed; fed back into the prompt.
    pub previous_failure: String,
}

impl Narrowing {
    pub fn after(failure: &DiagramError) -> Self {
        Self {
            technology: Technology::Svg,
            language: NEUTRAL_LANGUAGE.to_string(),
            ascii_only: true,
            previous_failure: failure.short_reason(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackLadder {
    stage: Stage,
    attempt: u8,
    failures: Vec<DiagramError>,
}

impl Default for FallbackLadder {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackLadder {
    pub fn new() -> Self {
        Self {
            stage: Stage::Generating,
            attempt: 1,
            failures: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    pub fn failures(&self) -> &[DiagramError] {
        &self.failures
    }

    pub fn last_failure(&self) -> Option<&DiagramError> {
        self.failures.last()
    }

    /// Narrowing for the current attempt; `None` on the first attempt.
    pub fn narrowing(&self) -> Option<Narrowing> {
        if self.attempt > 1 {
            self.failures.first().map(Narrowing::after)
        } else {
            None
        }
    }

    pub fn advance(&mut self, event: Event) -> Stage {
        self.stage = match (self.stage, event) {
            (stage, _) if stage.is_terminal() => stage,
            (Stage::Generating, Event::Generated) => Stage::Validating,
            (Stage::Validating, Event::Validated) => Stage::Executing,
            (Stage::Executing, Event::Executed) => Stage::Done,
            (_, Event::Failed(error)) => {
                self.failures.push(error);
                if self.attempt < MAX_ATTEMPTS {
                    self.attempt += 1;
                    Stage::Generating
                } else {
                    Stage::PlaceholderEmitted
                }
            }
            // Out-of-order success events leave the stage untouched.
            (stage, _) => stage,
        };
        self.stage
    }
}
