use std::fmt;

use serde::Serialize;

/// One entry per graded quiz item, in grading order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreLog {
    outcomes: Vec<bool>,
}

impl ScoreLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, correct: bool) {
        self.outcomes.push(correct);
    }

    pub fn outcomes(&self) -> &[bool] {
        &self.outcomes
    }

    pub fn correct(&self) -> usize {
        self.outcomes.iter().filter(|o| **o).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// `None` until something has been graded.
    pub fn accuracy(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        Some(self.correct() as f64 / self.total() as f64)
    }

    pub fn difficulty(&self) -> Difficulty {
        match self.accuracy() {
            None => Difficulty::Standard,
            Some(accuracy) if accuracy < 0.5 => Difficulty::Gentle,
            Some(accuracy) if accuracy >= 0.8 => Difficulty::Challenging,
            Some(_) => Difficulty::Standard,
        }
    }
}

impl fmt::Display for ScoreLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.accuracy() {
            None => write!(f, "no graded answers yet"),
            Some(accuracy) => write!(
                f,
                "{} of {} correct ({:.0}%)",
                self.correct(),
                self.total(),
                accuracy * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Gentle,
    Standard,
    Challenging,
}

impl Difficulty {
    pub fn instruction(&self) -> &'static str {
        match self {
            Difficulty::Gentle => {
                "The learner is struggling: ask about a central, clearly stated fact."
            }
            Difficulty::Standard => "Ask a question of moderate difficulty.",
            Difficulty::Challenging => {
                "The learner is doing well: ask something that connects two ideas from the text."
            }
        }
    }
}
