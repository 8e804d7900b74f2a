pub mod score;
pub mod state;

use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

use crate::parser::{fullwidth_to_ascii_digit, AnswerIndex, ParsedResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizKind {
    FillBlank,
    TrueFalse,
    MultipleChoice,
    Applied,
}

impl QuizKind {
    pub fn has_choices(&self) -> bool {
        matches!(self, QuizKind::MultipleChoice)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            QuizKind::FillBlank => "a fill-in-the-blank question (mark the blank with ____)",
            QuizKind::TrueFalse => "a true/false statement",
            QuizKind::MultipleChoice => "a multiple-choice question with four numbered choices",
            QuizKind::Applied => {
                "an applied question that asks the learner to reason with the material"
            }
        }
    }
}

impl fmt::Display for QuizKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuizKind::FillBlank => "fill-in-the-blank",
            QuizKind::TrueFalse => "true/false",
            QuizKind::MultipleChoice => "multiple choice",
            QuizKind::Applied => "applied",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown quiz kind {0:?}; use fill, tf, mc or applied")]
pub struct UnknownQuizKind(pub String);

impl FromStr for QuizKind {
    type Err = UnknownQuizKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "mc" | "choice" | "multiple-choice" | "選択" => Ok(QuizKind::MultipleChoice),
            "fill" | "blank" | "fill-blank" | "穴埋め" => Ok(QuizKind::FillBlank),
            "tf" | "truefalse" | "true-false" | "○×" => Ok(QuizKind::TrueFalse),
            "applied" | "apply" | "応用" => Ok(QuizKind::Applied),
            other => Err(UnknownQuizKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectAnswer {
    /// 1-based position in `QuizItem::choices`.
    Choice(usize),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizItem {
    pub prompt: String,
    pub kind: QuizKind,
    pub choices: Vec<String>,
    pub correct_answer: CorrectAnswer,
    pub explanation: String,
    pub recommendation: Option<String>,
}

/// Why a quiz completion could not become a [`QuizItem`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseDegraded {
    #[error("the completion had no question")]
    MissingQuestion,

    #[error("the multiple-choice completion listed no choices")]
    MissingChoices,

    #[error("the completion did not say which choice is correct")]
    AnswerIndexUnset,

    #[error("the answer index {0:?} is not a number")]
    AnswerIndexUnparseable(String),

    #[error("answer index {index} is outside choices 1..={choices}")]
    AnswerIndexOutOfRange { index: usize, choices: usize },

    #[error("the completion had no expected answer")]
    MissingAnswer,
}

impl QuizItem {
    /// Validates a parsed completion. Nothing half-formed is ever returned.
    pub fn from_parsed(kind: QuizKind, parsed: ParsedResponse) -> Result<Self, ParseDegraded> {
        let prompt = parsed
            .question
            .filter(|q| !q.trim().is_empty())
            .ok_or(ParseDegraded::MissingQuestion)?;

        let (choices, correct_answer) = if kind.has_choices() {
            if parsed.choices.is_empty() {
                return Err(ParseDegraded::MissingChoices);
            }
            let index = match parsed.answer_index {
                AnswerIndex::Index(index) => index,
                AnswerIndex::Unset => return Err(ParseDegraded::AnswerIndexUnset),
                AnswerIndex::Unparseable(raw) => {
                    return Err(ParseDegraded::AnswerIndexUnparseable(raw))
                }
            };
            if index == 0 || index > parsed.choices.len() {
                return Err(ParseDegraded::AnswerIndexOutOfRange {
                    index,
                    choices: parsed.choices.len(),
                });
            }
            (parsed.choices, CorrectAnswer::Choice(index))
        } else {
            let answer = parsed.answer.ok_or(ParseDegraded::MissingAnswer)?;
            (Vec::new(), CorrectAnswer::Text(answer))
        };

        Ok(Self {
            prompt,
            kind,
            choices,
            correct_answer,
            explanation: parsed.explanation.unwrap_or_default(),
            recommendation: parsed.recommendation,
        })
    }

    /// The expected answer in words, for feedback and local fallback grading.
    pub fn correct_answer_text(&self) -> String {
        match &self.correct_answer {
            CorrectAnswer::Choice(index) => index
                .checked_sub(1)
                .and_then(|i| self.choices.get(i))
                .map(|choice| format!("{}. {}", index, choice))
                .unwrap_or_else(|| index.to_string()),
            CorrectAnswer::Text(text) => text.clone(),
        }
    }

    /// Question text followed by its numbered choices, if any.
    pub fn render(&self) -> String {
        let mut text = self.prompt.clone();
        for (i, choice) in self.choices.iter().enumerate() {
            text.push_str(&format!("\n{}. {}", i + 1, choice));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    Choice(usize),
    Text(String),
}

impl Submission {
    /// Reads a user reply for the given item. Choice items accept only a number
    /// within the listed choices.
    pub fn parse(item: &QuizItem, input: &str) -> Result<Self, QuizError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(QuizError::InvalidSubmission("the answer is empty".to_string()));
        }
        if !item.kind.has_choices() {
            return Ok(Submission::Text(input.to_string()));
        }

        let digits: String = input
            .trim_end_matches(['.', ')', '．', '）'])
            .chars()
            .map(fullwidth_to_ascii_digit)
            .collect();
        let index = digits
            .parse::<usize>()
            .map_err(|_| {
                QuizError::InvalidSubmission(format!(
                    "reply with a choice number from 1 to {}",
                    item.choices.len()
                ))
            })?;
        if index == 0 || index > item.choices.len() {
            return Err(QuizError::InvalidSubmission(format!(
                "there is no choice {}; pick 1 to {}",
                index,
                item.choices.len()
            )));
        }
        Ok(Submission::Choice(index))
    }
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Submission::Choice(index) => write!(f, "{}", index),
            Submission::Text(text) => f.write_str(text),
        }
    }
}

/// Rejected quiz lifecycle transitions and unusable submissions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("there is no quiz question waiting for an answer")]
    NoPendingQuiz,

    #[error("this quiz question has already been graded")]
    AlreadyGraded,

    #[error("a quiz question is still waiting for an answer; answer or skip it first")]
    QuizPending,

    #[error("{0}")]
    InvalidSubmission(String),
}
