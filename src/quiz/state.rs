use serde::Serialize;

use super::{QuizError, QuizItem, Submission};

/// A graded item together with what was submitted and the feedback shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradedQuiz {
    pub item: QuizItem,
    pub submission: Submission,
    pub correct: bool,
    pub feedback: String,
}

/// Lifecycle of the single quiz item a session may hold:
/// `None -> Pending -> Graded -> None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QuizState {
    #[default]
    None,
    Pending(QuizItem),
    Graded(GradedQuiz),
}

impl QuizState {
    pub fn pending(&self) -> Result<&QuizItem, QuizError> {
        match self {
            QuizState::Pending(item) => Ok(item),
            QuizState::Graded(_) => Err(QuizError::AlreadyGraded),
            QuizState::None => Err(QuizError::NoPendingQuiz),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, QuizState::Pending(_))
    }

    /// Starts a new item. A graded item is dropped; a pending one blocks.
    pub fn begin(&mut self, item: QuizItem) -> Result<&QuizItem, QuizError> {
        if self.is_pending() {
            return Err(QuizError::QuizPending);
        }
        *self = QuizState::Pending(item);
        self.pending()
    }

    pub fn discard(&mut self) -> Result<QuizItem, QuizError> {
        self.pending()?;
        match std::mem::take(self) {
            QuizState::Pending(item) => Ok(item),
            _ => Err(QuizError::NoPendingQuiz),
        }
    }

    /// Records the grade for the pending item. The item is consumed, so it can
    /// never be graded a second time.
    pub fn grade(
        &mut self,
        submission: Submission,
        correct: bool,
        feedback: String,
    ) -> Result<&GradedQuiz, QuizError> {
        let item = self.discard()?;
        *self = QuizState::Graded(GradedQuiz {
            item,
            submission,
            correct,
            feedback,
        });
        match &*self {
            QuizState::Graded(graded) => Ok(graded),
            _ => Err(QuizError::NoPendingQuiz),
        }
    }

    /// Clears a graded item once its result has been shown.
    pub fn acknowledge(&mut self) -> Option<GradedQuiz> {
        match std::mem::take(self) {
            QuizState::Graded(graded) => Some(graded),
            other => {
                *self = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::{CorrectAnswer, QuizKind};

    fn item(prompt: &str) -> QuizItem {
        QuizItem {
            prompt: prompt.to_string(),
            kind: QuizKind::TrueFalse,
            choices: Vec::new(),
            correct_answer: CorrectAnswer::Text("true".to_string()),
            explanation: String::new(),
            recommendation: None,
        }
    }

    #[test]
    fn full_cycle() {
        let mut state = QuizState::default();
        assert_eq!(state.pending(), Err(QuizError::NoPendingQuiz));

        state.begin(item("first")).unwrap();
        assert!(state.is_pending());

        let graded = state
            .grade(Submission::Text("true".to_string()), true, "well done".to_string())
            .unwrap();
        assert!(graded.correct);
        assert_eq!(graded.item.prompt, "first");

        assert_eq!(state.pending(), Err(QuizError::AlreadyGraded));

        let acknowledged = state.acknowledge().unwrap();
        assert_eq!(acknowledged.feedback, "well done");
        assert_eq!(state, QuizState::None);
    }

    #[test]
    fn grading_twice_is_rejected() {
        let mut state = QuizState::default();
        state.begin(item("q")).unwrap();
        state
            .grade(Submission::Text("x".to_string()), false, String::new())
            .unwrap();

        let err = state
            .grade(Submission::Text("x".to_string()), false, String::new())
            .unwrap_err();
        assert_eq!(err, QuizError::AlreadyGraded);
    }

    #[test]
    fn grading_without_pending_item_is_rejected() {
        let mut state = QuizState::default();
        let err = state
            .grade(Submission::Text("x".to_string()), true, String::new())
            .unwrap_err();
        assert_eq!(err, QuizError::NoPendingQuiz);
        assert_eq!(state, QuizState::None);
    }

    #[test]
    fn pending_item_blocks_a_new_one_until_discarded() {
        let mut state = QuizState::default();
        state.begin(item("old")).unwrap();

        assert_eq!(state.begin(item("new")).unwrap_err(), QuizError::QuizPending);
        assert_eq!(state.pending().unwrap().prompt, "old");

        assert_eq!(state.discard().unwrap().prompt, "old");
        assert_eq!(state.discard().unwrap_err(), QuizError::NoPendingQuiz);
        assert_eq!(state.begin(item("new")).unwrap().prompt, "new");
    }

    #[test]
    fn graded_item_is_replaced_by_a_new_one() {
        let mut state = QuizState::default();
        state.begin(item("old")).unwrap();
        state
            .grade(Submission::Text("x".to_string()), true, String::new())
            .unwrap();

        assert_eq!(state.begin(item("next")).unwrap().prompt, "next");
        assert!(state.acknowledge().is_none());
        assert!(state.is_pending());
    }
}
