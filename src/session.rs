use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::ai_helper::AiHelper;
use crate::citation::{Citation, CitationExtractor};
use crate::completion::{CompletionError, FALLBACK_REPLY};
use crate::conversation::{ConversationLog, ConversationTurn, LineageEntry};
use crate::document::Document;
use crate::parser::ParsedResponse;
use crate::quiz::score::ScoreLog;
use crate::quiz::state::{GradedQuiz, QuizState};
use crate::quiz::{CorrectAnswer, ParseDegraded, QuizError, QuizItem, QuizKind, Submission};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no document is loaded yet; send a .txt file first")]
    NoDocument,

    #[error("the message is empty")]
    EmptyInput,

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error("the quiz could not be read ({0}); please request a new one")]
    Degraded(#[from] ParseDegraded),

    #[error("{}", FALLBACK_REPLY)]
    CompletionUnavailable(#[source] CompletionError),
}

/// Everything derived from the loaded document. Replaced as one value, so
/// nothing from a previous document survives a reload.
struct DocumentState {
    document: Document,
    summary: String,
    conversation: ConversationLog,
    quiz: QuizState,
    scores: ScoreLog,
}

/// One learner's interactive run.
pub struct Session {
    helper: Arc<AiHelper>,
    citations: CitationExtractor,
    history_turns: usize,
    state: Option<DocumentState>,
}

impl Session {
    pub fn new(helper: Arc<AiHelper>, history_turns: usize) -> Self {
        Self {
            helper,
            citations: CitationExtractor::new(),
            history_turns,
            state: None,
        }
    }

    /// Replaces the current document and all state derived from it, and
    /// returns the new document's summary.
    pub async fn load_document(&mut self, document: Document) -> &str {
        info!("Loading document {:?}", document.name());

        let summary = match self.helper.summarize(&document).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!("Summary unavailable: {}", err);
                FALLBACK_REPLY.to_string()
            }
        };

        let state = self.state.insert(DocumentState {
            document,
            summary,
            conversation: ConversationLog::new(),
            quiz: QuizState::default(),
            scores: ScoreLog::new(),
        });
        &state.summary
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn document(&self) -> Option<&Document> {
        self.state.as_ref().map(|state| &state.document)
    }

    pub fn summary(&self) -> Result<&str, SessionError> {
        Ok(self.loaded()?.summary.as_str())
    }

    pub fn conversation(&self) -> Result<&[ConversationTurn], SessionError> {
        Ok(self.loaded()?.conversation.turns())
    }

    pub fn lineage(&self) -> Result<Vec<LineageEntry>, SessionError> {
        Ok(self.loaded()?.conversation.lineage())
    }

    pub fn scores(&self) -> Result<&ScoreLog, SessionError> {
        Ok(&self.loaded()?.scores)
    }

    pub fn quiz(&self) -> Result<&QuizState, SessionError> {
        Ok(&self.loaded()?.quiz)
    }

    pub fn has_pending_quiz(&self) -> bool {
        self.state
            .as_ref()
            .map(|state| state.quiz.is_pending())
            .unwrap_or(false)
    }

    /// Answers a question about the document and records the exchange.
    /// Backend failures produce the fallback answer with an unknown citation.
    pub async fn ask(&mut self, question: &str) -> Result<&ConversationTurn, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let state = self.state.as_mut().ok_or(SessionError::NoDocument)?;
        let history = state.conversation.recent(self.history_turns);

        let answer = match self
            .helper
            .answer_question(&state.document, history, question)
            .await
        {
            Ok(answer) => {
                let citation = self.citations.extract(state.document.text(), &answer);
                ConversationTurn::assistant(answer, citation)
            }
            Err(err) => {
                warn!("Answer unavailable: {}", err);
                ConversationTurn::assistant(FALLBACK_REPLY, Citation::Unknown)
            }
        };

        Ok(state
            .conversation
            .record_exchange(ConversationTurn::user(question), answer))
    }

    /// Requests a new quiz item. Rejected while another item is pending;
    /// call [`Session::discard_quiz`] first.
    pub async fn generate_quiz(&mut self, kind: QuizKind) -> Result<&QuizItem, SessionError> {
        let state = self.state.as_mut().ok_or(SessionError::NoDocument)?;
        if state.quiz.is_pending() {
            return Err(QuizError::QuizPending.into());
        }

        let raw = self
            .helper
            .generate_quiz(&state.document, kind, &state.scores)
            .await
            .map_err(|err| {
                warn!("Quiz generation unavailable: {}", err);
                SessionError::CompletionUnavailable(err)
            })?;

        let item = QuizItem::from_parsed(kind, ParsedResponse::parse(&raw)).map_err(|err| {
            warn!("Discarding malformed {} quiz: {}", kind, err);
            err
        })?;

        Ok(state.quiz.begin(item)?)
    }

    pub fn discard_quiz(&mut self) -> Result<QuizItem, SessionError> {
        let state = self.state.as_mut().ok_or(SessionError::NoDocument)?;
        Ok(state.quiz.discard()?)
    }

    /// Grades the pending item and appends the outcome to the score log.
    /// Choice items are graded locally; free-text items go through the helper.
    pub async fn submit_answer(&mut self, input: &str) -> Result<&GradedQuiz, SessionError> {
        let state = self.state.as_mut().ok_or(SessionError::NoDocument)?;
        let item = state.quiz.pending()?;
        let submission = Submission::parse(item, input)?;

        let (correct, feedback) = match (&item.correct_answer, &submission) {
            (CorrectAnswer::Choice(expected), Submission::Choice(given)) => {
                let correct = expected == given;
                let mut feedback = if correct {
                    "Correct!".to_string()
                } else {
                    format!("Incorrect. The answer is {}.", item.correct_answer_text())
                };
                if !item.explanation.is_empty() {
                    feedback.push('\n');
                    feedback.push_str(&item.explanation);
                }
                (correct, feedback)
            }
            (_, submission) => {
                let grade = self
                    .helper
                    .grade_free_text(item, &submission.to_string())
                    .await;
                (grade.correct, grade.feedback)
            }
        };

        state.scores.record(correct);
        info!(
            "Graded {} quiz: correct={}, score {}",
            item.kind, correct, state.scores
        );
        Ok(state.quiz.grade(submission, correct, feedback)?)
    }

    /// Clears the graded item after its result has been shown.
    pub fn acknowledge_grade(&mut self) -> Option<GradedQuiz> {
        self.state.as_mut().and_then(|state| state.quiz.acknowledge())
    }

    fn loaded(&self) -> Result<&DocumentState, SessionError> {
        self.state.as_ref().ok_or(SessionError::NoDocument)
    }
}

/// Keeps one independently owned session per chat.
pub struct SessionRegistry {
    helper: Arc<AiHelper>,
    history_turns: usize,
    sessions: Mutex<HashMap<i64, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new(helper: Arc<AiHelper>, history_turns: usize) -> Self {
        Self {
            helper,
            history_turns,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, chat_id: i64) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session::new(
                    self.helper.clone(),
                    self.history_turns,
                )))
            })
            .clone()
    }

    /// Drops the chat's session. A handler still holding the old handle sees
    /// it reset; the next `get` starts from a fresh one.
    pub async fn remove(&self, chat_id: i64) {
        let removed = self.sessions.lock().await.remove(&chat_id);
        if let Some(session) = removed {
            session.lock().await.reset();
        }
    }

    pub async fn active_chats(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
