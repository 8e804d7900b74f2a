use std::sync::Arc;

use log::{debug, warn};

use crate::completion::{CompletionError, CompletionPort};
use crate::config::PromptSettings;
use crate::conversation::{ConversationTurn, Role};
use crate::document::Document;
use crate::parser::{ParsedResponse, Verdict};
use crate::quiz::score::ScoreLog;
use crate::quiz::{QuizItem, QuizKind};

const TUTOR_ROLE: &str = "You are a study assistant that helps a learner understand one uploaded document. \
Only use facts from the document below.";

/// Outcome of grading a free-text answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeTextGrade {
    pub correct: bool,
    pub feedback: String,
}

/// Builds every prompt and is the only caller of the completion port.
pub struct AiHelper {
    completion: Arc<dyn CompletionPort>,
    settings: PromptSettings,
}

impl AiHelper {
    pub fn new(completion: Arc<dyn CompletionPort>, settings: PromptSettings) -> Self {
        Self {
            completion,
            settings,
        }
    }

    pub async fn summarize(&self, document: &Document) -> Result<String, CompletionError> {
        debug!("Summarizing document {:?}", document.name());
        let prompt = format!(
            "{TUTOR_ROLE}\n\
            Summarize the document in five to eight sentences. Mention chapter or section \
            headings (for example 第1章 or Chapter 1) when the document has them.\n\n\
            Document:\n{}",
            document.head(self.settings.max_prompt_chars)
        );

        self.completion.complete(&prompt).await
    }

    pub async fn answer_question(
        &self,
        document: &Document,
        history: &[ConversationTurn],
        question: &str,
    ) -> Result<String, CompletionError> {
        debug!("Answering question: {:?}", question);

        let transcript = history
            .iter()
            .map(|turn| {
                let speaker = match turn.role {
                    Role::User => "Learner",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", speaker, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "{TUTOR_ROLE}\n\
            Answer the learner's question from the document. Name the chapter and section \
            (for example 第3章 第2節 or Chapter 3, Section 2) where the answer is found. \
            If the document does not contain the answer, say so.\n\n\
            Document:\n{}\n\n\
            Conversation so far:\n{}\n\n\
            Question: {}",
            document.head(self.settings.max_prompt_chars),
            if transcript.is_empty() { "(none)" } else { transcript.as_str() },
            question
        );

        self.completion.complete(&prompt).await
    }

    pub async fn generate_quiz(
        &self,
        document: &Document,
        kind: QuizKind,
        scores: &ScoreLog,
    ) -> Result<String, CompletionError> {
        debug!("Generating {} quiz, score so far: {}", kind, scores);

        let excerpt = document
            .excerpt(self.settings.max_prompt_chars, &mut rand::thread_rng())
            .to_string();

        let format = if kind.has_choices() {
            "Question: <the question>\n\
            Choices:\n\
            1. <choice>\n\
            2. <choice>\n\
            3. <choice>\n\
            4. <choice>\n\
            Answer index: <number of the correct choice>\n\
            Explanation: <why, citing the chapter or section>"
        } else {
            "Question: <the question>\n\
            Answer: <the expected answer>\n\
            Explanation: <why, citing the chapter or section>"
        };

        let adaptive = match scores.accuracy() {
            None => String::new(),
            Some(accuracy) => format!(
                "The learner has answered {} of {} quiz questions correctly ({:.0}%). {}\n\
                Also add one line \"Recommendation: <what to review next>\".\n",
                scores.correct(),
                scores.total(),
                accuracy * 100.0,
                scores.difficulty().instruction()
            ),
        };

        let prompt = format!(
            "{TUTOR_ROLE}\n\
            Write {} based on the document.\n\
            {}\
            Reply using exactly these labeled lines and nothing else:\n{}\n\n\
            Document:\n{}",
            kind.describe(),
            adaptive,
            format,
            excerpt
        );

        self.completion.complete(&prompt).await
    }

    /// Grades a free-text answer through the completion port.
    ///
    /// The structured `Verdict:` line is trusted first, then the legacy
    /// correctness marker. If the backend is unreachable the answer is compared
    /// locally with the stored expected answer.
    pub async fn grade_free_text(&self, item: &QuizItem, answer: &str) -> FreeTextGrade {
        let expected = item.correct_answer_text();
        let prompt = format!(
            "You are grading a learner's answer to a {} quiz question.\n\
            Question: {}\n\
            Expected answer: {}\n\
            Learner's answer: {}\n\n\
            Reply using exactly these labeled lines:\n\
            Verdict: correct or incorrect\n\
            Explanation: <one or two sentences>",
            item.kind, item.prompt, expected, answer
        );

        let reply = match self.completion.complete(&prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("Grading fell back to local comparison: {}", err);
                let correct = answers_match(item.kind, &expected, answer);
                return FreeTextGrade {
                    correct,
                    feedback: with_item_explanation(
                        format!("The expected answer is: {}.", item.correct_answer_text()),
                        item,
                    ),
                };
            }
        };

        let parsed = ParsedResponse::parse(&reply);
        let correct = match parsed.verdict {
            Verdict::Correct => true,
            Verdict::Incorrect => false,
            Verdict::Unset => {
                debug!("No verdict line in grading reply, checking the legacy marker");
                self.legacy_marker_verdict(&reply)
            }
        };

        FreeTextGrade {
            correct,
            feedback: with_item_explanation(parsed.explanation.unwrap_or(reply), item),
        }
    }

    /// The old grading contract: correct iff the reply contains the marker.
    /// Kept for replies that ignore the `Verdict:` format.
    pub fn legacy_marker_verdict(&self, reply: &str) -> bool {
        reply.contains(&self.settings.correct_marker)
    }
}

/// The grader's words, followed by the explanation stored with the item.
fn with_item_explanation(mut feedback: String, item: &QuizItem) -> String {
    if !item.explanation.is_empty() && !feedback.contains(&item.explanation) {
        feedback.push('\n');
        feedback.push_str(&item.explanation);
    }
    feedback
}

fn answers_match(kind: QuizKind, expected: &str, given: &str) -> bool {
    if kind == QuizKind::TrueFalse {
        if let (Some(expected), Some(given)) = (truth_value(expected), truth_value(given)) {
            return expected == given;
        }
    }
    normalize(expected) == normalize(given)
}

fn truth_value(text: &str) -> Option<bool> {
    match normalize(text).as_str() {
        "true" | "t" | "yes" | "correct" | "○" | "正しい" | "正" => Some(true),
        "false" | "f" | "no" | "incorrect" | "×" | "誤り" | "誤" => Some(false),
        _ => None,
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '○' | '×'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::scripted::ScriptedCompletion;
    use crate::quiz::CorrectAnswer;

    fn helper(port: ScriptedCompletion) -> (AiHelper, Arc<ScriptedCompletion>) {
        let port = Arc::new(port);
        (AiHelper::new(port.clone(), PromptSettings::default()), port)
    }

    fn fill_item() -> QuizItem {
        QuizItem {
            prompt: "Demand falls when ____ rises.".to_string(),
            kind: QuizKind::FillBlank,
            choices: Vec::new(),
            correct_answer: CorrectAnswer::Text("Price".to_string()),
            explanation: "See 第3章.".to_string(),
            recommendation: None,
        }
    }

    #[tokio::test]
    async fn structured_verdict_wins() {
        let (helper, _) = helper(
            ScriptedCompletion::new()
                .reply("Verdict: incorrect\nExplanation: 正解 is price, not cost."),
        );

        let grade = helper.grade_free_text(&fill_item(), "cost").await;

        // The marker appears in the text, but the verdict line decides.
        assert!(!grade.correct);
        assert_eq!(grade.feedback, "正解 is price, not cost.\nSee 第3章.");
    }

    #[tokio::test]
    async fn legacy_marker_used_without_verdict() {
        let (helper, _) =
            helper(ScriptedCompletion::new().reply("正解です！よくできました。 See 第3章."));

        let grade = helper.grade_free_text(&fill_item(), "price").await;

        assert!(grade.correct);
        // The item's explanation is already part of the reply.
        assert_eq!(grade.feedback, "正解です！よくできました。 See 第3章.");
    }

    #[test]
    fn legacy_marker_is_a_plain_substring_check() {
        let (helper, _) = helper(ScriptedCompletion::new());
        assert!(helper.legacy_marker_verdict("残念、不正解です"));
        assert!(!helper.legacy_marker_verdict("Well done"));
    }

    #[tokio::test]
    async fn transport_failure_grades_locally() {
        let (helper, _) = helper(ScriptedCompletion::new().fail().fail());

        let grade = helper.grade_free_text(&fill_item(), " price. ").await;
        assert!(grade.correct);
        assert_eq!(grade.feedback, "The expected answer is: Price.\nSee 第3章.");

        let grade = helper.grade_free_text(&fill_item(), "cost").await;
        assert!(!grade.correct);
        assert_eq!(grade.feedback, "The expected answer is: Price.\nSee 第3章.");
    }

    #[test]
    fn true_false_answers_compare_by_meaning() {
        assert!(answers_match(QuizKind::TrueFalse, "True", "○"));
        assert!(answers_match(QuizKind::TrueFalse, "誤り", "false"));
        assert!(!answers_match(QuizKind::TrueFalse, "True", "no"));
        assert!(!answers_match(QuizKind::FillBlank, "True", "○"));
    }

    #[tokio::test]
    async fn quiz_prompt_mentions_accuracy_once_graded() {
        let document = Document::new("d.txt", "第1章 市場\n需要と供給。").unwrap();
        let (helper, port) = helper(ScriptedCompletion::new().reply("x").reply("y"));

        helper
            .generate_quiz(&document, QuizKind::MultipleChoice, &ScoreLog::new())
            .await
            .unwrap();

        let mut scores = ScoreLog::new();
        scores.record(true);
        scores.record(false);
        scores.record(true);
        helper
            .generate_quiz(&document, QuizKind::Applied, &scores)
            .await
            .unwrap();

        let prompts = port.prompts();
        assert!(prompts[0].contains("Answer index:"));
        assert!(!prompts[0].contains("Recommendation"));
        assert!(prompts[0].contains("需要と供給"));
        assert!(prompts[1].contains("2 of 3"));
        assert!(prompts[1].contains("67%"));
        assert!(prompts[1].contains("Recommendation:"));
        assert!(!prompts[1].contains("Answer index:"));
    }

    #[tokio::test]
    async fn question_prompt_replays_history() {
        let document = Document::new("d.txt", "本文").unwrap();
        let (helper, port) = helper(ScriptedCompletion::new().reply("a"));
        let history = vec![ConversationTurn::user("earlier question")];

        helper
            .answer_question(&document, &history, "new question")
            .await
            .unwrap();

        let prompt = &port.prompts()[0];
        assert!(prompt.contains("Learner: earlier question"));
        assert!(prompt.ends_with("Question: new question"));
    }
}
