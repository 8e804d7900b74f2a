use serde::Serialize;

use crate::citation::Citation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// Set on assistant turns only; user turns have nothing to cite.
    pub citation: Option<Citation>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            citation: None,
        }
    }

    pub fn assistant(content: impl Into<String>, citation: Citation) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            citation: Some(citation),
        }
    }
}

/// Question, answer and citation of one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageEntry {
    pub question: String,
    pub answer: String,
    pub citation: Citation,
}

/// Append-only transcript; insertion order is display and replay order.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a question and its answer together so the log never holds a
    /// dangling question.
    pub fn record_exchange(
        &mut self,
        question: ConversationTurn,
        answer: ConversationTurn,
    ) -> &ConversationTurn {
        self.turns.push(question);
        self.turns.push(answer);
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        &self.turns[self.turns.len().saturating_sub(n)..]
    }

    pub fn lineage(&self) -> Vec<LineageEntry> {
        self.turns
            .windows(2)
            .filter_map(|pair| match pair {
                [question, answer]
                    if question.role == Role::User && answer.role == Role::Assistant =>
                {
                    Some(LineageEntry {
                        question: question.content.clone(),
                        answer: answer.content.clone(),
                        citation: answer.citation.clone().unwrap_or(Citation::Unknown),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::ProvenanceRef;

    fn chapter(name: &str) -> Citation {
        Citation::Found(ProvenanceRef {
            chapter: Some(name.to_string()),
            section: None,
        })
    }

    #[test]
    fn exchanges_are_appended_in_order() {
        let mut log = ConversationLog::new();
        assert!(log.turns().is_empty());

        let answer = log.record_exchange(
            ConversationTurn::user("What is covered?"),
            ConversationTurn::assistant("Markets.", chapter("第1章")),
        );
        assert_eq!(answer.content, "Markets.");

        log.record_exchange(
            ConversationTurn::user("And then?"),
            ConversationTurn::assistant("Prices.", Citation::Unknown),
        );

        let roles: Vec<Role> = log.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(log.turns().len(), 4);
        assert_eq!(log.turns()[0].citation, None);
    }

    #[test]
    fn lineage_pairs_questions_with_answers() {
        let mut log = ConversationLog::new();
        log.record_exchange(
            ConversationTurn::user("q1"),
            ConversationTurn::assistant("a1", chapter("第2章")),
        );
        log.record_exchange(
            ConversationTurn::user("q2"),
            ConversationTurn::assistant("a2", Citation::Unknown),
        );

        let lineage = log.lineage();

        assert_eq!(
            lineage,
            vec![
                LineageEntry {
                    question: "q1".to_string(),
                    answer: "a1".to_string(),
                    citation: chapter("第2章"),
                },
                LineageEntry {
                    question: "q2".to_string(),
                    answer: "a2".to_string(),
                    citation: Citation::Unknown,
                },
            ]
        );
    }

    #[test]
    fn recent_is_bounded() {
        let mut log = ConversationLog::new();
        for i in 0..3 {
            log.record_exchange(
                ConversationTurn::user(format!("q{i}")),
                ConversationTurn::assistant(format!("a{i}"), Citation::Unknown),
            );
        }

        let recent: Vec<&str> = log.recent(3).iter().map(|t| t.content.as_str()).collect();
        assert_eq!(recent, vec!["a1", "q2", "a2"]);
        assert_eq!(log.recent(100).len(), 6);
        assert!(log.recent(0).is_empty());
    }
}
