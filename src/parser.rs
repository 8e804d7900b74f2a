//! Turns loosely formatted completions into typed records.
//!
//! Completions are expected to use one labeled line per field
//! (`Question: ...`, `Answer index: 2`, ...) and ordinal lines (`1. ...`)
//! for choices. Nothing here fails: absent fields stay unset and malformed
//! numbers become [`AnswerIndex::Unparseable`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Question,
    Choices,
    AnswerIndex,
    Answer,
    Explanation,
    Verdict,
    Recommendation,
}

// Longer aliases come first so "answer index" is not read as "answer".
const LABEL_ALIASES: &[(&str, Label)] = &[
    ("correct answer index", Label::AnswerIndex),
    ("answer index", Label::AnswerIndex),
    ("correct index", Label::AnswerIndex),
    ("正解番号", Label::AnswerIndex),
    ("correct answer", Label::Answer),
    ("recommendation", Label::Recommendation),
    ("explanation", Label::Explanation),
    ("question", Label::Question),
    ("choices", Label::Choices),
    ("options", Label::Choices),
    ("verdict", Label::Verdict),
    ("answer", Label::Answer),
    ("アドバイス", Label::Recommendation),
    ("選択肢", Label::Choices),
    ("問題", Label::Question),
    ("質問", Label::Question),
    ("正解", Label::Answer),
    ("答え", Label::Answer),
    ("解説", Label::Explanation),
    ("判定", Label::Verdict),
];

/// A 1-based choice index as written by the model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnswerIndex {
    #[default]
    Unset,
    Index(usize),
    Unparseable(String),
}

impl AnswerIndex {
    fn parse(raw: &str) -> Self {
        let digits: String = raw
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .chars()
            .map(fullwidth_to_ascii_digit)
            .collect();

        if digits.is_empty() {
            return AnswerIndex::Unset;
        }
        match digits.parse::<usize>() {
            Ok(index) => AnswerIndex::Index(index),
            Err(_) => AnswerIndex::Unparseable(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    Correct,
    Incorrect,
    #[default]
    Unset,
}

impl Verdict {
    fn parse(raw: &str) -> Self {
        let value = raw.trim().to_lowercase();
        // Negative forms first: "不正解" ends with "正解".
        const INCORRECT: &[&str] = &["incorrect", "wrong", "false", "no", "不正解", "×", "✗"];
        const CORRECT: &[&str] = &["correct", "right", "true", "yes", "正解", "○", "✓"];

        if INCORRECT.iter().any(|token| value.starts_with(token)) {
            Verdict::Incorrect
        } else if CORRECT.iter().any(|token| value.starts_with(token)) {
            Verdict::Correct
        } else {
            Verdict::Unset
        }
    }
}

/// Every field a completion can carry. `None` means the label never appeared
/// (or appeared with an empty value as its last occurrence).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub question: Option<String>,
    pub choices: Vec<String>,
    pub answer_index: AnswerIndex,
    pub answer: Option<String>,
    pub explanation: Option<String>,
    pub verdict: Verdict,
    pub recommendation: Option<String>,
}

impl ParsedResponse {
    pub fn parse(raw: &str) -> Self {
        let mut parsed = ParsedResponse::default();

        for line in raw.lines() {
            let line = strip_decoration(line);
            if line.is_empty() {
                continue;
            }

            if let Some((label, value)) = split_label(line) {
                parsed.set(label, value);
            } else if let Some(choice) = strip_ordinal(line) {
                parsed.choices.push(choice.to_string());
            }
        }

        parsed
    }

    fn set(&mut self, label: Label, value: &str) {
        let text = if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        };

        match label {
            Label::Question => self.question = text,
            // The header only announces the ordinal lines that follow.
            Label::Choices => {}
            Label::AnswerIndex => self.answer_index = AnswerIndex::parse(value),
            Label::Answer => self.answer = text,
            Label::Explanation => self.explanation = text,
            Label::Verdict => self.verdict = Verdict::parse(value),
            Label::Recommendation => self.recommendation = text,
        }
    }
}

fn strip_decoration(line: &str) -> &str {
    line.trim().trim_start_matches(['*', '#']).trim()
}

fn split_label(line: &str) -> Option<(Label, &str)> {
    for (alias, label) in LABEL_ALIASES {
        let Some(head) = line.get(..alias.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(alias) {
            continue;
        }

        // "Question 2:" and "Question #2:" carry the same label.
        let rest = line[alias.len()..]
            .trim_start_matches('*')
            .trim_start()
            .trim_start_matches('#')
            .trim_start_matches(|c: char| c.is_ascii_digit() || ('０'..='９').contains(&c))
            .trim_start_matches('*')
            .trim_start();
        if let Some(value) = rest.strip_prefix(':').or_else(|| rest.strip_prefix('：')) {
            return Some((*label, value.trim().trim_matches('*').trim()));
        }
    }
    None
}

/// `1. text`, `2) text` and `３．text` yield `text`; the number itself is dropped.
fn strip_ordinal(line: &str) -> Option<&str> {
    let digits_end = line
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || ('０'..='９').contains(c)))
        .map(|(i, _)| i)?;
    if digits_end == 0 {
        return None;
    }

    let rest = &line[digits_end..];
    let marker = rest.chars().next()?;
    if !matches!(marker, '.' | ')' | '．' | '）') {
        return None;
    }

    let text = &rest[marker.len_utf8()..];
    if text.starts_with(|c: char| c.is_ascii_digit()) {
        // "3.5 percent" is prose, not a choice.
        return None;
    }
    Some(text.trim())
}

pub(crate) fn fullwidth_to_ascii_digit(c: char) -> char {
    if ('０'..='９').contains(&c) {
        char::from(b'0' + (c as u32 - '０' as u32) as u8)
    } else {
        c
    }
}
