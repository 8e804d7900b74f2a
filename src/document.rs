use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("the document is empty")]
    Empty,

    #[error("{0} is not a plain UTF-8 text file; only .txt uploads are supported")]
    Unsupported(String),
}

/// Source text for one session. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    name: String,
    text: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Result<Self, DocumentError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DocumentError::Empty);
        }
        Ok(Self {
            name: name.into(),
            text,
        })
    }

    /// Accepts an uploaded file only when it is UTF-8 text (a leading BOM is dropped).
    pub fn from_upload(name: &str, bytes: Vec<u8>) -> Result<Self, DocumentError> {
        let text = String::from_utf8(bytes)
            .map_err(|_| DocumentError::Unsupported(name.to_string()))?;
        Self::new(name, text.trim_start_matches('\u{feff}'))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The first `max_chars` characters.
    pub fn head(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((end, _)) => &self.text[..end],
            None => &self.text,
        }
    }

    /// A `max_chars` window starting at a random character, or the whole text
    /// if it already fits.
    pub fn excerpt<R: Rng + ?Sized>(&self, max_chars: usize, rng: &mut R) -> &str {
        let total = self.text.chars().count();
        if total <= max_chars {
            return &self.text;
        }

        let start_char = rng.gen_range(0..=total - max_chars);
        let mut boundaries = self.text.char_indices().map(|(i, _)| i).skip(start_char);
        let start = boundaries.next().unwrap_or(0);
        let end = boundaries
            .nth(max_chars.saturating_sub(1))
            .unwrap_or(self.text.len());
        &self.text[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn empty_documents_are_rejected() {
        assert_eq!(Document::new("a.txt", "  \n"), Err(DocumentError::Empty));
    }

    #[test]
    fn uploads_must_be_utf8() {
        let doc =
            Document::from_upload("notes.txt", "\u{feff}第1章 はじめに".as_bytes().to_vec())
                .unwrap();
        assert_eq!(doc.text(), "第1章 はじめに");
        assert_eq!(doc.name(), "notes.txt");

        let err = Document::from_upload("scan.pdf", vec![0x25, 0x50, 0xff, 0xfe]).unwrap_err();
        assert_eq!(err, DocumentError::Unsupported("scan.pdf".to_string()));
    }

    #[test]
    fn head_respects_char_boundaries() {
        let doc = Document::new("d", "市場動向の分析").unwrap();
        assert_eq!(doc.head(2), "市場");
        assert_eq!(doc.head(100), "市場動向の分析");
    }

    #[test]
    fn excerpt_is_a_window_of_the_requested_size() {
        let doc = Document::new("d", "一二三四五六七八九十").unwrap();
        let mut rng = StepRng::new(0, 0);

        let excerpt = doc.excerpt(4, &mut rng);
        assert_eq!(excerpt.chars().count(), 4);
        assert!(doc.text().contains(excerpt));

        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let excerpt = doc.excerpt(3, &mut rng);
            assert_eq!(excerpt.chars().count(), 3);
            assert!(doc.text().contains(excerpt));
        }

        assert_eq!(doc.excerpt(50, &mut rng), doc.text());
    }
}
