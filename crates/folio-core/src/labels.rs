use serde::{Deserialize, Serialize};

/// Where the chapter word goes relative to the number.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterOrder {
    /// `Chapter 1`
    #[default]
    Standard,
    /// `1 章`
    Reverse,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChapterLabel {
    pub word: String,
    pub order: ChapterOrder,
}

impl Default for ChapterLabel {
    fn default() -> Self {
        Self {
            word: "Chapter".to_string(),
            order: ChapterOrder::Standard,
        }
    }
}

/// Display words for numbered things, localizable per document.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelDictionary {
    pub chapter: ChapterLabel,
    pub section: String,
    pub figure: String,
    pub table: String,
    pub equation: String,
    pub aside: String,
    pub listing: String,
    pub contents: String,
}

impl Default for LabelDictionary {
    fn default() -> Self {
        Self {
            chapter: ChapterLabel::default(),
            section: "Section".to_string(),
            figure: "Figure".to_string(),
            table: "Table".to_string(),
            equation: "Equation".to_string(),
            aside: "Box".to_string(),
            listing: "Listing".to_string(),
            contents: "Contents".to_string(),
        }
    }
}

impl LabelDictionary {
    /// Words that may precede a reference and join its hyperlink.
    pub fn linking_words(&self) -> Vec<&str> {
        let mut words = vec![
            self.chapter.word.as_str(),
            self.section.as_str(),
            self.figure.as_str(),
            self.table.as_str(),
            self.equation.as_str(),
            self.aside.as_str(),
            self.listing.as_str(),
        ];
        words.retain(|word| !word.is_empty());
        // Longest first: a word may be a suffix of another.
        words.sort_by_key(|word| std::cmp::Reverse(word.chars().count()));
        words
    }

    pub fn chapter_badge(&self, number: &str) -> String {
        match self.chapter.order {
            ChapterOrder::Standard => format!("{} {}", self.chapter.word, number),
            ChapterOrder::Reverse => format!("{} {}", number, self.chapter.word),
        }
    }

    pub fn float_word(&self, kind: crate::ast::FloatKind) -> &str {
        use crate::ast::FloatKind;
        match kind {
            FloatKind::Figure => &self.figure,
            FloatKind::Table => &self.table,
            FloatKind::Equation => &self.equation,
            FloatKind::Aside => &self.aside,
            FloatKind::CodeListing => &self.listing,
        }
    }

    /// Byte offset where a linking phrase at the end of `text` starts.
    ///
    /// The phrase must start at a word boundary and be followed by a plain
    /// space, a non-breaking space or `~`. Matching ignores case.
    pub fn trailing_phrase(&self, text: &str) -> Option<usize> {
        let sep = text.chars().next_back()?;
        if !matches!(sep, ' ' | '\u{a0}' | '~') {
            return None;
        }
        let before = &text[..text.len() - sep.len_utf8()];
        for word in self.linking_words() {
            let lower_before = before.to_lowercase();
            let lower_word = word.to_lowercase();
            if !lower_before.ends_with(&lower_word) || lower_before.len() != before.len() {
                continue;
            }
            let start = before.len() - lower_word.len();
            if !before.is_char_boundary(start) {
                continue;
            }
            let boundary = before[..start]
                .chars()
                .next_back()
                .map(|c| !c.is_alphanumeric())
                .unwrap_or(true);
            if boundary {
                return Some(start);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{ChapterOrder, LabelDictionary};

    #[test]
    fn phrase_matches_case_insensitively() {
        let dictionary = LabelDictionary::default();
        assert_eq!(dictionary.trailing_phrase("see figure "), Some(4));
        assert_eq!(dictionary.trailing_phrase("see Figure\u{a0}"), Some(4));
        assert_eq!(dictionary.trailing_phrase("see Figure~"), Some(4));
        assert_eq!(dictionary.trailing_phrase("see Figure"), None);
        assert_eq!(dictionary.trailing_phrase("configure "), None);
    }

    #[test]
    fn reverse_order_badge() {
        let mut dictionary = LabelDictionary::default();
        dictionary.chapter.word = "章".to_string();
        dictionary.chapter.order = ChapterOrder::Reverse;
        assert_eq!(dictionary.chapter_badge("3"), "3 章");
    }
}
