use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// A user-entered search over node names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFilter {
    pub pattern: String,
    #[serde(default)]
    pub match_case: bool,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub use_regex: bool,
}

impl TextFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn match_case(mut self, enabled: bool) -> Self {
        self.match_case = enabled;
        self
    }

    pub fn whole_word(mut self, enabled: bool) -> Self {
        self.whole_word = enabled;
        self
    }

    pub fn use_regex(mut self, enabled: bool) -> Self {
        self.use_regex = enabled;
        self
    }

    /// An empty pattern matches everything; an invalid regex matches
    /// nothing.
    pub fn compile(&self) -> Matcher {
        if self.pattern.is_empty() {
            return Matcher::All;
        }
        let body = if self.use_regex {
            self.pattern.clone()
        } else {
            regex::escape(&self.pattern)
        };
        let body = if self.whole_word {
            format!(r"\b(?:{body})\b")
        } else {
            body
        };
        match RegexBuilder::new(&body).case_insensitive(!self.match_case).build() {
            Ok(re) => Matcher::Regex(re),
            Err(err) => {
                tracing::warn!(pattern = %self.pattern, %err, "invalid filter regex");
                Matcher::Nothing
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Matcher {
    All,
    Regex(Regex),
    Nothing,
}

impl Matcher {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::All => true,
            Self::Regex(re) => re.is_match(text),
            Self::Nothing => false,
        }
    }
}
