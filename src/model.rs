use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{Error, Result};

pub const DEFAULT_PRIORITY: u8 = 3;

/// Normalized bookmark passed from a source to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperLink {
    pub title: String,
    pub url: String,
    pub tags: Vec<String>,
    pub priority: u8,
    pub note: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl PaperLink {
    /// Notion rejects pages without a title or url.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidRecord(format!("missing title for {}", self.url)));
        }
        if self.url.trim().is_empty() {
            return Err(Error::InvalidRecord(format!("missing url for '{}'", self.title)));
        }
        Ok(())
    }
}

/// Priority marker embedded in a bookmark note, e.g. "p1" .. "p5".
pub fn priority_from_note(note: &str) -> u8 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"p([1-5])").unwrap());
    re.captures(note)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(DEFAULT_PRIORITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(title: &str, url: &str) -> PaperLink {
        PaperLink {
            title: title.into(),
            url: url.into(),
            tags: vec![],
            priority: DEFAULT_PRIORITY,
            note: String::new(),
            created_at: None,
        }
    }

    #[test]
    fn priority_marker() {
        assert_eq!(priority_from_note("p3"), 3);
        assert_eq!(priority_from_note("read soon p1 (diffusion)"), 1);
        assert_eq!(priority_from_note("p5"), 5);
    }

    #[test]
    fn priority_default() {
        assert_eq!(priority_from_note(""), 3);
        assert_eq!(priority_from_note("no marker here"), 3);
        assert_eq!(priority_from_note("p0 p9"), 3);
    }

    #[test]
    fn priority_first_match_wins() {
        assert_eq!(priority_from_note("p2 then p4"), 2);
    }

    #[test]
    fn validate_requires_title_and_url() {
        assert!(link("Attention Is All You Need", "https://arxiv.org/abs/1706.03762")
            .validate()
            .is_ok());
        assert!(matches!(
            link("", "https://arxiv.org/abs/1706.03762").validate(),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(link("Title", " ").validate(), Err(Error::InvalidRecord(_))));
    }
}
