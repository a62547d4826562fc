use std::fmt::Display;

use chrono::NaiveDate;

use crate::quote::QuoteOutcome;

/// Plain text body of the daily mail, built once and never changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent(String);

impl EmailContent {
    pub fn compose(outcome: &QuoteOutcome, date: NaiveDate) -> Self {
        Self(format!(
            "今日励志名言 ({})：\n\n{outcome}\n\n",
            date.format("%Y年%m月%d日")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EmailContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::{FetchError, Quote};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn fetched_quote() {
        // Arrange
        let outcome = QuoteOutcome::Fetched(Quote {
            content: "Q".into(),
            author: "A".into(),
        });

        // Act
        let actual = EmailContent::compose(&outcome, date());

        // Assert
        assert_eq!(actual.as_str(), "今日励志名言 (2024年03月07日)：\n\nQ\n\n——A\n\n");
    }

    #[test]
    fn placeholder_is_embedded() {
        let outcome = QuoteOutcome::Unavailable(FetchError::Api {
            code: "403".into(),
        });

        let actual = EmailContent::compose(&outcome, date());

        assert!(actual.as_str().contains("获取名言失败，请检查API状态"));
        assert!(actual.as_str().contains("2024年03月07日"));
    }
}
