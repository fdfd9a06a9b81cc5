//! crates/bookshelf_core/src/validation.rs
//!
//! Field-level invariants checked before any entity is written. Uniqueness
//! and reference resolution need the store and are enforced by `Library`
//! and the store adapters instead.

use crate::domain::{AiProfile, Book, ReadingHistory, ReadingProfile, User};
use std::collections::HashSet;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A constraint violation on a single field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Implemented by every entity and embedded structure with invariants.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    Ok(())
}

fn require_finite(field: &str, values: &[f64]) -> Result<(), ValidationError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(ValidationError::new(
            format!("{}[{}]", field, index),
            "must be a finite number",
        )),
        None => Ok(()),
    }
}

pub fn check_rating(rating: u8) -> Result<(), ValidationError> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ValidationError::new(
            "rating",
            format!("{} is outside {}..={}", rating, MIN_RATING, MAX_RATING),
        ));
    }
    Ok(())
}

/// Prefixes the field of a nested error with its location in the parent.
fn nested(prefix: String) -> impl FnOnce(ValidationError) -> ValidationError {
    move |e| ValidationError::new(format!("{}.{}", prefix, e.field), e.reason)
}

impl Validate for Book {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("olid", &self.olid)?;
        require_non_empty("title", &self.title)?;
        require_non_empty("author", &self.author)?;
        require_finite("embeddings", &self.embeddings)?;
        if !(0.0..=1.0).contains(&self.data_quality_completeness) {
            return Err(ValidationError::new(
                "data_quality_completeness",
                "must lie in 0..=1",
            ));
        }
        Ok(())
    }
}

impl Validate for User {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("email", &self.email)?;
        require_non_empty("password", &self.password)?;
        Ok(())
    }
}

impl Validate for ReadingHistory {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(rating) = self.rating {
            check_rating(rating)?;
        }
        Ok(())
    }
}

impl Validate for AiProfile {
    fn validate(&self) -> Result<(), ValidationError> {
        require_finite("interest_vector", &self.interest_vector)?;
        for (i, rec) in self.recommendations.iter().enumerate() {
            if !rec.score.is_finite() {
                return Err(ValidationError::new(
                    format!("recommendations[{}].score", i),
                    "must be a finite number",
                ));
            }
        }
        Ok(())
    }
}

impl Validate for ReadingProfile {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for (i, entry) in self.reading_history.iter().enumerate() {
            entry
                .validate()
                .map_err(nested(format!("reading_history[{}]", i)))?;
            if !seen.insert(entry.book) {
                return Err(ValidationError::new(
                    format!("reading_history[{}].book", i),
                    format!("book {} already has an entry", entry.book),
                ));
            }
        }
        if let Some(ai) = &self.ai_profile {
            ai.validate().map_err(nested("ai_profile".to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BookId, RecommendedBook, UserId};
    use proptest::prelude::*;

    #[test]
    fn book_requires_identity_fields() {
        assert!(Book::new("OL123", "T", "A").validate().is_ok());

        let err = Book::new("", "T", "A").validate().unwrap_err();
        assert_eq!(err.field, "olid");
        let err = Book::new("OL123", "  ", "A").validate().unwrap_err();
        assert_eq!(err.field, "title");
        let err = Book::new("OL123", "T", "").validate().unwrap_err();
        assert_eq!(err.field, "author");
    }

    #[test]
    fn book_rejects_non_finite_embeddings() {
        let mut book = Book::new("OL123", "T", "A");
        book.embeddings = vec![0.1, f64::NAN];
        assert_eq!(book.validate().unwrap_err().field, "embeddings[1]");
    }

    #[test]
    fn user_requires_email_and_password() {
        assert!(User::new("a@x.com", "hash1").validate().is_ok());
        assert_eq!(User::new("", "hash1").validate().unwrap_err().field, "email");
        assert_eq!(User::new("a@x.com", "").validate().unwrap_err().field, "password");
    }

    #[test]
    fn rating_bounds_are_inclusive() {
        assert!(check_rating(1).is_ok());
        assert!(check_rating(5).is_ok());
        assert!(check_rating(0).is_err());
        assert!(check_rating(6).is_err());
    }

    #[test]
    fn profile_reports_offending_entry() {
        let mut profile = ReadingProfile::new(UserId::new());
        profile.entry_or_insert(BookId::new()).rating = Some(5);
        profile.entry_or_insert(BookId::new()).rating = Some(6);

        let err = profile.validate().unwrap_err();
        assert_eq!(err.field, "reading_history[1].rating");
    }

    #[test]
    fn profile_rejects_duplicate_history_books() {
        let book = BookId::new();
        let mut profile = ReadingProfile::new(UserId::new());
        profile.reading_history.push(ReadingHistory::new(book));
        profile.reading_history.push(ReadingHistory::new(book));

        assert_eq!(profile.validate().unwrap_err().field, "reading_history[1].book");
    }

    #[test]
    fn profile_rejects_non_finite_scores() {
        let mut profile = ReadingProfile::new(UserId::new());
        profile.ai_profile = Some(AiProfile {
            recommendations: vec![RecommendedBook {
                book: BookId::new(),
                score: f64::INFINITY,
                reason: "similar themes".into(),
                date_generated: None,
            }],
            ..AiProfile::default()
        });

        assert_eq!(
            profile.validate().unwrap_err().field,
            "ai_profile.recommendations[0].score"
        );
    }

    proptest! {
        #[test]
        fn rating_accepted_iff_within_bounds(rating in any::<u8>()) {
            let mut entry = ReadingHistory::new(BookId::new());
            entry.rating = Some(rating);
            prop_assert_eq!(entry.validate().is_ok(), (1..=5).contains(&rating));
        }
    }
}
