//! crates/bookshelf_core/src/domain.rs
//!
//! Defines the core entities of the application: `Book`, `User` and
//! `ReadingProfile`, together with the structures embedded inside them.
//!
//! The serde shape of each entity is its persisted document shape. Identities
//! are stored as hyphenated UUID strings under `_id` so that every store sees
//! the same representation.

use crate::validation::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// An open-ended, loosely-typed key-value map (`metadata`, `ai_analysis`,
/// `stats`, pattern weights). No fixed schema is imposed on its contents.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

//=========================================================================================
// Identities
//=========================================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identity.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

entity_id!(
    /// Identity of a `Book` document.
    BookId
);
entity_id!(
    /// Identity of a `User` document.
    UserId
);
entity_id!(
    /// Identity of a `ReadingProfile` document.
    ReadingProfileId
);

//=========================================================================================
// Enumerated Fields
//=========================================================================================

macro_rules! choice_enum {
    ($(#[$meta:meta])* $name:ident, field = $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ValidationError::new(
                        $field,
                        format!("'{}' is not one of: {}", other, [$($text),+].join(", ")),
                    )),
                }
            }
        }
    };
}

choice_enum!(
    /// Where a book sits in a user's reading lifecycle.
    ReadingStatus, field = "status" {
        WantToRead => "want_to_read",
        Reading => "reading",
        Completed => "completed",
        Abandoned => "abandoned",
    }
);

impl Default for ReadingStatus {
    fn default() -> Self {
        ReadingStatus::WantToRead
    }
}

choice_enum!(
    ReadingLevel, field = "reading_level" {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
        Expert => "expert",
    }
);

choice_enum!(
    /// Account subscription tier.
    Subscription, field = "subscription" {
        Free => "free",
        Basic => "basic",
        Pro => "pro",
    }
);

impl Default for Subscription {
    fn default() -> Self {
        Subscription::Free
    }
}

//=========================================================================================
// Book
//=========================================================================================

/// Processing flags maintained by the external enrichment pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingState {
    #[serde(default)]
    pub embeddings_generated: bool,
    #[serde(default)]
    pub ai_analysis_complete: bool,
    #[serde(default)]
    pub needs_reprocessing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed: Option<DateTime<Utc>>,
}

/// A catalog item, keyed externally by its Open Library id (`olid`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "_id")]
    pub id: BookId,
    pub olid: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Written by the external embedding service.
    #[serde(default)]
    pub embeddings: Vec<f64>,
    #[serde(default)]
    pub metadata: Attributes,
    #[serde(default)]
    pub ai_analysis: Attributes,
    #[serde(default)]
    pub stats: Attributes,
    #[serde(default)]
    pub processing: ProcessingState,
    #[serde(default)]
    pub data_quality_completeness: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Embeddings older than this are considered stale.
pub const EMBEDDING_MAX_AGE_DAYS: i64 = 183;

impl Book {
    pub fn new(olid: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: BookId::new(),
            olid: olid.into(),
            title: title.into(),
            author: author.into(),
            publish_date: None,
            genres: Vec::new(),
            topics: Vec::new(),
            cover_url: None,
            description: None,
            embeddings: Vec::new(),
            metadata: Attributes::new(),
            ai_analysis: Attributes::new(),
            stats: Attributes::new(),
            processing: ProcessingState::default(),
            data_quality_completeness: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Scores how complete the catalog record is, stores the score in
    /// `data_quality_completeness` and returns it.
    ///
    /// Each populated core field (title, author, description, genres) adds 0.2,
    /// each populated optional field (cover url, publish date, page count) adds
    /// 0.067. The result is capped at 1.
    pub fn calculate_data_quality(&mut self) -> f64 {
        fn present(s: Option<&str>) -> bool {
            s.map_or(false, |s| !s.is_empty())
        }

        let core = [
            present(Some(self.title.as_str())),
            present(Some(self.author.as_str())),
            present(self.description.as_deref()),
            !self.genres.is_empty(),
        ];
        let optional = [
            present(self.cover_url.as_deref()),
            self.publish_date.is_some(),
            self.metadata
                .get("page_count")
                .map_or(false, |v| !v.is_null() && v.as_f64() != Some(0.0)),
        ];

        let score = core.iter().filter(|&&p| p).count() as f64 * 0.2
            + optional.iter().filter(|&&p| p).count() as f64 * 0.067;
        self.data_quality_completeness = score.min(1.0);
        self.data_quality_completeness
    }

    pub fn needs_embedding_update(&self, now: DateTime<Utc>) -> bool {
        if !self.processing.embeddings_generated || self.processing.needs_reprocessing {
            return true;
        }
        match self.processing.last_processed {
            Some(at) => at < now - Duration::days(EMBEDDING_MAX_AGE_DAYS),
            None => true,
        }
    }
}

//=========================================================================================
// User
//=========================================================================================

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailNotifications {
    #[serde(default = "enabled")]
    pub daily_recommendations: bool,
    #[serde(default = "enabled")]
    pub weekly_digest: bool,
    #[serde(default = "enabled")]
    pub new_releases: bool,
}

impl Default for EmailNotifications {
    fn default() -> Self {
        Self {
            daily_recommendations: true,
            weekly_digest: true,
            new_releases: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiFeatures {
    #[serde(default = "enabled")]
    pub personalized_summaries: bool,
    #[serde(default = "enabled")]
    pub reading_insights: bool,
}

impl Default for AiFeatures {
    fn default() -> Self {
        Self {
            personalized_summaries: true,
            reading_insights: true,
        }
    }
}

/// Account-level toggles. Every flag defaults to on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub email_notifications: EmailNotifications,
    #[serde(default)]
    pub ai_features: AiFeatures,
}

/// An account. `password` always holds a hash produced by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_profile: Option<ReadingProfileId>,
    #[serde(default)]
    pub preferences: UserPreferences,
    #[serde(default)]
    pub subscription: Subscription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email: email.into(),
            password: password_hash.into(),
            profile: None,
            reading_profile: None,
            preferences: UserPreferences::default(),
            subscription: Subscription::default(),
            last_active: None,
            created_at: now,
            updated_at: now,
        }
    }
}

//=========================================================================================
// ReadingProfile and its embedded structures
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_read: Option<u32>,
    /// Minutes spent reading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_date: Option<DateTime<Utc>>,
}

/// One book's entry in a user's reading history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingHistory {
    pub book: BookId,
    #[serde(default)]
    pub status: ReadingStatus,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed: Option<DateTime<Utc>>,
    /// Seconds.
    #[serde(default)]
    pub total_view_duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// 1 to 5 when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub date_added: DateTime<Utc>,
}

impl ReadingHistory {
    pub fn new(book: BookId) -> Self {
        Self {
            book,
            status: ReadingStatus::default(),
            favorite: false,
            view_count: 0,
            last_viewed: None,
            total_view_duration: 0,
            progress: None,
            rating: None,
            notes: None,
            date_added: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingGoals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub books_per_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_per_week: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingPreferences {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_goals: Option<ReadingGoals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_level: Option<ReadingLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedBook {
    pub book: BookId,
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_generated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingPatterns {
    #[serde(default)]
    pub preferred_genres: Vec<Attributes>,
    #[serde(default)]
    pub preferred_topics: Vec<Attributes>,
    /// Words per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_speed: Option<f64>,
    /// Percentage of history entries marked completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
}

/// The part of a profile owned by the external AI pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiProfile {
    #[serde(default)]
    pub interest_vector: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_patterns: Option<ReadingPatterns>,
    #[serde(default)]
    pub recommendations: Vec<RecommendedBook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A user's reading activity, kept in its own document so the AI pipeline
/// can rebuild it without touching the `User` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProfile {
    #[serde(rename = "_id")]
    pub id: ReadingProfileId,
    pub user: UserId,
    #[serde(default)]
    pub reading_history: Vec<ReadingHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<ReadingPreferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_profile: Option<AiProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReadingProfile {
    pub fn new(user: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: ReadingProfileId::new(),
            user,
            reading_history: Vec::new(),
            preferences: None,
            ai_profile: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn entry(&self, book: BookId) -> Option<&ReadingHistory> {
        self.reading_history.iter().find(|e| e.book == book)
    }

    pub fn entry_mut(&mut self, book: BookId) -> Option<&mut ReadingHistory> {
        self.reading_history.iter_mut().find(|e| e.book == book)
    }

    /// Returns the history entry for `book`, appending a fresh one if needed.
    pub fn entry_or_insert(&mut self, book: BookId) -> &mut ReadingHistory {
        let index = match self.reading_history.iter().position(|e| e.book == book) {
            Some(index) => index,
            None => {
                self.reading_history.push(ReadingHistory::new(book));
                self.reading_history.len() - 1
            }
        };
        &mut self.reading_history[index]
    }

    /// The recommendations last written by the AI pipeline, in stored order.
    pub fn recommendations(&self) -> &[RecommendedBook] {
        self.ai_profile
            .as_ref()
            .map(|ai| ai.recommendations.as_slice())
            .unwrap_or(&[])
    }

    /// Every book this profile points at, history first, without duplicates.
    pub fn referenced_books(&self) -> Vec<BookId> {
        let mut ids: Vec<BookId> = Vec::new();
        let history = self.reading_history.iter().map(|e| e.book);
        let recommended = self.recommendations().iter().map(|r| r.book);
        for id in history.chain(recommended) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Recomputes completion rate and average rating from the reading history.
    /// Other pattern fields are left as the AI pipeline wrote them.
    pub fn refresh_reading_patterns(&mut self) {
        let total = self.reading_history.len();
        let completed = self
            .reading_history
            .iter()
            .filter(|e| e.status == ReadingStatus::Completed)
            .count();
        let ratings: Vec<f64> = self
            .reading_history
            .iter()
            .filter_map(|e| e.rating.map(f64::from))
            .collect();

        let patterns = self
            .ai_profile
            .get_or_insert_with(AiProfile::default)
            .reading_patterns
            .get_or_insert_with(ReadingPatterns::default);

        patterns.completion_rate = (total > 0).then(|| completed as f64 * 100.0 / total as f64);
        patterns.average_rating =
            (!ratings.is_empty()).then(|| ratings.iter().sum::<f64>() / ratings.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_only_known_values() {
        for status in ReadingStatus::ALL {
            assert_eq!(status.as_str().parse::<ReadingStatus>().unwrap(), *status);
        }
        let err = "finished".parse::<ReadingStatus>().unwrap_err();
        assert_eq!(err.field, "status");
        assert!("Reading".parse::<ReadingStatus>().is_err());
    }

    #[test]
    fn subscription_defaults_to_free() {
        let user = User::new("a@x.com", "hash1");
        assert_eq!(user.subscription, Subscription::Free);
        assert!(user.preferences.email_notifications.weekly_digest);
        assert!(user.preferences.ai_features.reading_insights);
        assert!("enterprise".parse::<Subscription>().is_err());
    }

    #[test]
    fn ids_serialize_as_strings() {
        let id = BookId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
        let back: BookId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn missing_history_fields_take_defaults() {
        let book = BookId::new();
        let entry: ReadingHistory =
            serde_json::from_value(serde_json::json!({ "book": book.to_string() })).unwrap();
        assert_eq!(entry.status, ReadingStatus::WantToRead);
        assert!(!entry.favorite);
        assert_eq!(entry.view_count, 0);
        assert_eq!(entry.total_view_duration, 0);
        assert!(entry.rating.is_none());
    }

    #[test]
    fn data_quality_scores_populated_fields() {
        let mut book = Book::new("OL1W", "Dune", "Frank Herbert");
        assert!((book.calculate_data_quality() - 0.4).abs() < 1e-9);

        book.description = Some("Spice.".into());
        book.genres.push("science fiction".into());
        book.cover_url = Some("https://covers.example/1.jpg".into());
        book.publish_date = Some(Utc::now());
        book.metadata.insert("page_count".into(), serde_json::json!(412));
        assert_eq!(book.calculate_data_quality(), 1.0);
    }

    #[test]
    fn embedding_update_needed_when_stale_or_flagged() {
        let now = Utc::now();
        let mut book = Book::new("OL2W", "Emma", "Jane Austen");
        assert!(book.needs_embedding_update(now));

        book.processing.embeddings_generated = true;
        book.processing.last_processed = Some(now - Duration::days(10));
        assert!(!book.needs_embedding_update(now));

        book.processing.last_processed = Some(now - Duration::days(EMBEDDING_MAX_AGE_DAYS + 1));
        assert!(book.needs_embedding_update(now));

        book.processing.last_processed = Some(now);
        book.processing.needs_reprocessing = true;
        assert!(book.needs_embedding_update(now));
    }

    #[test]
    fn reading_patterns_track_completion_and_ratings() {
        let mut profile = ReadingProfile::new(UserId::new());
        profile.refresh_reading_patterns();
        let patterns = profile.ai_profile.as_ref().unwrap().reading_patterns.as_ref().unwrap();
        assert_eq!(patterns.completion_rate, None);

        let (a, b) = (BookId::new(), BookId::new());
        profile.entry_or_insert(a).status = ReadingStatus::Completed;
        profile.entry_or_insert(a).rating = Some(4);
        profile.entry_or_insert(b).rating = Some(2);
        assert_eq!(profile.reading_history.len(), 2);

        profile.refresh_reading_patterns();
        let patterns = profile.ai_profile.unwrap().reading_patterns.unwrap();
        assert_eq!(patterns.completion_rate, Some(50.0));
        assert_eq!(patterns.average_rating, Some(3.0));
    }
}
