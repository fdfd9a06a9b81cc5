//! crates/bookshelf_core/src/ports.rs
//!
//! Defines the storage contract (trait) for the application's core logic.
//! This trait forms the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete document store behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::domain::{Book, BookId, ReadingProfile, ReadingProfileId, User, UserId};
use crate::validation::ValidationError;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the document store driver.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The connection target is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The store is unreachable or did not answer in time. Retryable.
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Item not found: {0}")]
    NotFound(String),
    /// Persisted state breaks a cross-document invariant, e.g. an orphaned profile.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Whether the caller may retry the operation with its own backoff policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::Connection(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Port (Trait)
//=========================================================================================

/// Raw per-collection access to the document store.
///
/// Implementations enforce uniqueness of `Book.olid`, `User.email` and
/// `ReadingProfile.user`, reporting a collision as `PortError::Validation`
/// naming the field. `replace_*` and `delete_*` return `PortError::NotFound`
/// when the document does not exist. Every single-document write is atomic.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // --- Books ---
    async fn insert_book(&self, book: &Book) -> PortResult<()>;

    async fn replace_book(&self, book: &Book) -> PortResult<()>;

    async fn get_book(&self, id: BookId) -> PortResult<Book>;

    async fn find_book_by_olid(&self, olid: &str) -> PortResult<Option<Book>>;

    /// Returns the subset of `ids` with no matching book.
    async fn missing_books(&self, ids: &[BookId]) -> PortResult<Vec<BookId>>;

    async fn list_books(&self) -> PortResult<Vec<Book>>;

    /// Whether any reading history entry or recommendation points at the book.
    async fn is_book_referenced(&self, id: BookId) -> PortResult<bool>;

    async fn delete_book(&self, id: BookId) -> PortResult<()>;

    // --- Users ---
    async fn insert_user(&self, user: &User) -> PortResult<()>;

    async fn replace_user(&self, user: &User) -> PortResult<()>;

    /// Sets only `reading_profile` and `updated_at` on the stored user and
    /// returns the updated document. Other fields are left as stored.
    async fn link_reading_profile(
        &self,
        user: UserId,
        profile: ReadingProfileId,
        at: DateTime<Utc>,
    ) -> PortResult<User>;

    async fn get_user(&self, id: UserId) -> PortResult<User>;

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>>;

    async fn delete_user(&self, id: UserId) -> PortResult<()>;

    // --- Reading Profiles ---
    async fn insert_reading_profile(&self, profile: &ReadingProfile) -> PortResult<()>;

    async fn replace_reading_profile(&self, profile: &ReadingProfile) -> PortResult<()>;

    async fn get_reading_profile(&self, id: ReadingProfileId) -> PortResult<ReadingProfile>;

    async fn find_reading_profile_by_user(&self, user: UserId) -> PortResult<Option<ReadingProfile>>;

    async fn list_reading_profiles(&self) -> PortResult<Vec<ReadingProfile>>;

    async fn delete_reading_profile(&self, id: ReadingProfileId) -> PortResult<()>;

    // --- Connection Lifecycle ---
    /// Round-trips to the store to prove it is reachable.
    async fn ping(&self) -> PortResult<()>;

    /// Releases the underlying connection. The handle is unusable afterwards.
    async fn shutdown(&self) -> PortResult<()>;
}
