//! crates/bookshelf_core/src/library.rs
//!
//! The `Library` service: validated create/read/update/delete for every entity,
//! lazy reading-profile initialization, and the reading-activity bookkeeping
//! performed on a user's profile. All persistence goes through a
//! `DocumentStore` handle passed in at construction.

use crate::domain::{
    AiProfile, Book, BookId, Progress, ReadingHistory, ReadingPreferences, ReadingProfile,
    ReadingProfileId, ReadingStatus, RecommendedBook, User, UserId,
};
use crate::ports::{DocumentStore, PortError, PortResult};
use crate::validation::{check_rating, Validate, ValidationError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct Library {
    store: Arc<dyn DocumentStore>,
}

impl Library {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    //=====================================================================================
    // Books
    //=====================================================================================

    /// Validates and inserts a new catalog entry. Fails with a validation error
    /// on `olid` if another book already uses it.
    pub async fn create_book(&self, mut book: Book) -> PortResult<Book> {
        book.calculate_data_quality();
        book.validate()?;
        let now = Utc::now();
        book.created_at = now;
        book.updated_at = now;

        self.store.insert_book(&book).await?;
        info!(book_id = %book.id, olid = %book.olid, "Created book");
        Ok(book)
    }

    pub async fn get_book(&self, id: BookId) -> PortResult<Book> {
        self.store.get_book(id).await
    }

    pub async fn find_book_by_olid(&self, olid: &str) -> PortResult<Option<Book>> {
        self.store.find_book_by_olid(olid).await
    }

    pub async fn list_books(&self) -> PortResult<Vec<Book>> {
        self.store.list_books().await
    }

    pub async fn update_book(&self, mut book: Book) -> PortResult<Book> {
        book.calculate_data_quality();
        book.validate()?;
        let stored = self.store.get_book(book.id).await?;
        book.created_at = stored.created_at;
        book.updated_at = Utc::now();

        self.store.replace_book(&book).await?;
        debug!(book_id = %book.id, "Updated book");
        Ok(book)
    }

    /// Removes a book that no reading profile points at.
    pub async fn delete_book(&self, id: BookId) -> PortResult<()> {
        if self.store.is_book_referenced(id).await? {
            return Err(ValidationError::new(
                "book",
                format!("book {} is still referenced by a reading profile", id),
            )
            .into());
        }
        self.store.delete_book(id).await?;
        info!(book_id = %id, "Deleted book");
        Ok(())
    }

    //=====================================================================================
    // Users
    //=====================================================================================

    /// Registers a new account. `user.password` must already be a hash.
    pub async fn create_user(&self, mut user: User) -> PortResult<User> {
        user.validate()?;
        self.check_profile_link(&user).await?;
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        self.store.insert_user(&user).await?;
        info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> PortResult<User> {
        self.store.get_user(id).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        self.store.find_user_by_email(email).await
    }

    /// Replaces the stored account. A missing `reading_profile` keeps the
    /// stored link, so a copy taken before initialization cannot unlink it.
    pub async fn update_user(&self, mut user: User) -> PortResult<User> {
        user.validate()?;
        let stored = self.store.get_user(user.id).await?;
        if user.reading_profile.is_none() {
            user.reading_profile = stored.reading_profile;
        }
        self.check_profile_link(&user).await?;
        user.created_at = stored.created_at;
        user.updated_at = Utc::now();

        self.store.replace_user(&user).await?;
        debug!(user_id = %user.id, "Updated user");
        Ok(user)
    }

    pub async fn touch_last_active(&self, id: UserId) -> PortResult<User> {
        let mut user = self.store.get_user(id).await?;
        let now = Utc::now();
        user.last_active = Some(now);
        user.updated_at = now;
        self.store.replace_user(&user).await?;
        Ok(user)
    }

    /// Deletes the account, then its reading profile. An interruption between
    /// the two writes leaves an orphaned profile, which `find_orphaned_profiles`
    /// reports.
    pub async fn delete_user(&self, id: UserId) -> PortResult<()> {
        let profile = self.store.find_reading_profile_by_user(id).await?;
        self.store.delete_user(id).await?;
        if let Some(profile) = profile {
            self.store.delete_reading_profile(profile.id).await?;
        }
        info!(user_id = %id, "Deleted user");
        Ok(())
    }

    /// A user may only point at a profile that exists and belongs to them.
    async fn check_profile_link(&self, user: &User) -> PortResult<()> {
        let Some(profile_id) = user.reading_profile else {
            return Ok(());
        };
        match self.store.get_reading_profile(profile_id).await {
            Ok(profile) if profile.user == user.id => Ok(()),
            Ok(profile) => Err(ValidationError::new(
                "reading_profile",
                format!("profile {} belongs to user {}", profile_id, profile.user),
            )
            .into()),
            Err(PortError::NotFound(_)) => Err(ValidationError::new(
                "reading_profile",
                format!("profile {} does not exist", profile_id),
            )
            .into()),
            Err(e) => Err(e),
        }
    }

    //=====================================================================================
    // Reading Profile Lifecycle
    //=====================================================================================

    /// Makes sure `user` has a reading profile and returns it. On success
    /// `user` is refreshed from the stored document.
    ///
    /// Calling this on a user that is already linked is a no-op that re-reads
    /// and returns the linked profile. A profile left unlinked by an earlier
    /// interrupted call is adopted rather than duplicated. The profile insert
    /// and the link are two separate writes: if the link fails the new profile
    /// is deleted again, and if that cleanup also fails the orphan is reported
    /// as a data integrity error.
    pub async fn initialize_reading_profile(&self, user: &mut User) -> PortResult<ReadingProfile> {
        // The stored owner decides; `user` may be a stale copy.
        let stored = self.store.get_user(user.id).await?;
        if let Some(profile_id) = stored.reading_profile {
            debug!(user_id = %user.id, profile_id = %profile_id, "Reading profile already initialized");
            let profile = self.resolve_profile(stored.id, profile_id).await?;
            *user = stored;
            return Ok(profile);
        }

        if let Some(existing) = self.store.find_reading_profile_by_user(user.id).await? {
            warn!(user_id = %user.id, profile_id = %existing.id, "Adopting unlinked reading profile");
            self.link_profile(user, existing.id).await?;
            return Ok(existing);
        }

        let profile = ReadingProfile::new(user.id);
        self.store.insert_reading_profile(&profile).await?;

        if let Err(link_err) = self.link_profile(user, profile.id).await {
            error!(user_id = %user.id, profile_id = %profile.id, "Failed to link reading profile: {}", link_err);
            return Err(match self.store.delete_reading_profile(profile.id).await {
                Ok(()) => link_err,
                Err(cleanup_err) => PortError::DataIntegrity(format!(
                    "reading profile {} is orphaned: linking failed ({}) and cleanup failed ({})",
                    profile.id, link_err, cleanup_err
                )),
            });
        }

        info!(user_id = %user.id, profile_id = %profile.id, "Reading profile created");
        Ok(profile)
    }

    /// The recommendations currently stored on the user's profile, or an empty
    /// list when the user has none. The profile is re-read from the store.
    pub async fn get_recommendations(&self, user: &User) -> PortResult<Vec<RecommendedBook>> {
        let Some(profile_id) = user.reading_profile else {
            return Ok(Vec::new());
        };
        let profile = self.resolve_profile(user.id, profile_id).await?;
        Ok(profile.recommendations().to_vec())
    }

    pub async fn get_reading_profile(&self, id: ReadingProfileId) -> PortResult<ReadingProfile> {
        self.store.get_reading_profile(id).await
    }

    pub async fn find_profile_for_user(&self, user: UserId) -> PortResult<Option<ReadingProfile>> {
        self.store.find_reading_profile_by_user(user).await
    }

    /// Validates and persists an existing profile. Every referenced book must
    /// exist and the owning user cannot change.
    pub async fn save_reading_profile(&self, mut profile: ReadingProfile) -> PortResult<ReadingProfile> {
        profile.validate()?;

        let stored = self.store.get_reading_profile(profile.id).await?;
        if stored.user != profile.user {
            return Err(ValidationError::new(
                "user",
                format!("profile {} belongs to user {}", profile.id, stored.user),
            )
            .into());
        }
        profile.created_at = stored.created_at;

        let missing = self.store.missing_books(&profile.referenced_books()).await?;
        if let Some(book) = missing.first() {
            return Err(ValidationError::new("book", format!("book {} does not exist", book)).into());
        }

        profile.updated_at = Utc::now();
        self.store.replace_reading_profile(&profile).await?;
        debug!(profile_id = %profile.id, "Saved reading profile");
        Ok(profile)
    }

    async fn resolve_profile(&self, user: UserId, profile_id: ReadingProfileId) -> PortResult<ReadingProfile> {
        match self.store.get_reading_profile(profile_id).await {
            Ok(profile) if profile.user == user => Ok(profile),
            Ok(profile) => Err(PortError::DataIntegrity(format!(
                "user {} references reading profile {} owned by user {}",
                user, profile_id, profile.user
            ))),
            Err(PortError::NotFound(_)) => Err(PortError::DataIntegrity(format!(
                "user {} references missing reading profile {}",
                user, profile_id
            ))),
            Err(e) => Err(e),
        }
    }

    async fn link_profile(&self, user: &mut User, profile: ReadingProfileId) -> PortResult<()> {
        *user = self
            .store
            .link_reading_profile(user.id, profile, Utc::now())
            .await?;
        Ok(())
    }

    //=====================================================================================
    // Reading Activity
    //=====================================================================================

    async fn modify_profile<F>(&self, id: ReadingProfileId, f: F) -> PortResult<ReadingProfile>
    where
        F: FnOnce(&mut ReadingProfile) -> PortResult<()> + Send,
    {
        let mut profile = self.store.get_reading_profile(id).await?;
        f(&mut profile)?;
        self.save_reading_profile(profile).await
    }

    /// Applies `f` to the history entry for `book`, creating the entry first if
    /// the book has never been seen on this profile.
    async fn modify_entry<F>(&self, id: ReadingProfileId, book: BookId, f: F) -> PortResult<ReadingProfile>
    where
        F: FnOnce(&mut ReadingHistory) -> PortResult<()> + Send,
    {
        self.store.get_book(book).await?;
        self.modify_profile(id, |profile| f(profile.entry_or_insert(book))).await
    }

    /// Adds `book` to the history with `status`. A book already in the history
    /// only has its status changed.
    pub async fn add_to_history(
        &self,
        id: ReadingProfileId,
        book: BookId,
        status: ReadingStatus,
    ) -> PortResult<ReadingProfile> {
        self.set_reading_status(id, book, status).await
    }

    pub async fn set_reading_status(
        &self,
        id: ReadingProfileId,
        book: BookId,
        status: ReadingStatus,
    ) -> PortResult<ReadingProfile> {
        self.modify_entry(id, book, |entry| {
            entry.status = status;
            if status == ReadingStatus::Reading {
                let progress = entry.progress.get_or_insert_with(Progress::default);
                progress.last_read_date.get_or_insert_with(Utc::now);
            }
            Ok(())
        })
        .await
    }

    pub async fn rate_book(&self, id: ReadingProfileId, book: BookId, rating: u8) -> PortResult<ReadingProfile> {
        check_rating(rating)?;
        self.modify_entry(id, book, |entry| {
            entry.rating = Some(rating);
            Ok(())
        })
        .await
    }

    pub async fn set_favorite(&self, id: ReadingProfileId, book: BookId, favorite: bool) -> PortResult<ReadingProfile> {
        self.modify_entry(id, book, |entry| {
            entry.favorite = favorite;
            Ok(())
        })
        .await
    }

    /// Counts one view of `book` lasting `duration_secs`.
    pub async fn record_view(&self, id: ReadingProfileId, book: BookId, duration_secs: u64) -> PortResult<ReadingProfile> {
        self.modify_entry(id, book, |entry| {
            entry.view_count = entry.view_count.saturating_add(1);
            entry.last_viewed = Some(Utc::now());
            entry.total_view_duration = entry.total_view_duration.saturating_add(duration_secs);
            Ok(())
        })
        .await
    }

    pub async fn update_progress(&self, id: ReadingProfileId, book: BookId, progress: Progress) -> PortResult<ReadingProfile> {
        self.modify_entry(id, book, |entry| {
            entry.progress = Some(progress);
            Ok(())
        })
        .await
    }

    /// The books marked favorite on the profile, in history order. Entries
    /// whose book has disappeared are skipped.
    pub async fn favorites(&self, id: ReadingProfileId) -> PortResult<Vec<Book>> {
        let profile = self.store.get_reading_profile(id).await?;
        let mut books = Vec::new();
        for entry in profile.reading_history.iter().filter(|e| e.favorite) {
            match self.store.get_book(entry.book).await {
                Ok(book) => books.push(book),
                Err(PortError::NotFound(_)) => {
                    warn!(profile_id = %id, book_id = %entry.book, "Favorite references a missing book");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(books)
    }

    pub async fn set_preferences(&self, id: ReadingProfileId, preferences: ReadingPreferences) -> PortResult<ReadingProfile> {
        self.modify_profile(id, |profile| {
            profile.preferences = Some(preferences);
            Ok(())
        })
        .await
    }

    /// Stores the output of the external AI pipeline on the profile.
    pub async fn update_ai_profile(&self, id: ReadingProfileId, mut ai_profile: AiProfile) -> PortResult<ReadingProfile> {
        let now = Utc::now();
        ai_profile.last_updated = Some(now);
        for rec in &mut ai_profile.recommendations {
            rec.date_generated.get_or_insert(now);
        }
        self.modify_profile(id, |profile| {
            profile.ai_profile = Some(ai_profile);
            Ok(())
        })
        .await
    }

    pub async fn refresh_reading_patterns(&self, id: ReadingProfileId) -> PortResult<ReadingProfile> {
        self.modify_profile(id, |profile| {
            profile.refresh_reading_patterns();
            Ok(())
        })
        .await
    }

    //=====================================================================================
    // Integrity Maintenance
    //=====================================================================================

    /// Profiles whose owning user no longer exists.
    pub async fn find_orphaned_profiles(&self) -> PortResult<Vec<ReadingProfile>> {
        let mut orphans = Vec::new();
        for profile in self.store.list_reading_profiles().await? {
            match self.store.get_user(profile.user).await {
                Ok(_) => {}
                Err(PortError::NotFound(_)) => {
                    warn!(profile_id = %profile.id, user_id = %profile.user, "Orphaned reading profile");
                    orphans.push(profile);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(orphans)
    }

    /// Profiles whose owner exists but does not point back at them, as left by
    /// an interrupted or still running initialization.
    pub async fn find_unlinked_profiles(&self) -> PortResult<Vec<ReadingProfile>> {
        let mut unlinked = Vec::new();
        for profile in self.store.list_reading_profiles().await? {
            match self.store.get_user(profile.user).await {
                Ok(user) if user.reading_profile != Some(profile.id) => {
                    warn!(profile_id = %profile.id, user_id = %profile.user, "Unlinked reading profile");
                    unlinked.push(profile);
                }
                Ok(_) | Err(PortError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(unlinked)
    }

    /// Deletes every orphaned profile and returns how many were removed.
    /// Profiles of existing users are never deleted here.
    pub async fn purge_orphaned_profiles(&self) -> PortResult<usize> {
        let orphans = self.find_orphaned_profiles().await?;
        for profile in &orphans {
            self.store.delete_reading_profile(profile.id).await?;
        }
        if !orphans.is_empty() {
            info!(count = orphans.len(), "Purged orphaned reading profiles");
        }
        Ok(orphans.len())
    }

    /// Links each owner that has no profile link to its unlinked profile and
    /// returns how many were repaired. Owners linked elsewhere are only logged.
    pub async fn relink_profiles(&self) -> PortResult<usize> {
        let mut relinked = 0;
        for profile in self.find_unlinked_profiles().await? {
            let owner = self.store.get_user(profile.user).await?;
            match owner.reading_profile {
                None => {
                    self.store
                        .link_reading_profile(owner.id, profile.id, Utc::now())
                        .await?;
                    info!(profile_id = %profile.id, user_id = %owner.id, "Relinked reading profile");
                    relinked += 1;
                }
                Some(other) => {
                    warn!(
                        profile_id = %profile.id,
                        user_id = %owner.id,
                        linked_profile = %other,
                        "Owner is linked to a different profile, leaving it in place"
                    );
                }
            }
        }
        Ok(relinked)
    }
}
