//! services/store/src/adapters/memory.rs
//!
//! An in-process implementation of the `DocumentStore` port. It enforces the
//! same unique constraints the MongoDB indexes do, which makes it suitable for
//! tests and local experiments.

use async_trait::async_trait;
use bookshelf_core::domain::{Book, BookId, ReadingProfile, ReadingProfileId, User, UserId};
use bookshelf_core::ports::{DocumentStore, PortError, PortResult};
use bookshelf_core::ValidationError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Collections {
    books: HashMap<BookId, Book>,
    users: HashMap<UserId, User>,
    profiles: HashMap<ReadingProfileId, ReadingProfile>,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    closed: AtomicBool,
}

fn duplicate(field: &str, value: &str) -> PortError {
    ValidationError::new(field, format!("'{}' is already taken", value)).into()
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> PortError {
    PortError::NotFound(format!("{} {} not found", kind, id))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> PortResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PortError::Connection("store has been shut down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_book(&self, book: &Book) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        if c.books.contains_key(&book.id) {
            return Err(duplicate("_id", &book.id.to_string()));
        }
        if c.books.values().any(|b| b.olid == book.olid) {
            return Err(duplicate("olid", &book.olid));
        }
        c.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn replace_book(&self, book: &Book) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        if !c.books.contains_key(&book.id) {
            return Err(not_found("Book", book.id));
        }
        if c.books.values().any(|b| b.olid == book.olid && b.id != book.id) {
            return Err(duplicate("olid", &book.olid));
        }
        c.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn get_book(&self, id: BookId) -> PortResult<Book> {
        self.check_open()?;
        let c = self.collections.read().await;
        c.books.get(&id).cloned().ok_or_else(|| not_found("Book", id))
    }

    async fn find_book_by_olid(&self, olid: &str) -> PortResult<Option<Book>> {
        self.check_open()?;
        let c = self.collections.read().await;
        Ok(c.books.values().find(|b| b.olid == olid).cloned())
    }

    async fn missing_books(&self, ids: &[BookId]) -> PortResult<Vec<BookId>> {
        self.check_open()?;
        let c = self.collections.read().await;
        Ok(ids.iter().filter(|id| !c.books.contains_key(*id)).copied().collect())
    }

    async fn list_books(&self) -> PortResult<Vec<Book>> {
        self.check_open()?;
        let c = self.collections.read().await;
        let mut books: Vec<Book> = c.books.values().cloned().collect();
        books.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn is_book_referenced(&self, id: BookId) -> PortResult<bool> {
        self.check_open()?;
        let c = self.collections.read().await;
        Ok(c.profiles.values().any(|p| p.referenced_books().contains(&id)))
    }

    async fn delete_book(&self, id: BookId) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        c.books.remove(&id).map(|_| ()).ok_or_else(|| not_found("Book", id))
    }

    async fn insert_user(&self, user: &User) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        if c.users.contains_key(&user.id) {
            return Err(duplicate("_id", &user.id.to_string()));
        }
        if c.users.values().any(|u| u.email == user.email) {
            return Err(duplicate("email", &user.email));
        }
        c.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn replace_user(&self, user: &User) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        if !c.users.contains_key(&user.id) {
            return Err(not_found("User", user.id));
        }
        if c.users.values().any(|u| u.email == user.email && u.id != user.id) {
            return Err(duplicate("email", &user.email));
        }
        c.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn link_reading_profile(
        &self,
        user: UserId,
        profile: ReadingProfileId,
        at: DateTime<Utc>,
    ) -> PortResult<User> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        let stored = c.users.get_mut(&user).ok_or_else(|| not_found("User", user))?;
        stored.reading_profile = Some(profile);
        stored.updated_at = at;
        Ok(stored.clone())
    }

    async fn get_user(&self, id: UserId) -> PortResult<User> {
        self.check_open()?;
        let c = self.collections.read().await;
        c.users.get(&id).cloned().ok_or_else(|| not_found("User", id))
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        self.check_open()?;
        let c = self.collections.read().await;
        Ok(c.users.values().find(|u| u.email == email).cloned())
    }

    async fn delete_user(&self, id: UserId) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        c.users.remove(&id).map(|_| ()).ok_or_else(|| not_found("User", id))
    }

    async fn insert_reading_profile(&self, profile: &ReadingProfile) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        if c.profiles.contains_key(&profile.id) {
            return Err(duplicate("_id", &profile.id.to_string()));
        }
        if c.profiles.values().any(|p| p.user == profile.user) {
            return Err(duplicate("user", &profile.user.to_string()));
        }
        c.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn replace_reading_profile(&self, profile: &ReadingProfile) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        if !c.profiles.contains_key(&profile.id) {
            return Err(not_found("ReadingProfile", profile.id));
        }
        if c.profiles.values().any(|p| p.user == profile.user && p.id != profile.id) {
            return Err(duplicate("user", &profile.user.to_string()));
        }
        c.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn get_reading_profile(&self, id: ReadingProfileId) -> PortResult<ReadingProfile> {
        self.check_open()?;
        let c = self.collections.read().await;
        c.profiles.get(&id).cloned().ok_or_else(|| not_found("ReadingProfile", id))
    }

    async fn find_reading_profile_by_user(&self, user: UserId) -> PortResult<Option<ReadingProfile>> {
        self.check_open()?;
        let c = self.collections.read().await;
        Ok(c.profiles.values().find(|p| p.user == user).cloned())
    }

    async fn list_reading_profiles(&self) -> PortResult<Vec<ReadingProfile>> {
        self.check_open()?;
        let c = self.collections.read().await;
        let mut profiles: Vec<ReadingProfile> = c.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(profiles)
    }

    async fn delete_reading_profile(&self, id: ReadingProfileId) -> PortResult<()> {
        self.check_open()?;
        let mut c = self.collections.write().await;
        c.profiles
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("ReadingProfile", id))
    }

    async fn ping(&self) -> PortResult<()> {
        self.check_open()
    }

    async fn shutdown(&self) -> PortResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
