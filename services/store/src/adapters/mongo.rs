//! services/store/src/adapters/mongo.rs
//!
//! This module contains the MongoDB adapter, the concrete implementation of the
//! `DocumentStore` port used in production. Each entity lives in its own
//! collection (`Book`, `User`, `ReadingProfile`); uniqueness is enforced by the
//! indexes created when the connection is opened.

use crate::config::StoreConfig;
use crate::connection::Connector;
use async_trait::async_trait;
use bookshelf_core::domain::{Book, BookId, ReadingProfile, ReadingProfileId, User, UserId};
use bookshelf_core::ports::{DocumentStore, PortError, PortResult};
use bookshelf_core::ValidationError;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const BOOKS: &str = "Book";
pub const USERS: &str = "User";
pub const READING_PROFILES: &str = "ReadingProfile";

const DUPLICATE_KEY: i32 = 11000;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document store backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    timeout: Duration,
}

impl MongoStore {
    /// Opens a client, proves the server answers and bootstraps the indexes.
    pub async fn connect(config: &StoreConfig) -> PortResult<Self> {
        let mut options = bounded("parse connection string", None, config.timeout, async {
            ClientOptions::parse(&config.mongo_uri).await
        })
        .await
        .map_err(|e| match e {
            PortError::Unexpected(msg) => PortError::Configuration(format!("invalid MONGO_URI: {}", msg)),
            other => other,
        })?;
        options.app_name = Some("bookshelf".to_string());
        options.connect_timeout = Some(config.timeout);
        options.server_selection_timeout = Some(config.timeout);

        let client = Client::with_options(options)
            .map_err(|e| PortError::Configuration(format!("invalid MONGO_URI: {}", e)))?;
        let db = client
            .default_database()
            .unwrap_or_else(|| client.database(&config.database_name));

        let store = Self {
            client,
            db,
            timeout: config.timeout,
        };
        store.ping().await?;
        store.ensure_indexes().await?;
        Ok(store)
    }

    fn books(&self) -> Collection<Book> {
        self.db.collection(BOOKS)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn profiles(&self) -> Collection<ReadingProfile> {
        self.db.collection(READING_PROFILES)
    }

    async fn call<T, F>(&self, op: &'static str, unique: Option<&'static str>, fut: F) -> PortResult<T>
    where
        F: Future<Output = mongodb::error::Result<T>>,
    {
        bounded(op, unique, self.timeout, fut).await
    }

    /// Creates the unique and text indexes the data model relies on.
    pub async fn ensure_indexes(&self) -> PortResult<()> {
        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        self.call("create olid index", None, async {
            self.books().create_index(unique(doc! { "olid": 1 })).await
        })
        .await?;
        self.call("create email index", None, async {
            self.users().create_index(unique(doc! { "email": 1 })).await
        })
        .await?;
        self.call("create profile owner index", None, async {
            self.profiles().create_index(unique(doc! { "user": 1 })).await
        })
        .await?;

        let text_index = IndexModel::builder()
            .keys(doc! {
                "title": "text",
                "author": "text",
                "genres": "text",
                "topics": "text",
                "description": "text",
            })
            .options(
                IndexOptions::builder()
                    .name("book_text".to_string())
                    .default_language("english".to_string())
                    .build(),
            )
            .build();
        self.call("create book text index", None, async {
            self.books().create_index(text_index).await
        })
        .await?;

        info!(database = %self.db.name(), "Document store indexes are in place");
        Ok(())
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Runs a driver call under `timeout`, translating driver errors into port errors.
async fn bounded<T, F>(
    op: &'static str,
    unique: Option<&'static str>,
    timeout: Duration,
    fut: F,
) -> PortResult<T>
where
    F: Future<Output = mongodb::error::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(map_mongo_error(op, unique, e)),
        Err(_) => Err(PortError::Connection(format!(
            "{} timed out after {}s",
            op,
            timeout.as_secs()
        ))),
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn map_mongo_error(op: &str, unique: Option<&str>, err: MongoError) -> PortError {
    if let Some(field) = unique {
        if is_duplicate_key(&err) {
            return ValidationError::new(field, "value is already taken").into();
        }
    }
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => PortError::Connection(format!("{}: {}", op, err)),
        _ => PortError::Unexpected(format!("{}: {}", op, err)),
    }
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> PortError {
    PortError::NotFound(format!("{} {} not found", kind, id))
}

fn by_id(id: impl std::fmt::Display) -> Document {
    doc! { "_id": id.to_string() }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_book(&self, book: &Book) -> PortResult<()> {
        self.call("insert book", Some("olid"), async { self.books().insert_one(book).await })
            .await?;
        Ok(())
    }

    async fn replace_book(&self, book: &Book) -> PortResult<()> {
        let result = self
            .call("replace book", Some("olid"), async {
                self.books().replace_one(by_id(book.id), book).await
            })
            .await?;
        if result.matched_count == 0 {
            return Err(not_found("Book", book.id));
        }
        Ok(())
    }

    async fn get_book(&self, id: BookId) -> PortResult<Book> {
        self.call("get book", None, async { self.books().find_one(by_id(id)).await })
            .await?
            .ok_or_else(|| not_found("Book", id))
    }

    async fn find_book_by_olid(&self, olid: &str) -> PortResult<Option<Book>> {
        self.call("find book by olid", None, async {
            self.books().find_one(doc! { "olid": olid }).await
        })
        .await
    }

    async fn missing_books(&self, ids: &[BookId]) -> PortResult<Vec<BookId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let found: Vec<Document> = self
            .call("resolve book references", None, async {
                self.db
                    .collection::<Document>(BOOKS)
                    .find(doc! { "_id": { "$in": wanted.clone() } })
                    .projection(doc! { "_id": 1 })
                    .await?
                    .try_collect()
                    .await
            })
            .await?;

        let present: Vec<&str> = found.iter().filter_map(|d| d.get_str("_id").ok()).collect();
        Ok(ids
            .iter()
            .zip(&wanted)
            .filter(|(_, raw)| !present.contains(&raw.as_str()))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn list_books(&self) -> PortResult<Vec<Book>> {
        self.call("list books", None, async {
            self.books().find(doc! {}).await?.try_collect().await
        })
        .await
    }

    async fn is_book_referenced(&self, id: BookId) -> PortResult<bool> {
        let id = id.to_string();
        let count = self
            .call("count book references", None, async {
                self.profiles()
                    .count_documents(doc! {
                        "$or": [
                            { "reading_history.book": id.clone() },
                            { "ai_profile.recommendations.book": id.clone() },
                        ]
                    })
                    .await
            })
            .await?;
        Ok(count > 0)
    }

    async fn delete_book(&self, id: BookId) -> PortResult<()> {
        let result = self
            .call("delete book", None, async { self.books().delete_one(by_id(id)).await })
            .await?;
        if result.deleted_count == 0 {
            return Err(not_found("Book", id));
        }
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> PortResult<()> {
        self.call("insert user", Some("email"), async { self.users().insert_one(user).await })
            .await?;
        Ok(())
    }

    async fn replace_user(&self, user: &User) -> PortResult<()> {
        let result = self
            .call("replace user", Some("email"), async {
                self.users().replace_one(by_id(user.id), user).await
            })
            .await?;
        if result.matched_count == 0 {
            return Err(not_found("User", user.id));
        }
        Ok(())
    }

    async fn link_reading_profile(
        &self,
        user: UserId,
        profile: ReadingProfileId,
        at: DateTime<Utc>,
    ) -> PortResult<User> {
        let at = mongodb::bson::to_bson(&at)
            .map_err(|e| PortError::Unexpected(format!("encode timestamp: {}", e)))?;
        let update = doc! {
            "$set": { "reading_profile": profile.to_string(), "updated_at": at }
        };
        self.call("link reading profile", None, async {
            self.users()
                .find_one_and_update(by_id(user), update)
                .return_document(ReturnDocument::After)
                .await
        })
        .await?
        .ok_or_else(|| not_found("User", user))
    }

    async fn get_user(&self, id: UserId) -> PortResult<User> {
        self.call("get user", None, async { self.users().find_one(by_id(id)).await })
            .await?
            .ok_or_else(|| not_found("User", id))
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        self.call("find user by email", None, async {
            self.users().find_one(doc! { "email": email }).await
        })
        .await
    }

    async fn delete_user(&self, id: UserId) -> PortResult<()> {
        let result = self
            .call("delete user", None, async { self.users().delete_one(by_id(id)).await })
            .await?;
        if result.deleted_count == 0 {
            return Err(not_found("User", id));
        }
        Ok(())
    }

    async fn insert_reading_profile(&self, profile: &ReadingProfile) -> PortResult<()> {
        self.call("insert reading profile", Some("user"), async {
            self.profiles().insert_one(profile).await
        })
        .await?;
        debug!(profile_id = %profile.id, "Inserted reading profile");
        Ok(())
    }

    async fn replace_reading_profile(&self, profile: &ReadingProfile) -> PortResult<()> {
        let result = self
            .call("replace reading profile", Some("user"), async {
                self.profiles().replace_one(by_id(profile.id), profile).await
            })
            .await?;
        if result.matched_count == 0 {
            return Err(not_found("ReadingProfile", profile.id));
        }
        Ok(())
    }

    async fn get_reading_profile(&self, id: ReadingProfileId) -> PortResult<ReadingProfile> {
        self.call("get reading profile", None, async {
            self.profiles().find_one(by_id(id)).await
        })
        .await?
        .ok_or_else(|| not_found("ReadingProfile", id))
    }

    async fn find_reading_profile_by_user(&self, user: UserId) -> PortResult<Option<ReadingProfile>> {
        self.call("find reading profile by user", None, async {
            self.profiles().find_one(doc! { "user": user.to_string() }).await
        })
        .await
    }

    async fn list_reading_profiles(&self) -> PortResult<Vec<ReadingProfile>> {
        self.call("list reading profiles", None, async {
            self.profiles().find(doc! {}).await?.try_collect().await
        })
        .await
    }

    async fn delete_reading_profile(&self, id: ReadingProfileId) -> PortResult<()> {
        let result = self
            .call("delete reading profile", None, async {
                self.profiles().delete_one(by_id(id)).await
            })
            .await?;
        if result.deleted_count == 0 {
            return Err(not_found("ReadingProfile", id));
        }
        Ok(())
    }

    async fn ping(&self) -> PortResult<()> {
        self.call("ping", None, async {
            self.client.database("admin").run_command(doc! { "ping": 1 }).await
        })
        .await?;
        Ok(())
    }

    async fn shutdown(&self) -> PortResult<()> {
        let client = self.client.clone();
        tokio::time::timeout(self.timeout, async move { client.shutdown().await })
            .await
            .map_err(|_| {
                PortError::Connection(format!(
                    "shutdown timed out after {}s",
                    self.timeout.as_secs()
                ))
            })
    }
}

//=========================================================================================
// Connector
//=========================================================================================

/// Opens `MongoStore` connections for the `ConnectionManager`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    async fn open(&self, config: &StoreConfig) -> PortResult<Arc<dyn DocumentStore>> {
        let store = MongoStore::connect(config).await?;
        Ok(Arc::new(store))
    }
}
