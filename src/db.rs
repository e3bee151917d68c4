use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{
    Client, Collection, Database as MongoDatabase, IndexModel,
    bson::{Bson, DateTime, Document, doc, oid::ObjectId},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::Config;
use crate::data_models::{DEFAULT_SHELVES, Shelf, ShelfBook, User};

/// Collection names as constants for consistency
pub mod collections {
    pub const USERS: &str = "users";
    pub const SHELVES: &str = "shelves";
    pub const SHELF_BOOKS: &str = "shelf_books";
}

const DUPLICATE_KEY: i32 = 11000;

/// True when a write was rejected by a unique index.
pub fn is_duplicate_key(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<mongodb::error::Error>())
        .any(|e| match e.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == DUPLICATE_KEY,
            _ => false,
        })
}

/// Main database wrapper providing connection management and collection access
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: MongoDatabase,
}

impl Database {
    /// Create a client without talking to the server. The driver connects on
    /// first use.
    pub async fn connect_lazy(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri)
            .await
            .context("Failed to parse MongoDB connection string")?;

        let client =
            Client::with_options(client_options).context("Failed to create MongoDB client")?;
        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    /// Create a new Database instance and verify the server answers.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let database = Self::connect_lazy(uri, db_name).await?;
        database.ping().await?;

        log::info!("Connected to MongoDB database: {}", db_name);
        Ok(database)
    }

    /// Create a Database instance using the process configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.mongo_uri, &config.mongo_db_name).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to connect to MongoDB")?;
        Ok(())
    }

    /// Unique indexes backing the "one shelf name per user" and "one entry
    /// per book per shelf" rules. Safe to run repeatedly.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(Some(true)).build();

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create users.email index")?;

        self.shelves()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "name": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create shelves.(user_id, name) index")?;

        self.shelf_books()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "shelf_id": 1, "book_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create shelf_books.(shelf_id, book_id) index")?;

        self.shelf_books()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "shelf_id": 1, "added_at": -1 })
                    .build(),
            )
            .await
            .context("Failed to create shelf_books.(shelf_id, added_at) index")?;

        log::info!("Indexes ensured on {}", self.db.name());
        Ok(())
    }

    /// Get a typed collection by name
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.db.collection(name)
    }

    /// Get the underlying MongoDB client (for advanced operations)
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get the underlying MongoDB database (for advanced operations)
    pub fn database(&self) -> &MongoDatabase {
        &self.db
    }

    pub fn users(&self) -> Collection<User> {
        self.collection(collections::USERS)
    }

    pub fn shelves(&self) -> Collection<Shelf> {
        self.collection(collections::SHELVES)
    }

    pub fn shelf_books(&self) -> Collection<ShelfBook> {
        self.collection(collections::SHELF_BOOKS)
    }
}

// =============================================================================
// Generic CRUD operations
// =============================================================================

pub struct Repository<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(collection: Collection<T>) -> Self {
        Self { collection }
    }

    /// Insert a single document
    pub async fn insert(&self, doc: &T) -> Result<Bson> {
        let result = self
            .collection
            .insert_one(doc)
            .await
            .context("Failed to insert document")?;
        Ok(result.inserted_id)
    }

    /// Find a document by its `_id`
    pub async fn find_by_id(&self, id: impl Into<Bson>) -> Result<Option<T>> {
        let id: Bson = id.into();
        let filter = doc! { "_id": id };
        self.collection
            .find_one(filter)
            .await
            .context("Failed to find document by id")
    }

    /// Find a single document matching a filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.collection
            .find_one(filter)
            .await
            .context("Failed to find document")
    }

    /// Find all documents matching a filter, in `sort` order
    pub async fn find_sorted(&self, filter: Document, sort: Document) -> Result<Vec<T>> {
        let cursor = self
            .collection
            .find(filter)
            .sort(sort)
            .await
            .context("Failed to execute find query")?;

        cursor
            .try_collect()
            .await
            .context("Failed to collect results")
    }

    /// `$set` fields on the first document matching a filter
    pub async fn update_one(&self, filter: Document, update: Document) -> Result<bool> {
        let result = self
            .collection
            .update_one(filter, doc! { "$set": update })
            .await
            .context("Failed to update document")?;

        Ok(result.matched_count > 0)
    }

    /// Insert `on_insert` unless a document matching `filter` already exists.
    /// Returns whether a new document was created.
    pub async fn insert_if_absent(&self, filter: Document, on_insert: Document) -> Result<bool> {
        let result = self
            .collection
            .update_one(filter, doc! { "$setOnInsert": on_insert })
            .upsert(true)
            .await;

        match result {
            Ok(result) => Ok(result.upserted_id.is_some()),
            Err(e) => {
                let e = anyhow::Error::from(e).context("Failed to upsert document");
                // two concurrent upserts: the loser hits the unique index
                if is_duplicate_key(&e) { Ok(false) } else { Err(e) }
            }
        }
    }

    /// Delete the first document matching a filter
    pub async fn delete_one(&self, filter: Document) -> Result<bool> {
        let result = self
            .collection
            .delete_one(filter)
            .await
            .context("Failed to delete document")?;

        Ok(result.deleted_count > 0)
    }

    /// Delete multiple documents matching a filter
    pub async fn delete_many(&self, filter: Document) -> Result<u64> {
        let result = self
            .collection
            .delete_many(filter)
            .await
            .context("Failed to delete documents")?;

        Ok(result.deleted_count)
    }
}

// =============================================================================
// Users
// =============================================================================

pub struct UserRepo {
    repo: Repository<User>,
    shelves: Repository<Shelf>,
    shelf_books: Repository<ShelfBook>,
}

impl UserRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.users()),
            shelves: Repository::new(db.shelves()),
            shelf_books: Repository::new(db.shelf_books()),
        }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        self.repo.find_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.repo.find_one(doc! { "email": email }).await
    }

    /// Insert a user unless one with the same id already exists.
    pub async fn insert_if_absent(&self, user: &User) -> Result<bool> {
        match self.repo.insert(user).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn update_profile(&self, id: &str, name: &str, avatar: &str) -> Result<bool> {
        self.repo
            .update_one(doc! { "_id": id }, doc! { "name": name, "avatar": avatar })
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        self.repo.find_sorted(doc! {}, doc! { "name": 1 }).await
    }

    /// Delete a user together with their shelves and shelf entries.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let shelf_ids: Vec<ObjectId> = self
            .shelves
            .find_sorted(doc! { "user_id": id }, doc! {})
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        if !shelf_ids.is_empty() {
            self.shelf_books
                .delete_many(doc! { "shelf_id": { "$in": shelf_ids } })
                .await?;
            self.shelves.delete_many(doc! { "user_id": id }).await?;
        }

        self.repo.delete_one(doc! { "_id": id }).await
    }
}

// =============================================================================
// Shelves
// =============================================================================

pub struct ShelfRepo {
    repo: Repository<Shelf>,
    books: Repository<ShelfBook>,
}

impl ShelfRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.shelves()),
            books: Repository::new(db.shelf_books()),
        }
    }

    /// Make sure the user owns the default shelves. Returns the names that
    /// had to be created.
    pub async fn ensure_defaults(&self, user_id: &str) -> Result<Vec<&'static str>> {
        let mut created = Vec::new();
        for name in DEFAULT_SHELVES {
            let inserted = self
                .repo
                .insert_if_absent(
                    doc! { "user_id": user_id, "name": name },
                    doc! { "is_default": true, "created_at": DateTime::now() },
                )
                .await?;
            if inserted {
                created.push(name);
            }
        }
        log::debug!("Default shelves ensured for {}: {:?}", user_id, created);
        Ok(created)
    }

    /// Shelves of a user, defaults first, then by name.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Shelf>> {
        self.repo
            .find_sorted(
                doc! { "user_id": user_id },
                doc! { "is_default": -1, "name": 1 },
            )
            .await
    }

    /// Create a custom shelf. `None` when the user already has one by that name.
    pub async fn create(&self, user_id: &str, name: &str) -> Result<Option<Shelf>> {
        let shelf = Shelf::new(user_id.to_string(), name.to_string(), false);
        match self.repo.insert(&shelf).await {
            Ok(_) => Ok(Some(shelf)),
            Err(e) if is_duplicate_key(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// A shelf, only if `user_id` owns it.
    pub async fn find_owned(&self, user_id: &str, shelf_id: ObjectId) -> Result<Option<Shelf>> {
        self.repo
            .find_one(doc! { "_id": shelf_id, "user_id": user_id })
            .await
    }

    pub async fn find_by_name(&self, user_id: &str, name: &str) -> Result<Option<Shelf>> {
        self.repo
            .find_one(doc! { "user_id": user_id, "name": name })
            .await
    }

    /// Rename a shelf. `false` when the new name is already taken.
    pub async fn rename(&self, shelf_id: ObjectId, name: &str) -> Result<bool> {
        match self
            .repo
            .update_one(doc! { "_id": shelf_id }, doc! { "name": name })
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, shelf_id: ObjectId) -> Result<bool> {
        self.books.delete_many(doc! { "shelf_id": shelf_id }).await?;
        self.repo.delete_one(doc! { "_id": shelf_id }).await
    }

    /// Returns whether the book was newly added.
    pub async fn add_book(&self, shelf_id: ObjectId, book_id: &str) -> Result<bool> {
        self.books
            .insert_if_absent(
                doc! { "shelf_id": shelf_id, "book_id": book_id },
                doc! { "added_at": DateTime::now() },
            )
            .await
    }

    pub async fn remove_book(&self, shelf_id: ObjectId, book_id: &str) -> Result<bool> {
        self.books
            .delete_one(doc! { "shelf_id": shelf_id, "book_id": book_id })
            .await
    }

    /// Book ids on a shelf, most recently added first. A non-positive `limit`
    /// yields nothing, the server would read it as "no limit".
    pub async fn book_ids(&self, shelf_id: ObjectId, limit: i64) -> Result<Vec<String>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let cursor = self
            .books
            .collection
            .find(doc! { "shelf_id": shelf_id })
            .sort(doc! { "added_at": -1 })
            .limit(limit)
            .await
            .context("Failed to list shelf books")?;

        let entries: Vec<ShelfBook> = cursor
            .try_collect()
            .await
            .context("Failed to collect shelf books")?;
        Ok(entries.into_iter().map(|e| e.book_id).collect())
    }
}

// =============================================================================
// Test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Create a unique test database name
    pub fn unique_test_db_name() -> String {
        let count = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        format!("bookshelf_test_{}_{}", timestamp, count)
    }

    /// Uses MONGO_URI from environment but creates a unique test database.
    pub async fn create_test_db() -> Result<(Database, String)> {
        dotenvy::dotenv().ok();
        let uri =
            std::env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name = unique_test_db_name();
        let db = Database::new(&uri, &db_name).await?;
        db.ensure_indexes().await?;
        Ok((db, db_name))
    }

    /// Clean up a test database by dropping it
    pub async fn cleanup_test_db(db: &Database, db_name: &str) -> Result<()> {
        db.client()
            .database(db_name)
            .drop()
            .await
            .context("Failed to drop test database")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::*;

    #[tokio::test]
    #[ignore = "needs a running MongoDB at MONGO_URI"]
    async fn test_default_shelves_are_idempotent() -> Result<()> {
        let (db, db_name) = create_test_db().await?;
        let repo = ShelfRepo::new(&db);

        let created = repo.ensure_defaults("u1").await?;
        assert_eq!(created, DEFAULT_SHELVES.to_vec());

        let created_again = repo.ensure_defaults("u1").await?;
        assert!(created_again.is_empty());

        let names: Vec<String> = repo.list("u1").await?.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Currently Reading", "Read", "To Read"]);

        cleanup_test_db(&db, &db_name).await?;
        Ok(())
    }

    #[tokio::test]
    #[ignore = "needs a running MongoDB at MONGO_URI"]
    async fn test_shelf_crud() -> Result<()> {
        let (db, db_name) = create_test_db().await?;
        let repo = ShelfRepo::new(&db);
        repo.ensure_defaults("u1").await?;

        // Create
        let shelf = repo.create("u1", "Holiday").await?.expect("new shelf");
        assert!(!shelf.is_default);
        assert!(repo.create("u1", "Holiday").await?.is_none());

        // Custom shelves sort after the defaults
        let names: Vec<String> = repo.list("u1").await?.into_iter().map(|s| s.name).collect();
        assert_eq!(names.last().map(String::as_str), Some("Holiday"));

        // Ownership
        assert!(repo.find_owned("u1", shelf.id).await?.is_some());
        assert!(repo.find_owned("u2", shelf.id).await?.is_none());

        // Rename
        assert!(repo.rename(shelf.id, "Beach").await?);
        assert!(!repo.rename(shelf.id, "Read").await?);
        assert!(repo.find_by_name("u1", "Beach").await?.is_some());

        // Books
        assert!(repo.add_book(shelf.id, "vol-1").await?);
        assert!(!repo.add_book(shelf.id, "vol-1").await?);
        assert!(repo.add_book(shelf.id, "vol-2").await?);
        assert_eq!(repo.book_ids(shelf.id, 40).await?, vec!["vol-2", "vol-1"]);
        assert_eq!(repo.book_ids(shelf.id, 1).await?, vec!["vol-2"]);
        assert!(repo.book_ids(shelf.id, 0).await?.is_empty());
        assert!(repo.book_ids(shelf.id, -1).await?.is_empty());

        assert!(repo.remove_book(shelf.id, "vol-2").await?);
        assert_eq!(repo.book_ids(shelf.id, 40).await?, vec!["vol-1"]);

        // Delete
        assert!(repo.delete(shelf.id).await?);
        assert!(repo.find_owned("u1", shelf.id).await?.is_none());
        assert!(repo.book_ids(shelf.id, 40).await?.is_empty());

        cleanup_test_db(&db, &db_name).await?;
        Ok(())
    }

    #[tokio::test]
    #[ignore = "needs a running MongoDB at MONGO_URI"]
    async fn test_user_delete_cascades() -> Result<()> {
        let (db, db_name) = create_test_db().await?;
        let users = UserRepo::new(&db);
        let shelves = ShelfRepo::new(&db);

        let user = User::new(
            "abc".to_string(),
            "reader".to_string(),
            "reader@example.com".to_string(),
            "https://www.gravatar.com/avatar/abc".to_string(),
        );
        assert!(users.insert_if_absent(&user).await?);
        assert!(!users.insert_if_absent(&user).await?);
        assert_eq!(users.find_by_email("reader@example.com").await?, Some(user.clone()));

        shelves.ensure_defaults("abc").await?;
        let to_read = shelves.find_by_name("abc", "To Read").await?.expect("default shelf");
        shelves.add_book(to_read.id, "vol-1").await?;

        assert!(users.delete("abc").await?);
        assert!(users.find_by_id("abc").await?.is_none());
        assert!(shelves.list("abc").await?.is_empty());
        assert!(shelves.book_ids(to_read.id, 40).await?.is_empty());

        cleanup_test_db(&db, &db_name).await?;
        Ok(())
    }
}
