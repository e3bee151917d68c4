use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SHELVES: [&str; 3] = ["To Read", "Currently Reading", "Read"];
pub const TO_READ: &str = DEFAULT_SHELVES[0];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    /// Hex digest of the lowercased email, shared with the Gravatar URL.
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
}

impl User {
    pub fn new(id: String, name: String, email: String, avatar: String) -> User {
        User {
            id,
            name,
            email,
            avatar,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Shelf {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    pub name: String,
    pub is_default: bool,
    pub created_at: DateTime,
}

impl Shelf {
    pub fn new(user_id: String, name: String, is_default: bool) -> Shelf {
        Shelf {
            id: ObjectId::new(),
            user_id,
            name,
            is_default,
            created_at: DateTime::now(),
        }
    }
}

/// A catalog volume id placed on a shelf. Only the id is stored; book data is
/// always fetched fresh.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShelfBook {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub shelf_id: ObjectId,
    pub book_id: String,
    pub added_at: DateTime,
}
