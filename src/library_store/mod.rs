//! Library catalog persistence.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{
    Author, AuthorStatus, Book, BookStatus, CanonicalAuthor, MediaKind, RecordedPath,
};
pub use schema::LIBRARY_SCHEMA_SQL;
pub use store::SqliteLibraryStore;
pub use trait_def::LibraryStore;
