//! LibraryStore trait definition.
//!
//! Abstracts the catalog so the scanner can run against the SQLite store or
//! a test double without caring which.

use super::models::{
    Author, AuthorStatus, Book, BookStatus, CanonicalAuthor, MediaKind, RecordedPath,
};
use crate::matching::{BookCandidate, CatalogIndex};
use anyhow::Result;

/// Catalog storage operations the scan pipeline needs.
pub trait LibraryStore: Send + Sync {
    // =========================================================================
    // Books
    // =========================================================================

    /// Get a book by id.
    fn get_book(&self, id: &str) -> Result<Option<Book>>;

    /// Insert a book (used when materializing a provider result).
    fn insert_book(&self, book: &Book) -> Result<()>;

    /// Case-insensitive equality lookup on author name and title.
    fn find_book_exact(&self, author: &str, title: &str) -> Result<Option<String>>;

    /// All books recorded under an author name, case-insensitive.
    fn books_by_author_name(&self, author: &str) -> Result<Vec<BookCandidate>>;

    /// Lookup by ISBN.
    fn find_book_by_isbn(&self, isbn: &str) -> Result<Option<String>>;

    /// Overwrite a book's language.
    fn set_book_language(&self, id: &str, language: &str) -> Result<()>;

    /// Set the status for one modality.
    fn update_modality_status(&self, id: &str, kind: MediaKind, status: BookStatus) -> Result<()>;

    /// Set the library-membership timestamp for one modality.
    fn set_membership_timestamp(&self, id: &str, kind: MediaKind, timestamp: i64) -> Result<()>;

    /// Set or clear the recorded file path for one modality.
    fn set_file_path(&self, id: &str, kind: MediaKind, path: Option<&str>) -> Result<()>;

    /// Books that are library members with a recorded path, for removal
    /// detection.
    fn books_with_recorded_paths(&self, kind: MediaKind) -> Result<Vec<RecordedPath>>;

    /// Mark a book's modality as not found: set the given status, clear the
    /// path and the membership timestamp.
    fn mark_not_found(&self, id: &str, kind: MediaKind, status: BookStatus) -> Result<()>;

    /// Number of Open ebooks whose language is still Unknown.
    fn count_open_unknown_language(&self) -> Result<i64>;

    // =========================================================================
    // Authors
    // =========================================================================

    /// Get an author by id.
    fn get_author(&self, id: &str) -> Result<Option<Author>>;

    /// Resolve a raw author name to the preferred catalog author, following
    /// the alias table. Creates the author when unknown and `add_if_missing`
    /// is set; returns `None` when unknown and creation is disabled.
    fn canonical_author(&self, raw: &str, add_if_missing: bool)
        -> Result<Option<CanonicalAuthor>>;

    /// Set an author's lifecycle status.
    fn set_author_status(&self, id: &str, status: AuthorStatus) -> Result<()>;

    /// Collapse runs of whitespace in stored author names, merging authors
    /// that collide after cleanup. Returns how many rows were touched.
    fn cleanup_author_whitespace(&self) -> Result<usize>;

    /// Recompute per-author Open-book totals, for one author or for all.
    fn refresh_author_totals(&self, author_id: Option<&str>) -> Result<()>;

    // =========================================================================
    // Language cache
    // =========================================================================

    /// Look up a cached language for an ISBN prefix.
    fn cached_language(&self, prefix: &str) -> Result<Option<String>>;

    /// Insert a (prefix, language) pair. First writer wins: returns true if
    /// the entry was newly written, false if the prefix was already cached.
    fn cache_language(&self, prefix: &str, language: &str) -> Result<bool>;

    /// Number of cached prefixes.
    fn language_cache_size(&self) -> Result<i64>;

    // =========================================================================
    // Scan statistics snapshot
    // =========================================================================

    /// Drop the previous full-scan snapshot.
    fn clear_stats_snapshot(&self) -> Result<()>;

    /// Persist the end-of-run statistics snapshot (JSON).
    fn save_stats_snapshot(&self, snapshot: &str) -> Result<()>;
}

// Every LibraryStore is a CatalogIndex for the fuzzy matcher.
impl<S: LibraryStore + ?Sized> CatalogIndex for S {
    fn exact_match(&self, author: &str, title: &str) -> Result<Option<String>> {
        self.find_book_exact(author, title)
    }

    fn candidates_by_author(&self, author: &str) -> Result<Vec<BookCandidate>> {
        self.books_by_author_name(author)
    }
}
