//! Catalog models for the SQLite-backed library store.

use serde::{Deserialize, Serialize};

// =============================================================================
// Enumerations
// =============================================================================

/// Status of a book in one modality (ebook or audiobook).
///
/// `Open` means a verified file is currently attached for that modality.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BookStatus {
    Open,
    Have,
    Wanted,
    Skipped,
    Ignored,
}

impl BookStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Open" => Some(BookStatus::Open),
            "Have" => Some(BookStatus::Have),
            "Wanted" => Some(BookStatus::Wanted),
            "Skipped" => Some(BookStatus::Skipped),
            "Ignored" => Some(BookStatus::Ignored),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Open => "Open",
            BookStatus::Have => "Have",
            BookStatus::Wanted => "Wanted",
            BookStatus::Skipped => "Skipped",
            BookStatus::Ignored => "Ignored",
        }
    }
}

/// Author lifecycle status. `Loading` marks an author whose import scan is
/// in flight; it must never survive a finished (or crashed) run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthorStatus {
    Active,
    Loading,
}

impl AuthorStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(AuthorStatus::Active),
            "Loading" => Some(AuthorStatus::Loading),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorStatus::Active => "Active",
            AuthorStatus::Loading => "Loading",
        }
    }
}

/// Which library modality a scan or a bookkeeping update refers to.
/// Ebook and audiobook state are tracked independently per book.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaKind {
    EBook,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::EBook => "eBook",
            MediaKind::Audio => "Audio",
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A known work in the catalog.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub isbn: Option<String>,
    pub language: String,
    pub status: BookStatus,
    pub audio_status: BookStatus,
    pub book_file: Option<String>,
    pub audio_file: Option<String>,
    /// Unix millis of first library membership, per modality.
    pub book_library: Option<i64>,
    pub audio_library: Option<i64>,
}

impl Book {
    pub fn status_for(&self, kind: MediaKind) -> BookStatus {
        match kind {
            MediaKind::EBook => self.status,
            MediaKind::Audio => self.audio_status,
        }
    }

    pub fn file_for(&self, kind: MediaKind) -> Option<&str> {
        match kind {
            MediaKind::EBook => self.book_file.as_deref(),
            MediaKind::Audio => self.audio_file.as_deref(),
        }
    }

    pub fn library_for(&self, kind: MediaKind) -> Option<i64> {
        match kind {
            MediaKind::EBook => self.book_library,
            MediaKind::Audio => self.audio_library,
        }
    }
}

/// A known author.
#[derive(Debug, Clone)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub status: AuthorStatus,
    pub have_books: i64,
    pub have_audio: i64,
}

/// Result of resolving a raw author name through the alias table.
#[derive(Debug, Clone)]
pub struct CanonicalAuthor {
    pub id: String,
    /// The preferred name, which may differ from the raw input.
    pub name: String,
    pub is_new: bool,
}

/// A recorded on-disk location, used by the removal-detection pass.
#[derive(Debug, Clone)]
pub struct RecordedPath {
    pub book_id: String,
    pub author_name: String,
    pub title: String,
    pub path: String,
}
