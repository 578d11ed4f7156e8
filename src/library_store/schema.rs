//! Database schema for the library store.
//!
//! - authors / author_aliases: known authors plus preferred-name mapping
//! - books: one row per work, ebook and audiobook state side by side
//! - languages: ISBN-prefix language cache
//! - scan_stats: single-row snapshot of the last full scan

/// SQL schema for the library database.
pub const LIBRARY_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS authors (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL COLLATE NOCASE,
    status TEXT NOT NULL DEFAULT 'Active',
    have_books INTEGER NOT NULL DEFAULT 0,
    have_audio INTEGER NOT NULL DEFAULT 0
);

-- raw-name -> preferred-author mapping, e.g. pen names merged by hand
CREATE TABLE IF NOT EXISTS author_aliases (
    alias TEXT PRIMARY KEY COLLATE NOCASE,
    author_id TEXT NOT NULL,
    FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS books (
    id TEXT PRIMARY KEY,
    author_id TEXT NOT NULL,
    title TEXT NOT NULL COLLATE NOCASE,
    isbn TEXT,
    language TEXT NOT NULL DEFAULT 'Unknown',

    -- ebook and audiobook tracked independently
    status TEXT NOT NULL DEFAULT 'Skipped',
    audio_status TEXT NOT NULL DEFAULT 'Skipped',
    book_file TEXT,
    audio_file TEXT,
    book_library INTEGER,
    audio_library INTEGER,

    FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE CASCADE
);

-- ISBN-prefix -> language, first writer wins
CREATE TABLE IF NOT EXISTS languages (
    isbn_prefix TEXT PRIMARY KEY,
    language TEXT NOT NULL
);

-- snapshot of the statistics from the most recent full scan (JSON)
CREATE TABLE IF NOT EXISTS scan_stats (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    snapshot TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_authors_name ON authors(name);
CREATE INDEX IF NOT EXISTS idx_books_author ON books(author_id);
CREATE INDEX IF NOT EXISTS idx_books_isbn ON books(isbn);
"#;
