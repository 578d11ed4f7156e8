//! SQLite-backed implementation of the library store.

use super::models::{
    Author, AuthorStatus, Book, BookStatus, CanonicalAuthor, MediaKind, RecordedPath,
};
use super::schema::LIBRARY_SCHEMA_SQL;
use super::trait_def::LibraryStore;
use crate::matching::BookCandidate;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite implementation of [`LibraryStore`].
#[derive(Clone)]
pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    /// Open or create a library database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open library database: {:?}", path))?;
        Self::init(conn)
    }

    /// Create an in-memory database, used by tests and tooling.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute_batch(LIBRARY_SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn file_column(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::EBook => "book_file",
            MediaKind::Audio => "audio_file",
        }
    }

    fn status_column(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::EBook => "status",
            MediaKind::Audio => "audio_status",
        }
    }

    fn library_column(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::EBook => "book_library",
            MediaKind::Audio => "audio_library",
        }
    }

    fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get("id")?,
            author_id: row.get("author_id")?,
            title: row.get("title")?,
            isbn: row.get("isbn")?,
            language: row.get("language")?,
            status: BookStatus::parse(&row.get::<_, String>("status")?)
                .unwrap_or(BookStatus::Skipped),
            audio_status: BookStatus::parse(&row.get::<_, String>("audio_status")?)
                .unwrap_or(BookStatus::Skipped),
            book_file: row.get("book_file")?,
            audio_file: row.get("audio_file")?,
            book_library: row.get("book_library")?,
            audio_library: row.get("audio_library")?,
        })
    }

    fn row_to_author(row: &rusqlite::Row) -> rusqlite::Result<Author> {
        Ok(Author {
            id: row.get("id")?,
            name: row.get("name")?,
            status: AuthorStatus::parse(&row.get::<_, String>("status")?)
                .unwrap_or(AuthorStatus::Active),
            have_books: row.get("have_books")?,
            have_audio: row.get("have_audio")?,
        })
    }
}

impl LibraryStore for SqliteLibraryStore {
    // =========================================================================
    // Books
    // =========================================================================

    fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock().unwrap();
        let book = conn
            .query_row("SELECT * FROM books WHERE id = ?1", params![id], |row| {
                Self::row_to_book(row)
            })
            .optional()?;
        Ok(book)
    }

    fn insert_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO books (
                id, author_id, title, isbn, language,
                status, audio_status, book_file, audio_file, book_library, audio_library
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                book.id,
                book.author_id,
                book.title,
                book.isbn,
                book.language,
                book.status.as_str(),
                book.audio_status.as_str(),
                book.book_file,
                book.audio_file,
                book.book_library,
                book.audio_library,
            ],
        )
        .with_context(|| format!("Failed to insert book {}", book.id))?;
        Ok(())
    }

    fn find_book_exact(&self, author: &str, title: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                r#"
                SELECT books.id FROM books, authors
                WHERE books.author_id = authors.id
                  AND authors.name = ?1 COLLATE NOCASE
                  AND books.title = ?2 COLLATE NOCASE
                "#,
                params![author, title],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn books_by_author_name(&self, author: &str) -> Result<Vec<BookCandidate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT books.id, books.title, books.isbn FROM books, authors
            WHERE books.author_id = authors.id
              AND authors.name = ?1 COLLATE NOCASE
            ORDER BY books.rowid
            "#,
        )?;
        let candidates = stmt
            .query_map(params![author], |row| {
                Ok(BookCandidate {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    isbn: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }

    fn find_book_by_isbn(&self, isbn: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                "SELECT id FROM books WHERE isbn = ?1",
                params![isbn],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn set_book_language(&self, id: &str, language: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE books SET language = ?1 WHERE id = ?2",
            params![language, id],
        )?;
        Ok(())
    }

    fn update_modality_status(&self, id: &str, kind: MediaKind, status: BookStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE books SET {} = ?1 WHERE id = ?2",
            Self::status_column(kind)
        );
        conn.execute(&sql, params![status.as_str(), id])?;
        Ok(())
    }

    fn set_membership_timestamp(&self, id: &str, kind: MediaKind, timestamp: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE books SET {} = ?1 WHERE id = ?2",
            Self::library_column(kind)
        );
        conn.execute(&sql, params![timestamp, id])?;
        Ok(())
    }

    fn set_file_path(&self, id: &str, kind: MediaKind, path: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE books SET {} = ?1 WHERE id = ?2",
            Self::file_column(kind)
        );
        conn.execute(&sql, params![path, id])?;
        Ok(())
    }

    fn books_with_recorded_paths(&self, kind: MediaKind) -> Result<Vec<RecordedPath>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            r#"
            SELECT books.id, authors.name, books.title, books.{file} FROM books, authors
            WHERE books.author_id = authors.id
              AND books.{library} IS NOT NULL
              AND books.{file} IS NOT NULL AND books.{file} != ''
            "#,
            file = Self::file_column(kind),
            library = Self::library_column(kind),
        );
        let mut stmt = conn.prepare(&sql)?;
        let paths = stmt
            .query_map([], |row| {
                Ok(RecordedPath {
                    book_id: row.get(0)?,
                    author_name: row.get(1)?,
                    title: row.get(2)?,
                    path: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    fn mark_not_found(&self, id: &str, kind: MediaKind, status: BookStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE books SET {} = ?1, {} = NULL, {} = NULL WHERE id = ?2",
            Self::status_column(kind),
            Self::file_column(kind),
            Self::library_column(kind),
        );
        conn.execute(&sql, params![status.as_str(), id])?;
        Ok(())
    }

    fn count_open_unknown_language(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM books WHERE status = 'Open' AND language = 'Unknown'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Authors
    // =========================================================================

    fn get_author(&self, id: &str) -> Result<Option<Author>> {
        let conn = self.conn.lock().unwrap();
        let author = conn
            .query_row("SELECT * FROM authors WHERE id = ?1", params![id], |row| {
                Self::row_to_author(row)
            })
            .optional()?;
        Ok(author)
    }

    fn canonical_author(
        &self,
        raw: &str,
        add_if_missing: bool,
    ) -> Result<Option<CanonicalAuthor>> {
        let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return Ok(None);
        }

        let conn = self.conn.lock().unwrap();

        // an alias redirects to the preferred author record
        let aliased: Option<(String, String)> = conn
            .query_row(
                r#"
                SELECT authors.id, authors.name FROM author_aliases, authors
                WHERE author_aliases.author_id = authors.id
                  AND author_aliases.alias = ?1
                "#,
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((id, preferred)) = aliased {
            return Ok(Some(CanonicalAuthor {
                id,
                name: preferred,
                is_new: false,
            }));
        }

        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT id, name FROM authors WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((id, stored)) = existing {
            return Ok(Some(CanonicalAuthor {
                id,
                name: stored,
                is_new: false,
            }));
        }

        if !add_if_missing {
            return Ok(None);
        }

        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO authors (id, name, status) VALUES (?1, ?2, 'Active')",
            params![id, name],
        )?;
        Ok(Some(CanonicalAuthor {
            id,
            name,
            is_new: true,
        }))
    }

    fn set_author_status(&self, id: &str, status: AuthorStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE authors SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    fn cleanup_author_whitespace(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let sloppy: Vec<(String, String)> = conn
            .prepare("SELECT id, name FROM authors WHERE name LIKE '%  %'")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut touched = 0;
        for (id, name) in sloppy {
            let cleaned = name.split_whitespace().collect::<Vec<_>>().join(" ");
            // the cleaned name may collide with an existing author: merge
            let duplicate: Option<String> = conn
                .query_row(
                    "SELECT id FROM authors WHERE name = ?1 AND id != ?2",
                    params![cleaned, id],
                    |row| row.get(0),
                )
                .optional()?;
            match duplicate {
                Some(keep_id) => {
                    conn.execute(
                        "UPDATE books SET author_id = ?1 WHERE author_id = ?2",
                        params![keep_id, id],
                    )?;
                    conn.execute(
                        "UPDATE author_aliases SET author_id = ?1 WHERE author_id = ?2",
                        params![keep_id, id],
                    )?;
                    conn.execute("DELETE FROM authors WHERE id = ?1", params![id])?;
                }
                None => {
                    conn.execute(
                        "UPDATE authors SET name = ?1 WHERE id = ?2",
                        params![cleaned, id],
                    )?;
                }
            }
            touched += 1;
        }
        Ok(touched)
    }

    fn refresh_author_totals(&self, author_id: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let update = r#"
            UPDATE authors SET
                have_books = (SELECT COUNT(*) FROM books
                              WHERE books.author_id = authors.id AND books.status = 'Open'),
                have_audio = (SELECT COUNT(*) FROM books
                              WHERE books.author_id = authors.id AND books.audio_status = 'Open')
        "#;
        match author_id {
            Some(id) => {
                conn.execute(&format!("{} WHERE authors.id = ?1", update), params![id])?;
            }
            None => {
                conn.execute(update, [])?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Language cache
    // =========================================================================

    fn cached_language(&self, prefix: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let language = conn
            .query_row(
                "SELECT language FROM languages WHERE isbn_prefix = ?1",
                params![prefix],
                |row| row.get(0),
            )
            .optional()?;
        Ok(language)
    }

    fn cache_language(&self, prefix: &str, language: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO languages (isbn_prefix, language) VALUES (?1, ?2)",
            params![prefix, language],
        )?;
        Ok(changed > 0)
    }

    fn language_cache_size(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM languages", [], |row| row.get(0))?;
        Ok(count)
    }

    // =========================================================================
    // Scan statistics snapshot
    // =========================================================================

    fn clear_stats_snapshot(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM scan_stats", [])?;
        Ok(())
    }

    fn save_stats_snapshot(&self, snapshot: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO scan_stats (id, snapshot, updated_at) VALUES (1, ?1, ?2)",
            params![snapshot, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteLibraryStore {
        SqliteLibraryStore::open_in_memory().unwrap()
    }

    fn add_book(store: &SqliteLibraryStore, id: &str, author: &str, title: &str) -> String {
        let canonical = store.canonical_author(author, true).unwrap().unwrap();
        store
            .insert_book(&Book {
                id: id.to_string(),
                author_id: canonical.id.clone(),
                title: title.to_string(),
                isbn: None,
                language: "Unknown".to_string(),
                status: BookStatus::Skipped,
                audio_status: BookStatus::Skipped,
                book_file: None,
                audio_file: None,
                book_library: None,
                audio_library: None,
            })
            .unwrap();
        canonical.id
    }

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let s = store();
        add_book(&s, "b1", "Jane Doe", "Foo");
        assert_eq!(
            s.find_book_exact("JANE DOE", "foo").unwrap().as_deref(),
            Some("b1")
        );
        assert_eq!(s.find_book_exact("Jane Doe", "Bar").unwrap(), None);
    }

    #[test]
    fn test_candidates_by_author() {
        let s = store();
        add_book(&s, "b1", "Jane Doe", "Foo");
        add_book(&s, "b2", "Jane Doe", "Bar");
        add_book(&s, "b3", "Someone Else", "Baz");

        let candidates = s.books_by_author_name("jane doe").unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "b1");
        assert_eq!(candidates[1].id, "b2");
    }

    #[test]
    fn test_language_cache_first_writer_wins() {
        let s = store();
        assert!(s.cache_language("978", "en").unwrap());
        // second write for the same prefix is ignored
        assert!(!s.cache_language("978", "fr").unwrap());
        assert_eq!(s.cached_language("978").unwrap().as_deref(), Some("en"));
        assert_eq!(s.language_cache_size().unwrap(), 1);
    }

    #[test]
    fn test_canonical_author_alias_redirect() {
        let s = store();
        let preferred = s.canonical_author("Iain M. Banks", true).unwrap().unwrap();
        {
            let conn = s.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO author_aliases (alias, author_id) VALUES (?1, ?2)",
                params!["Iain Banks", preferred.id],
            )
            .unwrap();
        }

        let resolved = s.canonical_author("Iain Banks", true).unwrap().unwrap();
        assert_eq!(resolved.id, preferred.id);
        assert_eq!(resolved.name, "Iain M. Banks");
        assert!(!resolved.is_new);
    }

    #[test]
    fn test_canonical_author_creation_toggle() {
        let s = store();
        assert!(s.canonical_author("New Author", false).unwrap().is_none());

        let created = s.canonical_author("New Author", true).unwrap().unwrap();
        assert!(created.is_new);

        // whitespace is collapsed before lookup
        let again = s.canonical_author("New   Author", true).unwrap().unwrap();
        assert!(!again.is_new);
        assert_eq!(again.id, created.id);
    }

    #[test]
    fn test_cleanup_author_whitespace_merges_duplicates() {
        let s = store();
        let keep = s.canonical_author("Jane Doe", true).unwrap().unwrap();
        {
            let conn = s.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO authors (id, name, status) VALUES ('dup', 'Jane  Doe', 'Active')",
                [],
            )
            .unwrap();
        }
        s.insert_book(&Book {
            id: "b1".to_string(),
            author_id: "dup".to_string(),
            title: "Foo".to_string(),
            isbn: None,
            language: "Unknown".to_string(),
            status: BookStatus::Skipped,
            audio_status: BookStatus::Skipped,
            book_file: None,
            audio_file: None,
            book_library: None,
            audio_library: None,
        })
        .unwrap();

        assert_eq!(s.cleanup_author_whitespace().unwrap(), 1);
        let book = s.get_book("b1").unwrap().unwrap();
        assert_eq!(book.author_id, keep.id);
        assert!(s.get_author("dup").unwrap().is_none());
    }

    #[test]
    fn test_mark_not_found_clears_modality() {
        let s = store();
        add_book(&s, "b1", "Jane Doe", "Foo");
        s.update_modality_status("b1", MediaKind::EBook, BookStatus::Open)
            .unwrap();
        s.set_file_path("b1", MediaKind::EBook, Some("/gone.epub"))
            .unwrap();
        s.set_membership_timestamp("b1", MediaKind::EBook, 123)
            .unwrap();

        s.mark_not_found("b1", MediaKind::EBook, BookStatus::Skipped)
            .unwrap();
        let book = s.get_book("b1").unwrap().unwrap();
        assert_eq!(book.status, BookStatus::Skipped);
        assert_eq!(book.book_file, None);
        assert_eq!(book.book_library, None);
        // the audio modality is untouched
        assert_eq!(book.audio_status, BookStatus::Skipped);
    }

    #[test]
    fn test_books_with_recorded_paths_filters_members() {
        let s = store();
        add_book(&s, "b1", "Jane Doe", "Foo");
        add_book(&s, "b2", "Jane Doe", "Bar");
        s.set_file_path("b1", MediaKind::EBook, Some("/books/foo.epub"))
            .unwrap();
        s.set_membership_timestamp("b1", MediaKind::EBook, 1).unwrap();
        // b2 has a path but no membership timestamp
        s.set_file_path("b2", MediaKind::EBook, Some("/books/bar.epub"))
            .unwrap();

        let recorded = s.books_with_recorded_paths(MediaKind::EBook).unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].book_id, "b1");
        assert_eq!(recorded[0].path, "/books/foo.epub");
    }

    #[test]
    fn test_refresh_author_totals() {
        let s = store();
        let author_id = add_book(&s, "b1", "Jane Doe", "Foo");
        add_book(&s, "b2", "Jane Doe", "Bar");
        s.update_modality_status("b1", MediaKind::EBook, BookStatus::Open)
            .unwrap();
        s.update_modality_status("b2", MediaKind::Audio, BookStatus::Open)
            .unwrap();

        s.refresh_author_totals(None).unwrap();
        let author = s.get_author(&author_id).unwrap().unwrap();
        assert_eq!(author.have_books, 1);
        assert_eq!(author.have_audio, 1);
    }
}
