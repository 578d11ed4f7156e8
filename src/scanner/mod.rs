//! Directory-walk orchestrator.
//!
//! Walks a library tree, extracts metadata per file, reconciles each file
//! against the catalog (falling back to the provider when the catalog has no
//! match) and keeps on-disk locations current. All failures are file-scoped:
//! nothing here aborts a walk.

mod stats;

pub use stats::{ScanReport, ScanStatistics};

use crate::library_store::{
    AuthorStatus, Book, BookStatus, LibraryStore, MediaKind,
};
use crate::matching::{find_book, fuzz, strip_quotes, unaccented};
use crate::metadata::{
    has_extension, isbn_language_prefix, MetadataResolver, ResolvedMetadata, UNKNOWN_LANGUAGE,
};
use crate::provider::BookProvider;
use anyhow::{bail, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Directories containing this marker file are pruned from the walk.
const IGNORE_MARKER: &str = ".ll_ignore";

/// Minimum token-set score for accepting a provider search result.
const SEARCH_ACCEPT_SCORE: f64 = 98.0;

/// Configuration for the scanner.
#[derive(Clone)]
pub struct ScannerConfig {
    /// Root of the ebook library.
    pub ebook_dir: PathBuf,
    /// Root of the audiobook library.
    pub audio_dir: PathBuf,
    /// Cover images are copied under `<cache_dir>/book/` when set.
    pub cache_dir: Option<PathBuf>,
    pub ebook_types: Vec<String>,
    pub audio_types: Vec<String>,
    /// Destination-file naming template, e.g. `$Author - $Title`.
    pub dest_file_template: String,
    /// Skip remaining ebook files in a directory once one is attributed.
    pub single_book_per_dir: bool,
    /// Status given to books whose recorded file has disappeared.
    pub notfound_status: BookStatus,
    /// Whether unknown authors may be added to the catalog.
    pub add_authors: bool,
}

impl ScannerConfig {
    fn root_for(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::EBook => &self.ebook_dir,
            MediaKind::Audio => &self.audio_dir,
        }
    }

    fn types_for(&self, kind: MediaKind) -> &[String] {
        match kind {
            MediaKind::EBook => &self.ebook_types,
            MediaKind::Audio => &self.audio_types,
        }
    }
}

/// Walks library directories and reconciles files against the catalog.
pub struct LibraryScanner {
    store: Arc<dyn LibraryStore>,
    provider: Option<Arc<dyn BookProvider>>,
    config: ScannerConfig,
    full_scan_in_progress: AtomicBool,
}

impl LibraryScanner {
    pub fn new(
        store: Arc<dyn LibraryStore>,
        provider: Option<Arc<dyn BookProvider>>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            full_scan_in_progress: AtomicBool::new(false),
        }
    }

    /// Scan a directory tree, adding new books to the catalog.
    ///
    /// `start_dir` defaults to the configured library root; a scan rooted
    /// there is a *full* scan, which additionally runs removal detection and
    /// persists end-of-run statistics. `author_id` attributes a partial scan
    /// to one author, whose status is `Loading` for the duration of the run
    /// and guaranteed to be reset on every exit path.
    pub fn scan(
        &self,
        start_dir: Option<&Path>,
        kind: MediaKind,
        author_id: Option<&str>,
    ) -> Result<ScanReport> {
        let root = self.config.root_for(kind).to_path_buf();
        let start = start_dir.unwrap_or(&root).to_path_buf();
        let is_full = canonical(&start) == canonical(&root);

        let _update_flag = if is_full {
            if self.full_scan_in_progress.swap(true, Ordering::SeqCst) {
                bail!("A full {} scan is already in progress", kind.as_str());
            }
            Some(ScanFlagGuard {
                flag: &self.full_scan_in_progress,
            })
        } else {
            None
        };

        let _author_run = match author_id {
            Some(id) if !is_full => AuthorRunGuard::begin(self.store.clone(), id)?,
            _ => None,
        };

        if !start.is_dir() {
            bail!("Cannot find directory: {}. Not scanning", start.display());
        }

        if is_full {
            self.store.clear_stats_snapshot()?;
            let cleaned = self.store.cleanup_author_whitespace()?;
            if cleaned > 0 {
                info!("Removed extra spaces from {} author name(s)", cleaned);
            }
            self.remove_missing(kind)?;
        }

        info!("Scanning {} directory: {}", kind.as_str(), start.display());
        let report = self.walk(&start, kind)?;

        info!(
            "{}/{} new/modified {}(s) found and added to the database",
            report.new_books,
            report.modified_books,
            kind.as_str()
        );
        info!("{} file(s) processed", report.files_processed);

        if is_full {
            self.store
                .save_stats_snapshot(&serde_json::to_string(&report.stats)?)?;

            let unknown = self.store.count_open_unknown_language()?;
            if unknown > 0 {
                warn!(
                    "Found {} book(s) in your library with unknown language",
                    unknown
                );
            }
            debug!(
                "Provider was hit {} time(s) for books",
                report.stats.provider_book_hits
            );
            debug!(
                "Language cache {} hit(s), {} miss(es)",
                report.stats.cache_hits, report.stats.cache_misses
            );
            debug!(
                "Unwanted characters removed from {} title(s)",
                report.stats.rejected_characters
            );
            debug!(
                "Unable to cache language for {} book(s) with missing ISBN",
                report.stats.uncacheable
            );
            debug!("Found {} duplicate file(s)", report.stats.duplicates);
            debug!(
                "Rescan {} hit(s), {} miss(es)",
                report.rescan_hits,
                report.rescan_attempts - report.rescan_hits
            );
            debug!(
                "ISBN language cache holds {} entries",
                self.store.language_cache_size()?
            );

            self.store.refresh_author_totals(None)?;
        } else if let Some(id) = author_id {
            self.store.refresh_author_totals(Some(id))?;
        }

        info!("Library scan complete");
        Ok(report)
    }

    // =========================================================================
    // Removal detection
    // =========================================================================

    /// Mark catalog entries whose recorded file no longer exists on disk.
    ///
    /// Runs before the walk on full scans only; it is driven by catalog
    /// state, not by the files found while walking.
    fn remove_missing(&self, kind: MediaKind) -> Result<()> {
        let status = self.config.notfound_status;
        info!(
            "Missing {}s will be marked as {}",
            kind.as_str(),
            status.as_str()
        );
        for recorded in self.store.books_with_recorded_paths(kind)? {
            if !Path::new(&recorded.path).is_file() {
                self.store.mark_not_found(&recorded.book_id, kind, status)?;
                warn!(
                    "{} {} - {} updated as not found on disk",
                    kind.as_str(),
                    recorded.author_name,
                    recorded.title
                );
            }
        }
        Ok(())
    }

    // =========================================================================
    // Directory walk
    // =========================================================================

    fn walk(&self, start: &Path, kind: MediaKind) -> Result<ScanReport> {
        let resolver = MetadataResolver::new(
            &self.config.dest_file_template,
            self.config.types_for(kind),
            &self.config.audio_types,
        )?;

        let mut report = ScanReport::default();
        let mut processed: HashSet<PathBuf> = HashSet::new();
        let mut warned_no_new_authors = false;

        let walker = WalkDir::new(start)
            .into_iter()
            .filter_entry(|entry| !should_prune(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Walk error: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            report.files_processed += 1;

            if !has_extension(path, self.config.types_for(kind)) {
                continue;
            }

            let subdirectory = path.parent().unwrap_or(start).to_path_buf();
            let dedup = match kind {
                MediaKind::EBook => self.config.single_book_per_dir,
                MediaKind::Audio => true,
            };
            if dedup && processed.contains(&subdirectory) {
                debug!("[{}] already scanned", subdirectory.display());
                report.stats.duplicates += 1;
                continue;
            }

            match self.process_file(
                path,
                &subdirectory,
                kind,
                &resolver,
                &mut report,
                &mut warned_no_new_authors,
            ) {
                Ok(true) => {
                    processed.insert(subdirectory);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to process {}: {}", path.display(), e);
                }
            }
        }

        Ok(report)
    }

    /// Extract, reconcile and record one file. Returns true when the file
    /// was attributed to a catalog entry.
    fn process_file(
        &self,
        path: &Path,
        subdirectory: &Path,
        kind: MediaKind,
        resolver: &MetadataResolver,
        report: &mut ScanReport,
        warned_no_new_authors: &mut bool,
    ) -> Result<bool> {
        debug!("Now scanning {}", path.display());

        let resolved = resolver.resolve(path);
        if !resolved.usable {
            debug!("Metadata incomplete in {}", path.display());
            return Ok(false);
        }

        self.cache_language_opportunistically(&resolved, report)?;

        let canonical = match self
            .store
            .canonical_author(&resolved.author, self.config.add_authors)?
        {
            Some(canonical) => canonical,
            None => {
                if !*warned_no_new_authors {
                    warn!("Add authors to database is disabled");
                    *warned_no_new_authors = true;
                }
                return Ok(false);
            }
        };
        if canonical.name != resolved.author {
            debug!(
                "Preferred author name changed from [{}] to [{}]",
                resolved.author, canonical.name
            );
        }
        let author = canonical.name;

        // metadata providers are inconsistent about punctuation
        let title = strip_quotes(&resolved.title);
        if title != resolved.title {
            report.stats.rejected_characters += 1;
        }

        let book_id = self.resolve_book_id(&author, &title, &resolved, path, report)?;
        let Some(book_id) = book_id else {
            warn!(
                "Failed to match {} [{}] by [{}] in database",
                kind.as_str(),
                title,
                author
            );
            return Ok(false);
        };

        self.attach_file(&book_id, path, subdirectory, kind, report)?;
        Ok(true)
    }

    fn cache_language_opportunistically(
        &self,
        resolved: &ResolvedMetadata,
        report: &mut ScanReport,
    ) -> Result<()> {
        if resolved.language == UNKNOWN_LANGUAGE {
            return Ok(());
        }
        match isbn_language_prefix(&resolved.isbn) {
            Some(prefix) => {
                debug!(
                    "Found Language [{}] ISBN [{}]",
                    resolved.language, resolved.isbn
                );
                if self.store.cache_language(&prefix, &resolved.language)? {
                    report.stats.cache_misses += 1;
                    debug!("Cached Lang [{}] ISBN [{}]", resolved.language, prefix);
                } else {
                    report.stats.cache_hits += 1;
                    debug!(
                        "Already cached Lang [{}] ISBN [{}]",
                        resolved.language, prefix
                    );
                }
            }
            None => {
                report.stats.uncacheable += 1;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Catalog id resolution cascade
    // =========================================================================

    fn resolve_book_id(
        &self,
        author: &str,
        title: &str,
        resolved: &ResolvedMetadata,
        path: &Path,
        report: &mut ScanReport,
    ) -> Result<Option<String>> {
        // (a) fuzzy catalog match on (author, title)
        if let Some(id) = find_book(self.store.as_ref(), author, title)? {
            return Ok(Some(id));
        }

        // (b) the container may carry a provider id we already know, or can
        // fetch directly
        if let Some(external_id) = &resolved.external_id {
            if self.store.get_book(external_id)?.is_some() {
                return Ok(Some(external_id.clone()));
            }
            debug!(
                "Unable to find book {} by {} in database, trying provider id {}",
                title, author, external_id
            );
            if let Some(id) = self.materialize_from_provider(external_id, report)? {
                return Ok(Some(id));
            }
        }

        // (c) direct ISBN lookup
        if !resolved.isbn.is_empty() {
            if let Some(id) = self.store.find_book_by_isbn(&resolved.isbn)? {
                return Ok(Some(id));
            }
        }

        // (d) some libraries are laid out per-author: retry with the parent
        // directory name
        if let Some(dir_author) = parent_directory_author(path) {
            if !dir_author.eq_ignore_ascii_case(author) {
                debug!("Trying author name [{}]", dir_author);
                if let Some(id) = find_book(self.store.as_ref(), &dir_author, title)? {
                    warn!(
                        "{} not found under [{}], found under [{}]",
                        title, author, dir_author
                    );
                    return Ok(Some(id));
                }
            }
        }

        // (e) provider free-text search, where supported
        self.search_provider(author, title, resolved, report)
    }

    /// Fetch a record by provider id and insert it into the catalog.
    /// Provider failures degrade to "not found"; the scan continues.
    fn materialize_from_provider(
        &self,
        provider_id: &str,
        report: &mut ScanReport,
    ) -> Result<Option<String>> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };

        let fetched = match provider.fetch_by_id(provider_id) {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Provider lookup failed for {}: {}", provider_id, e);
                return Ok(None);
            }
        };
        let Some(record) = fetched else {
            debug!("Provider has no knowledge of id {}", provider_id);
            return Ok(None);
        };
        report.stats.provider_book_hits += 1;

        let Some(author) = self
            .store
            .canonical_author(&record.author, self.config.add_authors)?
        else {
            return Ok(None);
        };

        if self.store.get_book(&record.id)?.is_none() {
            self.store.insert_book(&Book {
                id: record.id.clone(),
                author_id: author.id,
                title: record.title,
                isbn: record.isbn,
                language: record
                    .language
                    .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
                status: BookStatus::Skipped,
                audio_status: BookStatus::Skipped,
                book_file: None,
                audio_file: None,
                book_library: None,
                audio_library: None,
            })?;
        }
        Ok(Some(record.id))
    }

    fn search_provider(
        &self,
        author: &str,
        title: &str,
        resolved: &ResolvedMetadata,
        report: &mut ScanReport,
    ) -> Result<Option<String>> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };
        // providers without free-text search just don't know this book
        if !provider.supports_search() {
            return Ok(None);
        }

        report.rescan_attempts += 1;
        let author = compact_initials(author);
        let query = clean_search_text(&unaccented(&format!("{} {}", author, title)));

        let hits = match provider.search(&query) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Error requesting provider search for {}: {}", query, e);
                return Ok(None);
            }
        };

        for hit in hits {
            let score = fuzz::token_set_ratio(&hit.title.to_lowercase(), &title.to_lowercase());
            if score < SEARCH_ACCEPT_SCORE {
                continue;
            }
            debug!("Rescan found {} : {}", hit.title, resolved.language);
            if let Some(id) = self.materialize_from_provider(&hit.id, report)? {
                report.rescan_hits += 1;
                if resolved.language != UNKNOWN_LANGUAGE {
                    debug!(
                        "Setting language from metadata {} : {}",
                        hit.title, resolved.language
                    );
                    self.store.set_book_language(&id, &resolved.language)?;
                    report.stats.language_corrections += 1;
                }
                return Ok(Some(id));
            }
        }

        warn!("Provider doesn't know about {}", title);
        Ok(None)
    }

    // =========================================================================
    // Location bookkeeping
    // =========================================================================

    fn attach_file(
        &self,
        book_id: &str,
        path: &Path,
        subdirectory: &Path,
        kind: MediaKind,
        report: &mut ScanReport,
    ) -> Result<()> {
        let Some(book) = self.store.get_book(book_id)? else {
            bail!("Unable to find bookid {} in database", book_id);
        };

        if book.status_for(kind) != BookStatus::Open {
            report.new_books += 1;
            self.store
                .update_modality_status(book_id, kind, BookStatus::Open)?;
        }
        if book.library_for(kind).is_none() {
            self.store.set_membership_timestamp(
                book_id,
                kind,
                chrono::Utc::now().timestamp_millis(),
            )?;
        }

        let recorded = self.preferred_file(path, subdirectory, kind);
        let recorded_str = recorded.to_string_lossy().to_string();
        match book.file_for(kind) {
            None | Some("") => {
                self.store
                    .set_file_path(book_id, kind, Some(&recorded_str))?;
            }
            Some(previous) if previous != recorded_str => {
                report.modified_books += 1;
                warn!(
                    "Updating {} location for {} from {} to {}",
                    kind.as_str(),
                    book.title,
                    previous,
                    recorded_str
                );
                self.store
                    .set_file_path(book_id, kind, Some(&recorded_str))?;
            }
            _ => {}
        }

        self.cache_cover(book_id, &recorded);
        Ok(())
    }

    /// Pick the file actually recorded for a match: the preferred-format
    /// sibling for ebooks, the "part 1" file for multi-part audiobooks.
    fn preferred_file(&self, path: &Path, subdirectory: &Path, kind: MediaKind) -> PathBuf {
        match kind {
            MediaKind::EBook => {
                for ext in &self.config.ebook_types {
                    let candidate = path.with_extension(ext);
                    if candidate.is_file() {
                        if candidate != path {
                            debug!(
                                "Linking to preferred type {}: {}",
                                ext,
                                candidate.display()
                            );
                        }
                        return candidate;
                    }
                }
                path.to_path_buf()
            }
            MediaKind::Audio => {
                if let Ok(entries) = std::fs::read_dir(subdirectory) {
                    for entry in entries.flatten() {
                        let candidate = entry.path();
                        let is_part_one = candidate
                            .file_name()
                            .and_then(|n| n.to_str())
                            .map(|n| n.contains("01"))
                            .unwrap_or(false);
                        if candidate.is_file()
                            && is_part_one
                            && has_extension(&candidate, &self.config.audio_types)
                        {
                            return candidate;
                        }
                    }
                }
                path.to_path_buf()
            }
        }
    }

    /// Copy a sibling cover.jpg into the image cache. Best effort.
    fn cache_cover(&self, book_id: &str, recorded: &Path) {
        let Some(cache_dir) = &self.config.cache_dir else {
            return;
        };
        let Some(cover) = recorded.parent().map(|dir| dir.join("cover.jpg")) else {
            return;
        };
        if !cover.is_file() {
            return;
        }
        let dest_dir = cache_dir.join("book");
        let dest = dest_dir.join(format!("{}.jpg", book_id));
        if let Err(e) = std::fs::create_dir_all(&dest_dir).and_then(|_| {
            std::fs::copy(&cover, &dest).map(|_| ())
        }) {
            warn!("Failed to cache cover for {}: {}", book_id, e);
        }
    }
}

// =============================================================================
// Guards
// =============================================================================

/// Clears the full-scan-in-progress flag on every exit path.
struct ScanFlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ScanFlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Holds an author in `Loading` for the duration of an attributed scan.
///
/// The reset to `Active` runs on drop so that no exit path, including a
/// propagating error, can leave the author stuck.
struct AuthorRunGuard {
    store: Arc<dyn LibraryStore>,
    author_id: String,
}

impl AuthorRunGuard {
    fn begin(store: Arc<dyn LibraryStore>, author_id: &str) -> Result<Option<Self>> {
        if store.get_author(author_id)?.is_none() {
            return Ok(None);
        }
        store.set_author_status(author_id, AuthorStatus::Loading)?;
        Ok(Some(Self {
            store,
            author_id: author_id.to_string(),
        }))
    }
}

impl Drop for AuthorRunGuard {
    fn drop(&mut self) {
        if let Err(e) = self
            .store
            .set_author_status(&self.author_id, AuthorStatus::Active)
        {
            error!(
                "Failed to reset author {} to Active: {}",
                self.author_id, e
            );
        }
    }
}

// =============================================================================
// Walk helpers
// =============================================================================

fn should_prune(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('_') || name.starts_with('.') {
        debug!("Skipping {}", entry.path().display());
        return true;
    }
    if entry.path().join(IGNORE_MARKER).exists() {
        debug!("Found {} file in {}", IGNORE_MARKER, entry.path().display());
        return true;
    }
    false
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// The grandparent directory name, for per-author folder layouts. Calibre
/// replaces a trailing period with an underscore; undo that.
fn parent_directory_author(path: &Path) -> Option<String> {
    let name = path.parent()?.parent()?.file_name()?.to_str()?;
    let mut name = name.to_string();
    if name.ends_with('_') {
        name.pop();
        name.push('.');
    }
    Some(name)
}

/// Collapse spelled-out initials ("J. R. R. Tolkien" -> "J.R.R. Tolkien")
/// the way the provider's search index expects them.
fn compact_initials(author: &str) -> String {
    let author = author.split_whitespace().collect::<Vec<_>>().join(" ");
    let chars: Vec<char> = author.chars().collect();
    if chars.len() < 2 || !matches!(chars[1], '.' | ' ') {
        return author;
    }

    let mut forename = String::new();
    let mut rest: &[char] = &chars;
    while rest.len() > 1 && matches!(rest[1], '.' | ' ') {
        forename.push(rest[0]);
        forename.push('.');
        rest = &rest[2..];
        while rest.first() == Some(&' ') {
            rest = &rest[1..];
        }
    }
    let surname: String = rest.iter().collect();
    let compacted = format!("{} {}", forename, surname.trim()).trim().to_string();
    if compacted != author {
        debug!("Stripped author name [{}] to [{}]", author, compacted);
    }
    compacted
}

/// Reduce a provider search string to letters, digits and periods.
fn clean_search_text(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}
