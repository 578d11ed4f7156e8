//! Per-run scan statistics.
//!
//! One instance is owned by a single scan run, threaded through the
//! orchestrator and returned (plus persisted as a snapshot on full scans)
//! at run end. Nothing here is process-wide.

use serde::Serialize;

/// Counters accumulated during one scan run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanStatistics {
    /// Successful provider record fetches.
    pub provider_book_hits: u64,
    /// Language-cache prefixes that were already cached.
    pub cache_hits: u64,
    /// Language-cache prefixes newly written this run.
    pub cache_misses: u64,
    /// Books whose catalog language was corrected from file metadata.
    pub language_corrections: u64,
    /// Books rejected for an unwanted language.
    pub rejected_languages: u64,
    /// Titles that had quote characters stripped before matching.
    pub rejected_characters: u64,
    /// Books with a known language but no cacheable ISBN.
    pub uncacheable: u64,
    /// Files skipped because their directory was already attributed.
    pub duplicates: u64,
}

/// The aggregate outcome of one scan run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanReport {
    pub new_books: u64,
    pub modified_books: u64,
    pub files_processed: u64,
    /// Provider free-text search fallback attempts and acceptances.
    pub rescan_attempts: u64,
    pub rescan_hits: u64,
    pub stats: ScanStatistics,
}
