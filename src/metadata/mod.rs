//! Metadata extraction from book and audiobook files.
//!
//! Each container reader produces a partial [`RawMetadata`] record; the
//! [`resolver`] cascades readers in priority order until it has a usable
//! author + title pair.

mod audio;
mod epub;
mod filename;
mod mobi;
mod opf;
mod resolver;

pub use audio::read_audio_tags;
pub use epub::read_epub;
pub use filename::FilenamePattern;
pub use mobi::read_mobi;
pub use opf::{find_opf_sidecar, read_opf};
pub use resolver::{MetadataResolver, ResolvedMetadata, UNKNOWN_LANGUAGE};

use std::path::Path;
use thiserror::Error;

/// Errors that can occur while extracting metadata from a file.
///
/// None of these are fatal to a scan: the caller logs and degrades to
/// "no metadata available".
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("container unreadable: {0}")]
    ContainerCorrupt(String),

    #[error("no metadata found in container")]
    MetadataMissing,

    #[error("malformed metadata: {0}")]
    MetadataParseError(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which container a metadata record was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Epub,
    Mobi,
    Azw3,
    Opf,
    Id3,
    Filename,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Epub => "epub",
            ContainerKind::Mobi => "mobi",
            ContainerKind::Azw3 => "azw3",
            ContainerKind::Opf => "opf",
            ContainerKind::Id3 => "id3",
            ContainerKind::Filename => "filename",
        }
    }
}

/// A partial metadata record read from one source.
///
/// Any field may be absent; the resolver decides whether the merged result
/// is good enough to attempt catalog reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub language: Option<String>,
    /// ISBN-10 or ISBN-13, already checksum-validated by the reader.
    pub identifier: Option<String>,
    /// Provider-specific id (e.g. a goodreads book id) found in the container.
    pub external_id: Option<String>,
    pub kind: ContainerKind,
}

impl RawMetadata {
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            title: None,
            creator: None,
            language: None,
            identifier: None,
            external_id: None,
            kind,
        }
    }

    /// A record is usable when both creator and title are present and
    /// non-trivial (length > 2 after trimming).
    pub fn is_usable(&self) -> bool {
        fn ok(field: &Option<String>) -> bool {
            field
                .as_deref()
                .map(|s| s.trim().chars().count() > 2)
                .unwrap_or(false)
        }
        ok(&self.creator) && ok(&self.title)
    }
}

/// Case-insensitive extension check against a list of bare extensions.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            extensions.iter().any(|x| x.eq_ignore_ascii_case(&e))
        })
        .unwrap_or(false)
}

/// Validate an ISBN-10 or ISBN-13, including the checksum digit.
///
/// Hyphens and spaces are ignored. ISBN-10 allows a trailing `X`
/// check digit.
pub fn is_valid_isbn(isbn: &str) -> bool {
    let cleaned: String = isbn.chars().filter(|c| *c != '-' && *c != ' ').collect();

    match cleaned.len() {
        10 => {
            let mut sum: u32 = 0;
            for (i, c) in cleaned.chars().enumerate() {
                let value = match c {
                    '0'..='9' => c as u32 - '0' as u32,
                    'X' | 'x' if i == 9 => 10,
                    _ => return false,
                };
                sum += value * (10 - i as u32);
            }
            sum % 11 == 0
        }
        13 => {
            let mut sum: u32 = 0;
            for (i, c) in cleaned.chars().enumerate() {
                let value = match c {
                    '0'..='9' => c as u32 - '0' as u32,
                    _ => return false,
                };
                sum += value * if i % 2 == 0 { 1 } else { 3 };
            }
            sum % 10 == 0
        }
        _ => false,
    }
}

/// The 3-character language-cache key for a validated ISBN.
///
/// First 3 digits of an ISBN-10, digits 3..6 of an ISBN-13.
pub fn isbn_language_prefix(isbn: &str) -> Option<String> {
    if !is_valid_isbn(isbn) {
        return None;
    }
    let cleaned: String = isbn.chars().filter(|c| *c != '-' && *c != ' ').collect();
    if cleaned.len() == 10 {
        Some(cleaned[0..3].to_string())
    } else {
        Some(cleaned[3..6].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_is_valid_isbn_10() {
        assert!(is_valid_isbn("0306406152"));
        assert!(is_valid_isbn("0-306-40615-2"));
        // X check digit
        assert!(is_valid_isbn("097522980X"));
        assert!(is_valid_isbn("097522980x"));
        // bad checksum
        assert!(!is_valid_isbn("0306406153"));
        // X not in final position
        assert!(!is_valid_isbn("0X06406152"));
    }

    #[test]
    fn test_is_valid_isbn_13() {
        assert!(is_valid_isbn("9780306406157"));
        assert!(is_valid_isbn("978-0-306-40615-7"));
        assert!(!is_valid_isbn("9780306406158"));
        // no X check digit in ISBN-13
        assert!(!is_valid_isbn("978030640615X"));
    }

    #[test]
    fn test_is_valid_isbn_length() {
        assert!(!is_valid_isbn(""));
        assert!(!is_valid_isbn("12345"));
        assert!(!is_valid_isbn("97803064061579"));
        assert!(!is_valid_isbn("not an isbn"));
    }

    #[test]
    fn test_isbn_language_prefix() {
        assert_eq!(isbn_language_prefix("0306406152").as_deref(), Some("030"));
        assert_eq!(
            isbn_language_prefix("9780306406157").as_deref(),
            Some("030")
        );
        assert_eq!(isbn_language_prefix("garbage"), None);
    }

    #[test]
    fn test_usable_metadata() {
        let mut meta = RawMetadata::new(ContainerKind::Epub);
        assert!(!meta.is_usable());

        meta.title = Some("The Hobbit".to_string());
        meta.creator = Some("J.R.R. Tolkien".to_string());
        assert!(meta.is_usable());

        // short captures are almost certainly wrong
        meta.title = Some("ab".to_string());
        assert!(!meta.is_usable());

        meta.title = Some("   ".to_string());
        assert!(!meta.is_usable());
    }

    #[test]
    fn test_has_extension() {
        let types = vec!["epub".to_string(), "mobi".to_string()];
        assert!(has_extension(&PathBuf::from("book.epub"), &types));
        assert!(has_extension(&PathBuf::from("book.EPUB"), &types));
        assert!(!has_extension(&PathBuf::from("book.pdf"), &types));
        assert!(!has_extension(&PathBuf::from("book"), &types));
    }
}
