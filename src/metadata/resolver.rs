//! The extraction cascade: container, then sidecar override, then audio
//! tags, then filename pattern.
//!
//! Resolution never errors. Every failure downgrades to "no metadata from
//! this source" and the next step runs; the caller gets a record plus a
//! usability flag and decides whether reconciliation is worth attempting.

use super::{
    find_opf_sidecar, has_extension, read_audio_tags, read_epub, read_mobi, read_opf,
    ContainerKind, ExtractionError, FilenamePattern, RawMetadata,
};
use anyhow::Result;
use std::path::Path;
use tracing::debug;

/// Language recorded when no source knew better.
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// The final, defaulted result of the extraction cascade.
#[derive(Debug, Clone)]
pub struct ResolvedMetadata {
    pub author: String,
    pub title: String,
    pub language: String,
    pub isbn: String,
    pub external_id: Option<String>,
    /// True when author and title are both present and non-trivial; only
    /// usable records are worth reconciling against the catalog.
    pub usable: bool,
}

/// Runs the extraction cascade for one scan configuration.
pub struct MetadataResolver {
    audio_types: Vec<String>,
    pattern: FilenamePattern,
}

impl MetadataResolver {
    pub fn new(
        template: &str,
        scan_types: &[String],
        audio_types: &[String],
    ) -> Result<Self> {
        Ok(Self {
            audio_types: audio_types.to_vec(),
            pattern: FilenamePattern::compile(template, scan_types)?,
        })
    }

    /// Extract the best-effort metadata record for one file.
    pub fn resolve(&self, path: &Path) -> ResolvedMetadata {
        let mut meta = self.container_metadata(path);

        // A sidecar overrides embedded metadata: users hand-edit it to merge
        // author aliases, so it is the most trusted source when usable.
        if let Some(sidecar) = path.parent().and_then(find_opf_sidecar) {
            match read_opf(&sidecar) {
                Ok(opf) if opf.is_usable() => {
                    debug!("Sidecar {} overrides embedded metadata", sidecar.display());
                    apply_override(&mut meta, opf);
                }
                Ok(_) => debug!("Sidecar {} metadata incomplete", sidecar.display()),
                Err(e) => debug!("Cannot read sidecar {}: {}", sidecar.display(), e),
            }
        }

        if !meta.is_usable() && has_extension(path, &self.audio_types) {
            let tags = read_audio_tags(path);
            if tags.is_usable() {
                meta.creator = tags.creator;
                meta.title = tags.title;
            }
        }

        if !meta.is_usable() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(matched) = self.pattern.matches(name) {
                    meta.creator = matched.creator;
                    meta.title = matched.title;
                } else {
                    debug!("Pattern match failed [{}]", name);
                }
            }
        }

        finalize(meta)
    }

    fn container_metadata(&self, path: &Path) -> RawMetadata {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let result = match extension.as_str() {
            "epub" => read_epub(path),
            "mobi" => read_mobi(path, ContainerKind::Mobi),
            "azw3" => read_mobi(path, ContainerKind::Azw3),
            _ => Err(ExtractionError::UnsupportedFormat(extension)),
        };

        match result {
            Ok(meta) => meta,
            // not an error: the rest of the cascade handles these files
            Err(ExtractionError::UnsupportedFormat(_)) => {
                RawMetadata::new(ContainerKind::Filename)
            }
            Err(e) => {
                debug!("No embedded metadata in {}: {}", path.display(), e);
                RawMetadata::new(ContainerKind::Filename)
            }
        }
    }
}

fn apply_override(meta: &mut RawMetadata, other: RawMetadata) {
    if other.title.is_some() {
        meta.title = other.title;
    }
    if other.creator.is_some() {
        meta.creator = other.creator;
    }
    if other.language.is_some() {
        meta.language = other.language;
    }
    if other.identifier.is_some() {
        meta.identifier = other.identifier;
    }
    if other.external_id.is_some() {
        meta.external_id = other.external_id;
    }
}

fn finalize(meta: RawMetadata) -> ResolvedMetadata {
    let usable = meta.is_usable();
    ResolvedMetadata {
        author: meta.creator.map(|s| s.trim().to_string()).unwrap_or_default(),
        title: meta.title.map(|s| s.trim().to_string()).unwrap_or_default(),
        language: meta
            .language
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
        isbn: meta.identifier.unwrap_or_default(),
        external_id: meta.external_id,
        usable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SIDECAR_OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>The Dispossessed</dc:title>
    <dc:creator>Ursula K. Le Guin</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier opf:scheme="ISBN">9780306406157</dc:identifier>
  </metadata>
</package>"#;

    fn resolver() -> MetadataResolver {
        let ebook_types = vec!["epub".to_string(), "mobi".to_string(), "azw3".to_string()];
        let audio_types = vec!["mp3".to_string(), "m4b".to_string()];
        MetadataResolver::new("$Author - $Title", &ebook_types, &audio_types).unwrap()
    }

    #[test]
    fn test_sidecar_overrides_broken_container() {
        let dir = TempDir::new().unwrap();
        // the epub itself is unreadable, the sidecar carries the metadata
        let book = dir.path().join("whatever.epub");
        fs::write(&book, b"not a zip").unwrap();
        fs::write(dir.path().join("metadata.opf"), SIDECAR_OPF).unwrap();

        let resolved = resolver().resolve(&book);
        assert!(resolved.usable);
        assert_eq!(resolved.author, "Ursula K. Le Guin");
        assert_eq!(resolved.title, "The Dispossessed");
        assert_eq!(resolved.language, "en");
        assert_eq!(resolved.isbn, "9780306406157");
    }

    #[test]
    fn test_filename_fallback() {
        let dir = TempDir::new().unwrap();
        let book = dir.path().join("Iain Banks - The Wasp Factory.epub");
        fs::write(&book, b"not a zip").unwrap();

        let resolved = resolver().resolve(&book);
        assert!(resolved.usable);
        assert_eq!(resolved.author, "Iain Banks");
        assert_eq!(resolved.title, "The Wasp Factory");
        // cascade defaults
        assert_eq!(resolved.language, UNKNOWN_LANGUAGE);
        assert_eq!(resolved.isbn, "");
        assert_eq!(resolved.external_id, None);
    }

    #[test]
    fn test_unresolvable_file() {
        let dir = TempDir::new().unwrap();
        let book = dir.path().join("randomname.epub");
        fs::write(&book, b"not a zip").unwrap();

        let resolved = resolver().resolve(&book);
        assert!(!resolved.usable);
    }

    #[test]
    fn test_incomplete_sidecar_does_not_override() {
        let dir = TempDir::new().unwrap();
        let book = dir.path().join("Iain Banks - The Wasp Factory.epub");
        fs::write(&book, b"not a zip").unwrap();
        // sidecar missing a creator: not usable, must not clobber the cascade
        let partial = SIDECAR_OPF.replace("<dc:creator>Ursula K. Le Guin</dc:creator>", "");
        fs::write(dir.path().join("metadata.opf"), partial).unwrap();

        let resolved = resolver().resolve(&book);
        assert!(resolved.usable);
        assert_eq!(resolved.author, "Iain Banks");
        assert_eq!(resolved.title, "The Wasp Factory");
    }
}
