//! Audiobook tag reader.
//!
//! Reads the performer/title pair from whatever tag format the file carries
//! (ID3v2 on mp3, vorbis comments, MP4 atoms). Tag-library failures are
//! never fatal: a file without readable tags simply yields an empty record.

use super::{ContainerKind, RawMetadata};
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;
use tracing::debug;

/// Extract performer + title from an audio file's tags.
pub fn read_audio_tags(path: &Path) -> RawMetadata {
    let mut meta = RawMetadata::new(ContainerKind::Id3);

    let tagged = match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(tagged) => tagged,
        Err(e) => {
            debug!("No readable tags in {}: {}", path.display(), e);
            return meta;
        }
    };

    if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
        meta.creator = tag
            .artist()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        meta.title = tag
            .title()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unreadable_file_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter.mp3");
        std::fs::write(&path, b"definitely not an mp3").unwrap();

        let meta = read_audio_tags(&path);
        assert_eq!(meta.kind, ContainerKind::Id3);
        assert_eq!(meta.creator, None);
        assert_eq!(meta.title, None);
    }

    #[test]
    fn test_missing_file_is_not_fatal() {
        let meta = read_audio_tags(Path::new("/no/such/file.mp3"));
        assert!(!meta.is_usable());
    }
}
