//! OPF package-document parsing, shared by the epub reader and sidecar files.
//!
//! Calibre writes `metadata.opf` next to each book; our renamer writes
//! `<title> - <author>.opf`. Either way, a sidecar overrides embedded
//! metadata because users hand-edit it to merge author aliases.

use super::{is_valid_isbn, ContainerKind, ExtractionError, RawMetadata};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::{Path, PathBuf};

/// Parse the `<metadata>` block of an OPF package document.
///
/// Field mapping over the metadata element's children:
/// - tag ending in `title` -> title (last wins)
/// - tag ending in `language` -> language
/// - tag ending in `creator` -> creator, first author wins
/// - `identifier` with an `isbn` designation and a valid checksum -> identifier
/// - `identifier` with a `goodreads` designation -> external_id
pub fn parse_package_metadata(
    xml: &str,
    kind: ContainerKind,
) -> Result<RawMetadata, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut meta = RawMetadata::new(kind);

    let mut saw_metadata = false;
    let mut in_metadata = false;
    // depth below the <metadata> element; 1 = a direct child is open
    let mut depth = 0usize;
    let mut current: Option<(String, String)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Err(e) => return Err(ExtractionError::MetadataParseError(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let local = local_name(&e);
                if !in_metadata {
                    if local.ends_with("metadata") {
                        in_metadata = true;
                        saw_metadata = true;
                    }
                } else {
                    depth += 1;
                    if depth == 1 {
                        current = Some((local, attribute_blob(&e)));
                        text.clear();
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if current.is_some() {
                    let value = t
                        .unescape()
                        .map_err(|e| ExtractionError::MetadataParseError(e.to_string()))?;
                    text.push_str(&value);
                }
            }
            Ok(Event::End(_)) => {
                if in_metadata {
                    if depth == 0 {
                        in_metadata = false;
                    } else {
                        depth -= 1;
                        if depth == 0 {
                            if let Some((tag, attrs)) = current.take() {
                                apply_field(&mut meta, &tag, &attrs, text.trim());
                            }
                        }
                    }
                }
            }
            Ok(_) => {}
        }
    }

    if !saw_metadata {
        return Err(ExtractionError::MetadataMissing);
    }
    Ok(meta)
}

/// Read an OPF sidecar file from disk.
///
/// Hand-edited files sometimes contain unmatched `<br>` tags, which a strict
/// XML parser rejects; they are stripped before parsing.
pub fn read_opf(path: &Path) -> Result<RawMetadata, ExtractionError> {
    let raw = std::fs::read_to_string(path)?;
    let sanitized = raw.replace("<br>", "").replace("</br>", "");
    parse_package_metadata(&sanitized, ContainerKind::Opf)
}

/// Locate an OPF sidecar in a book's directory.
///
/// Any `.opf` file qualifies; the first one in directory listing order wins
/// since the preferred author/title naming is not known at this point.
pub fn find_opf_sidecar(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            let is_opf = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("opf"))
                .unwrap_or(false);
            if is_opf {
                return Some(path);
            }
        }
    }
    None
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase()
}

/// Flatten an element's attributes into one lowercase string for the
/// designation checks ("isbn" / "goodreads" may appear in key or value).
fn attribute_blob(e: &BytesStart) -> String {
    let mut blob = String::new();
    for attr in e.attributes().flatten() {
        blob.push_str(&String::from_utf8_lossy(attr.key.as_ref()).to_lowercase());
        blob.push('=');
        blob.push_str(&String::from_utf8_lossy(&attr.value).to_lowercase());
        blob.push(' ');
    }
    blob
}

fn apply_field(meta: &mut RawMetadata, tag: &str, attrs: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    if tag.ends_with("title") {
        meta.title = Some(text.to_string());
    } else if tag.ends_with("language") {
        meta.language = Some(text.to_string());
    } else if tag.ends_with("creator") {
        // take the first author name if multiple authors
        if meta.creator.is_none() {
            meta.creator = Some(text.to_string());
        }
    } else if tag.ends_with("identifier") {
        if attrs.contains("isbn") {
            if is_valid_isbn(text) {
                meta.identifier = Some(text.to_string());
            }
        } else if attrs.contains("goodreads") {
            meta.external_id = Some(text.to_string());
        }
    }
}
