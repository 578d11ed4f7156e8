//! Mobi / azw3 container reader.
//!
//! Both formats are Palm databases: a record table up front, with record 0
//! holding a PalmDOC header, the MOBI header and (usually) an EXTH block of
//! typed metadata records. Author, title, language and ISBN all come from
//! there; no text decompression is needed.

use super::{is_valid_isbn, ContainerKind, ExtractionError, RawMetadata};
use std::path::Path;

// EXTH record types carrying the fields we care about.
const EXTH_AUTHOR: u32 = 100;
const EXTH_ISBN: u32 = 104;
const EXTH_UPDATED_TITLE: u32 = 503;
const EXTH_LANGUAGE: u32 = 524;

/// Extract metadata from a mobi or azw3 file.
pub fn read_mobi(path: &Path, kind: ContainerKind) -> Result<RawMetadata, ExtractionError> {
    let data = std::fs::read(path)
        .map_err(|e| ExtractionError::ContainerCorrupt(format!("{}: {}", path.display(), e)))?;
    parse_palm_database(&data, kind)
}

fn parse_palm_database(data: &[u8], kind: ContainerKind) -> Result<RawMetadata, ExtractionError> {
    if data.len() < 86 {
        return Err(corrupt("file too short for a palm database"));
    }
    // type + creator at offset 60 identify the container
    if &data[60..68] != b"BOOKMOBI" {
        return Err(corrupt("not a BOOKMOBI palm database"));
    }

    let record_count = be_u16(data, 76)? as usize;
    if record_count == 0 {
        return Err(corrupt("palm database has no records"));
    }
    let rec0_start = be_u32(data, 78)? as usize;
    let rec0_end = if record_count > 1 {
        be_u32(data, 86)? as usize
    } else {
        data.len()
    };
    if rec0_start >= rec0_end || rec0_end > data.len() {
        return Err(corrupt("record 0 offsets out of range"));
    }
    let rec0 = &data[rec0_start..rec0_end];

    // record 0 = 16-byte PalmDOC header, then the MOBI header
    if rec0.len() < 132 || &rec0[16..20] != b"MOBI" {
        return Err(corrupt("missing MOBI header"));
    }
    let header_len = be_u32(rec0, 20)? as usize;
    let encoding = be_u32(rec0, 28)?;
    let fullname_offset = be_u32(rec0, 84)? as usize;
    let fullname_len = be_u32(rec0, 88)? as usize;
    let locale = be_u32(rec0, 92)?;
    let exth_flags = if header_len >= 116 { be_u32(rec0, 128)? } else { 0 };

    let mut meta = RawMetadata::new(kind);

    if exth_flags & 0x40 != 0 {
        parse_exth(rec0, 16 + header_len, encoding, &mut meta)?;
    }

    if meta.title.is_none() && fullname_len > 0 {
        let end = fullname_offset
            .checked_add(fullname_len)
            .ok_or_else(|| corrupt("full name range overflow"))?;
        if end > rec0.len() {
            return Err(corrupt("full name out of range"));
        }
        meta.title = Some(decode_text(&rec0[fullname_offset..end], encoding));
    }

    if meta.language.is_none() {
        meta.language = locale_language(locale).map(|s| s.to_string());
    }

    Ok(meta)
}

fn parse_exth(
    rec0: &[u8],
    start: usize,
    encoding: u32,
    meta: &mut RawMetadata,
) -> Result<(), ExtractionError> {
    if start + 12 > rec0.len() || &rec0[start..start + 4] != b"EXTH" {
        return Err(corrupt("EXTH header missing where flagged"));
    }
    let count = be_u32(rec0, start + 8)? as usize;
    let mut pos = start + 12;

    for _ in 0..count {
        let record_type = be_u32(rec0, pos)?;
        let record_len = be_u32(rec0, pos + 4)? as usize;
        if record_len < 8 || pos + record_len > rec0.len() {
            return Err(corrupt("EXTH record out of range"));
        }
        let payload = decode_text(&rec0[pos + 8..pos + record_len], encoding);

        match record_type {
            EXTH_AUTHOR => {
                if meta.creator.is_none() && !payload.is_empty() {
                    meta.creator = Some(payload);
                }
            }
            EXTH_ISBN => {
                if is_valid_isbn(&payload) {
                    meta.identifier = Some(payload);
                }
            }
            EXTH_UPDATED_TITLE => {
                if !payload.is_empty() {
                    meta.title = Some(payload);
                }
            }
            EXTH_LANGUAGE => {
                if !payload.is_empty() {
                    meta.language = Some(payload);
                }
            }
            _ => {}
        }
        pos += record_len;
    }
    Ok(())
}

/// Map the low byte of a Windows locale code to an ISO 639-1 language.
fn locale_language(locale: u32) -> Option<&'static str> {
    match locale & 0xff {
        7 => Some("de"),
        9 => Some("en"),
        10 => Some("es"),
        12 => Some("fr"),
        16 => Some("it"),
        19 => Some("nl"),
        22 => Some("pt"),
        25 => Some("ru"),
        _ => None,
    }
}

fn decode_text(bytes: &[u8], encoding: u32) -> String {
    let trimmed: &[u8] = match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    };
    if encoding == 65001 {
        String::from_utf8_lossy(trimmed).trim().to_string()
    } else {
        // cp1252 content degrades to latin-1 for the code points we need
        trimmed
            .iter()
            .map(|&b| b as char)
            .collect::<String>()
            .trim()
            .to_string()
    }
}

fn be_u16(data: &[u8], offset: usize) -> Result<u16, ExtractionError> {
    data.get(offset..offset + 2)
        .map(|s| u16::from_be_bytes([s[0], s[1]]))
        .ok_or_else(|| corrupt("truncated header"))
}

fn be_u32(data: &[u8], offset: usize) -> Result<u32, ExtractionError> {
    data.get(offset..offset + 4)
        .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or_else(|| corrupt("truncated header"))
}

fn corrupt(msg: &str) -> ExtractionError {
    ExtractionError::ContainerCorrupt(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_mobi(
        author: &str,
        title: &str,
        isbn: Option<&str>,
        language: Option<&str>,
    ) -> Vec<u8> {
        let mut exth_records: Vec<(u32, Vec<u8>)> =
            vec![(EXTH_AUTHOR, author.as_bytes().to_vec())];
        if let Some(isbn) = isbn {
            exth_records.push((EXTH_ISBN, isbn.as_bytes().to_vec()));
        }
        if let Some(language) = language {
            exth_records.push((EXTH_LANGUAGE, language.as_bytes().to_vec()));
        }

        let mut exth = b"EXTH".to_vec();
        let records_len: usize = exth_records.iter().map(|(_, d)| d.len() + 8).sum();
        exth.extend((12 + records_len as u32).to_be_bytes());
        exth.extend((exth_records.len() as u32).to_be_bytes());
        for (record_type, payload) in &exth_records {
            exth.extend(record_type.to_be_bytes());
            exth.extend(((payload.len() + 8) as u32).to_be_bytes());
            exth.extend(payload);
        }

        let mobi_header_len: u32 = 132;
        let fullname_offset = 16 + mobi_header_len as usize + exth.len();

        let mut mobi = vec![0u8; mobi_header_len as usize];
        mobi[0..4].copy_from_slice(b"MOBI");
        mobi[4..8].copy_from_slice(&mobi_header_len.to_be_bytes());
        mobi[12..16].copy_from_slice(&65001u32.to_be_bytes());
        mobi[68..72].copy_from_slice(&(fullname_offset as u32).to_be_bytes());
        mobi[72..76].copy_from_slice(&(title.len() as u32).to_be_bytes());
        mobi[76..80].copy_from_slice(&9u32.to_be_bytes());
        mobi[112..116].copy_from_slice(&0x40u32.to_be_bytes());

        let mut record0 = vec![0u8; 16];
        record0.extend(&mobi);
        record0.extend(&exth);
        record0.extend(title.as_bytes());

        let record0_offset: u32 = 78 + 8 + 2;
        let mut data = vec![0u8; record0_offset as usize];
        data[60..68].copy_from_slice(b"BOOKMOBI");
        data[76..78].copy_from_slice(&1u16.to_be_bytes());
        data[78..82].copy_from_slice(&record0_offset.to_be_bytes());
        data.extend(&record0);
        data
    }

    #[test]
    fn test_parse_mobi_metadata() {
        let data = build_mobi(
            "Frank Herbert",
            "Dune",
            Some("9780306406157"),
            Some("en"),
        );
        let meta = parse_palm_database(&data, ContainerKind::Mobi).unwrap();
        assert_eq!(meta.creator.as_deref(), Some("Frank Herbert"));
        assert_eq!(meta.title.as_deref(), Some("Dune"));
        assert_eq!(meta.identifier.as_deref(), Some("9780306406157"));
        assert_eq!(meta.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_language_falls_back_to_locale() {
        let data = build_mobi("Frank Herbert", "Dune", None, None);
        let meta = parse_palm_database(&data, ContainerKind::Mobi).unwrap();
        // locale 9 in the MOBI header
        assert_eq!(meta.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_invalid_isbn_dropped() {
        let data = build_mobi("Frank Herbert", "Dune", Some("123"), None);
        let meta = parse_palm_database(&data, ContainerKind::Mobi).unwrap();
        assert_eq!(meta.identifier, None);
    }

    #[test]
    fn test_not_a_palm_database() {
        let err = parse_palm_database(b"garbage bytes that are way too short", ContainerKind::Mobi)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ContainerCorrupt(_)));

        let mut data = vec![0u8; 200];
        data[60..68].copy_from_slice(b"NOTABOOK");
        let err = parse_palm_database(&data, ContainerKind::Mobi).unwrap_err();
        assert!(matches!(err, ExtractionError::ContainerCorrupt(_)));
    }

    #[test]
    fn test_truncated_record_table() {
        let mut data = vec![0u8; 86];
        data[60..68].copy_from_slice(b"BOOKMOBI");
        data[76..78].copy_from_slice(&1u16.to_be_bytes());
        // record 0 offset points past the end of the file
        data[78..82].copy_from_slice(&500u32.to_be_bytes());
        let err = parse_palm_database(&data, ContainerKind::Mobi).unwrap_err();
        assert!(matches!(err, ExtractionError::ContainerCorrupt(_)));
    }
}
