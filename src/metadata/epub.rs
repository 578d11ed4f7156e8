//! Epub container reader.
//!
//! An epub is a zip archive whose `META-INF/container.xml` names the OPF
//! package document holding the actual metadata.

use super::opf::parse_package_metadata;
use super::{ContainerKind, ExtractionError, RawMetadata};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Extract metadata from an epub file.
pub fn read_epub(path: &Path) -> Result<RawMetadata, ExtractionError> {
    let file = File::open(path)
        .map_err(|e| ExtractionError::ContainerCorrupt(format!("{}: {}", path.display(), e)))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| ExtractionError::ContainerCorrupt(format!("{}: {}", path.display(), e)))?;

    let container_xml = read_archive_file(&mut archive, "META-INF/container.xml")?;
    let opf_path = container_opf_path(&container_xml)?;
    let opf_xml = read_archive_file(&mut archive, &opf_path)?;

    parse_package_metadata(&opf_xml, ContainerKind::Epub)
}

fn read_archive_file(
    archive: &mut ZipArchive<File>,
    name: &str,
) -> Result<String, ExtractionError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| ExtractionError::ContainerCorrupt(format!("{}: {}", name, e)))?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

/// Find the OPF path named by `container.xml`: the first element carrying a
/// `full-path` attribute.
fn container_opf_path(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Err(e) => return Err(ExtractionError::MetadataParseError(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return Ok(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
            }
            Ok(_) => {}
        }
    }
    Err(ExtractionError::MetadataMissing)
}
