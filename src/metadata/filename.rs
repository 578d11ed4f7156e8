//! Last-resort metadata extraction by matching the configured naming
//! template against a bare filename.
//!
//! The destination-file template (e.g. `$Author - $Title`) is compiled once
//! per scan: literals are escaped, the tokens become lazy named groups, and
//! the pattern is anchored to end with one of the configured extensions.

use super::{ContainerKind, RawMetadata};
use anyhow::{Context, Result};
use regex::Regex;

const AUTHOR_TOKEN: &str = "$Author";
const TITLE_TOKEN: &str = "$Title";

/// A compiled filename-naming pattern.
pub struct FilenamePattern {
    regex: Regex,
}

impl FilenamePattern {
    /// Compile a naming template plus a list of recognized extensions.
    pub fn compile(template: &str, extensions: &[String]) -> Result<Self> {
        let mut pattern = regex::escape(template);
        pattern = pattern.replace(&regex::escape(AUTHOR_TOKEN), "(?P<author>.*?)");
        pattern = pattern.replace(&regex::escape(TITLE_TOKEN), "(?P<book>.*?)");

        let alternation = extensions
            .iter()
            .map(|e| regex::escape(e))
            .collect::<Vec<_>>()
            .join("|");
        let anchored = format!("^{}\\.(?:{})$", pattern, alternation);

        let regex = Regex::new(&anchored)
            .with_context(|| format!("Invalid naming template: {}", template))?;
        Ok(Self { regex })
    }

    /// Match a bare filename (no directory component) against the pattern.
    ///
    /// Captures of length <= 2 are rejected as almost certainly wrong.
    pub fn matches(&self, filename: &str) -> Option<RawMetadata> {
        let captures = self.regex.captures(filename)?;
        let author = captures.name("author")?.as_str().trim();
        let title = captures.name("book")?.as_str().trim();
        if author.chars().count() <= 2 || title.chars().count() <= 2 {
            return None;
        }

        let mut meta = RawMetadata::new(ContainerKind::Filename);
        meta.creator = Some(author.to_string());
        meta.title = Some(title.to_string());
        Some(meta)
    }
}
