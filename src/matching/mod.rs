//! Approximate string matching against the catalog.
//!
//! Metadata providers disagree about accents, quotes and subtitles, so
//! titles are normalized before scoring and compared with several
//! independent similarity metrics.

pub mod fuzz;

mod finder;

pub use finder::{find_book, BookCandidate, CatalogIndex};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip accents: NFKD-decompose and drop combining marks.
pub fn unaccented(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Remove ASCII and common Unicode quote/apostrophe variants.
pub fn strip_quotes(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\'' | '"' | '\u{2018}' | '\u{2019}' | '\u{201c}' | '\u{201d}'))
        .collect()
}

/// Whitespace-delimited word count.
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// The "core" of a title: everything before a trailing parenthetical or
/// colon-separated subtitle. `None` when that reduction changes nothing.
pub fn core_title(title: &str) -> Option<String> {
    let cut = title.find(|c| c == '(' || c == ':')?;
    let core = title[..cut].trim();
    if core.is_empty() || core == title.trim() {
        return None;
    }
    Some(core.to_string())
}
