//! Similarity scores in the 0..=100 range, built on normalized Levenshtein
//! distance.
//!
//! `ratio` is plain edit-distance similarity; the token and partial variants
//! tolerate reordered words ("Lord Of The Rings, The") and substring
//! relationships (omnibus vs single volume) respectively.

use std::collections::BTreeSet;

/// Edit-distance similarity, 0..=100.
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Best-matching-substring similarity: the shorter string against every
/// equally long window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };
    if shorter.is_empty() {
        return 0.0;
    }
    if shorter.len() == longer.len() {
        return ratio(a, b);
    }

    let needle: String = shorter.iter().collect();
    let mut best = 0.0_f64;
    for start in 0..=(longer.len() - shorter.len()) {
        let window: String = longer[start..start + shorter.len()].iter().collect();
        let score = ratio(&needle, &window);
        if score > best {
            best = score;
        }
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// Order-independent similarity: words sorted before comparison.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Set-based similarity: scores the common words against each side's
/// remainder and keeps the best. Tolerant of extraneous words on one side.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let common: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let base = common.join(" ");
    let combined_a = join_nonempty(&base, &only_a.join(" "));
    let combined_b = join_nonempty(&base, &only_b.join(" "));

    ratio(&base, &combined_a)
        .max(ratio(&base, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{} {}", a, b),
    }
}
