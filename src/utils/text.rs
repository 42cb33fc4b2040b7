// Shared text helpers used by the classifier, the extractor and the
// cross-document validator. All of these tolerate OCR noise rather than
// demanding exact matches.

use std::collections::HashSet;

/// Character-overlap similarity between two strings (Jaccard index over
/// lowercase character sets). Crude, but robust against the single-character
/// substitutions OCR engines produce.
pub fn char_overlap_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<char> = a.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    let set_b: HashSet<char> = b.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Fuzzy keyword check against a body of text.
///
/// Single-word keywords match when at least 70% of their characters appear in
/// the text; multi-word keywords match when at least 70% of their words do.
pub fn fuzzy_keyword_match(keyword: &str, text: &str) -> bool {
    let keyword = keyword.to_lowercase();
    let text = text.to_lowercase();
    let words: Vec<&str> = keyword.split_whitespace().collect();

    if words.len() <= 1 {
        let keyword_chars: HashSet<char> = keyword.chars().filter(|c| !c.is_whitespace()).collect();
        if keyword_chars.is_empty() {
            return false;
        }
        let text_chars: HashSet<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let common = keyword_chars.intersection(&text_chars).count();
        common as f64 >= keyword_chars.len() as f64 * 0.7
    } else {
        let present = words.iter().filter(|w| text.contains(*w)).count();
        present as f64 >= words.len() as f64 * 0.7
    }
}

/// Clean an extracted person name: strip punctuation, collapse spaces and
/// title-case the parts. Returns None when the remainder does not look like a
/// real name (fewer than two parts).
pub fn clean_name(raw: &str) -> Option<String> {
    let stripped: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let cleaned = stripped
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");

    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    if parts.len() >= 2 && parts.iter().all(|p| !p.is_empty()) {
        Some(cleaned)
    } else {
        None
    }
}
