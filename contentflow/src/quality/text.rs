//! Text measurements shared by drafting and scoring.

use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("valid word regex"));

const STOP_WORDS: [&str; 7] = ["in", "for", "the", "a", "an", "and", "or"];

/// Counts words the way every length check in the crate does.
#[must_use]
pub fn word_count(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// Returns the first `n` words of `text`, lowercased and space-joined.
#[must_use]
pub fn first_words(text: &str, n: usize) -> String {
    WORD.find_iter(text)
        .take(n)
        .map(|m| m.as_str().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Counts whole-phrase occurrences of `phrase` in already-lowercased `haystack`.
#[must_use]
pub fn count_phrase(haystack: &str, phrase: &str) -> usize {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return 0;
    }
    Regex::new(&format!(r"\b{}\b", regex::escape(&phrase)))
        .map_or(0, |re| re.find_iter(haystack).count())
}

/// Returns true if `keyword` is covered by already-lowercased `haystack`.
///
/// Multi-word keywords also match when their first two significant words
/// appear as a phrase with the rest present anywhere, or when every
/// significant word longer than three characters appears.
#[must_use]
pub fn keyword_present(haystack: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    if haystack.contains(&keyword) {
        return true;
    }

    let words: Vec<&str> = keyword
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .collect();
    if words.len() < 2 {
        return false;
    }

    let lead = words[..2].join(" ");
    if haystack.contains(&lead) && words[2..].iter().all(|w| haystack.contains(w)) {
        return true;
    }

    let significant: Vec<&&str> = words.iter().filter(|w| w.len() > 3).collect();
    !significant.is_empty() && significant.iter().all(|w| haystack.contains(**w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("Hello, world!"), 2);
        assert_eq!(word_count("it's 2026 - co-op"), 5);
    }

    #[test]
    fn test_first_words() {
        assert_eq!(first_words("One Two, three. Four", 3), "one two three");
    }

    #[test]
    fn test_count_phrase_whole_words() {
        let text = "ai solutions help. more ai solutions! ai solutionsx";
        assert_eq!(count_phrase(text, "AI Solutions"), 2);
        assert_eq!(count_phrase(text, ""), 0);
    }

    #[test]
    fn test_keyword_present_variants() {
        let text = "machine learning for diagnostics is growing in remote clinics";
        assert!(keyword_present(text, "machine learning"));
        assert!(keyword_present(text, "Machine Learning Diagnostics"));
        assert!(keyword_present(text, "remote diagnostics clinics"));
        assert!(!keyword_present(text, "cloud storage"));
        assert!(!keyword_present(text, "storage"));
    }
}
