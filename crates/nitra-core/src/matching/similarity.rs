//! String normalization and bigram similarity shared by both matchers.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::MatcherConfig;

/// Trailing model extension, case-insensitive.
static MODEL_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = MatcherConfig::MODEL_EXTENSIONS
        .iter()
        .map(|ext| regex::escape(ext.trim_start_matches('.')))
        .collect();
    Regex::new(&format!(r"(?i)\.(?:{})$", alternatives.join("|"))).unwrap()
});

/// Trim surrounding whitespace and lowercase.
///
/// Every identifier comparison in the matchers goes through this.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Remove a trailing model extension (`.safetensors`, `.ckpt`, ...).
///
/// Only the known model extensions are stripped; `notes.txt` is returned
/// unchanged.
///
/// # Examples
///
/// ```
/// use nitra_core::matching::strip_extension;
///
/// assert_eq!(strip_extension("sdxl_base.SafeTensors"), "sdxl_base");
/// assert_eq!(strip_extension("notes.txt"), "notes.txt");
/// ```
pub fn strip_extension(filename: &str) -> String {
    MODEL_EXTENSION.replace(filename, "").into_owned()
}

/// Whether `value` ends in one of the recognized model extensions.
pub fn has_model_extension(value: &str) -> bool {
    MODEL_EXTENSION.is_match(value)
}

/// Dice-style similarity over character bigrams of the normalized strings.
///
/// The intersection is counted by testing every bigram of `b` (duplicates
/// included) against the *set* of bigrams of `a`. This is not a true
/// multiset intersection: the result depends on argument order and can
/// exceed `1.0` when `b` repeats a bigram that `a` contains once. Match
/// scores are tuned against this exact behavior.
///
/// # Examples
///
/// ```
/// use nitra_core::matching::calculate_similarity;
///
/// assert_eq!(calculate_similarity("Model", " model "), 1.0);
/// assert_eq!(calculate_similarity("aab", "aba"), 0.5);
/// assert_eq!(calculate_similarity("a", "abc"), 0.0);
/// ```
pub fn calculate_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return 1.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.len() < 2 || b_chars.len() < 2 {
        return 0.0;
    }

    let a_bigrams: HashSet<(char, char)> = a_chars.windows(2).map(|w| (w[0], w[1])).collect();
    let intersection = b_chars
        .windows(2)
        .filter(|w| a_bigrams.contains(&(w[0], w[1])))
        .count();

    (2 * intersection) as f64 / (a_chars.len() + b_chars.len() - 2) as f64
}
