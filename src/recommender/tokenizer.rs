use once_cell::sync::Lazy;
use regex::Regex;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation pattern"));

/// Lowercases, replaces punctuation with spaces and splits on whitespace.
/// Unicode word characters are kept, so non-Latin captions tokenize too.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    PUNCTUATION
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Tokens of an optional field; a missing field yields no tokens.
pub fn tokenize_opt(text: Option<&str>) -> Vec<String> {
    text.map(tokenize).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_punctuation_and_lowercases() {
        assert_eq!(
            tokenize("Sunset at Baga Beach!! #Goa, 2024"),
            vec!["sunset", "at", "baga", "beach", "goa", "2024"]
        );
    }

    #[test]
    fn test_keeps_non_latin_words() {
        assert_eq!(tokenize("नमस्ते Jaipur"), vec!["नमस्ते", "jaipur"]);
    }

    #[test]
    fn test_missing_text_is_empty() {
        assert!(tokenize_opt(None).is_empty());
        assert!(tokenize("  ... ").is_empty());
    }
}
