//! Small text helpers shared by the signal backends and the composers.
//!
//! Journal text never leaves this crate through logs: anything that needs to
//! identify a piece of text in a log line goes through [`anon_hash`].

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// English stopwords plus a handful of journaling fillers ("felt", "today")
/// that would otherwise dominate keyphrases and feature hashes.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "aren't", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "can't", "cannot", "could", "couldn't", "did",
        "didn't", "do", "does", "doesn't", "doing", "don't", "down", "during", "each", "even",
        "ever", "every", "few", "for", "from", "further", "get", "got", "had", "hadn't", "has",
        "hasn't", "have", "haven't", "having", "he", "her", "here", "hers", "herself", "him",
        "himself", "his", "how", "i", "i'd", "i'll", "i'm", "i've", "if", "in", "into", "is",
        "isn't", "it", "it's", "its", "itself", "just", "let", "like", "lot", "me", "more",
        "most", "much", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
        "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "really",
        "same", "she", "should", "so", "some", "still", "such", "than", "that", "that's", "the",
        "their", "theirs", "them", "themselves", "then", "there", "these", "they", "thing",
        "things", "this", "those", "through", "to", "too", "under", "until", "up", "very",
        "was", "wasn't", "we", "were", "weren't", "what", "when", "where", "which", "while",
        "who", "whom", "why", "will", "with", "won't", "would", "wouldn't", "you", "your",
        "yours", "yourself", "yourselves", "feel", "feeling", "feels", "felt", "today", "day",
        "bit", "kind", "maybe", "pretty", "quite", "around", "went", "going", "make", "made",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Lower-cased word tokens. Apostrophes inside words are kept ("can't"),
/// curly apostrophes are folded to ASCII first.
pub fn tokenize(text: &str) -> Vec<String> {
    text.replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Capitalise the first letter of each whitespace-separated word and
/// lower-case the rest ("long WALK" -> "Long Walk").
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Short, stable, non-reversible id for a piece of text (first 6 bytes of
/// its SHA-256, hex encoded). Safe to put in logs.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// First 8 bytes of the SHA-256 of `key`, big-endian. Used wherever a
/// reproducible seed has to be derived from request data.
pub fn stable_seed(key: &str) -> u64 {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_keeps_inner_apostrophes() {
        let toks = tokenize("I can’t sleep, 'really' TIRED.");
        assert_eq!(toks, vec!["i", "can't", "sleep", "really", "tired"]);
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("long WALK"), "Long Walk");
        assert_eq!(title_case("calm"), "Calm");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn anon_hash_is_stable_and_short() {
        let a = anon_hash("some private text");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("some private text"));
        assert_ne!(a, anon_hash("other text"));
    }

    #[test]
    fn stable_seed_depends_on_key() {
        assert_eq!(stable_seed("user-1Calm5"), stable_seed("user-1Calm5"));
        assert_ne!(stable_seed("user-1Calm5"), stable_seed("user-2Calm5"));
    }
}
