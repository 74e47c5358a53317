//! Utility functions for the orchestration service

use chrono::{DateTime, Utc};
use rand::Rng;

/// Alphabet for join pass keys; avoids ambiguous characters
const PASS_KEY_CHARS: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";

/// Generate a random lobby pass key of the given length
pub fn generate_pass_key(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..PASS_KEY_CHARS.len());
            PASS_KEY_CHARS[idx] as char
        })
        .collect()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Human-readable lobby title for a bracket pairing
pub fn match_title(team1: &str, team2: &str) -> String {
    format!("{} vs {}", team1, team2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_key_length_and_alphabet() {
        let key = generate_pass_key(8);
        assert_eq!(key.len(), 8);
        assert!(key.bytes().all(|b| PASS_KEY_CHARS.contains(&b)));
    }

    #[test]
    fn test_pass_keys_vary() {
        let a = generate_pass_key(12);
        let b = generate_pass_key(12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_match_title() {
        assert_eq!(match_title("Alpha", "Beta"), "Alpha vs Beta");
    }

    proptest::proptest! {
        #[test]
        fn pass_key_always_matches_alphabet(length in 1usize..64) {
            let key = generate_pass_key(length);
            proptest::prop_assert_eq!(key.len(), length);
            proptest::prop_assert!(key.bytes().all(|b| PASS_KEY_CHARS.contains(&b)));
        }
    }
}
