//! Candidate key generation.
//!
//! Keys are six characters drawn uniformly from `A-Z0-9`, e.g. `Q7ZK2M`.
//! Unlike human-facing license formats there is no prefix, no segmenting
//! and no exclusion of look-alike characters.

use rand::Rng;

/// Character set for candidate keys.
pub const KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of every generated key.
pub const KEY_LENGTH: usize = 6;

/// Character set for session tokens.
pub(crate) const TOKEN_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Lowercase base36 digits, used for request ids and session codes.
pub(crate) const BASE36_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Draw `length` characters uniformly from `charset`.
pub(crate) fn random_string<R: Rng>(rng: &mut R, charset: &[u8], length: usize) -> String {
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset[idx] as char
        })
        .collect()
}

/// Generate a new candidate key using the supplied RNG.
pub fn generate_key<R: Rng>(rng: &mut R) -> String {
    random_string(rng, KEY_CHARSET, KEY_LENGTH)
}

/// Check that `key` has the shape of a generated key.
pub fn validate_key_format(key: &str) -> bool {
    key.len() == KEY_LENGTH && key.bytes().all(|b| KEY_CHARSET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_key_has_correct_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let key = generate_key(&mut rng);
            assert_eq!(key.len(), KEY_LENGTH);
            assert!(validate_key_format(&key), "bad key: {}", key);
        }
    }

    #[test]
    fn same_seed_same_keys() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(generate_key(&mut a), generate_key(&mut b));
    }

    #[test]
    fn all_characters_eventually_appear() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2000 {
            seen.extend(generate_key(&mut rng).bytes());
        }
        assert_eq!(seen.len(), KEY_CHARSET.len());
    }

    #[test]
    fn validate_format_rejects_bad_keys() {
        assert!(!validate_key_format(""));
        assert!(!validate_key_format("ABC12"));
        assert!(!validate_key_format("ABC1234"));
        assert!(!validate_key_format("abc123"));
        assert!(!validate_key_format("ABC-12"));
        assert!(validate_key_format("ABC123"));
    }

    #[test]
    fn random_string_respects_charset() {
        let mut rng = StdRng::seed_from_u64(3);
        let s = random_string(&mut rng, BASE36_CHARSET, 64);
        assert_eq!(s.len(), 64);
        assert!(s.bytes().all(|b| BASE36_CHARSET.contains(&b)));
        let t = random_string(&mut rng, TOKEN_CHARSET, 16);
        assert!(t.bytes().all(|b| b.is_ascii_alphanumeric()));
    }
}
