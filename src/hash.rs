//! Display fingerprints for keys and tokens.
//!
//! Nothing in here is cryptographic. The digests only exist so report lines
//! and log events carry a short, stable tag per key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Mask that keeps the accumulator within 31 bits.
const HASH_MASK: i32 = 0x7fff_ffff;

/// Compute an 8-character lowercase hex fingerprint of `input`.
///
/// Runs `acc = ((acc << 5) - acc + c) & 0x7fffffff` over the UTF-16 code
/// units of the input. Pure and deterministic; the empty string hashes to
/// `"00000000"`.
pub fn pseudo_hash(input: &str) -> String {
    let acc = input.encode_utf16().fold(0i32, |acc, unit| {
        (acc.wrapping_shl(5).wrapping_sub(acc).wrapping_add(unit as i32)) & HASH_MASK
    });
    format!("{:08x}", acc)
}

/// Mask a token for display: base64 it, drop the last two characters, append `..`.
pub fn obfuscate_token(token: &str) -> String {
    let mut encoded = STANDARD.encode(token.as_bytes());
    let keep = encoded.len().saturating_sub(2);
    encoded.truncate(keep);
    encoded.push_str("..");
    encoded
}
