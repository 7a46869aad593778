//! Masking key generation and XOR masking of frame payloads.
//!
//! https://tools.ietf.org/html/rfc6455#section-5.3

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate a fresh 4-byte masking key.
///
/// Per RFC 6455 §5.3, a masking key should not be predictable; we draw it
/// from the thread's OS-seeded RNG, same as the teacher's `write_frame_client`.
pub fn make_key() -> [u8; 4] {
    let mut rng = StdRng::from_rng(rand::thread_rng()).expect("thread_rng must be seedable");
    rng.random::<[u8; 4]>()
}

/// XOR `data` in place against `key`, repeating the key every 4 bytes.
///
/// Masking is its own inverse: `mask(key, mask(key, data)) == data`.
pub fn mask(key: [u8; 4], data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Return a masked copy of `data`, leaving the input untouched.
pub fn mask_copy(key: [u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    mask(key, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_is_its_own_inverse() {
        let key = [0x11, 0x22, 0x33, 0x44];
        for len in [0usize, 1, 2, 3, 4, 5, 7, 8, 16, 17, 125, 1000] {
            let original: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let masked = mask_copy(key, &original);
            assert_eq!(masked.len(), original.len());
            let unmasked = mask_copy(key, &masked);
            assert_eq!(unmasked, original, "roundtrip failed for len={len}");
        }
    }

    #[test]
    fn mask_matches_naive_byte_xor() {
        let key = [0xde, 0xad, 0xbe, 0xef];
        let data: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        let naive: Vec<u8> = data
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % 4])
            .collect();
        let fast = mask_copy(key, &data);
        assert_eq!(fast, naive);
    }

    #[test]
    fn make_key_is_four_bytes() {
        let key = make_key();
        assert_eq!(key.len(), 4);
    }
}
