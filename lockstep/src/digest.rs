//! Digest boundary.
//!
//! The shard search and the integrity checks share one digest abstraction:
//! bytes in, fixed-length bytes out. [`Sha256Digest`] is the production
//! implementation; tests substitute cheaper or deliberately colliding ones.

use std::fmt::Write as _;

use sha2::Digest as _;

/// Incremental digest state.
pub trait DigestState: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// A fixed-length digest function.
pub trait Digest: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Length of the output in bytes.
    fn output_len(&self) -> usize;

    /// Starts an incremental computation.
    fn start(&self) -> Box<dyn DigestState>;

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut state = self.start();
        state.update(data);
        state.finalize()
    }

    /// True if `data` digests to `expected`. Implementations override this
    /// to avoid allocating in hot loops.
    fn matches(&self, data: &[u8], expected: &[u8]) -> bool {
        self.digest(data) == expected
    }
}

/// SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

struct Sha256State(sha2::Sha256);

impl DigestState for Sha256State {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

impl Digest for Sha256Digest {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn output_len(&self) -> usize {
        32
    }

    fn start(&self) -> Box<dyn DigestState> {
        Box::new(Sha256State(sha2::Sha256::new()))
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        sha2::Sha256::digest(data).to_vec()
    }

    fn matches(&self, data: &[u8], expected: &[u8]) -> bool {
        sha2::Sha256::digest(data).as_slice() == expected
    }
}

/// Lower-case hex encoding.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Parses a hex string (either case). Returns `None` on odd length or a
/// non-hex character.
pub fn parse_hex(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vectors() {
        let digest = Sha256Digest;
        assert_eq!(
            to_hex(&digest.digest(b"hello world")),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            to_hex(&digest.digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let digest = Sha256Digest;
        let mut state = digest.start();
        state.update(b"hello ");
        state.update(b"world");
        assert_eq!(state.finalize(), digest.digest(b"hello world"));
    }

    #[test]
    fn test_matches() {
        let digest = Sha256Digest;
        let expected = digest.digest(&[127, 255, 255]);
        assert!(digest.matches(&[127, 255, 255], &expected));
        assert!(!digest.matches(&[127, 255, 254], &expected));
    }

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(parse_hex("00ff7F"), Some(vec![0x00, 0xff, 0x7f]));
        assert_eq!(to_hex(&[0x00, 0xff, 0x7f]), "00ff7f");
        assert_eq!(parse_hex("abc"), None);
        assert_eq!(parse_hex("zz"), None);
    }
}
