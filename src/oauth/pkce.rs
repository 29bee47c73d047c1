//! Usage: PKCE verifier/challenge generation for the GitHub authorization code flow.
//!
//! Randomness and hashing are injected capabilities so the generator can be driven by
//! deterministic stand-ins in tests. The production random source MUST be a CSPRNG: a
//! guessable verifier lets anyone who intercepts the authorization code redeem it.

use crate::shared::error::AppResult;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// RFC 7636 unreserved characters: `[A-Za-z0-9-._~]`.
pub const VERIFIER_ALPHABET: &[u8; 66] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
pub const DEFAULT_VERIFIER_LENGTH: usize = 64;
const RFC_MIN_VERIFIER_LENGTH: usize = 43;
const RFC_MAX_VERIFIER_LENGTH: usize = 128;
// Largest multiple of 66 that fits in a byte; bytes at or above it are rejected.
const REJECTION_BOUND: u8 = (256 / VERIFIER_ALPHABET.len() * VERIFIER_ALPHABET.len()) as u8;

pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Operating-system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

pub trait ChallengeHasher: Send + Sync {
    fn sha256(&self, input: &[u8]) -> [u8; 32];
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ChallengeHasher for Sha256Hasher {
    fn sha256(&self, input: &[u8]) -> [u8; 32] {
        Sha256::digest(input).into()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

impl PkcePair {
    pub fn generate(
        rng: &dyn RandomSource,
        hasher: &dyn ChallengeHasher,
        length: usize,
    ) -> AppResult<Self> {
        let code_verifier = generate_verifier(rng, length)?;
        let code_challenge = derive_challenge(hasher, &code_verifier);
        Ok(Self {
            code_verifier,
            code_challenge,
        })
    }
}

/// Draws `length` characters uniformly from [`VERIFIER_ALPHABET`] by rejection sampling.
pub fn generate_verifier(rng: &dyn RandomSource, length: usize) -> AppResult<String> {
    if length == 0 {
        return Err("SEC_INVALID_INPUT: code verifier length must be at least 1"
            .to_string()
            .into());
    }
    if !(RFC_MIN_VERIFIER_LENGTH..=RFC_MAX_VERIFIER_LENGTH).contains(&length) {
        tracing::warn!(
            length,
            "code verifier length is outside the 43..=128 range providers expect"
        );
    }

    let mut verifier = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while verifier.len() < length {
        rng.fill_bytes(&mut buf);
        for byte in buf {
            if byte >= REJECTION_BOUND {
                continue;
            }
            let idx = usize::from(byte) % VERIFIER_ALPHABET.len();
            verifier.push(char::from(VERIFIER_ALPHABET[idx]));
            if verifier.len() == length {
                break;
            }
        }
    }
    Ok(verifier)
}

/// `BASE64URL-NOPAD(SHA-256(verifier))`, the S256 challenge method.
pub fn derive_challenge(hasher: &dyn ChallengeHasher, verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(hasher.sha256(verifier.as_bytes()))
}
