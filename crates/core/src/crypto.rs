//! Crypto primitives for secret-at-rest protection.
//!
//! AES-256-GCM sealing for reversible secrets (client secrets, PKCE
//! challenges), keyed HMAC-SHA-256 for the grant-code lookup column, and
//! constant-time comparison for anything token-like. All keys are derived
//! from a single server base secret with HKDF-SHA-256 and a fixed per-field
//! salt, so rotating the base secret rotates every field key.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// AES-256-GCM with the 16-byte IV the stored format uses.
type SecretCipher = AesGcm<Aes256, U16>;

/// Random IV length prepended to every ciphertext.
const IV_LEN: usize = 16;

/// Zero sentinel prefixed to plaintext before sealing. A decryption with the
/// wrong key that somehow passes the GCM tag still fails the sentinel check.
const SENTINEL: [u8; 4] = [0u8; 4];

/// Number of random bytes behind generated codes and secrets (256 bits).
const TOKEN_BYTES: usize = 32;

/// Crypto failures. Deliberately carry no plaintext or key material.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("mac computation failed")]
    Mac,
}

/// Per-field keys derived from the server base secret.
///
/// Derived once at startup and held read-only for the process lifetime.
#[derive(Clone)]
pub struct Keys {
    client_secret: [u8; 32],
    code_challenge: [u8; 32],
    grant_code: [u8; 32],
}

impl Keys {
    /// Derive all field keys from `base_secret` (must be at least 32 bytes).
    pub fn derive(base_secret: &[u8]) -> Result<Self, CryptoError> {
        if base_secret.len() < 32 {
            return Err(CryptoError::KeyDerivation);
        }
        Ok(Self {
            client_secret: derive_key(base_secret, b"consentry.client.secret")?,
            code_challenge: derive_key(base_secret, b"consentry.grant.code_challenge")?,
            grant_code: derive_key(base_secret, b"consentry.grant.code")?,
        })
    }

    /// Seal a client secret for storage.
    pub fn seal_client_secret(&self, secret: &str) -> Result<Vec<u8>, CryptoError> {
        seal(&self.client_secret, secret.as_bytes())
    }

    /// Open a stored client secret.
    pub fn open_client_secret(&self, sealed: &[u8]) -> Result<String, CryptoError> {
        let plaintext = open(&self.client_secret, sealed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }

    /// Seal a PKCE code challenge for storage.
    pub fn seal_code_challenge(&self, challenge: &str) -> Result<Vec<u8>, CryptoError> {
        seal(&self.code_challenge, challenge.as_bytes())
    }

    /// Open a stored PKCE code challenge.
    pub fn open_code_challenge(&self, sealed: &[u8]) -> Result<String, CryptoError> {
        let plaintext = open(&self.code_challenge, sealed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }

    /// Keyed hash of an authorization code for exact-equality lookup.
    ///
    /// The raw code never reaches the database; a leaked table cannot be
    /// replayed against the token endpoint.
    pub fn code_hash(&self, code: &str) -> Result<String, CryptoError> {
        let mut mac =
            <Hmac<Sha256> as Mac>::new_from_slice(&self.grant_code).map_err(|_| CryptoError::Mac)?;
        mac.update(code.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys").finish()
    }
}

/// HKDF-SHA-256 with a fixed per-field salt, 32-byte output.
pub fn derive_key(base_secret: &[u8], salt: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), base_secret);
    let mut okm = [0u8; 32];
    hk.expand(&[], &mut okm)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(okm)
}

/// Encrypt `plaintext` under `key`: random 16-byte IV, then
/// AES-256-GCM over the sentinel-prefixed plaintext. Output is IV ‖ ciphertext.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = SecretCipher::new(key.into());

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::<U16>::from_slice(&iv);

    let mut buf = Vec::with_capacity(SENTINEL.len() + plaintext.len());
    buf.extend_from_slice(&SENTINEL);
    buf.extend_from_slice(plaintext);

    let ciphertext = cipher
        .encrypt(nonce, buf.as_slice())
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverse of [`seal`]. Fails on a bad tag or a missing sentinel.
pub fn open(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < IV_LEN {
        return Err(CryptoError::Decrypt);
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);

    let cipher = SecretCipher::new(key.into());
    let nonce = Nonce::<U16>::from_slice(iv);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Decrypt)?;

    if plaintext.len() < SENTINEL.len() || plaintext[..SENTINEL.len()] != SENTINEL {
        return Err(CryptoError::Decrypt);
    }
    Ok(plaintext[SENTINEL.len()..].to_vec())
}

/// Compare two byte strings in constant time.
///
/// Differing lengths short-circuit; length is not secret for any field this
/// guards (secrets and codes have fixed generated lengths).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Generate a fresh 256-bit random token, URL-safe base64 without padding.
pub fn random_urlsafe() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `base64url_nopad(SHA256(verifier))` — the S256 transform of RFC 7636.
pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Verify an S256 code verifier against a stored challenge, in constant time.
pub fn pkce_verify(challenge: &str, verifier: &str) -> bool {
    constant_time_eq(pkce_challenge(verifier).as_bytes(), challenge.as_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn test_keys() -> Keys {
        Keys::derive(b"a-base-secret-that-is-long-enough-for-hkdf").unwrap()
    }

    #[test]
    fn derive_rejects_short_secret() {
        assert!(matches!(
            Keys::derive(b"too short"),
            Err(CryptoError::KeyDerivation)
        ));
    }

    #[test]
    fn derived_keys_differ_per_field() {
        let base = b"a-base-secret-that-is-long-enough-for-hkdf";
        let a = derive_key(base, b"consentry.client.secret").unwrap();
        let b = derive_key(base, b"consentry.grant.code").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = derive_key(b"a-base-secret-that-is-long-enough-for-hkdf", b"t").unwrap();
        let sealed = seal(&key, b"some secret value").unwrap();
        assert_eq!(open(&key, &sealed).unwrap(), b"some secret value");
    }

    #[test]
    fn seal_is_randomized() {
        let key = derive_key(b"a-base-secret-that-is-long-enough-for-hkdf", b"t").unwrap();
        let a = seal(&key, b"same plaintext").unwrap();
        let b = seal(&key, b"same plaintext").unwrap();
        assert_ne!(a, b);
        assert_eq!(open(&key, &a).unwrap(), open(&key, &b).unwrap());
    }

    #[test]
    fn open_with_wrong_key_errors() {
        let base = b"a-base-secret-that-is-long-enough-for-hkdf";
        let key = derive_key(base, b"one").unwrap();
        let wrong = derive_key(base, b"two").unwrap();
        let sealed = seal(&key, b"secret").unwrap();
        assert!(matches!(open(&wrong, &sealed), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn open_truncated_errors() {
        let key = derive_key(b"a-base-secret-that-is-long-enough-for-hkdf", b"t").unwrap();
        assert!(open(&key, &[0u8; 7]).is_err());
    }

    #[test]
    fn client_secret_roundtrip() {
        let keys = test_keys();
        let sealed = keys.seal_client_secret("s3cr3t").unwrap();
        assert_eq!(keys.open_client_secret(&sealed).unwrap(), "s3cr3t");
    }

    #[test]
    fn code_hash_is_stable_and_keyed() {
        let keys = test_keys();
        let other = Keys::derive(b"another-base-secret-that-is-long-enough!!").unwrap();

        let h1 = keys.code_hash("some-code").unwrap();
        let h2 = keys.code_hash("some-code").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, keys.code_hash("other-code").unwrap());
        assert_ne!(h1, other.code_hash("some-code").unwrap());
    }

    #[test]
    fn random_tokens_are_distinct_and_urlsafe() {
        let a = random_urlsafe();
        let b = random_urlsafe();
        assert_ne!(a, b);
        // 32 bytes of base64url without padding.
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn pkce_s256_verification() {
        // Verifier from RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = pkce_challenge(verifier);
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
        assert!(pkce_verify(&challenge, verifier));
        assert!(!pkce_verify(&challenge, "wrong-verifier"));
    }

    #[test]
    fn constant_time_eq_handles_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
