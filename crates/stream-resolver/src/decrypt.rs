//! CryptoJS-compatible AES-256-CBC payload decryption.
//!
//! Embed hosts encrypt their source lists with the default CryptoJS
//! passphrase format: base64 of `"Salted__" ‖ salt(8) ‖ ciphertext`, with the
//! key and IV derived from the passphrase and salt. Hosts differ only in the
//! key derivation, selected with [`Derivation`].

use crate::error::DecryptError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::Sha1;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const SALT_MAGIC: &[u8; 8] = b"Salted__";
const BLOCK_SIZE: usize = 16;
const KEY_SIZE: usize = 32;
const KEY_IV_SIZE: usize = KEY_SIZE + BLOCK_SIZE;

/// Iteration count used by hosts with PBKDF2 key derivation
pub const PBKDF2_ITERATIONS: u32 = 1000;

/// Key/IV derivation for salted payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// OpenSSL `EVP_BytesToKey` with MD5, one round (CryptoJS default)
    EvpMd5,
    /// PBKDF2-HMAC-SHA1
    Pbkdf2Sha1 { iterations: u32 },
}

impl Derivation {
    pub fn pbkdf2() -> Self {
        Derivation::Pbkdf2Sha1 {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Derive the 48-byte `key ‖ iv` block
    fn derive(&self, passphrase: &[u8], salt: &[u8]) -> [u8; KEY_IV_SIZE] {
        let mut out = [0u8; KEY_IV_SIZE];
        match self {
            Derivation::EvpMd5 => {
                let mut filled = 0;
                let mut previous: Option<md5::Digest> = None;
                while filled < KEY_IV_SIZE {
                    let mut context = md5::Context::new();
                    if let Some(digest) = &previous {
                        context.consume(digest.0);
                    }
                    context.consume(passphrase);
                    context.consume(salt);
                    let digest = context.compute();

                    let take = (KEY_IV_SIZE - filled).min(digest.0.len());
                    out[filled..filled + take].copy_from_slice(&digest.0[..take]);
                    filled += take;
                    previous = Some(digest);
                }
            }
            Derivation::Pbkdf2Sha1 { iterations } => {
                pbkdf2::pbkdf2_hmac::<Sha1>(passphrase, salt, *iterations, &mut out);
            }
        }
        out
    }
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Derivation::EvpMd5 => f.write_str("evp"),
            Derivation::Pbkdf2Sha1 { iterations } => write!(f, "pbkdf2({iterations})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown key derivation '{0}' (expected evp or pbkdf2)")]
pub struct UnknownDerivation(pub String);

impl FromStr for Derivation {
    type Err = UnknownDerivation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evp" | "md5" => Ok(Derivation::EvpMd5),
            "pbkdf2" => Ok(Derivation::pbkdf2()),
            _ => Err(UnknownDerivation(s.to_string())),
        }
    }
}

/// Decrypt a base64 payload with `passphrase`
///
/// Salted payloads derive key and IV with `derivation`. Unsalted payloads
/// carry the IV in their first 16 bytes and use the passphrase itself as
/// the key, zero-padded or truncated to 32 bytes.
pub fn decrypt(
    payload: &str,
    passphrase: &str,
    derivation: Derivation,
) -> Result<String, DecryptError> {
    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| DecryptError::InvalidBase64(e.to_string()))?;

    if data.len() < BLOCK_SIZE {
        return Err(DecryptError::TooShort(data.len()));
    }

    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; BLOCK_SIZE];
    let ciphertext = if data.starts_with(SALT_MAGIC) {
        let block = derivation.derive(passphrase.as_bytes(), &data[8..16]);
        key.copy_from_slice(&block[..KEY_SIZE]);
        iv.copy_from_slice(&block[KEY_SIZE..]);
        &data[16..]
    } else {
        let raw = passphrase.as_bytes();
        let len = raw.len().min(KEY_SIZE);
        key[..len].copy_from_slice(&raw[..len]);
        iv.copy_from_slice(&data[..BLOCK_SIZE]);
        &data[BLOCK_SIZE..]
    };

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(DecryptError::Misaligned(ciphertext.len()));
    }

    let mut buf = ciphertext.to_vec();
    let decrypted = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| DecryptError::Misaligned(ciphertext.len()))?;

    let plaintext = strip_pkcs7(decrypted)?;
    String::from_utf8(plaintext.to_vec()).map_err(|_| DecryptError::InvalidUtf8)
}

/// Encrypt `plaintext` into the salted CryptoJS format
///
/// Inverse of [`decrypt`]; used to build fixtures for hosts that publish
/// their sources encrypted.
pub fn encrypt_salted(
    plaintext: &str,
    passphrase: &str,
    salt: [u8; 8],
    derivation: Derivation,
) -> Result<String, DecryptError> {
    let block = derivation.derive(passphrase.as_bytes(), &salt);
    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; BLOCK_SIZE];
    key.copy_from_slice(&block[..KEY_SIZE]);
    iv.copy_from_slice(&block[KEY_SIZE..]);

    let bytes = plaintext.as_bytes();
    let mut buf = vec![0u8; bytes.len() + BLOCK_SIZE];
    buf[..bytes.len()].copy_from_slice(bytes);
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, bytes.len())
        .map_err(|_| DecryptError::InvalidPadding)?;

    let mut out = Vec::with_capacity(16 + ciphertext.len());
    out.extend_from_slice(SALT_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(ciphertext);
    Ok(STANDARD.encode(out))
}

/// Validate and strip PKCS#7 padding
fn strip_pkcs7(data: &[u8]) -> Result<&[u8], DecryptError> {
    let pad = match data.last() {
        Some(&byte) => byte as usize,
        None => return Err(DecryptError::EmptyPlaintext),
    };

    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return Err(DecryptError::InvalidPadding);
    }

    let (plaintext, padding) = data.split_at(data.len() - pad);
    if padding.iter().any(|&byte| byte as usize != pad) {
        return Err(DecryptError::InvalidPadding);
    }

    if plaintext.is_empty() {
        return Err(DecryptError::EmptyPlaintext);
    }

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAINTEXT: &str = r#"[{"file":"https://cdn.example/master.m3u8","type":"hls"}]"#;
    const SALT: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

    // Produced by `openssl enc -aes-256-cbc` with the same salt and passphrase.
    const OPENSSL_EVP: &str = "U2FsdGVkX18BAgMEBQYHCFDBHPWUETvSUjp8bEKsKfLBjDTERcjE4FkFPNoBzlbxVLhWHD7EVWIf0sE3Malex/6XjPWgsi+VGiwjdJgd6qE=";
    const OPENSSL_PBKDF2: &str = "U2FsdGVkX18BAgMEBQYHCHHxtzMGHBVaYjxR8rw2rMccSC5tqWAQbZ7ToZncSfy+TqmHNzBTkOPvEsIPm86chhc0vpvWh2cYZT4rYsX9DP0=";
    // IV 00..0f, key "short-key" zero-padded.
    const OPENSSL_UNSALTED: &str = "AAECAwQFBgcICQoLDA0OD+AotivHLUEhYBu2CawFj8WezqyyU0CQB/wgjqtJSu+IK24IOAxQcEbmJTjxwIUD8rzowKZrr1f0yYhVwEpzY3U=";

    /// Encrypt raw blocks without adding padding
    fn encrypt_unpadded(data: &[u8], passphrase: &str) -> String {
        let block = Derivation::EvpMd5.derive(passphrase.as_bytes(), &SALT);
        let mut buf = data.to_vec();
        let len = buf.len();
        let ciphertext = Aes256CbcEnc::new_from_slices(&block[..32], &block[32..])
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .unwrap()
            .to_vec();

        let mut out = SALT_MAGIC.to_vec();
        out.extend_from_slice(&SALT);
        out.extend_from_slice(&ciphertext);
        STANDARD.encode(out)
    }

    #[test]
    fn test_decrypts_openssl_evp_output() {
        let plaintext = decrypt(OPENSSL_EVP, "test-passphrase", Derivation::EvpMd5).unwrap();
        assert_eq!(plaintext, PLAINTEXT);
    }

    #[test]
    fn test_decrypts_openssl_pbkdf2_output() {
        let plaintext = decrypt(OPENSSL_PBKDF2, "test-passphrase", Derivation::pbkdf2()).unwrap();
        assert_eq!(plaintext, PLAINTEXT);
    }

    #[test]
    fn test_decrypts_unsalted_payload() {
        let plaintext = decrypt(OPENSSL_UNSALTED, "short-key", Derivation::EvpMd5).unwrap();
        assert_eq!(plaintext, PLAINTEXT);
    }

    #[test]
    fn test_encrypt_salted_matches_openssl() {
        assert_eq!(
            encrypt_salted(PLAINTEXT, "test-passphrase", SALT, Derivation::EvpMd5).unwrap(),
            OPENSSL_EVP
        );
        assert_eq!(
            encrypt_salted(PLAINTEXT, "test-passphrase", SALT, Derivation::pbkdf2()).unwrap(),
            OPENSSL_PBKDF2
        );
    }

    #[test]
    fn test_round_trip_with_block_aligned_plaintext() {
        let plaintext = "0123456789abcdef";
        let payload = encrypt_salted(plaintext, "k", SALT, Derivation::EvpMd5).unwrap();
        assert_eq!(decrypt(&payload, "k", Derivation::EvpMd5).unwrap(), plaintext);
    }

    #[test]
    fn test_rejects_mismatched_padding_bytes() {
        let mut block = *b"hello world!!\x03\x03\x02";
        let payload = encrypt_unpadded(&block, "k");
        assert_eq!(
            decrypt(&payload, "k", Derivation::EvpMd5),
            Err(DecryptError::InvalidPadding)
        );

        block[15] = 0x11;
        let payload = encrypt_unpadded(&block, "k");
        assert_eq!(
            decrypt(&payload, "k", Derivation::EvpMd5),
            Err(DecryptError::InvalidPadding)
        );

        block[15] = 0x00;
        let payload = encrypt_unpadded(&block, "k");
        assert_eq!(
            decrypt(&payload, "k", Derivation::EvpMd5),
            Err(DecryptError::InvalidPadding)
        );
    }

    #[test]
    fn test_rejects_padding_only_plaintext() {
        let payload = encrypt_unpadded(&[0x10; 16], "k");
        assert_eq!(
            decrypt(&payload, "k", Derivation::EvpMd5),
            Err(DecryptError::EmptyPlaintext)
        );
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(
            decrypt("not base64!", "k", Derivation::EvpMd5),
            Err(DecryptError::InvalidBase64(_))
        ));
        assert_eq!(
            decrypt(&STANDARD.encode(b"Salted__"), "k", Derivation::EvpMd5),
            Err(DecryptError::TooShort(8))
        );

        let mut misaligned = SALT_MAGIC.to_vec();
        misaligned.extend_from_slice(&SALT);
        misaligned.extend_from_slice(&[0u8; 5]);
        assert_eq!(
            decrypt(&STANDARD.encode(misaligned), "k", Derivation::EvpMd5),
            Err(DecryptError::Misaligned(5))
        );
    }

    #[test]
    fn test_parse_derivation() {
        assert_eq!("pbkdf2".parse::<Derivation>().unwrap(), Derivation::pbkdf2());
        assert_eq!("EVP".parse::<Derivation>().unwrap(), Derivation::EvpMd5);
        assert!("scrypt".parse::<Derivation>().is_err());
    }
}
