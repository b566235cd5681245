//! At-rest protection for the vault: AES-256-GCM for session content and
//! Argon2 PHC strings for the passphrase.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::{rngs::OsRng, RngCore};
use tracing::info;

use super::VaultError;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Prefix every supported passphrase record starts with
pub const PHC_PREFIX: &str = "$argon2";

pub type VaultKey = [u8; KEY_LEN];

pub fn generate_key() -> VaultKey {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Read the base64 key at `path`, or create one there if the file is missing
pub fn load_or_create_key(path: &Path) -> Result<VaultKey, VaultError> {
    match fs::read_to_string(path) {
        Ok(encoded) => decode_key(encoded.trim()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let key = generate_key();
            let mut options = OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(path)?;
            file.write_all(B64.encode(key).as_bytes())?;
            info!(path = %path.display(), "created vault key");
            Ok(key)
        }
        Err(e) => Err(e.into()),
    }
}

fn decode_key(encoded: &str) -> Result<VaultKey, VaultError> {
    let bytes = B64
        .decode(encoded)
        .map_err(|e| VaultError::Corrupt(format!("vault key: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| VaultError::Corrupt(format!("vault key length {}", b.len())))
}

fn cipher(key: &VaultKey) -> Result<Aes256Gcm, VaultError> {
    Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::Crypto(e.to_string()))
}

/// base64(nonce || ciphertext || tag)
pub fn encrypt(plaintext: &[u8], key: &VaultKey) -> Result<String, VaultError> {
    let cipher = cipher(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| VaultError::Crypto(e.to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(B64.encode(combined))
}

pub fn decrypt(encoded: &str, key: &VaultKey) -> Result<Vec<u8>, VaultError> {
    let combined = B64
        .decode(encoded)
        .map_err(|e| VaultError::Corrupt(format!("ciphertext encoding: {e}")))?;
    if combined.len() <= NONCE_LEN {
        return Err(VaultError::Corrupt("ciphertext too short".to_string()));
    }

    let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
    cipher(key)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::Corrupt("ciphertext failed authentication".to_string()))
}

pub fn hash_passphrase(passphrase: &str) -> Result<String, VaultError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| VaultError::Crypto(e.to_string()))
}

pub fn verify_passphrase(passphrase: &str, stored: &str) -> Result<bool, VaultError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| VaultError::Corrupt(format!("passphrase record: {e}")))?;
    Ok(Argon2::default()
        .verify_password(passphrase.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_encrypt_then_decrypt() {
        let key = generate_key();
        let sealed = encrypt(b"dear diary", &key).unwrap();
        assert!(!sealed.contains("diary"));
        assert_eq!(decrypt(&sealed, &key).unwrap(), b"dear diary");
    }

    #[test]
    fn test_nonce_is_fresh_per_message() {
        let key = generate_key();
        assert_ne!(encrypt(b"same", &key).unwrap(), encrypt(b"same", &key).unwrap());
    }

    #[test]
    fn test_wrong_key_is_corrupt() {
        let sealed = encrypt(b"secret", &generate_key()).unwrap();
        assert!(matches!(
            decrypt(&sealed, &generate_key()),
            Err(VaultError::Corrupt(_))
        ));
        assert!(matches!(
            decrypt("not base64 at all!", &generate_key()),
            Err(VaultError::Corrupt(_))
        ));
        assert!(matches!(
            decrypt(&B64.encode([0u8; 4]), &generate_key()),
            Err(VaultError::Corrupt(_))
        ));
    }

    #[test]
    fn test_key_file_is_created_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.key");

        let first = load_or_create_key(&path).unwrap();
        let second = load_or_create_key(&path).unwrap();
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_truncated_key_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.key");
        fs::write(&path, B64.encode([1u8; 8])).unwrap();
        assert!(matches!(
            load_or_create_key(&path),
            Err(VaultError::Corrupt(_))
        ));
    }

    #[test]
    fn test_passphrase_hash_is_phc() {
        let hash = hash_passphrase("correct horse").unwrap();
        assert!(hash.starts_with(PHC_PREFIX));
        assert!(verify_passphrase("correct horse", &hash).unwrap());
        assert!(!verify_passphrase("wrong horse", &hash).unwrap());
    }
}
