// Copyright (c) 2024 Lattice Wallet Contributors

//! Crypto envelope (spec §4.1): password-based KEK derivation, 256-bit
//! symmetric wrap/unwrap, and the in-memory XOR-share ("fan") representation
//! of the current KEK.
//!
//! Grounded on the teacher's `db/encryption.rs` (Blake2b-domain-tag expansion
//! feeding an AES-256-GCM key+nonce pair) and `service/password_manager.rs`
//! (argon2 password hashing with a deterministic Blake2b-derived salt).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use blake2::{Blake2b512, Digest};
use displaydoc::Display;
use rand_core::{CryptoRng, RngCore};

pub const RAW_KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
const ARGON2_DOMAIN_TAG: &[u8] = b"latwallet-kek-v1";
const NONCE_LEN: usize = 12;

pub type RawKey = [u8; RAW_KEY_LEN];
pub type Salt = [u8; SALT_LEN];
pub type Ciphertext = Vec<u8>;

#[derive(Display, Debug)]
pub enum CryptoError {
    /// Argon2 error: {0}
    Argon2(argon2::Error),

    /// AEAD error during wrap/unwrap (wrong key, corrupt ciphertext, or wrong length)
    Aead,
}

impl From<argon2::Error> for CryptoError {
    fn from(src: argon2::Error) -> Self {
        Self::Argon2(src)
    }
}

/// Derives a KEK from `password` and `salt`. Deterministic: the same pair
/// always yields the same key, which is what lets `attempt_password` work
/// without ever storing the password itself.
pub fn derive_kek(password: &str, salt: &Salt) -> Result<RawKey, CryptoError> {
    let config = argon2::Config {
        variant: argon2::Variant::Argon2id,
        ..argon2::Config::default()
    };
    let hash = argon2::hash_raw(password.as_bytes(), salt_material(salt).as_slice(), &config)?;
    let mut kek = [0u8; RAW_KEY_LEN];
    kek.copy_from_slice(&hash[..RAW_KEY_LEN]);
    Ok(kek)
}

/// Combines the wallet's random salt with a fixed domain tag so that the
/// KDF's salt parameter (which argon2 treats as arbitrary bytes, not
/// necessarily secret) stays namespaced to this application.
fn salt_material(salt: &Salt) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update(ARGON2_DOMAIN_TAG);
    hasher.update(salt);
    hasher.finalize()[..SALT_LEN].to_vec()
}

/// Derives the 96-bit GCM nonce from the first 128 bits ("IV material") of
/// the wallet salt, per spec §4.1.
fn iv_from_salt(salt: &Salt) -> Nonce {
    *Nonce::from_slice(&salt[..NONCE_LEN])
}

/// Wraps (encrypts) a 256-bit key under `wrapping_key`, using the IV derived
/// from `salt`.
pub fn wrap(plaintext_key: &RawKey, wrapping_key: &RawKey, salt: &Salt) -> Ciphertext {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(wrapping_key));
    let nonce = iv_from_salt(salt);
    // Only fails if the plaintext somehow exceeds AES-GCM's maximum message
    // size (well beyond a 256-bit key); unreachable for our fixed-size input.
    cipher
        .encrypt(&nonce, plaintext_key.as_slice())
        .expect("256-bit plaintext is always within AES-GCM's message size limit")
}

/// Unwraps (decrypts) a ciphertext produced by [`wrap`]. Fails if `ciphertext`
/// was not produced under this `(wrapping_key, salt)` pair.
pub fn unwrap(ciphertext: &[u8], wrapping_key: &RawKey, salt: &Salt) -> Result<RawKey, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(wrapping_key));
    let nonce = iv_from_salt(salt);
    let plaintext = cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|_| CryptoError::Aead)?;
    if plaintext.len() != RAW_KEY_LEN {
        return Err(CryptoError::Aead);
    }
    let mut key = [0u8; RAW_KEY_LEN];
    key.copy_from_slice(&plaintext);
    Ok(key)
}

/// Encrypts `plaintext` (of arbitrary length, used for the all-zeros check
/// value) the same way [`wrap`] does.
pub fn encrypt_bytes(plaintext: &[u8], key: &RawKey, salt: &Salt) -> Ciphertext {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = iv_from_salt(salt);
    cipher
        .encrypt(&nonce, plaintext)
        .expect("check-value plaintext is always within AES-GCM's message size limit")
}

/// The number of XOR shares the KEK is split into while resident in memory.
/// Reconstructing requires XOR-ing all shares together; no single share
/// leaks the key, which narrows the window in which a core dump could
/// recover a contiguous password-derived key.
const FAN_SHARES: usize = 4;

/// XOR-share ("fan") in-memory representation of the current KEK (spec
/// §4.1, §9 "Password fan"). `get()` reconstructs the key by XOR-ing all
/// shares; `set(k)` regenerates a fresh random split; `lock()` is `set([0; 32])`.
#[derive(Clone)]
pub struct PasswordFan {
    shares: [RawKey; FAN_SHARES],
}

impl Default for PasswordFan {
    fn default() -> Self {
        let mut fan = Self {
            shares: [[0u8; RAW_KEY_LEN]; FAN_SHARES],
        };
        fan.set(&[0u8; RAW_KEY_LEN]);
        fan
    }
}

impl PasswordFan {
    /// Reconstructs the key by XOR-ing every share together.
    pub fn get(&self) -> RawKey {
        let mut key = [0u8; RAW_KEY_LEN];
        for share in &self.shares {
            for (k, s) in key.iter_mut().zip(share.iter()) {
                *k ^= s;
            }
        }
        key
    }

    /// Splits `key` into `FAN_SHARES` random shares whose XOR is `key`.
    pub fn set_with_rng<R: RngCore + CryptoRng>(&mut self, key: &RawKey, rng: &mut R) {
        let mut accumulator = [0u8; RAW_KEY_LEN];
        for share in self.shares.iter_mut().take(FAN_SHARES - 1) {
            rng.fill_bytes(share);
            for (a, s) in accumulator.iter_mut().zip(share.iter()) {
                *a ^= s;
            }
        }
        let last = &mut self.shares[FAN_SHARES - 1];
        for i in 0..RAW_KEY_LEN {
            last[i] = accumulator[i] ^ key[i];
        }
    }

    /// Convenience wrapper over [`set_with_rng`] using the thread RNG.
    pub fn set(&mut self, key: &RawKey) {
        self.set_with_rng(key, &mut rand::thread_rng());
    }

    /// Zeroes the fan so it reconstructs to the all-zero key.
    pub fn lock(&mut self) {
        self.set(&[0u8; RAW_KEY_LEN]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_round_trip() {
        let key = [7u8; RAW_KEY_LEN];
        let wrapping_key = [9u8; RAW_KEY_LEN];
        let salt = [3u8; SALT_LEN];

        let ct = wrap(&key, &wrapping_key, &salt);
        let pt = unwrap(&ct, &wrapping_key, &salt).unwrap();
        assert_eq!(pt, key);
    }

    #[test]
    fn unwrap_with_wrong_key_fails() {
        let key = [7u8; RAW_KEY_LEN];
        let wrapping_key = [9u8; RAW_KEY_LEN];
        let wrong_key = [10u8; RAW_KEY_LEN];
        let salt = [3u8; SALT_LEN];

        let ct = wrap(&key, &wrapping_key, &salt);
        assert!(unwrap(&ct, &wrong_key, &salt).is_err());
    }

    #[test]
    fn derive_kek_is_deterministic() {
        let salt = [1u8; SALT_LEN];
        let a = derive_kek("hunter2", &salt).unwrap();
        let b = derive_kek("hunter2", &salt).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fan_reconstructs_after_set() {
        let mut fan = PasswordFan::default();
        assert_eq!(fan.get(), [0u8; RAW_KEY_LEN]);

        let key = [42u8; RAW_KEY_LEN];
        fan.set(&key);
        assert_eq!(fan.get(), key);

        fan.lock();
        assert_eq!(fan.get(), [0u8; RAW_KEY_LEN]);
    }
}
