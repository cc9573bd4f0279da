//! Symmetric encryption for gossip datagrams.
//!
//! When a gossip topology is configured with a shared secret, every heartbeat
//! is sealed as `IV(16) || AES-256-CBC(PKCS#7-padded payload)` with the key
//! derived as SHA-256 of the secret. Peers that cannot decrypt-and-unpad a
//! packet drop it.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the initialization vector prepended to every sealed packet.
pub const IV_SIZE: usize = 16;

/// AES block size; ciphertext length is always a multiple of this.
pub const BLOCK_SIZE: usize = 16;

const KEY_SIZE: usize = 32;

/// Errors from sealing or opening gossip packets.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Packet shorter than one IV; it cannot carry any ciphertext.
    #[error("packet too short to carry an IV")]
    TooShort,

    /// Ciphertext length is not a positive multiple of the cipher block.
    #[error("ciphertext length is not a multiple of the cipher block")]
    BadLength,

    /// Decryption or PKCS#7 unpadding failed (wrong secret or tampered data).
    #[error("decryption failed: wrong secret or corrupted packet")]
    DecryptFailed,
}

/// Packet cipher shared by all peers of one gossip topology.
///
/// The derived key is zeroed from memory when the cipher is dropped.
pub struct PacketCipher {
    key: [u8; KEY_SIZE],
}

impl Drop for PacketCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl PacketCipher {
    /// Derives the packet key from a shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Seals `plaintext` under a fresh random IV.
    #[must_use]
    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut packet = Vec::with_capacity(IV_SIZE + ciphertext.len());
        packet.extend_from_slice(&iv);
        packet.extend_from_slice(&ciphertext);
        packet
    }

    /// Opens a packet of the form `IV || ciphertext`.
    pub fn open(&self, packet: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if packet.len() < IV_SIZE {
            return Err(CryptoError::TooShort);
        }
        let (iv, ciphertext) = packet.split_at(IV_SIZE);
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::BadLength);
        }

        Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| CryptoError::DecryptFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }
}
