//! AES-256-CFB8 packet encryption with SHA-256 checksums.
//!
//! Each direction is one continuous CFB8 stream: a packet picks up the
//! cipher state where the previous packet left it. Every encrypted payload
//! carries an 8-byte trailer
//!
//! ```text
//! SHA256(counter_le_u64 || plaintext || key)[..8]
//! ```
//!
//! where the counter is the number of packets previously sent in that
//! direction. A replayed, dropped or altered packet breaks the check.

use aes::Aes256;
use bytes::{BufMut, Bytes, BytesMut};
use cfb8::cipher::generic_array::GenericArray;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cfb8::{Decryptor, Encryptor};
use sha2::{Digest, Sha256};

use crate::CryptoError;

pub const CHECKSUM_LEN: usize = 8;

pub struct PacketEncryption {
    encryptor: Encryptor<Aes256>,
    decryptor: Decryptor<Aes256>,
    key: [u8; 32],
    send_counter: u64,
    recv_counter: u64,
}

impl PacketEncryption {
    pub fn new(key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            encryptor: Encryptor::<Aes256>::new(key.into(), iv.into()),
            decryptor: Decryptor::<Aes256>::new(key.into(), iv.into()),
            key: *key,
            send_counter: 0,
            recv_counter: 0,
        }
    }

    /// Append the checksum to `plaintext` and encrypt both.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Bytes {
        let checksum = checksum(self.send_counter, plaintext, &self.key);
        self.send_counter += 1;

        let mut data = BytesMut::with_capacity(plaintext.len() + CHECKSUM_LEN);
        data.put_slice(plaintext);
        data.put_slice(&checksum);
        for byte in data.iter_mut() {
            self.encryptor
                .encrypt_block_mut(GenericArray::from_mut_slice(std::slice::from_mut(byte)));
        }
        data.freeze()
    }

    /// Decrypt and verify. The receive counter advances even when the
    /// checksum fails; the caller is expected to drop the connection.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Bytes, CryptoError> {
        if data.len() < CHECKSUM_LEN {
            return Err(CryptoError::PayloadTooShort(data.len()));
        }

        let mut buf = BytesMut::from(data);
        for byte in buf.iter_mut() {
            self.decryptor
                .decrypt_block_mut(GenericArray::from_mut_slice(std::slice::from_mut(byte)));
        }

        let counter = self.recv_counter;
        self.recv_counter += 1;

        let trailer = buf.split_off(buf.len() - CHECKSUM_LEN);
        if trailer[..] != checksum(counter, &buf, &self.key) {
            return Err(CryptoError::ChecksumMismatch { counter });
        }
        Ok(buf.freeze())
    }

    pub fn send_counter(&self) -> u64 {
        self.send_counter
    }

    pub fn recv_counter(&self) -> u64 {
        self.recv_counter
    }
}

fn checksum(counter: u64, payload: &[u8], key: &[u8; 32]) -> [u8; CHECKSUM_LEN] {
    let hash = Sha256::new()
        .chain_update(counter.to_le_bytes())
        .chain_update(payload)
        .chain_update(key)
        .finalize();
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash[..CHECKSUM_LEN]);
    out
}
