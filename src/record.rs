//! Record layer: the ChaCha20-Poly1305 AEAD framing that wraps every byte
//! of HTTP traffic after pair-verify completes.
//!
//! Frame layout: 2-byte little-endian length `L` (1..=1024), `L` bytes of
//! ciphertext, 16-byte Poly1305 tag. The length prefix itself is the AEAD's
//! associated data. Nonces are per-direction monotonic counters; HAP does
//! not use 96-bit random nonces here, the framing protocol takes the
//! channel's ordering guarantee as the nonce instead.

use bytes::{Buf, BufMut, BytesMut};

use crate::crypto::{ChaCha20Poly1305Cipher, CryptoError, Nonce};

/// Maximum plaintext bytes per frame (spec §4.4: `L` is `1..=1024`).
pub const MAX_FRAME_SIZE: usize = 1024;
const TAG_SIZE: usize = 16;
const LENGTH_SIZE: usize = 2;

/// Per-session AEAD framing state. One `RecordLayer` is created once
/// pair-verify completes and lives for the rest of the connection.
pub struct RecordLayer {
    write_key: [u8; 32],
    read_key: [u8; 32],
    write_counter: u64,
    read_counter: u64,
    input: BytesMut,
}

impl RecordLayer {
    /// `write_key` encrypts accessory -> controller frames, `read_key`
    /// decrypts controller -> accessory frames.
    #[must_use]
    pub fn new(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        Self {
            write_key,
            read_key,
            write_counter: 0,
            read_counter: 0,
            input: BytesMut::with_capacity(4096),
        }
    }

    /// Chunk `plaintext` into `<= MAX_FRAME_SIZE` pieces and frame each one
    /// independently, incrementing the write counter once per frame.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, RecordError> {
        let cipher = ChaCha20Poly1305Cipher::new(&self.write_key).map_err(RecordError::Crypto)?;
        let mut out = Vec::with_capacity(plaintext.len() + plaintext.len() / MAX_FRAME_SIZE * (LENGTH_SIZE + TAG_SIZE) + LENGTH_SIZE + TAG_SIZE);

        if plaintext.is_empty() {
            self.encrypt_one(&cipher, &[], &mut out)?;
            return Ok(out);
        }

        for chunk in plaintext.chunks(MAX_FRAME_SIZE) {
            self.encrypt_one(&cipher, chunk, &mut out)?;
        }
        Ok(out)
    }

    fn encrypt_one(&mut self, cipher: &ChaCha20Poly1305Cipher, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), RecordError> {
        #[allow(clippy::cast_possible_truncation, reason = "chunk length is bounded by MAX_FRAME_SIZE")]
        let len_prefix = (chunk.len() as u16).to_le_bytes();

        let nonce = Nonce::from_counter(self.write_counter);
        self.write_counter += 1;

        let ciphertext = cipher
            .encrypt_with_aad(&nonce, &len_prefix, chunk)
            .map_err(RecordError::Crypto)?;

        out.extend_from_slice(&len_prefix);
        out.extend_from_slice(&ciphertext);
        Ok(())
    }

    /// Feed raw bytes received from the socket into the reassembly buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
    }

    /// Decrypt one complete frame, if the buffer holds one. `Ok(None)`
    /// means more bytes are needed.
    pub fn decrypt(&mut self) -> Result<Option<Vec<u8>>, RecordError> {
        if self.input.len() < LENGTH_SIZE {
            return Ok(None);
        }

        let len_prefix = [self.input[0], self.input[1]];
        let plaintext_len = u16::from_le_bytes(len_prefix) as usize;
        if plaintext_len > MAX_FRAME_SIZE {
            return Err(RecordError::InvalidFrameLength(plaintext_len));
        }

        let frame_len = LENGTH_SIZE + plaintext_len + TAG_SIZE;
        if self.input.len() < frame_len {
            return Ok(None);
        }

        let _ = self.input.get_u16_le();
        let ciphertext = self.input.split_to(plaintext_len + TAG_SIZE);

        let cipher = ChaCha20Poly1305Cipher::new(&self.read_key).map_err(RecordError::Crypto)?;
        let nonce = Nonce::from_counter(self.read_counter);
        self.read_counter += 1;

        let plaintext = cipher
            .decrypt_with_aad(&nonce, &len_prefix, &ciphertext)
            .map_err(|_| RecordError::AuthFailed)?;

        Ok(Some(plaintext))
    }

    /// Decrypt every complete frame currently buffered.
    pub fn decrypt_all(&mut self) -> Result<Vec<Vec<u8>>, RecordError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.decrypt()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[must_use]
    pub fn write_counter(&self) -> u64 {
        self.write_counter
    }

    #[must_use]
    pub fn read_counter(&self) -> u64 {
        self.read_counter
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("frame length {0} exceeds the 1024-byte maximum")]
    InvalidFrameLength(usize),

    /// AEAD tag verification failed; the session must be closed.
    #[error("AEAD authentication failed")]
    AuthFailed,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
