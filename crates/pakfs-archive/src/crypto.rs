//! Entry decryption using AES-128-CBC.
//!
//! Encrypted entries use AES-128-CBC with a zero IV and a key shared by the
//! whole archive family. Decryption happens on the raw payload, before the
//! decompressor sees it.

use std::io::{self, Read};

use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, KeyIvInit};

use crate::Error;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// The AES-128 key used by the game client.
///
/// This is hardcoded in the game client and is not a secret.
pub const DEFAULT_KEY: [u8; 16] = [
    0x5E, 0x7A, 0x20, 0x02, 0x30, 0x2E, 0xEB, 0x1A, 0x3B, 0xB6, 0x17, 0xC3, 0x0F, 0xDE, 0x1E, 0x47,
];

/// The initialization vector (all zeros).
const IV: [u8; 16] = [0u8; 16];

const BLOCK_SIZE: usize = 16;

/// Ciphertext read per refill; a multiple of the block size.
const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming CBC decryptor over a ciphertext reader.
///
/// The chaining state carries over between refills, so the plaintext is the
/// same as decrypting the whole payload at once.
pub struct DecryptReader<R> {
    inner: R,
    decryptor: Aes128CbcDec,
    buffer: Box<[u8]>,
    position: usize,
    filled: usize,
    eof: bool,
}

impl<R: Read> DecryptReader<R> {
    pub fn new(inner: R, key: &[u8; 16]) -> Self {
        let decryptor =
            Aes128CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(&IV));
        Self {
            inner,
            decryptor,
            buffer: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            position: 0,
            filled: 0,
            eof: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.inner.read(&mut self.buffer[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        if filled % BLOCK_SIZE != 0 {
            return Err(Error::Decryption(format!(
                "ciphertext length is not a multiple of {BLOCK_SIZE} bytes"
            ))
            .into_io());
        }

        for block in self.buffer[..filled].chunks_exact_mut(BLOCK_SIZE) {
            self.decryptor
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        self.position = 0;
        self.filled = filled;
        Ok(())
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position == self.filled {
            if self.eof {
                return Ok(0);
            }
            self.refill()?;
        }

        let n = buf.len().min(self.filled - self.position);
        buf[..n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

#[cfg(test)]
pub(crate) fn encrypt(plaintext: &[u8], key: &[u8; 16]) -> Vec<u8> {
    use cipher::block_padding::NoPadding;
    use cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    let padded_len = plaintext.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    let mut buffer = plaintext.to_vec();
    buffer.resize(padded_len, 0);

    Aes128CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(&IV))
        .encrypt_padded_mut::<NoPadding>(&mut buffer, padded_len)
        .expect("buffer is block aligned");
    buffer
}
