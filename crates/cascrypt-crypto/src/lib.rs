//! cascrypt-crypto: password-based streaming authenticated encryption
//!
//! Container layout:
//! ```text
//! [salt: 16][nonce per cipher stage][ciphertext][tag]
//! ```
//!
//! Key material for every stage comes from one Argon2 call over the
//! password and salt. Cipher stages run in cascade order on encrypt and in
//! reverse on decrypt; MAC stages authenticate header and ciphertext and
//! are chained so that only the last tag is stored.

pub mod cascade;
pub mod container;
pub mod credentials;
pub mod kdf;
pub mod primitives;
pub mod schedule;
pub mod stream;

use std::io::{Read, Seek, Write};

pub use cascrypt_core::{CipherSpec, EngineError, EngineResult, KdfSpec, MacSpec};
pub use container::SALT_SIZE;
pub use credentials::Credentials;
pub use kdf::DerivedKeyMaterial;
pub use stream::{decrypt_seekable, decrypt_stream, ProgressFn, StreamOptions, Summary};

/// Any readable, seekable input.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Where a container is read from on decrypt.
///
/// Seekable sources are authenticated in full before any plaintext is
/// written. Stream sources release plaintext as they go and only detect
/// tampering at the end.
pub enum Source<'a> {
    Seekable(&'a mut dyn ReadSeek),
    Stream(&'a mut dyn Read),
}

/// Encrypt `input` into a container written to `output`.
pub fn encrypt(
    credentials: &Credentials,
    kdf: &KdfSpec,
    ciphers: &CipherSpec,
    macs: &MacSpec,
    input: impl Read,
    output: impl Write,
) -> EngineResult<()> {
    encrypt_with(credentials, kdf, ciphers, macs, input, output, &StreamOptions::default())?;
    Ok(())
}

/// Decrypt the container in `source` into `output`.
pub fn decrypt(
    credentials: &Credentials,
    kdf: &KdfSpec,
    ciphers: &CipherSpec,
    macs: &MacSpec,
    source: Source<'_>,
    output: impl Write,
) -> EngineResult<()> {
    decrypt_with(credentials, kdf, ciphers, macs, source, output, &StreamOptions::default())?;
    Ok(())
}

/// [`encrypt`] with explicit stream options, returning byte counts.
pub fn encrypt_with(
    credentials: &Credentials,
    kdf: &KdfSpec,
    ciphers: &CipherSpec,
    macs: &MacSpec,
    input: impl Read,
    output: impl Write,
    options: &StreamOptions,
) -> EngineResult<Summary> {
    stream::encrypt(credentials, kdf, ciphers, macs, input, output, options)
}

/// [`decrypt`] with explicit stream options, returning byte counts.
pub fn decrypt_with(
    credentials: &Credentials,
    kdf: &KdfSpec,
    ciphers: &CipherSpec,
    macs: &MacSpec,
    source: Source<'_>,
    output: impl Write,
    options: &StreamOptions,
) -> EngineResult<Summary> {
    match source {
        Source::Seekable(input) => {
            decrypt_seekable(credentials, kdf, ciphers, macs, input, output, options)
        }
        Source::Stream(input) => decrypt_stream(credentials, kdf, ciphers, macs, input, output, options),
    }
}
