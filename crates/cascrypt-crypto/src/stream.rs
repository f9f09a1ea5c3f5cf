//! Chunked encrypt/decrypt over `Read`/`Write`.
//!
//! Memory use is bounded by one chunk (plus one tag on the streaming
//! decrypt path) regardless of payload size.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use zeroize::Zeroizing;

use cascrypt_core::config::DEFAULT_CHUNK_SIZE;
use cascrypt_core::{CipherSpec, EngineError, EngineResult, KdfSpec, MacSpec};

use crate::cascade::{CipherCascade, MacCascade};
use crate::container::{Header, Layout};
use crate::credentials::Credentials;
use crate::kdf;
use crate::schedule::KeySchedule;

/// Progress callback type (bytes_done, bytes_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Tuning knobs for one stream operation.
pub struct StreamOptions {
    /// Bytes read, transformed and written per step (default: 1 MiB)
    pub chunk_size: usize,
    /// Called after every chunk; `bytes_total` is 0 when unknown
    pub progress: Option<ProgressFn>,
}

impl StreamOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidParameter("chunk size must be greater than zero".into()));
        }
        Ok(())
    }

    fn report(&self, done: u64, total: u64, msg: &str) {
        if let Some(progress) = &self.progress {
            progress(done, total, msg);
        }
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress: None,
        }
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("chunk_size", &self.chunk_size)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Byte counts of a finished operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub plaintext_bytes: u64,
    pub container_bytes: u64,
}

/// Keyed cascades for one container.
struct Session {
    ciphers: CipherCascade,
    macs: MacCascade,
}

impl Session {
    fn open(
        credentials: &Credentials,
        kdf_spec: &KdfSpec,
        cipher_spec: &CipherSpec,
        mac_spec: &MacSpec,
        header: &Header,
    ) -> EngineResult<Self> {
        let salt = credentials.salt().unwrap_or(&header.salt[..]);
        let material = kdf::derive(
            kdf_spec,
            credentials.password(),
            salt,
            credentials.secret(),
            KeySchedule::required_len(cipher_spec, mac_spec),
        )?;
        let schedule = KeySchedule::new(material, cipher_spec, mac_spec)?;
        Ok(Self {
            ciphers: CipherCascade::new(cipher_spec, &schedule, &header.nonces)?,
            macs: MacCascade::new(mac_spec, &schedule)?,
        })
    }
}

/// Encrypt everything `input` yields into a container written to `output`.
pub fn encrypt<R: Read, W: Write>(
    credentials: &Credentials,
    kdf_spec: &KdfSpec,
    cipher_spec: &CipherSpec,
    mac_spec: &MacSpec,
    mut input: R,
    mut output: W,
    options: &StreamOptions,
) -> EngineResult<Summary> {
    options.validate()?;
    let header = Header::generate(cipher_spec);
    let mut session = Session::open(credentials, kdf_spec, cipher_spec, mac_spec, &header)?;

    let header_bytes = header.to_bytes();
    output.write_all(&header_bytes)?;
    session.macs.update(&header_bytes);

    let mut buf = Zeroizing::new(vec![0u8; options.chunk_size]);
    let mut plaintext_bytes = 0u64;
    loop {
        let n = read_full(&mut input, &mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &mut buf[..n];
        session.ciphers.encrypt(chunk)?;
        session.macs.update(chunk);
        output.write_all(chunk)?;

        plaintext_bytes += n as u64;
        options.report(plaintext_bytes, 0, "encrypt");
        if n < options.chunk_size {
            break;
        }
    }

    let tag = session.macs.finalize();
    output.write_all(&tag)?;
    output.flush()?;

    let summary = Summary {
        plaintext_bytes,
        container_bytes: (header_bytes.len() + tag.len()) as u64 + plaintext_bytes,
    };
    tracing::debug!(?summary, ciphers = %cipher_spec, macs = %mac_spec, "encrypted");
    Ok(summary)
}

/// Decrypt a container from a seekable source.
///
/// The tag is verified over the whole container before any plaintext is
/// written; the body is then read a second time and decrypted.
pub fn decrypt_seekable<R: Read + Seek, W: Write>(
    credentials: &Credentials,
    kdf_spec: &KdfSpec,
    cipher_spec: &CipherSpec,
    mac_spec: &MacSpec,
    mut input: R,
    mut output: W,
    options: &StreamOptions,
) -> EngineResult<Summary> {
    options.validate()?;
    let layout = Layout::new(cipher_spec, mac_spec);

    let start = input.stream_position()?;
    let end = input.seek(SeekFrom::End(0))?;
    input.seek(SeekFrom::Start(start))?;
    let total = end.saturating_sub(start);
    let body_len = layout.body_len(total)?;

    let (header, raw_header) = Header::read_from(&mut input, cipher_spec)?;
    let Session { mut ciphers, mut macs } =
        Session::open(credentials, kdf_spec, cipher_spec, mac_spec, &header)?;
    macs.update(&raw_header);

    // Pass 1: authenticate
    let mut buf = Zeroizing::new(vec![0u8; options.chunk_size]);
    let mut remaining = body_len;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        read_body(&mut input, &mut buf[..want])?;
        macs.update(&buf[..want]);
        remaining -= want as u64;
        options.report(body_len - remaining, body_len, "verify");
    }
    let mut tag = vec![0u8; layout.trailer_len];
    read_body(&mut input, &mut tag)?;
    macs.verify(&tag)?;
    tracing::debug!(body_len, "container authenticated");

    // Pass 2: decrypt
    input.seek(SeekFrom::Start(start + layout.header_len as u64))?;
    let mut remaining = body_len;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let chunk = &mut buf[..want];
        read_body(&mut input, chunk)?;
        ciphers.decrypt(chunk)?;
        output.write_all(chunk)?;
        remaining -= want as u64;
        options.report(body_len - remaining, body_len, "decrypt");
    }
    output.flush()?;

    let summary = Summary {
        plaintext_bytes: body_len,
        container_bytes: total,
    };
    tracing::debug!(?summary, "decrypted");
    Ok(summary)
}

/// Decrypt a container from a source that can only be read once.
///
/// The last `tag_len` bytes seen are held back as the candidate tag; all
/// earlier bytes are decrypted and written immediately, so on
/// `MacVerificationFailure` unauthenticated plaintext has already reached
/// `output`.
pub fn decrypt_stream<R: Read, W: Write>(
    credentials: &Credentials,
    kdf_spec: &KdfSpec,
    cipher_spec: &CipherSpec,
    mac_spec: &MacSpec,
    mut input: R,
    mut output: W,
    options: &StreamOptions,
) -> EngineResult<Summary> {
    options.validate()?;
    let layout = Layout::new(cipher_spec, mac_spec);
    let tag_len = layout.trailer_len;

    let (header, raw_header) = Header::read_from(&mut input, cipher_spec)?;
    let Session { mut ciphers, mut macs } =
        Session::open(credentials, kdf_spec, cipher_spec, mac_spec, &header)?;
    macs.update(&raw_header);

    // buf[..held] is the unreleased window carried between reads
    let mut buf = Zeroizing::new(vec![0u8; options.chunk_size + tag_len]);
    let mut held = 0usize;
    let mut plaintext_bytes = 0u64;
    loop {
        let n = read_full(&mut input, &mut buf[held..])?;
        if n == 0 {
            break;
        }
        let available = held + n;
        let release = available.saturating_sub(tag_len);

        let chunk = &mut buf[..release];
        macs.update(chunk);
        ciphers.decrypt(chunk)?;
        output.write_all(chunk)?;
        plaintext_bytes += release as u64;
        options.report(plaintext_bytes, 0, "decrypt");

        buf.copy_within(release..available, 0);
        held = available - release;
    }

    if held < tag_len {
        return Err(EngineError::InvalidContainer(format!(
            "truncated: {held} of {tag_len} tag bytes present"
        )));
    }
    if let Err(e) = macs.verify(&buf[..held]) {
        tracing::warn!(
            plaintext_bytes,
            "MAC verification failed after plaintext was released from a non-seekable source"
        );
        return Err(e);
    }
    output.flush()?;

    let summary = Summary {
        plaintext_bytes,
        container_bytes: (layout.header_len + tag_len) as u64 + plaintext_bytes,
    };
    tracing::debug!(?summary, "decrypted stream");
    Ok(summary)
}

/// Fill `buf` from `reader`, stopping early only at end of input.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> EngineResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Read bytes the container length promised; running short means the
/// source changed underneath us.
fn read_body<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> EngineResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => EngineError::InvalidContainer("container shrank while reading".into()),
        _ => EngineError::Io(e),
    })
}
