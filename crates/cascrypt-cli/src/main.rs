//! cascrypt: password-based streaming encryption
//!
//! Usage:
//!   cascrypt -e [-k KDF] [-c CIPHERS] [-m MACS] [-p PASSWORD] [-i INPUT] [-o OUTPUT]
//!   cascrypt -d [-k KDF] [-c CIPHERS] [-m MACS] [-p PASSWORD] [-i INPUT] [-o OUTPUT]
//!
//! The KDF, cipher list and MAC list are not stored in the container; the
//! same values must be given to decrypt. Decrypting from a file verifies the
//! tag before writing any plaintext. Decrypting from stdin cannot.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use cascrypt_core::config::CascryptConfig;
use cascrypt_crypto::{
    decrypt_with, encrypt_with, CipherSpec, Credentials, KdfSpec, MacSpec, ProgressFn, Source,
    StreamOptions, Summary,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "cascrypt",
    version,
    about = "Password-based streaming encryption with cipher and MAC cascades",
    group(ArgGroup::new("mode").required(true).args(["encrypt", "decrypt"])),
    group(ArgGroup::new("password_source").args(["password_file", "prompt"]))
)]
struct Cli {
    /// Encrypt INPUT into a container
    #[arg(short = 'e', long)]
    encrypt: bool,

    /// Decrypt a container from INPUT
    #[arg(short = 'd', long)]
    decrypt: bool,

    /// KDF: argon2i|argon2d|argon2id,<time cost>,<memory KiB>,<parallelism>
    #[arg(short = 'k', long)]
    kdf: Option<KdfSpec>,

    /// Comma-separated ciphers: aes-128-ctr, aes-192-ctr, aes-256-ctr, chacha20
    #[arg(short = 'c', long)]
    ciphers: Option<CipherSpec>,

    /// Comma-separated MACs: hmac-sha1, hmac-sha256, hmac-sha512, poly1305
    #[arg(short = 'm', long)]
    macs: Option<MacSpec>,

    /// Password (default: empty)
    #[arg(short = 'p', long, env = "CASCRYPT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Read the password from a file (raw bytes, no trimming)
    #[arg(long)]
    password_file: Option<PathBuf>,

    /// Prompt for the password on the terminal
    #[arg(long)]
    prompt: bool,

    /// Explicit salt; overrides the salt stored in the container
    #[arg(short = 's', long)]
    salt: Option<String>,

    /// File holding the Argon2 secret value mixed into key derivation
    #[arg(long)]
    secret_file: Option<PathBuf>,

    /// Input file (default: stdin)
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Worker threads for the KDF lanes (default: one per CPU)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Bytes per streaming chunk (overrides config)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Show a progress bar on stderr
    #[arg(long)]
    progress: bool,

    /// Path to cascrypt.toml configuration file
    #[arg(long, env = "CASCRYPT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CASCRYPT_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, env = "CASCRYPT_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cascrypt: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(mut cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    let level = cli.log.take().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(format) => format,
        None => <LogFormat as ValueEnum>::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("config log.format: {e}"))?,
    };
    init_logging(&level, format);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring worker threads")?;
    }

    let kdf = cli.kdf.take().unwrap_or(config.defaults.kdf);
    let ciphers = cli.ciphers.take().unwrap_or(config.defaults.ciphers);
    let macs = cli.macs.take().unwrap_or(config.defaults.macs);
    let credentials = read_credentials(&mut cli)?;

    let mode = if cli.encrypt { "encrypt" } else { "decrypt" };
    info!(mode, kdf = %kdf, ciphers = %ciphers, macs = %macs, "cascrypt starting");

    let pb = cli.progress.then(|| make_progress_bar(mode));
    let options = StreamOptions {
        chunk_size: cli.chunk_size.unwrap_or(config.io.chunk_size),
        progress: pb.clone().map(progress_callback),
    };

    let output = open_output(cli.output.as_deref());
    let summary = if cli.encrypt {
        cmd_encrypt(&cli, &credentials, &kdf, &ciphers, &macs, output, &options)?
    } else {
        cmd_decrypt(&cli, &credentials, &kdf, &ciphers, &macs, output, &options)?
    };

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    info!(
        plaintext_bytes = summary.plaintext_bytes,
        container_bytes = summary.container_bytes,
        "{mode} complete"
    );
    Ok(())
}

// ── Setup ─────────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<CascryptConfig> {
    match path {
        Some(path) => CascryptConfig::load(path).context("loading configuration"),
        None => Ok(CascryptConfig::default()),
    }
}

/// Logs go to stderr so stdout stays a clean data channel.
fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // try_init: a second call (tests) keeps the first subscriber
    let _ = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .try_init(),
    };
}

/// Password precedence: --prompt, --password-file, -p / CASCRYPT_PASSWORD, empty.
fn read_credentials(cli: &mut Cli) -> Result<Credentials> {
    let password = if cli.prompt {
        rpassword::prompt_password("Password: ")
            .context("reading password from terminal")?
            .into_bytes()
    } else if let Some(path) = &cli.password_file {
        std::fs::read(path).with_context(|| format!("reading password file {}", path.display()))?
    } else {
        cli.password.take().map(String::into_bytes).unwrap_or_default()
    };

    let mut credentials = Credentials::new(password);
    if let Some(salt) = cli.salt.take() {
        credentials = credentials.with_salt(salt);
    }
    if let Some(path) = &cli.secret_file {
        let secret = std::fs::read(path)
            .with_context(|| format!("reading secret file {}", path.display()))?;
        credentials = credentials.with_secret(secret);
    }
    debug!(?credentials, "credentials ready");
    Ok(credentials)
}

fn open_output(path: Option<&Path>) -> Box<dyn Write> {
    match path {
        Some(path) => Box::new(DeferredFile::new(path)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    }
}

/// Output file created on first write or flush, so a run that fails before
/// producing output leaves an existing file untouched.
struct DeferredFile {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl DeferredFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut BufWriter<File>> {
        if self.file.is_none() {
            let file = File::create(&self.path).map_err(|e| {
                io::Error::new(e.kind(), format!("creating {}: {e}", self.path.display()))
            })?;
            debug!(path = %self.path.display(), "output opened");
            self.file = Some(BufWriter::new(file));
        }
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(io::Error::other("output file not open")),
        }
    }
}

impl Write for DeferredFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_callback(pb: ProgressBar) -> ProgressFn {
    Box::new(move |done, total, msg| {
        if total > 0 {
            pb.set_length(total);
        }
        pb.set_position(done);
        pb.set_message(msg.to_string());
    })
}

// ── `cascrypt -e` ─────────────────────────────────────────────────────────────

fn cmd_encrypt(
    cli: &Cli,
    credentials: &Credentials,
    kdf: &KdfSpec,
    ciphers: &CipherSpec,
    macs: &MacSpec,
    mut output: Box<dyn Write>,
    options: &StreamOptions,
) -> Result<Summary> {
    let input: Box<dyn Read> = match &cli.input {
        Some(path) => {
            Box::new(File::open(path).with_context(|| format!("opening {}", path.display()))?)
        }
        None => Box::new(io::stdin().lock()),
    };
    encrypt_with(credentials, kdf, ciphers, macs, input, &mut output, options).context("encrypting")
}

// ── `cascrypt -d` ─────────────────────────────────────────────────────────────

fn cmd_decrypt(
    cli: &Cli,
    credentials: &Credentials,
    kdf: &KdfSpec,
    ciphers: &CipherSpec,
    macs: &MacSpec,
    mut output: Box<dyn Write>,
    options: &StreamOptions,
) -> Result<Summary> {
    match &cli.input {
        Some(path) => {
            let mut file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let seekable = file
                .metadata()
                .with_context(|| format!("inspecting {}", path.display()))?
                .is_file();
            let source = if seekable {
                Source::Seekable(&mut file)
            } else {
                warn!(
                    path = %path.display(),
                    "input is not a regular file: plaintext is written before the tag is verified"
                );
                Source::Stream(&mut file)
            };
            decrypt_with(credentials, kdf, ciphers, macs, source, &mut output, options)
                .with_context(|| format!("decrypting {}", path.display()))
        }
        None => {
            warn!("decrypting from stdin: plaintext is written before the tag is verified");
            let mut stdin = io::stdin().lock();
            decrypt_with(
                credentials,
                kdf,
                ciphers,
                macs,
                Source::Stream(&mut stdin),
                &mut output,
                options,
            )
            .context("decrypting stdin")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const FAST_KDF: &str = "argon2d,1,8,1";

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cascrypt").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_mode_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["cascrypt"]).is_err());
        assert!(Cli::try_parse_from(["cascrypt", "-e", "-d"]).is_err());
        assert!(parse(&["-e"]).encrypt);
        assert!(parse(&["-d"]).decrypt);
    }

    #[test]
    fn test_spec_flags_parse() {
        let cli = parse(&[
            "-e",
            "-k",
            "argon2i,2,4096,2",
            "-c",
            "aes-256-ctr,chacha20",
            "-m",
            "hmac-sha512,poly1305",
        ]);
        assert_eq!(cli.kdf.unwrap().to_string(), "argon2i,2,4096,2");
        assert_eq!(cli.ciphers.unwrap().len(), 2);
        assert_eq!(cli.macs.unwrap().tag_len(), 16);
    }

    #[test]
    fn test_invalid_specs_rejected() {
        assert!(Cli::try_parse_from(["cascrypt", "-e", "-k", "argon2x,1,8,1"]).is_err());
        assert!(Cli::try_parse_from(["cascrypt", "-e", "-k", "argon2d,1,7,1"]).is_err());
        assert!(Cli::try_parse_from(["cascrypt", "-e", "-c", "rot13"]).is_err());
        assert!(Cli::try_parse_from(["cascrypt", "-e", "-m", ""]).is_err());
    }

    #[test]
    fn test_password_sources_conflict() {
        assert!(
            Cli::try_parse_from(["cascrypt", "-e", "--prompt", "--password-file", "pw.txt"]).is_err()
        );
    }

    #[test]
    fn test_password_file_is_read_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pw.txt");
        std::fs::write(&path, b"secret\n").unwrap();

        let mut cli = parse(&["-e", "--password-file", path.to_str().unwrap()]);
        let creds = read_credentials(&mut cli).unwrap();
        assert_eq!(creds.password(), b"secret\n");
    }

    #[test]
    fn test_file_roundtrip_and_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        let sealed = dir.path().join("sealed.bin");
        let opened = dir.path().join("opened.txt");
        std::fs::write(&plain, b"hello from the command line").unwrap();

        let path = |p: &Path| p.to_str().unwrap().to_string();
        let common = ["-k", FAST_KDF, "-c", "aes-128-ctr,aes-192-ctr", "-m", "hmac-sha1,hmac-sha256"];

        let mut args = vec!["-e".to_string(), "-p".into(), "pass".into(), "-s".into(), "key".into()];
        args.extend(common.iter().map(|s| s.to_string()));
        args.extend(["-i".into(), path(&plain), "-o".into(), path(&sealed)]);
        run(parse(&args.iter().map(String::as_str).collect::<Vec<_>>())).unwrap();

        let mut args = vec!["-d".to_string(), "-p".into(), "pass".into(), "-s".into(), "key".into()];
        args.extend(common.iter().map(|s| s.to_string()));
        args.extend(["-i".into(), path(&sealed), "-o".into(), path(&opened)]);
        run(parse(&args.iter().map(String::as_str).collect::<Vec<_>>())).unwrap();
        assert_eq!(std::fs::read(&opened).unwrap(), b"hello from the command line");

        let mut args = vec!["-d".to_string(), "-p".into(), "wrong".into(), "-s".into(), "key".into()];
        args.extend(common.iter().map(|s| s.to_string()));
        args.extend(["-i".into(), path(&sealed), "-o".into(), path(&opened)]);
        let err = run(parse(&args.iter().map(String::as_str).collect::<Vec<_>>())).unwrap_err();
        assert!(format!("{err:#}").contains("read_mac: MAC verification failure"));
        assert_eq!(std::fs::read(&opened).unwrap(), b"hello from the command line");
    }

    #[test]
    fn test_failed_decrypt_leaves_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let sealed = dir.path().join("sealed.bin");
        let existing = dir.path().join("existing.txt");
        let fresh = dir.path().join("fresh.txt");
        std::fs::write(&sealed, b"not a container").unwrap();
        std::fs::write(&existing, b"keep me").unwrap();

        let args = |input: &Path, output: &Path| {
            parse(&[
                "-d",
                "-k",
                FAST_KDF,
                "-i",
                input.to_str().unwrap(),
                "-o",
                output.to_str().unwrap(),
            ])
        };

        assert!(run(args(&sealed, &existing)).is_err());
        assert_eq!(std::fs::read(&existing).unwrap(), b"keep me");

        assert!(run(args(&dir.path().join("missing"), &existing)).is_err());
        assert_eq!(std::fs::read(&existing).unwrap(), b"keep me");

        assert!(run(args(&sealed, &fresh)).is_err());
        assert!(!fresh.exists());
    }

    #[test]
    fn test_empty_payload_still_creates_output() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("empty.txt");
        let sealed = dir.path().join("sealed.bin");
        let opened = dir.path().join("opened.txt");
        std::fs::write(&plain, b"").unwrap();

        let run_with = |mode: &str, input: &Path, output: &Path| {
            run(parse(&[
                mode,
                "-k",
                FAST_KDF,
                "-i",
                input.to_str().unwrap(),
                "-o",
                output.to_str().unwrap(),
            ]))
        };
        run_with("-e", &plain, &sealed).unwrap();
        run_with("-d", &sealed, &opened).unwrap();
        assert!(std::fs::read(&opened).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_decrypt_from_fifo_input() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        let sealed = dir.path().join("sealed.bin");
        let fifo = dir.path().join("pipe");
        let opened = dir.path().join("opened.txt");
        std::fs::write(&plain, b"through a named pipe").unwrap();

        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success());

        run(parse(&[
            "-e",
            "-k",
            FAST_KDF,
            "-p",
            "pw",
            "-i",
            plain.to_str().unwrap(),
            "-o",
            sealed.to_str().unwrap(),
        ]))
        .unwrap();

        let container = std::fs::read(&sealed).unwrap();
        let writer_path = fifo.clone();
        let writer = std::thread::spawn(move || {
            let mut pipe = std::fs::OpenOptions::new().write(true).open(writer_path).unwrap();
            pipe.write_all(&container).unwrap();
        });

        run(parse(&[
            "-d",
            "-k",
            FAST_KDF,
            "-p",
            "pw",
            "-i",
            fifo.to_str().unwrap(),
            "-o",
            opened.to_str().unwrap(),
        ]))
        .unwrap();
        writer.join().unwrap();

        assert_eq!(std::fs::read(&opened).unwrap(), b"through a named pipe");
    }

    #[test]
    fn test_config_supplies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("cascrypt.toml");
        std::fs::write(
            &config,
            format!("[defaults]\nkdf = \"{FAST_KDF}\"\nciphers = \"aes-256-ctr\"\n\n[io]\nchunk_size = 4\n"),
        )
        .unwrap();

        let loaded = load_config(Some(&config)).unwrap();
        assert_eq!(loaded.defaults.kdf.to_string(), FAST_KDF);
        assert_eq!(loaded.io.chunk_size, 4);

        std::fs::write(&config, "[log]\nformat = \"xml\"\n").unwrap();
        let mut cli = parse(&["-e", "--config", config.to_str().unwrap()]);
        cli.input = Some(dir.path().join("missing"));
        let err = run(cli).unwrap_err();
        assert!(format!("{err:#}").contains("log.format"));
    }
}
