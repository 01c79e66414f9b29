//! credseal - Encrypt and decrypt short secrets as printable tokens
//!
//! Usage:
//!   credseal encrypt <key-file> [subject] <item | ->  - Encrypt an item
//!   credseal decrypt <key-file> [subject] <item | ->  - Decrypt an item
//!
//! An item of `-` is read from stdin, so the tool can be used in a pipe.
//!
//! Exit codes: 0 on success, 1 on failure, 2 on a usage error.

use clap::{Parser, Subcommand};
use credseal::{EnvelopeCipher, Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

/// Upper bound for input read from stdin.
const MAX_STDIN_BYTES: usize = 50_000_000;

/// Compiled-in key-derivation key.
///
/// Replace this array for your own deployment; anyone running a stock
/// binary against your key file can otherwise derive the same keys.
const DERIVATION_KEY: [u8; 32] = [
    0x3b, 0xd1, 0x85, 0x27, 0x4f, 0x9e, 0x60, 0xc8, 0x12, 0xaf, 0x7b, 0x33, 0xe4, 0x58, 0x0a,
    0x96, 0xd9, 0x41, 0x2c, 0xfa, 0x6e, 0x83, 0x15, 0xb0, 0x5c, 0xc7, 0x38, 0x92, 0x09, 0xe1,
    0x74, 0x4d,
];

#[derive(Parser)]
#[command(name = "credseal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Encrypts short secrets into self-describing printable tokens")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt an item into a printable token
    Encrypt {
        /// File whose contents the encryption key is derived from
        key_file: PathBuf,

        /// Optional subject followed by the item, or just the item.
        /// An item of `-` reads from stdin.
        #[arg(value_name = "[SUBJECT] ITEM", num_args = 1..=2, required = true)]
        args: Vec<String>,
    },

    /// Decrypt a printable token
    Decrypt {
        /// File whose contents the encryption key is derived from
        key_file: PathBuf,

        /// Optional subject followed by the token, or just the token.
        /// A token of `-` reads from stdin.
        #[arg(value_name = "[SUBJECT] ITEM", num_args = 1..=2, required = true)]
        args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // Logs go to stderr; stdout carries only the en-/decrypted output.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = run_command(cli.command) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Encrypt { key_file, args } => cmd_encrypt(&key_file, &args),
        Commands::Decrypt { key_file, args } => cmd_decrypt(&key_file, &args),
    }
}

fn cmd_encrypt(key_file: &Path, args: &[String]) -> Result<()> {
    let (subject, item) = split_subject_and_item(args)?;
    let item = resolve_item(&item)?;

    let cipher = build_cipher(key_file)?;
    let token = cipher.encrypt_str(&item, &subject)?;

    println!("{}", token);

    Ok(())
}

fn cmd_decrypt(key_file: &Path, args: &[String]) -> Result<()> {
    let (subject, item) = split_subject_and_item(args)?;
    let item = resolve_item(&item)?;

    let cipher = build_cipher(key_file)?;
    let decrypted = cipher.decrypt_str(&item, &subject)?;

    println!("{}", &*decrypted);

    Ok(())
}

/// Split the trailing positional arguments into subject and item.
fn split_subject_and_item(args: &[String]) -> Result<(String, String)> {
    match args {
        [item] => Ok((String::new(), item.clone())),
        [subject, item] => Ok((subject.clone(), item.clone())),
        _ => Err(Error::InvalidArgument(
            "expected an item, optionally preceded by a subject".to_string(),
        )),
    }
}

/// The item itself, or stdin when the item is `-`.
fn resolve_item(item: &str) -> Result<Zeroizing<String>> {
    if item == "-" {
        read_stdin_capped()
    } else {
        Ok(Zeroizing::new(item.to_string()))
    }
}

/// Read stdin up to the size cap.
fn read_stdin_capped() -> Result<Zeroizing<String>> {
    let mut buffer = Zeroizing::new(Vec::new());

    std::io::stdin()
        .lock()
        .take(MAX_STDIN_BYTES as u64 + 1)
        .read_to_end(&mut buffer)?;

    if buffer.len() > MAX_STDIN_BYTES {
        return Err(Error::InvalidArgument(format!(
            "input from stdin is larger than {} bytes",
            MAX_STDIN_BYTES
        )));
    }

    debug!("read {} bytes from stdin", buffer.len());

    let text =
        std::str::from_utf8(&buffer).map_err(|e| Error::CharacterCoding(e.to_string()))?;

    // Pipes append a trailing newline that is not part of the item.
    Ok(Zeroizing::new(text.trim().to_string()))
}

/// Derive the working keys from the key file contents.
fn build_cipher(key_file: &Path) -> Result<EnvelopeCipher> {
    let key_bytes = Zeroizing::new(std::fs::read(key_file)?);

    debug!(
        "deriving keys from {} bytes of {}",
        key_bytes.len(),
        key_file.display()
    );

    EnvelopeCipher::new(&DERIVATION_KEY, &[&key_bytes])
}
