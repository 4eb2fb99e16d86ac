/*!
# XSig Tool

Command-line encoder and decoder for XSig token streams.

## Usage

### Encode token literals
```bash
xsig encode D1=1 A5=0x1234 'S3="hello"'
xsig encode --format raw D1=1 > tokens.bin
```

### Decode a captured stream
```bash
xsig decode 8000c8004142ff
xsig decode --format raw --json < tokens.bin
```

### Generate a configuration file
```bash
xsig config --output xsig.toml
```
*/

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{info, Level};
use xsig::{StreamDecoder, Token, TokenBatch, XSigError};

mod config;
mod wire;

use config::AppConfig;
use wire::WireFormat;

#[derive(Parser)]
#[command(name = "xsig")]
#[command(about = "Encode and decode XSig token streams")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "xsig.toml")]
    config: PathBuf,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode token literals such as D1=1, A5=0x1234 or S3="text"
    Encode {
        /// Token literals, encoded in the order given
        #[arg(required = true)]
        tokens: Vec<String>,

        /// Output representation
        #[arg(short, long, value_enum)]
        format: Option<WireFormat>,

        /// Offset added to every index
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<i32>,

        /// Keep only the last literal written to each signal
        #[arg(long)]
        coalesce: bool,
    },

    /// Decode an encoded token stream
    Decode {
        /// Encoded input (read from stdin when omitted)
        input: Option<String>,

        /// Input representation
        #[arg(short, long, value_enum)]
        format: Option<WireFormat>,

        /// Print tokens as JSON
        #[arg(long)]
        json: bool,

        /// Print the tokens decoded before an error
        #[arg(long)]
        partial: bool,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "xsig.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to stderr to keep stdout clean for encoded data
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match cli.command {
        Commands::Encode { tokens, format, offset, coalesce } => {
            let config = AppConfig::load_or_default(&cli.config)?;
            run_encode(&config, &tokens, format, offset, coalesce)
        }

        Commands::Decode { input, format, json, partial } => {
            let config = AppConfig::load_or_default(&cli.config)?;
            run_decode(&config, input, format, json, partial)
        }

        Commands::Config { output } => generate_config_file(output),
    }
}

/// Encode literals and write them in the requested representation
fn run_encode(
    config: &AppConfig,
    literals: &[String],
    format: Option<WireFormat>,
    offset: Option<i32>,
    coalesce: bool,
) -> Result<()> {
    let mut batch = literals
        .iter()
        .map(|literal| {
            literal
                .parse::<Token>()
                .with_context(|| format!("Invalid token literal {literal:?}"))
        })
        .collect::<Result<TokenBatch>>()?;

    let offset = offset.unwrap_or(config.codec.index_offset);
    batch = batch
        .with_offset(offset)
        .with_context(|| format!("Index offset {offset} moves a token out of range"))?;

    if coalesce || config.codec.coalesce {
        batch.coalesce();
    }

    let bytes = batch.encode();
    info!("Encoded {} tokens into {} bytes", batch.len(), bytes.len());

    let format = format.unwrap_or(config.output.format);
    match format.render(&bytes, config.output.uppercase_hex) {
        Some(text) => println!("{text}"),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write encoded tokens")?;
            stdout.flush()?;
        }
    }

    Ok(())
}

/// Decode input and print the tokens
fn run_decode(
    config: &AppConfig,
    input: Option<String>,
    format: Option<WireFormat>,
    json: bool,
    partial: bool,
) -> Result<()> {
    let format = format.unwrap_or(config.output.format);

    let (tokens, failure) = match (format, input) {
        (WireFormat::Raw, None) => {
            decode_stream(std::io::stdin().lock(), config.codec.stream_buffer_limit)?
        }
        (format, input) => {
            let text = match input {
                Some(text) => text,
                None => {
                    let mut text = String::new();
                    std::io::stdin()
                        .read_to_string(&mut text)
                        .context("Failed to read input")?;
                    text
                }
            };
            let bytes = format.parse(&text)?;
            let decoded = xsig::decode_partial(&bytes);
            (decoded.tokens, decoded.error.map(XSigError::from))
        }
    };

    if let Some(err) = failure {
        if !partial {
            return Err(anyhow!(err).context("Failed to decode input"));
        }
        print_tokens(&tokens, json || config.output.json)?;
        return Err(anyhow!(err).context(format!("Decoding stopped after {} tokens", tokens.len())));
    }

    info!("Decoded {} tokens", tokens.len());
    print_tokens(&tokens, json || config.output.json)
}

/// Feed a reader through the stream decoder in fixed-size chunks
///
/// Returns the tokens decoded before the first failure along with it.
fn decode_stream<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<Token>, Option<XSigError>)> {
    let mut stream = StreamDecoder::with_limit(limit);
    let mut tokens = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let read = reader.read(&mut chunk).context("Failed to read input")?;
        if read == 0 {
            break;
        }
        // Tokens completed before an overflowing tail are still delivered.
        let pushed = stream.push(&chunk[..read]);
        if let Err(err) = drain_into(&mut stream, &mut tokens).and(pushed) {
            return Ok((tokens, Some(err)));
        }
    }

    Ok((tokens, stream.finish().err()))
}

fn drain_into(stream: &mut StreamDecoder, tokens: &mut Vec<Token>) -> xsig::Result<()> {
    while let Some(token) = stream.next_token()? {
        tokens.push(token);
    }
    Ok(())
}

fn print_tokens(tokens: &[Token], json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(tokens).context("Failed to serialize tokens")?;
        println!("{text}");
    } else {
        for token in tokens {
            println!("{token}");
        }
    }
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   xsig --config {} decode ...", output_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use xsig::DecodeError;

    /// Reader returning at most `step` bytes per call
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = (self.pos + self.step).min(self.data.len());
            let count = (end - self.pos).min(buf.len());
            buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
            self.pos += count;
            Ok(count)
        }
    }

    fn sample() -> TokenBatch {
        vec![
            Token::digital(1, true).unwrap(),
            Token::serial(2, "split me").unwrap(),
            Token::analog(300, 40000).unwrap(),
        ]
        .into()
    }

    #[test]
    fn test_decode_stream_in_small_reads() {
        let batch = sample();
        let reader = Trickle {
            data: batch.encode().to_vec(),
            pos: 0,
            step: 3,
        };

        let (tokens, failure) = decode_stream(reader, 1024).unwrap();
        assert!(failure.is_none());
        assert_eq!(tokens, batch.tokens());
    }

    #[test]
    fn test_decode_stream_reports_trailing_partial_token() {
        let mut bytes = sample().encode().to_vec();
        bytes.push(0x80);

        let (tokens, failure) = decode_stream(Cursor::new(bytes), 1024).unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(matches!(
            failure,
            Some(XSigError::Decode(DecodeError::Truncated { offset: 17, .. }))
        ));
    }

    #[test]
    fn test_decode_stream_stops_on_malformed_data() {
        let (tokens, failure) = decode_stream(Cursor::new(vec![0x80, 0x00, 0x00]), 1024).unwrap();
        assert_eq!(tokens, vec![Token::digital(1, true).unwrap()]);
        assert_eq!(failure.and_then(|err| err.decode_offset()), Some(2));
    }

    #[test]
    fn test_decode_stream_input_larger_than_limit() {
        let batch: TokenBatch = (1..=600).map(|index| Token::digital(index, index % 2 == 0).unwrap()).collect();

        let (tokens, failure) = decode_stream(Cursor::new(batch.encode().to_vec()), 1024).unwrap();
        assert!(failure.is_none());
        assert_eq!(tokens.len(), 600);
        assert_eq!(tokens, batch.tokens());
    }

    #[test]
    fn test_cli_parses_encode_arguments() {
        let cli = Cli::try_parse_from(["xsig", "encode", "--offset", "-2", "--format", "base64", "D3=1"]).unwrap();
        match cli.command {
            Commands::Encode { tokens, format, offset, coalesce } => {
                assert_eq!(tokens, vec!["D3=1"]);
                assert_eq!(format, Some(WireFormat::Base64));
                assert_eq!(offset, Some(-2));
                assert!(!coalesce);
            }
            _ => panic!("expected encode command"),
        }
    }
}
