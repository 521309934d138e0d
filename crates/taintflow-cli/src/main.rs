//! Taintflow CLI - inspect tags, configurations and sink audit journals

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use taintflow_audit::{AuditJournal, SinkEvent};
use taintflow_core::{Taint, TaintConfig};
use taintflow_tag::{TaintSource, Tag};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taintflow")]
#[command(about = "Taintflow - dynamic taint tracking toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Render a tag mask as source names
    Describe {
        /// Mask as decimal, 0x hex, or comma-separated source keys
        mask: String,
    },
    /// List known taint sources
    Sources,
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config/taintflow.toml")]
        config: PathBuf,
    },
    /// Print recent sink audit records
    Audit {
        /// Audit database directory
        #[arg(short, long)]
        db: PathBuf,
        /// Maximum number of records
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Only show records for this sink
        #[arg(short, long)]
        sink: Option<String>,
        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Status {
        /// Configuration file path; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Some(Commands::Describe { mask }) => {
            let tag = parse_mask(&mask)?;
            println!("{:#010x}  {}", tag.bits(), Taint::describe_tag(tag));
        }
        Some(Commands::Sources) => {
            for source in TaintSource::ALL {
                println!("{:#010x}  {:<14} {}", source.bit(), source.key(), source.name());
            }
        }
        Some(Commands::Check { config }) => {
            let parsed = TaintConfig::load(&config)
                .with_context(|| format!("invalid config {}", config.display()))?;
            println!(
                "Config OK: {} ({} sinks, audit {})",
                config.display(),
                parsed.sinks.len(),
                if parsed.audit.enabled { "enabled" } else { "disabled" }
            );
        }
        Some(Commands::Audit {
            db,
            limit,
            sink,
            json,
        }) => {
            let journal = AuditJournal::open(&db)
                .with_context(|| format!("cannot open audit journal {}", db.display()))?;
            debug!("Opened {:?}", journal);

            let events = match sink {
                Some(name) => {
                    let mut events = journal.by_sink(&name)?;
                    events.reverse();
                    events.truncate(limit);
                    events
                }
                None => journal.recent(limit)?,
            };

            if events.is_empty() {
                println!("No sink events recorded");
            }
            for event in &events {
                if json {
                    println!("{}", serde_json::to_string(event)?);
                } else {
                    println!("{}", format_event(event));
                }
            }
        }
        Some(Commands::Status { config }) => {
            let effective = match &config {
                Some(path) => TaintConfig::load(path)
                    .with_context(|| format!("invalid config {}", path.display()))?,
                None => TaintConfig::default(),
            };
            print!("{}", toml::to_string_pretty(&effective)?);
        }
        None => {
            println!(
                "Taintflow v{} - Use --help for commands",
                env!("CARGO_PKG_VERSION")
            );
        }
    }

    Ok(())
}

/// Parses `0x`-prefixed hex, decimal, or comma-separated source keys.
fn parse_mask(input: &str) -> anyhow::Result<Tag> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty mask");
    }

    if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        let bits = u32::from_str_radix(hex, 16).with_context(|| format!("bad hex mask '{input}'"))?;
        return Ok(Tag::from_bits(bits));
    }

    if input.bytes().all(|b| b.is_ascii_digit()) {
        let bits: u32 = input
            .parse()
            .with_context(|| format!("bad decimal mask '{input}'"))?;
        return Ok(Tag::from_bits(bits));
    }

    input
        .split(',')
        .map(|key| key.parse::<TaintSource>().map(Tag::from).map_err(anyhow::Error::from))
        .collect()
}

fn format_event(event: &SinkEvent) -> String {
    format!(
        "#{:<6} {} sink={} tag={:#010x} [{}] to={} len={} sha256={}\n        {:?}{}",
        event.id,
        event.timestamp_ms,
        event.sink,
        event.tag.bits(),
        event.sources,
        event.destination.as_deref().unwrap_or("-"),
        event.payload_len,
        event.digest_hex(),
        event.preview,
        if event.truncated { " ..." } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_and_decimal() {
        assert_eq!(parse_mask("0x204").unwrap(), Tag::MIC | Tag::SMS);
        assert_eq!(parse_mask("3").unwrap(), Tag::LOCATION | Tag::CONTACTS);
        assert_eq!(parse_mask("0").unwrap(), Tag::CLEAR);
    }

    #[test]
    fn test_parse_source_keys() {
        assert_eq!(
            parse_mask("password, imei").unwrap(),
            Tag::PASSWORD | Tag::IMEI
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_mask("").is_err());
        assert!(parse_mask("0xZZ").is_err());
        assert!(parse_mask("99999999999").is_err());
        assert!(parse_mask("location,bluetooth").is_err());
    }

    #[test]
    fn test_cli_parses_audit_args() {
        let cli = Cli::try_parse_from(["taintflow", "audit", "--db", "/tmp/a", "--limit", "5"]).unwrap();
        match cli.command {
            Some(Commands::Audit { db, limit, sink, json }) => {
                assert_eq!(db, PathBuf::from("/tmp/a"));
                assert_eq!(limit, 5);
                assert!(sink.is_none());
                assert!(!json);
            }
            _ => panic!("expected audit command"),
        }
    }

    #[test]
    fn test_default_status_serializes_to_toml() {
        let text = toml::to_string_pretty(&TaintConfig::default()).unwrap();
        let parsed = TaintConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, TaintConfig::default());
    }
}
