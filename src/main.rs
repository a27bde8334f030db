//! Command line interface for building, reading and fetching social-reading
//! events. Supports encoding records, decoding event files, summing zap
//! receipts, querying relays, and signature verification.

use std::{fs, path::Path};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use tracing::warn;
use tracing_subscriber::{prelude::*, EnvFilter};

use shelfstr::{
    config::{default_env_file, Settings},
    decode::{decode, decode_lenient},
    encode::Encode,
    event::UnsignedEvent,
    model::{Book, BookClub, Bookshelf, Review, ZapRequest},
    signer::{verify_event, KeySigner, Signer},
    source::{latest_replaceable, FileSource, Filter, RelaySource},
    stats::{aggregate, aggregate_by_target},
};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "shelfstr",
    author,
    version,
    about = "Social-reading events on Nostr"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Record types accepted by `encode`.
#[derive(Clone, Copy, ValueEnum)]
enum RecordKind {
    Book,
    Shelf,
    Review,
    Club,
    ZapRequest,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON record into an event, signed if `SECRET_KEY` is set.
    Encode {
        #[arg(value_enum)]
        kind: RecordKind,
        /// JSON file holding the record.
        file: String,
        /// Author pubkey for unsigned output.
        #[arg(long)]
        pubkey: Option<String>,
    },
    /// Decode event files into records, one JSON line each.
    Decode {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Emit unsupported kinds as raw events instead of skipping them.
        #[arg(long)]
        raw: bool,
    },
    /// Sum zap receipts found in event files.
    Stats {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Break totals down by zapped event id.
        #[arg(long)]
        by_target: bool,
    },
    /// Query relays and print matching events as NDJSON.
    Fetch {
        /// Relay to query; defaults to `RELAYS`.
        #[arg(long = "relay")]
        relays: Vec<String>,
        #[arg(long = "kind")]
        kinds: Vec<u32>,
        #[arg(long = "author")]
        authors: Vec<String>,
        /// Tag filter as `key=value`, repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        since: Option<u64>,
        #[arg(long)]
        until: Option<u64>,
        #[arg(long)]
        limit: Option<usize>,
        /// Keep only the newest version of replaceable events.
        #[arg(long)]
        latest: bool,
    },
    /// Verify ids and signatures of events in files.
    Verify {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    match cli.command {
        Commands::Encode { kind, file, pubkey } => {
            let data = fs::read_to_string(&file).with_context(|| format!("reading {file}"))?;
            let signer = cfg
                .secret_key
                .as_deref()
                .map(KeySigner::from_hex)
                .transpose()?;
            let author = match (&signer, pubkey) {
                (Some(s), _) => s.public_key(),
                (None, Some(pk)) => pk,
                (None, None) => bail!("no SECRET_KEY configured; pass --pubkey for unsigned output"),
            };
            let unsigned = match kind {
                RecordKind::Book => encode_record::<Book>(&data, &author)?,
                RecordKind::Shelf => encode_record::<Bookshelf>(&data, &author)?,
                RecordKind::Review => encode_record::<Review>(&data, &author)?,
                RecordKind::Club => encode_record::<BookClub>(&data, &author)?,
                RecordKind::ZapRequest => encode_record::<ZapRequest>(&data, &author)?,
            };
            match signer {
                Some(s) => println!("{}", serde_json::to_string(&s.sign(unsigned)?)?),
                None => println!("{}", serde_json::to_string(&unsigned)?),
            }
        }
        Commands::Decode { paths, raw } => {
            // One bad event never stops the rest of the batch.
            for ev in FileSource::new(paths, cfg.verify_sig).read_all()? {
                let entity = if raw {
                    decode_lenient(&ev)
                } else {
                    match decode(&ev) {
                        Ok(entity) => entity,
                        Err(e) => {
                            warn!(id = %ev.id, "skipping: {e}");
                            continue;
                        }
                    }
                };
                println!("{}", serde_json::to_string(&entity)?);
            }
        }
        Commands::Stats { paths, by_target } => {
            let events = FileSource::new(paths, cfg.verify_sig).read_all()?;
            if by_target {
                println!("{}", serde_json::to_string(&aggregate_by_target(&events))?);
            } else {
                println!("{}", serde_json::to_string(&aggregate(&events))?);
            }
        }
        Commands::Fetch {
            relays,
            kinds,
            authors,
            tags,
            since,
            until,
            limit,
            latest,
        } => {
            let relays = if relays.is_empty() { cfg.relays.clone() } else { relays };
            if relays.is_empty() {
                bail!("no relays given and RELAYS is empty");
            }
            let mut filter = Filter {
                since,
                until,
                limit,
                ..Default::default()
            };
            if !kinds.is_empty() {
                filter = filter.kinds(kinds);
            }
            if !authors.is_empty() {
                filter = filter.authors(authors);
            }
            for raw in &tags {
                let (key, value) = parse_tag_filter(raw)?;
                filter = filter.tag(key, [value]);
            }
            let source = RelaySource::new(relays)
                .tor_socks(cfg.tor_socks.clone())
                .timeout(cfg.fetch_timeout)
                .verify_sig(cfg.verify_sig);
            let mut events = source.fetch_all(&filter).await?;
            if latest {
                events = latest_replaceable(events);
            }
            for ev in events {
                println!("{}", serde_json::to_string(&ev)?);
            }
        }
        Commands::Verify { paths } => {
            let events = FileSource::new(paths, false).read_all()?;
            let mut bad = 0usize;
            for ev in &events {
                if let Err(e) = verify_event(ev) {
                    warn!(id = %ev.id, "{e}");
                    bad += 1;
                }
            }
            println!("{} valid, {} invalid", events.len() - bad, bad);
            if bad > 0 {
                bail!("{bad} events failed verification");
            }
        }
    }
    Ok(())
}

fn encode_record<T>(data: &str, pubkey: &str) -> anyhow::Result<UnsignedEvent>
where
    T: Encode + DeserializeOwned,
{
    let record: T = serde_json::from_str(data).context("parsing record")?;
    Ok(record.encode(pubkey)?)
}

/// Split a `key=value` tag filter.
fn parse_tag_filter(raw: &str) -> anyhow::Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() && !v.is_empty() => Ok((k.trim_start_matches('#'), v)),
        _ => bail!("tag filter must look like key=value: {raw}"),
    }
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(env_path, default_env_file())?;
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tag_filter_parsing() {
        assert_eq!(parse_tag_filter("d=dune").unwrap(), ("d", "dune"));
        assert_eq!(parse_tag_filter("#e=abc").unwrap(), ("e", "abc"));
        assert_eq!(parse_tag_filter("x=a=b").unwrap(), ("x", "a=b"));
        assert!(parse_tag_filter("nope").is_err());
        assert!(parse_tag_filter("=v").is_err());
    }

    #[test]
    fn creates_default_env() {
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("nested/.env");
        ensure_env_file(env_path.to_str().unwrap()).unwrap();
        let data = fs::read_to_string(&env_path).unwrap();
        assert!(data.contains("RELAYS="));
        assert!(data.contains("VERIFY_SIG=0"));
    }

    #[test]
    fn encode_record_surfaces_validation_errors() {
        let err = encode_record::<Review>(r#"{"book_event_id":"e1"}"#, "pk").unwrap_err();
        assert!(err.to_string().contains("rating"));
        let ev = encode_record::<Review>(r#"{"book_event_id":"e1","rating":5}"#, "pk").unwrap();
        assert_eq!(ev.kind, shelfstr::event::KIND_REVIEW);
    }
}
