//! # hypem
//!
//! Command-line bus node. Listens and/or connects, then pipes NDJSON records
//! between the terminal and the bus:
//!
//! - every stdin line `{"name": "...", "payload": ...}` is emitted
//! - every bus record is printed to stdout as one JSON line
//!
//! Logs go to stderr (`HB_LOG` or `RUST_LOG` select the level).
//!
//! ```text
//! hypem schema.proto --port 9901
//! hypem schema.proto --port 9902 --target-port 9901 --db ./node2.db
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use hb_01_codec_registry::CodecSource;
use hb_02_causal_log::{FileBackedKVStore, InMemoryKVStore, KeyValueStore};
use hyper_emitter::{Cursor, DecodedEvent, EmitterConfig, HyperEmitter, Payload, StreamReader};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "hypem")]
#[command(about = "Replicated event bus node piping NDJSON through stdin/stdout")]
struct Args {
    /// Protocol-buffer schema with the application messages
    #[arg(value_name = "SCHEMA")]
    schema_path: Option<PathBuf>,

    /// Schema file (alternative to the positional argument)
    #[arg(long, conflicts_with = "schema_path")]
    schema: Option<PathBuf>,

    /// Port to listen on for replication connections
    #[arg(short, long, env = "HB_PORT")]
    port: Option<u16>,

    /// Interface to listen on
    #[arg(long, default_value = hyper_emitter::DEFAULT_LISTEN_HOST)]
    host: String,

    /// Host of a node to connect to
    #[arg(long, default_value = "localhost")]
    target_host: String,

    /// Port of a node to connect to
    #[arg(long)]
    target_port: Option<u16>,

    /// Store the log in this file instead of memory
    #[arg(long, env = "HB_DB")]
    db: Option<PathBuf>,

    /// Print the whole history before live records
    #[arg(long)]
    from_scratch: bool,

    /// TOML configuration file
    #[arg(short, long, env = "HB_CONFIG")]
    config: Option<PathBuf>,
}

/// One stdin line.
#[derive(Debug, Deserialize)]
struct InputRecord {
    name: String,
    #[serde(default)]
    payload: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("HB_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EmitterConfig::from_toml_file(path)?,
        None => EmitterConfig::from_env(),
    };

    let codecs = match args.schema_path.as_ref().or(args.schema.as_ref()) {
        Some(path) => CodecSource::Schema(
            std::fs::read_to_string(path)
                .with_context(|| format!("cannot read schema {}", path.display()))?,
        ),
        None => CodecSource::None,
    };

    let store: Arc<dyn KeyValueStore> = match &args.db {
        Some(path) => Arc::new(
            FileBackedKVStore::open(path)
                .with_context(|| format!("cannot open store {}", path.display()))?,
        ),
        None => Arc::new(InMemoryKVStore::new()),
    };

    let bus = HyperEmitter::new(store, codecs, config)?;
    bus.ready().await?;
    info!(id = %bus.get_id().await?, "[hypem] Node started");

    let cursor = if args.from_scratch {
        Cursor::Beginning
    } else {
        Cursor::Now
    };
    let stream = bus.stream(cursor);

    tokio::spawn(log_status(bus.clone()));

    if let Some(port) = args.port {
        let addr = bus.listen(port, Some(&args.host)).await?;
        info!(%addr, "[hypem] Listening");
    }
    if let Some(port) = args.target_port {
        bus.connect(port, &args.target_host).await?;
        info!(host = %args.target_host, port, "[hypem] Connected");
    }

    let printer = tokio::spawn(print_records(stream.reader));
    let mut writer = stream.writer;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    match parse_record(&bus, &line) {
                        Ok(event) => {
                            if let Err(e) = writer.send(event).await {
                                error!(error = %e, "[hypem] Cannot emit");
                            }
                        }
                        Err(e) => warn!(error = %e, "[hypem] Ignoring input line"),
                    }
                }
                None => {
                    info!("[hypem] Input closed, still replicating (Ctrl+C to stop)");
                    writer.close();
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("[hypem] Shutting down");
    bus.close().await?;
    printer.await?;
    Ok(())
}

/// Decoded payload when a codec exists for the name, otherwise the JSON text
/// as raw bytes.
fn parse_record(bus: &HyperEmitter, line: &str) -> Result<DecodedEvent> {
    let record: InputRecord = serde_json::from_str(line)?;
    let payload = if bus.codecs().contains(&record.name) {
        Payload::Decoded(record.payload)
    } else {
        Payload::Raw(serde_json::to_vec(&record.payload)?)
    };
    Ok(DecodedEvent::new(record.name, payload))
}

async fn print_records(mut reader: StreamReader) {
    let mut stdout = tokio::io::stdout();
    while let Some(record) = reader.recv().await {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "[hypem] Cannot print record");
                continue;
            }
        };
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        };
        if let Err(e) = written.await {
            error!(error = %e, "[hypem] stdout closed");
            break;
        }
    }
}

async fn log_status(bus: HyperEmitter) {
    let mut status = bus.status();
    while let Some(event) = status.recv().await {
        info!(?event, "[hypem] Status");
    }
}
