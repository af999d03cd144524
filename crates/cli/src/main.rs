//! `bramble-server`: a minimal plaintext RESP TCP front end over the
//! command engine. Per-connection framing only — no TLS, no ACLs, no
//! replication; just enough of a server to exercise the full dispatch path
//! end to end.

mod config;

use std::sync::Arc;

use bramble_core::DbIndex;
use bramble_engine::{BackgroundConfig, BackgroundScanner, Database, DatabaseOptions};
use bramble_storage::EvictionConfig;
use bramble_wire::{decode_command, encode_reply, Encoding, Reply};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use config::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = std::env::args().nth(1);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    let database = match open_database(&config) {
        Ok(database) => Arc::new(database),
        Err(err) => {
            eprintln!("failed to open database: {err}");
            std::process::exit(1);
        }
    };

    // Held for the process lifetime: dropping it would stop the scanner
    // thread. The accept loop below never returns normally.
    let _background = BackgroundScanner::spawn(database.clone(), background_config(&config));

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };
    info!(%addr, "bramble-server listening");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        let database = database.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, database).await {
                warn!(%peer, %err, "connection ended with an error");
            }
        });
    }
}

fn open_database(config: &Config) -> bramble_core::Result<Database> {
    Database::open(DatabaseOptions {
        data_dir: config.data_dir.clone(),
        databases: config.databases,
        aof_sync_strategy: config.sync_strategy()?,
        restore_aof: config.restore_aof,
        restore_snapshot: config.restore_snapshot,
        snapshot_threshold: config.snapshot_threshold,
    })
}

fn background_config(config: &Config) -> BackgroundConfig {
    let eviction = EvictionConfig {
        policy: config.eviction_policy().unwrap_or(bramble_storage::EvictionPolicy::NoEviction),
        max_memory: config.max_memory,
        sample: config.eviction_sample,
        interval: std::time::Duration::from_secs(config.eviction_interval),
    };
    BackgroundConfig {
        eviction,
        expiry_sample: config.eviction_sample,
        scan_interval: std::time::Duration::from_secs(config.eviction_interval),
        snapshot_interval: std::time::Duration::from_secs(config.snapshot_interval),
    }
}

/// Read RESP frames off `socket`, run each through `database`, and write
/// back the encoded reply, until the client disconnects.
///
/// `SELECT` is dispatched like any other command (so its validation runs
/// through the same path a replayed AOF command does), and on success this
/// loop — the only place that actually owns "current database" for a
/// connection — updates `current_db` for subsequent commands.
async fn handle_connection(mut socket: TcpStream, database: Arc<Database>) -> std::io::Result<()> {
    let mut current_db = DbIndex::DEFAULT;
    let encoding = Encoding::Resp2;
    let mut buf = Vec::new();
    let mut read_buf = [0u8; 8192];

    loop {
        match decode_command(&buf) {
            Ok(Some((argv, consumed))) => {
                buf.drain(..consumed);
                if argv.is_empty() {
                    continue;
                }
                let reply = match database.execute(current_db, &argv) {
                    Ok(reply) => {
                        if argv[0].eq_ignore_ascii_case(b"SELECT") {
                            if let Ok(index) = std::str::from_utf8(&argv[1]).unwrap_or_default().parse::<u16>() {
                                current_db = DbIndex(index);
                            }
                        }
                        reply
                    }
                    Err(err) => Reply::from_error(&err),
                };
                let mut out = Vec::new();
                encode_reply(&reply, encoding, &mut out);
                socket.write_all(&out).await?;
            }
            Ok(None) => {
                let n = socket.read(&mut read_buf).await?;
                if n == 0 {
                    return Ok(());
                }
                buf.extend_from_slice(&read_buf[..n]);
            }
            Err(err) => {
                let mut out = Vec::new();
                encode_reply(&Reply::from_error(&err), encoding, &mut out);
                socket.write_all(&out).await?;
                error!(%err, "protocol error, closing connection");
                return Ok(());
            }
        }
    }
}
