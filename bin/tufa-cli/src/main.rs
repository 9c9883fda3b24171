//! tufa CLI - Blob data plane client
//!
//! Issues single data requests against one blob server, or replicated
//! quorum writes against a replica set.

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tufa_blob::{BlobResult, DataClient, DataClientPool, DataOptions, QuorumWriter};
use tufa_common::{ClientConfig, ObjectId, ParsedPath, ReplicaInfo, ReplicationPolicy};

#[derive(Parser, Debug)]
#[command(name = "tufa-cli")]
#[command(about = "tufa blob data plane client")]
#[command(version)]
struct Args {
    /// Client configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append data without forcing it to stable storage
    Append(WriteArgs),
    /// Append data and sync it to stable storage
    AppendSync(WriteArgs),
    /// Sync an object to stable storage
    Sync {
        /// Blob server data address
        #[arg(long)]
        addr: String,
        /// Object ID (UUID)
        #[arg(long)]
        object: ObjectId,
    },
    /// Read a byte range and write it to stdout
    Read {
        /// Blob server data address
        #[arg(long)]
        addr: String,
        /// Object ID (UUID)
        #[arg(long)]
        object: ObjectId,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long)]
        length: u32,
    },
    /// Append data to every replica, waiting for a majority per chunk
    WriteQuorum {
        /// Replica data address (repeat for each replica)
        #[arg(long = "replica", required = true)]
        replicas: Vec<String>,
        /// Object ID (UUID)
        #[arg(long)]
        object: ObjectId,
        #[command(flatten)]
        input: InputArgs,
        /// Bytes per quorum round
        #[arg(long, default_value_t = 1 << 20)]
        chunk: usize,
        /// Per-round deadline in milliseconds (overrides the config file)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Parse a replication policy query
    Policy {
        /// Query string, e.g. "ssd=2&hdd=1&zone=local"
        query: String,
        /// Zone of this client, required for zone=local
        #[arg(long)]
        zone: Option<String>,
    },
    /// Parse an object path, e.g. "//ctl:26257/dir/file?ssd=2"
    Path {
        path: String,
        /// Zone of this client, required for zone=local
        #[arg(long)]
        zone: Option<String>,
        /// Alias definition NAME=ADDR[,ADDR...], added to the config's aliases
        #[arg(long = "alias", value_parser = parse_alias)]
        aliases: Vec<(String, Vec<String>)>,
    },
}

fn parse_alias(s: &str) -> Result<(String, Vec<String>), String> {
    let (name, addrs) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=ADDR[,ADDR...], got {s:?}"))?;
    let addrs = addrs.split(',').map(|a| a.trim().to_string()).collect();
    Ok((name.to_string(), addrs))
}

fn format_policy(policy: &ReplicationPolicy) -> String {
    let quorum = if policy.total_replicas() == 0 {
        "n/a".to_string()
    } else {
        policy.quorum().to_string()
    };
    format!(
        "ssd replicas: {}\nhdd replicas: {}\narchive:      {}\nzone:         {}\nquorum:       {}",
        policy.ssd_replicas,
        policy.hdd_replicas,
        policy.archive,
        policy.local_zone.as_deref().unwrap_or("cross"),
        quorum,
    )
}

#[derive(ClapArgs, Debug)]
struct WriteArgs {
    /// Blob server data address
    #[arg(long)]
    addr: String,
    /// Object ID (UUID)
    #[arg(long)]
    object: ObjectId,
    /// Object offset to append at
    #[arg(long, default_value_t = 0)]
    offset: u64,
    #[command(flatten)]
    input: InputArgs,
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct InputArgs {
    /// Literal data
    #[arg(long)]
    data: Option<String>,
    /// Read data from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl InputArgs {
    fn load(&self) -> Result<Bytes> {
        match (&self.data, &self.file) {
            (Some(data), _) => Ok(Bytes::copy_from_slice(data.as_bytes())),
            (None, Some(path)) => read_file(path),
            (None, None) => bail!("either --data or --file is required"),
        }
    }
}

fn read_file(path: &Path) -> Result<Bytes> {
    let contents =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Bytes::from(contents))
}

/// Run one request on a pooled client, discarding the client if its
/// connection broke.
fn with_client<T>(
    pool: &DataClientPool,
    addr: &str,
    op: impl FnOnce(&mut DataClient) -> BlobResult<T>,
) -> Result<T> {
    let Some(mut client) = pool.acquire(addr) else {
        bail!("connection pool is closed");
    };
    debug!(addr, client = client.id(), "acquired data client");
    let result = op(&mut client);
    match &result {
        Err(e) if e.is_transport() => pool.release_with_error(client),
        _ => pool.release(client),
    }
    result.with_context(|| format!("request to {addr} failed"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let pool = DataClientPool::from_config(&config);

    match args.command {
        Commands::Append(w) => {
            let data = w.input.load()?;
            with_client(&pool, &w.addr, |c| c.append(w.object, w.offset, &data))?;
            println!("appended {} bytes at offset {}", data.len(), w.offset);
        }
        Commands::AppendSync(w) => {
            let data = w.input.load()?;
            with_client(&pool, &w.addr, |c| c.append_sync(w.object, w.offset, &data))?;
            println!("appended and synced {} bytes at offset {}", data.len(), w.offset);
        }
        Commands::Sync { addr, object } => {
            with_client(&pool, &addr, |c| c.sync(object))?;
            println!("synced {object}");
        }
        Commands::Read {
            addr,
            object,
            offset,
            length,
        } => {
            let mut buf = vec![0u8; length as usize];
            let n = with_client(&pool, &addr, |c| c.read(object, offset, &mut buf))?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&buf[..n])?;
            stdout.flush()?;
        }
        Commands::WriteQuorum {
            replicas,
            object,
            input,
            chunk,
            timeout_ms,
        } => {
            if chunk == 0 {
                bail!("--chunk must be positive");
            }
            let data = input.load()?;
            let replicas: Vec<ReplicaInfo> = replicas.into_iter().map(ReplicaInfo::from).collect();

            let mut quorum_config = config.quorum.clone();
            if timeout_ms.is_some() {
                quorum_config.write_timeout_ms = timeout_ms;
            }
            let writer = QuorumWriter::with_options(
                object,
                &replicas,
                &quorum_config,
                &DataOptions::from(&config.data),
            )?;
            info!(
                object = %object,
                replicas = writer.replica_count(),
                quorum = writer.quorum(),
                len = data.len(),
                "writing with quorum"
            );

            let mut rest = data;
            while !rest.is_empty() {
                let at = writer.offset();
                let piece = rest.split_to(chunk.min(rest.len()));
                writer
                    .write_and_sync(piece)
                    .with_context(|| format!("quorum write at offset {at} failed"))?;
            }
            let offset = writer.offset();
            writer.close();
            println!("wrote {offset} bytes to {object}");
        }
        Commands::Policy { query, zone } => {
            let policy = ReplicationPolicy::parse(&query, zone.as_deref())?;
            println!("{}", format_policy(&policy));
        }
        Commands::Path {
            path,
            zone,
            aliases,
        } => {
            let mut resolver = config.aliases.clone();
            resolver.extend(aliases);
            match ParsedPath::parse(&path, zone.as_deref(), Some(&resolver))? {
                None => println!("local path"),
                Some(parsed) => {
                    let (dir, base) = parsed.split_path();
                    println!("controllers:  {}", parsed.controllers().join(", "));
                    println!("path:         {}", parsed.path());
                    println!("dir:          {dir:?}");
                    println!("base:         {base:?}");
                    println!("{}", format_policy(parsed.policy()));
                }
            }
        }
    }

    pool.close();
    Ok(())
}
