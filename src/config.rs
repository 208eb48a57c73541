use crate::services::errors::{TransferError, TransferResult};
use anyhow::{Context, Result};
use clap::Parser;
use std::env;

pub const DEFAULT_PARENT_COLLECTION: &str = "files";
pub const DEFAULT_CHUNK_COLLECTION: &str = "_file_chunks_";
pub const DEFAULT_CHUNK_SIZE_KB: u32 = 256;
pub const DEFAULT_BATCH_SIZE: u32 = 1;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub collections: CollectionConfig,
    pub chunk_size_kb: u32,
    pub batch_size: u32,
}

/// Names of the two collections backing chunked storage.
///
/// Resolved once at construction; both names must be plain identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    pub parent_collection: String,
    pub chunk_collection: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked large-object store")]
pub struct Args {
    /// Host to bind to (overrides CHUNK_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CHUNK_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides CHUNK_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Collection holding file entities (overrides CHUNK_STORE_PARENT_COLLECTION)
    #[arg(long)]
    pub parent_collection: Option<String>,

    /// Collection holding chunk records (overrides CHUNK_STORE_CHUNK_COLLECTION)
    #[arg(long)]
    pub chunk_collection: Option<String>,

    /// Default upload chunk size in KiB (overrides CHUNK_STORE_CHUNK_SIZE_KB)
    #[arg(long)]
    pub chunk_size_kb: Option<u32>,

    /// Default download batch size (overrides CHUNK_STORE_BATCH_SIZE)
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Create the collections and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_host = env::var("CHUNK_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_number("CHUNK_STORE_PORT", 3000u16)?;
        let env_db = env::var("CHUNK_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/chunk_store.db".into());
        let env_parent = env::var("CHUNK_STORE_PARENT_COLLECTION")
            .unwrap_or_else(|_| DEFAULT_PARENT_COLLECTION.into());
        let env_chunk = env::var("CHUNK_STORE_CHUNK_COLLECTION")
            .unwrap_or_else(|_| DEFAULT_CHUNK_COLLECTION.into());
        let env_chunk_size = env_number("CHUNK_STORE_CHUNK_SIZE_KB", DEFAULT_CHUNK_SIZE_KB)?;
        let env_batch = env_number("CHUNK_STORE_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;

        let collections = CollectionConfig::new(
            args.parent_collection.unwrap_or(env_parent),
            args.chunk_collection.unwrap_or(env_chunk),
        )
        .context("resolving collection names")?;

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            collections,
            chunk_size_kb: args.chunk_size_kb.unwrap_or(env_chunk_size),
            batch_size: args.batch_size.unwrap_or(env_batch),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read a numeric env var, falling back to `default` when it is unset.
fn env_number<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl CollectionConfig {
    pub fn new(
        parent_collection: impl Into<String>,
        chunk_collection: impl Into<String>,
    ) -> TransferResult<Self> {
        let parent_collection = parent_collection.into();
        let chunk_collection = chunk_collection.into();
        ensure_identifier(&parent_collection)?;
        ensure_identifier(&chunk_collection)?;
        if parent_collection.eq_ignore_ascii_case(&chunk_collection) {
            return Err(TransferError::validation(
                "parent and chunk collections must differ",
            ));
        }
        Ok(Self {
            parent_collection,
            chunk_collection,
        })
    }

    /// Name of the index supporting chunk lookups by parent.
    pub fn chunk_index_name(&self) -> String {
        format!("idx_{}_parent_seq", self.chunk_collection)
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            parent_collection: DEFAULT_PARENT_COLLECTION.into(),
            chunk_collection: DEFAULT_CHUNK_COLLECTION.into(),
        }
    }
}

/// Collection names are spliced into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is allowed.
fn ensure_identifier(name: &str) -> TransferResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(TransferError::validation(format!(
            "invalid collection name `{}`",
            name
        )))
    }
}
