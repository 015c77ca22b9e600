//! Sharded Redis-compatible cache client
//!
//! Each configured server becomes a shard named by a stable hash of its
//! address, so the same server list always yields the same shard names.
//! Keys are routed to shards by rendezvous hashing over those names. Shards
//! speak RESP over TCP and connect lazily on their first command.
//!
//! [`shared_cache`] hands out one process-wide ring built from [`Settings`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::config::Settings;

/// Default port when a server address omits one
pub const DEFAULT_CACHE_PORT: u16 = 6379;

/// Connection options for a single cache server
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_CACHE_PORT,
            password: None,
            db: 0,
        }
    }
}

impl CacheOptions {
    /// Parse `host` or `host:port`.
    pub fn from_addr(addr: &str) -> Result<Self, CacheError> {
        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    CacheError::Config(format!("invalid port in cache address {addr:?}"))
                })?;
                (host, port)
            }
            None => (addr, DEFAULT_CACHE_PORT),
        };
        if host.is_empty() {
            return Err(CacheError::Config(format!("missing host in cache address {addr:?}")));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            ..Default::default()
        })
    }
}

/// Cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether the connection that produced this error can still be used.
    fn keeps_connection(&self) -> bool {
        matches!(self, CacheError::Server(_))
    }
}

/// RESP value types
#[derive(Debug, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<String>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    fn as_string(&self) -> Option<String> {
        match self {
            RespValue::SimpleString(s) => Some(s.clone()),
            RespValue::BulkString(Some(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    fn is_ok(&self) -> bool {
        matches!(self, RespValue::SimpleString(s) if s == "OK")
    }
}

/// Encode a RESP command
fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();

    // Array header
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());

    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf
}

/// Parse a RESP response from a buffered reader
async fn parse_resp<R: AsyncBufReadExt + Unpin + Send>(
    reader: &mut R,
) -> Result<RespValue, CacheError> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    if line.is_empty() {
        return Err(CacheError::Protocol("Empty response".to_string()));
    }

    let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

    let mut chars = line.chars();
    let prefix = chars
        .next()
        .ok_or_else(|| CacheError::Protocol("Empty response line".to_string()))?;
    let content = chars.as_str();

    match prefix {
        '+' => Ok(RespValue::SimpleString(content.to_string())),
        '-' => Ok(RespValue::Error(content.to_string())),
        ':' => {
            let i = content
                .parse::<i64>()
                .map_err(|_| CacheError::Protocol(format!("Invalid integer: {}", content)))?;
            Ok(RespValue::Integer(i))
        }
        '$' => {
            let len = content.parse::<i64>().map_err(|_| {
                CacheError::Protocol(format!("Invalid bulk string length: {}", content))
            })?;

            if len < 0 {
                return Ok(RespValue::BulkString(None));
            }

            let mut data = vec![0u8; len as usize];
            reader.read_exact(&mut data).await?;

            // Read trailing \r\n
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf).await?;

            let s = String::from_utf8(data)
                .map_err(|_| CacheError::Protocol("Invalid UTF-8 in bulk string".to_string()))?;

            Ok(RespValue::BulkString(Some(s)))
        }
        '*' => {
            let count = content
                .parse::<i64>()
                .map_err(|_| CacheError::Protocol(format!("Invalid array length: {}", content)))?;

            if count < 0 {
                return Ok(RespValue::Array(None));
            }

            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(Box::pin(parse_resp(reader)).await?);
            }

            Ok(RespValue::Array(Some(items)))
        }
        _ => Err(CacheError::Protocol(format!(
            "Unknown RESP prefix: {}",
            prefix
        ))),
    }
}

/// One RESP connection to a cache server
pub struct CacheClient {
    stream: BufReader<TcpStream>,
}

impl CacheClient {
    /// Connect, authenticate when a password is set, and select the database.
    pub async fn connect(opts: &CacheOptions) -> Result<Self, CacheError> {
        let addr = format!("{}:{}", opts.host, opts.port);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| CacheError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

        let mut client = Self {
            stream: BufReader::new(stream),
        };

        if let Some(password) = opts.password.as_deref() {
            client.expect_ok(&["AUTH", password]).await?;
        }
        if opts.db != 0 {
            let db = opts.db.to_string();
            client.expect_ok(&["SELECT", &db]).await?;
        }

        debug!(%addr, db = opts.db, "cache connection established");
        Ok(client)
    }

    /// Send a command and receive the response
    pub async fn command(&mut self, args: &[&str]) -> Result<RespValue, CacheError> {
        let cmd = encode_command(args);
        self.stream.get_mut().write_all(&cmd).await?;
        self.stream.get_mut().flush().await?;

        let resp = parse_resp(&mut self.stream).await?;

        if let RespValue::Error(msg) = &resp {
            return Err(CacheError::Server(msg.clone()));
        }

        Ok(resp)
    }

    async fn expect_ok(&mut self, args: &[&str]) -> Result<(), CacheError> {
        let resp = self.command(args).await?;
        if resp.is_ok() {
            Ok(())
        } else {
            Err(CacheError::Protocol(format!("{} did not return OK", args[0])))
        }
    }
}

/// Stable shard name for a server address
pub fn shard_key(addr: &str) -> String {
    let digest = Sha256::digest(addr.as_bytes());
    hex::encode(&digest[..8])
}

fn rendezvous_score(shard: &str, key: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(shard.as_bytes());
    hasher.update(b":");
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// One server of the ring
pub struct Shard {
    key: String,
    options: CacheOptions,
    conn: Mutex<Option<CacheClient>>,
}

impl Shard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.options.host, self.options.port)
    }

    /// Run a command on this shard, connecting first if needed. A
    /// connection that failed below the server-reply level is dropped and
    /// re-established on the next command.
    async fn command(&self, args: &[&str]) -> Result<RespValue, CacheError> {
        let mut slot = self.conn.lock().await;
        let mut client = match slot.take() {
            Some(client) => client,
            None => CacheClient::connect(&self.options).await?,
        };

        let result = client.command(args).await;
        match &result {
            Err(err) if !err.keeps_connection() => {
                debug!(shard = %self.key, error = %err, "dropping cache connection");
            }
            _ => *slot = Some(client),
        }
        result
    }
}

/// Cache client spread over several servers
pub struct ShardedCache {
    shards: Vec<Shard>,
}

impl ShardedCache {
    /// Build a ring over `addresses`. Nothing connects until the first command.
    pub fn new<I, S>(addresses: I, password: Option<String>, db: u32) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_key = BTreeMap::new();
        for addr in addresses {
            let addr = addr.as_ref().trim();
            if addr.is_empty() {
                continue;
            }
            let options = CacheOptions {
                password: password.clone(),
                db,
                ..CacheOptions::from_addr(addr)?
            };
            by_key.insert(shard_key(addr), options);
        }

        if by_key.is_empty() {
            return Err(CacheError::Config("no cache servers configured".to_string()));
        }

        let shards = by_key
            .into_iter()
            .map(|(key, options)| Shard {
                key,
                options,
                conn: Mutex::new(None),
            })
            .collect();
        Ok(Self { shards })
    }

    /// Build a ring from a comma-separated server list.
    pub fn from_server_list(
        servers: &str,
        password: Option<String>,
        db: u32,
    ) -> Result<Self, CacheError> {
        Self::new(servers.split(','), password, db)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CacheError> {
        Self::from_server_list(
            &settings.cache_servers,
            settings.cache_password.clone(),
            settings.cache_db,
        )
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Shard responsible for `key`.
    pub fn shard_for(&self, key: &str) -> &Shard {
        let mut best = &self.shards[0];
        let mut best_score = rendezvous_score(&best.key, key);
        for shard in &self.shards[1..] {
            let score = rendezvous_score(&shard.key, key);
            if score > best_score {
                best = shard;
                best_score = score;
            }
        }
        best
    }

    async fn command(&self, key: &str, args: &[&str]) -> Result<RespValue, CacheError> {
        self.shard_for(key).command(args).await
    }

    /// Get a value by key
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let resp = self.command(key, &["GET", key]).await?;
        Ok(resp.as_string())
    }

    /// Set a value with optional TTL in seconds
    pub async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), CacheError> {
        let resp = match ttl {
            Some(seconds) => {
                let ttl_str = seconds.to_string();
                self.command(key, &["SET", key, value, "EX", &ttl_str]).await?
            }
            None => self.command(key, &["SET", key, value]).await?,
        };

        if resp.is_ok() {
            Ok(())
        } else {
            Err(CacheError::Protocol("SET did not return OK".to_string()))
        }
    }

    /// Delete a key, returns true if key existed
    pub async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let resp = self.command(key, &["DEL", key]).await?;
        Ok(resp.as_integer().unwrap_or(0) > 0)
    }

    /// Check if a key exists
    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let resp = self.command(key, &["EXISTS", key]).await?;
        Ok(resp.as_integer().unwrap_or(0) > 0)
    }

    /// Set expiration on a key
    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool, CacheError> {
        let ttl_str = seconds.to_string();
        let resp = self.command(key, &["EXPIRE", key, &ttl_str]).await?;
        Ok(resp.as_integer().unwrap_or(0) > 0)
    }

    /// Get TTL of a key in seconds (-1 = no expiry, -2 = key doesn't exist)
    pub async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        let resp = self.command(key, &["TTL", key]).await?;
        Ok(resp.as_integer().unwrap_or(-2))
    }

    /// Increment a key's integer value by 1
    pub async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let resp = self.command(key, &["INCR", key]).await?;
        resp.as_integer()
            .ok_or_else(|| CacheError::Protocol("INCR did not return integer".to_string()))
    }

    /// Increment a key's integer value by amount
    pub async fn incrby(&self, key: &str, amount: i64) -> Result<i64, CacheError> {
        let amount_str = amount.to_string();
        let resp = self.command(key, &["INCRBY", key, &amount_str]).await?;
        resp.as_integer()
            .ok_or_else(|| CacheError::Protocol("INCRBY did not return integer".to_string()))
    }

    /// Ping every shard
    pub async fn ping_all(&self) -> Result<(), CacheError> {
        let pings = self.shards.iter().map(|s| s.command(&["PING"]));
        let replies = futures::future::join_all(pings).await;
        for reply in replies {
            match reply? {
                RespValue::SimpleString(s) if s == "PONG" => {}
                _ => return Err(CacheError::Protocol("PING did not return PONG".to_string())),
            }
        }
        Ok(())
    }
}

static SHARED_CACHE: OnceLock<ShardedCache> = OnceLock::new();

/// Process-wide cache ring, built from the environment on first use.
///
/// # Panics
///
/// Panics when the settings are invalid or list no servers.
pub fn shared_cache() -> &'static ShardedCache {
    SHARED_CACHE.get_or_init(|| {
        let settings = Settings::from_env().unwrap_or_else(|err| halt(&err.to_string()));
        build_shared(&settings)
    })
}

/// Build the process-wide ring from explicit settings. Once the ring exists,
/// later calls (and [`shared_cache`]) return it unchanged.
///
/// # Panics
///
/// Panics when the ring cannot be built.
pub fn init_shared_cache(settings: &Settings) -> &'static ShardedCache {
    SHARED_CACHE.get_or_init(|| build_shared(settings))
}

fn build_shared(settings: &Settings) -> ShardedCache {
    match ShardedCache::from_settings(settings) {
        Ok(cache) => {
            debug!(shards = cache.shards.len(), "shared cache ring ready");
            cache
        }
        Err(err) => halt(&err.to_string()),
    }
}

fn halt(reason: &str) -> ! {
    error!(%reason, "cannot build cache client");
    panic!("cannot build cache client: {reason}");
}
