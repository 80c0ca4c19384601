//! Service configuration.
//!
//! Everything is resolved once at startup from environment variables (a `.env`
//! file is honoured by `main`), and then injected into the components that need
//! it. Nothing reads the environment after startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Request body size limit in bytes (bounds multipart uploads)
    pub body_limit: usize,
    /// Directory served for unmatched paths, if any
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
            body_limit: 50 * 1024 * 1024, // 50MB
            static_dir: None,
        }
    }
}

/// Locations of the two transient file namespaces.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub converted_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            converted_dir: PathBuf::from("converted"),
        }
    }
}

/// How to invoke an external tool.
///
/// `prefix_args` are passed before the tool-specific arguments, which lets a
/// wrapper (`sh script.sh`, `docker run ...`) stand in for the real binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub prefix_args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Build a kill-on-drop command with the prefix arguments applied.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = process_utils::tokio_command(&self.program);
        cmd.args(&self.prefix_args);
        cmd
    }

    pub fn name(&self) -> &str {
        self.prefix_args
            .last()
            .map(String::as_str)
            .unwrap_or(self.program.as_str())
    }
}

/// External tools driven by the pipeline.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub ffmpeg: ToolCommand,
    pub yt_dlp: ToolCommand,
    pub soffice: ToolCommand,
    pub pdftotext: ToolCommand,
    /// Upper bound for one-shot document conversions.
    pub conversion_timeout: Duration,
    /// Audio bitrate passed to the mp3 encoder.
    pub mp3_bitrate: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: ToolCommand::new("ffmpeg"),
            yt_dlp: ToolCommand::new("yt-dlp"),
            soffice: ToolCommand::new("soffice"),
            pdftotext: ToolCommand::new("pdftotext"),
            conversion_timeout: Duration::from_secs(120),
            mp3_bitrate: Some("192k".to_string()),
        }
    }
}

/// Origin fetching policy.
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// Route video-page locators through the extractor tool.
    pub extractor_enabled: bool,
    /// Accept loopback/private IP literals and `localhost`.
    pub allow_private_hosts: bool,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            extractor_enabled: true,
            allow_private_hosts: false,
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("media-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub origin: OriginConfig,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`, `API_ENABLE_CORS`, `API_BODY_LIMIT_MB`
    /// - `STATIC_DIR`, `UPLOAD_DIR`, `CONVERTED_DIR`
    /// - `FFMPEG_PATH`, `YTDLP_PATH`, `SOFFICE_PATH`, `PDFTOTEXT_PATH`
    /// - `CONVERSION_TIMEOUT_SECS`, `MP3_BITRATE`
    /// - `EXTRACTOR_ENABLED`, `ORIGIN_ALLOW_PRIVATE_HOSTS`,
    ///   `ORIGIN_CONNECT_TIMEOUT_SECS`, `ORIGIN_USER_AGENT`
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            config.server.bind_address = bind_address;
        }
        if let Some(port) = parse_value::<u16>("API_PORT", get("API_PORT")) {
            config.server.port = port;
        }
        if let Some(cors) = parse_bool("API_ENABLE_CORS", get("API_ENABLE_CORS")) {
            config.server.enable_cors = cors;
        }
        if let Some(mb) = parse_value::<usize>("API_BODY_LIMIT_MB", get("API_BODY_LIMIT_MB")) {
            config.server.body_limit = mb.saturating_mul(1024 * 1024);
        }
        config.server.static_dir = get("STATIC_DIR").map(PathBuf::from);

        if let Some(dir) = get("UPLOAD_DIR") {
            config.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("CONVERTED_DIR") {
            config.storage.converted_dir = PathBuf::from(dir);
        }

        if let Some(path) = get("FFMPEG_PATH") {
            config.tools.ffmpeg = ToolCommand::new(path);
        }
        if let Some(path) = get("YTDLP_PATH") {
            config.tools.yt_dlp = ToolCommand::new(path);
        }
        if let Some(path) = get("SOFFICE_PATH") {
            config.tools.soffice = ToolCommand::new(path);
        }
        if let Some(path) = get("PDFTOTEXT_PATH") {
            config.tools.pdftotext = ToolCommand::new(path);
        }
        if let Some(secs) = parse_value::<u64>(
            "CONVERSION_TIMEOUT_SECS",
            get("CONVERSION_TIMEOUT_SECS"),
        ) {
            config.tools.conversion_timeout = Duration::from_secs(secs);
        }
        if let Some(bitrate) = get("MP3_BITRATE") {
            config.tools.mp3_bitrate = Some(bitrate);
        }

        if let Some(enabled) = parse_bool("EXTRACTOR_ENABLED", get("EXTRACTOR_ENABLED")) {
            config.origin.extractor_enabled = enabled;
        }
        if let Some(allow) = parse_bool(
            "ORIGIN_ALLOW_PRIVATE_HOSTS",
            get("ORIGIN_ALLOW_PRIVATE_HOSTS"),
        ) {
            config.origin.allow_private_hosts = allow;
        }
        if let Some(secs) = parse_value::<u64>(
            "ORIGIN_CONNECT_TIMEOUT_SECS",
            get("ORIGIN_CONNECT_TIMEOUT_SECS"),
        ) {
            config.origin.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(ua) = get("ORIGIN_USER_AGENT") {
            config.origin.user_agent = ua;
        }

        config
    }
}

fn parse_value<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}

fn parse_bool(key: &str, raw: Option<String>) -> Option<bool> {
    let raw = raw?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %raw, "Ignoring unparseable boolean configuration value");
            None
        }
    }
}
