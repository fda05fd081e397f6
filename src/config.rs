use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "COVE_DATABASE_URL")]
    pub database_url: String,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub realtime: RealtimeConfig,

    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Maximum number of results returned by messageable-user search
    #[arg(long, env = "COVE_SEARCH_LIMIT", default_value_t = 10)]
    pub search_limit: i64,
}

#[derive(Clone, Debug, Args)]
pub struct RealtimeConfig {
    /// Capacity of a per-table push-event channel
    #[arg(long, env = "COVE_REALTIME_CHANNEL_CAPACITY", default_value_t = 64)]
    pub channel_capacity: usize,

    /// Size of the listener-to-session event buffer
    #[arg(long, env = "COVE_REALTIME_EVENT_BUFFER_SIZE", default_value_t = 32)]
    pub event_buffer_size: usize,

    /// How often the session re-polls the unread snapshot
    #[arg(long, env = "COVE_UNREAD_POLL_INTERVAL_SECS", default_value_t = 60)]
    pub unread_poll_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct StorageConfig {
    /// Blob store bucket name
    #[arg(long, env = "COVE_S3_BUCKET", default_value = "cove-attachments")]
    pub bucket: String,

    /// Blob store region
    #[arg(long, env = "COVE_S3_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom S3 endpoint (useful for MinIO)
    #[arg(long, env = "COVE_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// S3 access key
    #[arg(long, env = "COVE_S3_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// S3 secret key
    #[arg(long, env = "COVE_S3_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Force path style (required for many MinIO setups: http://host/bucket/key)
    #[arg(long, env = "COVE_S3_FORCE_PATH_STYLE", default_value_t = false)]
    pub force_path_style: bool,

    /// Max attachment size in bytes, enforced before any network call (Default: 10MB)
    #[arg(long, env = "COVE_ATTACHMENT_MAX_SIZE_BYTES", default_value_t = 10_485_760)]
    pub attachment_max_size_bytes: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP endpoint for traces and metrics; telemetry export is disabled when unset
    #[arg(long, env = "COVE_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "COVE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { search_limit: 10 }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self { channel_capacity: 64, event_buffer_size: 32, unread_poll_interval_secs: 60 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "cove-attachments".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
            attachment_max_size_bytes: 10_485_760,
        }
    }
}
