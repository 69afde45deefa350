use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Zapp real-time messaging server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "zapp-server", version, about = "Zapp real-time messaging server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "ZAPP_PORT", default_value = "5001")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "ZAPP_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./zapp.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "ZAPP_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key, media)
    #[arg(long, env = "ZAPP_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Token and rate limit settings (loaded from [auth] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Upload limits (loaded from [media] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub media: Option<MediaConfig>,

    /// Presence tuning (loaded from [presence] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub presence: Option<PresenceConfig>,

    /// Story expiry purge (loaded from [stories] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub stories: Option<StoriesConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Access token lifetime in seconds (default: 604800 = 7 days)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,

    /// Seconds per replenished signup/login token, per IP (default: 12)
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u64,

    /// Signup/login burst size per IP (default: 5)
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            rate_limit_per_second: default_rate_limit_per_second(),
            rate_limit_burst: default_rate_limit_burst(),
        }
    }
}

fn default_token_ttl() -> i64 {
    7 * 24 * 60 * 60
}

fn default_rate_limit_per_second() -> u64 {
    12
}

fn default_rate_limit_burst() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Maximum decoded image size in megabytes (default: 10)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

fn default_max_upload_size() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Quiet period after which a typing indicator is expired server-side (default: 2000)
    #[serde(default = "default_typing_quiet_ms")]
    pub typing_quiet_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            typing_quiet_ms: default_typing_quiet_ms(),
        }
    }
}

fn default_typing_quiet_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoriesConfig {
    /// Interval in seconds between expired story purges (default: 3600 = 1 hour)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for StoriesConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5001,
            bind_address: "0.0.0.0".to_string(),
            config: "./zapp.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            auth: None,
            media: None,
            presence: None,
            stories: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (ZAPP_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();
        Self::layered(&config_path, cli).extract()
    }

    fn layered(config_path: &str, cli: Config) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("ZAPP_").split("__"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Zapp Server Configuration
# Place this file at ./zapp.toml or specify with --config <path>
# All settings can be overridden via environment variables (ZAPP_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5001)
# port = 5001

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database, JWT signing key and uploaded media
# data_dir = "./data"

# ---- Accounts ----
# [auth]
# token_ttl_secs = 604800       # 7 days
# rate_limit_per_second = 12    # 1 token every 12 seconds per IP on signup/login
# rate_limit_burst = 5

# ---- Media ----
# [media]
# max_upload_size_mb = 10

# ---- Presence ----
# [presence]
# typing_quiet_ms = 2000        # expire a typing indicator after this much silence

# ---- Stories ----
# [stories]
# cleanup_interval_secs = 3600  # purge expired stories every hour
"#
    .to_string()
}
