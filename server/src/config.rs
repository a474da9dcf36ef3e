use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Kanto lobby and WebRTC signaling server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "kanto-server", version, about = "Kanto lobby and WebRTC signaling server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "KANTO_PORT", default_value = "8000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "KANTO_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./kanto.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "KANTO_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Maximum players per room; joins beyond this are rejected
    #[arg(long, env = "KANTO_MAX_PLAYERS_PER_ROOM", default_value = "20")]
    pub max_players_per_room: usize,

    /// Registered-users TOML file; when unset the server runs open
    #[arg(long, env = "KANTO_USERS_FILE")]
    pub users_file: Option<String>,

    /// Directory of static frontend assets to serve
    #[arg(long, env = "KANTO_STATIC_DIR")]
    pub static_dir: Option<String>,

    /// TURN relay configuration (loaded from [turn] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub turn: Option<TurnConfig>,
}

/// Configuration for the TURN relay used by WebRTC clients behind
/// restrictive NATs. Credentials are either minted per request from the
/// shared secret (coturn mechanism) or taken verbatim from the static pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Whether TURN is advertised at all (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// TURN server hostname or IP (default: "127.0.0.1")
    #[serde(default = "default_turn_host")]
    pub host: String,

    /// TURN server port (default: 3478)
    #[serde(default = "default_turn_port")]
    pub port: u16,

    /// Shared secret for generating time-limited TURN credentials
    #[serde(default)]
    pub shared_secret: String,

    /// Credential TTL in seconds (default: 86400 = 24 hours)
    #[serde(default = "default_credential_ttl")]
    pub credential_ttl_secs: u64,

    /// Static TURN username, used when no shared secret is configured
    #[serde(default)]
    pub username: Option<String>,

    /// Static TURN password, used when no shared secret is configured
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 3478,
            shared_secret: String::new(),
            credential_ttl_secs: 86400,
            username: None,
            password: None,
        }
    }
}

fn default_turn_host() -> String {
    "127.0.0.1".to_string()
}

fn default_turn_port() -> u16 {
    3478
}

fn default_credential_ttl() -> u64 {
    86400
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            config: "./kanto.toml".to_string(),
            json_logs: false,
            generate_config: false,
            max_players_per_room: 20,
            users_file: None,
            static_dir: None,
            turn: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (KANTO_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("KANTO_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Kanto Signaling Server Configuration
# Place this file at ./kanto.toml or specify with --config <path>
# All settings can be overridden via environment variables (KANTO_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8000)
# port = 8000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Maximum players per room (default: 20)
# It used to be 5 because large rooms got laggy; 20 is the current limit.
# max_players_per_room = 20

# Registered-users TOML file. When unset, the server runs open and the
# WebSocket endpoint requires no session token.
# users_file = "./config/users.toml"

# Directory of static frontend assets to serve at /
# static_dir = "./static"

# ---- TURN Relay (WebRTC NAT traversal) ----
# [turn]
# enabled = false
# host = "127.0.0.1"
# port = 3478
# shared_secret = ""        # time-limited credentials when set
# credential_ttl_secs = 86400
# username = ""             # static credentials when no shared secret
# password = ""
"#
    .to_string()
}
