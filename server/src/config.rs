use clap::{Parser, ValueEnum};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line flags. Only flags the user actually passed (or set through
/// their `COURIER_*` variable) are serialized, so unset flags never mask the
/// TOML or env layers beneath them.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "courier-server", version, about = "Presence and direct-message routing server")]
pub struct Cli {
    /// Port to listen on [default: 8080]
    #[arg(long, env = "COURIER_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "COURIER_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file [default: ./courier.toml]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "COURIER_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key) [default: ./data]
    #[arg(long, env = "COURIER_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Payload written to a peer's chat socket: "json" envelope or legacy "text"
    #[arg(long, env = "COURIER_CHAT_PAYLOAD", value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_payload: Option<ChatPayload>,

    /// Longest accepted message, in characters [default: 4000]
    #[arg(long, env = "COURIER_MAX_MESSAGE_LENGTH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_length: Option<usize>,
}

/// Effective server configuration after layering.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,
    pub chat_payload: ChatPayload,
    pub max_message_length: usize,
}

/// Outbound format on chat-kind sockets.
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatPayload {
    /// `{"message", "receiver_id", "sender_id"}`
    #[default]
    Json,
    /// Bare message text
    Text,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            config: "./courier.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            chat_payload: ChatPayload::Json,
            max_message_length: 4000,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (COURIER_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(&Cli::parse()).extract()
    }

    /// The layered provider stack for a parsed command line.
    pub fn figment(cli: &Cli) -> Figment {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| Config::default().config);

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("COURIER_"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Courier Server Configuration
# Place this file at ./courier.toml or specify with --config <path>
# All settings can be overridden via environment variables (COURIER_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and JWT signing key
# data_dir = "./data"

# Payload written to a peer's chat socket:
#   "json" -> {"message": "...", "receiver_id": 2, "sender_id": 1}
#   "text" -> the bare message text (legacy clients)
# chat_payload = "json"

# Longest accepted chat message, in characters
# max_message_length = 4000
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_mentions_every_setting() {
        let template = generate_config_template();
        for key in [
            "port",
            "bind_address",
            "json_logs",
            "data_dir",
            "chat_payload",
            "max_message_length",
        ] {
            assert!(template.contains(key), "template is missing {key}");
        }
    }

    fn write_toml(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, body).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_toml_survives_cli_without_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(
            &dir,
            "port = 9000\nmax_message_length = 10\nchat_payload = \"text\"",
        );
        let cli = Cli::parse_from(["courier-server", "--config", path.as_str()]);

        let config: Config = Config::figment(&cli).extract().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_message_length, 10);
        assert_eq!(config.chat_payload, ChatPayload::Text);
        assert_eq!(config.data_dir, "./data");
        assert_eq!(config.config, path);
    }

    #[test]
    fn test_cli_flag_beats_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(&dir, "port = 9000\nmax_message_length = 10");
        let cli = Cli::parse_from([
            "courier-server",
            "--config",
            path.as_str(),
            "--port",
            "9100",
        ]);

        let config: Config = Config::figment(&cli).extract().unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.max_message_length, 10);
    }

    #[test]
    fn test_missing_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let cli = Cli::parse_from(["courier-server", "--config", missing.to_str().unwrap()]);

        let config: Config = Config::figment(&cli).extract().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.chat_payload, ChatPayload::Json);
        assert!(!config.generate_config);
    }
}
