//! A TOML file whose path is given on the command line, with a
//! write-then-read bootstrap when it doesn't exist yet.

use std::fs;
use std::io::ErrorKind;

use anyhow::Result;
use serde::Deserialize;

const EXAMPLE_CONFIG: &str = r#"# strangerlink server configuration

# One or more addresses to bind.
host = ["0.0.0.0"]
port = 8080

# Forwarded to the logging setup; does not affect matchmaking semantics.
dev_mode = false

# Force TRACE-level logging even in release builds.
trace = false

# Maximum accepted size, in bytes, of a single inbound WebSocket text frame.
limit_message_length = 16384
"#;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    host: Vec<String>,
    port: u16,
    #[serde(default)]
    dev_mode: bool,
    #[serde(default)]
    trace: bool,
    #[serde(default = "default_limit_message_length")]
    limit_message_length: usize,
}

fn default_limit_message_length() -> usize {
    16384
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: Vec<String>,
    pub port: u16,
    pub dev_mode: bool,
    pub trace: bool,
    pub limit_message_length: usize,
}

impl From<RawConfig> for ServerConfig {
    fn from(raw: RawConfig) -> Self {
        ServerConfig {
            host: raw.host,
            port: raw.port,
            dev_mode: raw.dev_mode,
            trace: raw.trace,
            limit_message_length: raw.limit_message_length,
        }
    }
}

/// Load configuration from `path`. If the file is missing, write the
/// bundled example config to that path first, then parse it — so a first
/// run always produces something runnable instead of failing outright.
pub fn load(path: &str) -> Result<ServerConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs::write(path, EXAMPLE_CONFIG)?;
            EXAMPLE_CONFIG.to_string()
        }
        Err(e) => return Err(e.into()),
    };
    let raw: RawConfig = toml::from_str(&contents)?;
    Ok(raw.into())
}
