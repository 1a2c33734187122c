use anyhow::Context;
use clap::Parser;
use corvax_lab_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 39333;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    /// Save slot served by this process.
    pub player_id: String,
    /// Browser origins allowed by CORS. An entry without a port also matches
    /// the same scheme and host on any port.
    pub allowed_origins: Vec<String>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            db_path: default_db_path(),
            player_id: "local".to_string(),
            allowed_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            engine: EngineConfig::default(),
        }
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".corvax-lab")
        .join("corvax-lab.db")
}

impl ServerConfig {
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("parse server config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("load config: {}", path.display()))
    }
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Corvax Lab session server", long_about = None)]
pub struct Cli {
    /// YAML config file. Flags below take precedence over its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Listen address, e.g. 127.0.0.1:39333.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// SQLite database path.
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Player save slot.
    #[arg(long)]
    pub player: Option<String>,
}

impl Cli {
    pub fn resolve(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(db) = self.db {
            config.db_path = db;
        }
        if let Some(player) = self.player {
            config.player_id = player;
        }
        Ok(config)
    }
}
