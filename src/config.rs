//! Agent configuration.
//!
//! Values come from the command line first, then from `GRASSBOT_*`
//! environment variables (a `.env` file is loaded into the environment if
//! present), then from built-in defaults.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::connection::ConnectOptions;
use crate::search::MAX_SEARCH_RADIUS;

pub const ENV_PREFIX: &str = "GRASSBOT_";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 25565;
pub const DEFAULT_VIEWER_PORT: u16 = 3007;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_SESSION_TICKS: u64 = 2400;
pub const DEFAULT_SEARCH_RADIUS: u32 = 64;
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_GAME_VERSION: &str = "raspberry-juice";
pub const DEFAULT_TARGET_BLOCK: &str = "grass_block";
pub const DEFAULT_CHAT_POLL_TICKS: u64 = 20;

/// Probe the server for its version instead of naming one.
pub const AUTO_VERSION: &str = "auto";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Invalid {ENV_PREFIX}* environment: {source}"))]
    Env { source: envy::Error },
    #[snafu(display("No username given"))]
    MissingUsername,
    #[snafu(display("Invalid username {username:?}"))]
    InvalidUsername { username: String },
    #[snafu(display("{field} must be greater than zero"))]
    Zero { field: &'static str },
    #[snafu(display("search_radius {radius} is larger than {MAX_SEARCH_RADIUS}"))]
    RadiusTooLarge { radius: u32 },
}

/// Collects grass blocks on a Minecraft API server.
#[derive(Debug, Default, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Name of the player to act as.
    pub username: Option<String>,
    /// Server host.
    #[arg(long)]
    pub host: Option<String>,
    /// Server API port.
    #[arg(long, short)]
    pub port: Option<u16>,
    /// Port of the world viewer.
    #[arg(long)]
    pub viewer_port: Option<u16>,
    /// Milliseconds to wait before reconnecting.
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
    /// Game ticks before the agent leaves.
    #[arg(long)]
    pub session_ticks: Option<u64>,
    /// How far to look for blocks, in blocks.
    #[arg(long)]
    pub search_radius: Option<u32>,
    /// Milliseconds to wait for a response from the server.
    #[arg(long)]
    pub response_timeout_ms: Option<u64>,
    /// Block table version, or "auto" to ask the server.
    #[arg(long)]
    pub game_version: Option<String>,
    /// Name of the block to collect.
    #[arg(long)]
    pub target_block: Option<String>,
    /// Game ticks between chat polls.
    #[arg(long)]
    pub chat_poll_ticks: Option<u64>,
}

/// The `GRASSBOT_*` environment.
#[derive(Debug, Default, Deserialize)]
pub struct EnvConfig {
    pub username: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub viewer_port: Option<u16>,
    pub retry_delay_ms: Option<u64>,
    pub session_ticks: Option<u64>,
    pub search_radius: Option<u32>,
    pub response_timeout_ms: Option<u64>,
    pub game_version: Option<String>,
    pub target_block: Option<String>,
    pub chat_poll_ticks: Option<u64>,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        envy::prefixed(ENV_PREFIX).from_env().context(EnvSnafu)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub username: String,
    pub host: String,
    pub port: u16,
    pub viewer_port: u16,
    pub retry_delay: Duration,
    pub session_ticks: u64,
    pub search_radius: u32,
    pub response_timeout: Duration,
    pub game_version: String,
    pub target_block: String,
    pub chat_poll_ticks: u64,
}

impl Config {
    /// A configuration with every default and the given username.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            viewer_port: DEFAULT_VIEWER_PORT,
            retry_delay: DEFAULT_RETRY_DELAY,
            session_ticks: DEFAULT_SESSION_TICKS,
            search_radius: DEFAULT_SEARCH_RADIUS,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            game_version: DEFAULT_GAME_VERSION.to_owned(),
            target_block: DEFAULT_TARGET_BLOCK.to_owned(),
            chat_poll_ticks: DEFAULT_CHAT_POLL_TICKS,
        }
    }

    /// Reads the process arguments, `.env` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_sources(Cli::parse(), EnvConfig::from_env()?)
    }

    /// Merges the sources, the command line taking precedence.
    pub fn from_sources(cli: Cli, env: EnvConfig) -> Result<Self, ConfigError> {
        let username = cli.username.or(env.username).context(MissingUsernameSnafu)?;
        let defaults = Self::new(username);
        let millis = |ms: Option<u64>| ms.map(Duration::from_millis);

        let config = Self {
            host: cli.host.or(env.host).unwrap_or(defaults.host),
            port: cli.port.or(env.port).unwrap_or(defaults.port),
            viewer_port: cli
                .viewer_port
                .or(env.viewer_port)
                .unwrap_or(defaults.viewer_port),
            retry_delay: millis(cli.retry_delay_ms.or(env.retry_delay_ms))
                .unwrap_or(defaults.retry_delay),
            session_ticks: cli
                .session_ticks
                .or(env.session_ticks)
                .unwrap_or(defaults.session_ticks),
            search_radius: cli
                .search_radius
                .or(env.search_radius)
                .unwrap_or(defaults.search_radius),
            response_timeout: millis(cli.response_timeout_ms.or(env.response_timeout_ms))
                .unwrap_or(defaults.response_timeout),
            game_version: cli
                .game_version
                .or(env.game_version)
                .unwrap_or(defaults.game_version),
            target_block: cli
                .target_block
                .or(env.target_block)
                .unwrap_or(defaults.target_block),
            chat_poll_ticks: cli
                .chat_poll_ticks
                .or(env.chat_poll_ticks)
                .unwrap_or(defaults.chat_poll_ticks),
            username: defaults.username,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.username.is_empty() && !self.username.contains(['\n', '\r']),
            InvalidUsernameSnafu {
                username: &self.username
            }
        );
        ensure!(self.search_radius > 0, ZeroSnafu { field: "search_radius" });
        ensure!(
            self.search_radius <= MAX_SEARCH_RADIUS,
            RadiusTooLargeSnafu {
                radius: self.search_radius
            }
        );
        ensure!(
            !self.response_timeout.is_zero(),
            ZeroSnafu {
                field: "response_timeout"
            }
        );
        ensure!(self.chat_poll_ticks > 0, ZeroSnafu { field: "chat_poll_ticks" });
        Ok(())
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            response_timeout: self.response_timeout,
        }
    }

    /// The viewer listens on every interface.
    pub fn viewer_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.viewer_port))
    }
}
