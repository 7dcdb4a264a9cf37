use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use bedrock_proto::compression::MAX_DECOMPRESSED_SIZE;
use bedrock_proto::{BatchConfig, CompressionAlgorithm};
use bedrock_raknet::constants::{MAX_MTU, MIN_MTU};
use bedrock_raknet::{RakNetConfig, ServerMotd};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    pub address: String,
    pub port: u16,
    pub motd: String,
    #[serde(default = "default_sub_name")]
    pub sub_name: String,
    pub max_players: u32,
    pub gamemode: String,
}

fn default_sub_name() -> String {
    "world".into()
}

#[derive(Debug, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_min_mtu")]
    pub min_mtu: u16,
    #[serde(default = "default_max_mtu")]
    pub max_mtu: u16,
    /// Defaults to `server.max_players` when absent.
    #[serde(default)]
    pub max_connections: Option<usize>,
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: u16,
    #[serde(default = "default_compression_algorithm")]
    pub compression_algorithm: String,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default = "default_max_packets_per_batch")]
    pub max_packets_per_batch: usize,
    #[serde(default = "default_resend_timeout_ms")]
    pub resend_timeout_ms: u64,
    #[serde(default = "default_staleness_timeout_ms")]
    pub staleness_timeout_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_encryption")]
    pub encryption: bool,
}

fn default_min_mtu() -> u16 {
    MIN_MTU
}

fn default_max_mtu() -> u16 {
    MAX_MTU
}

fn default_compression_threshold() -> u16 {
    256
}

fn default_compression_algorithm() -> String {
    "zlib".into()
}

fn default_compression_level() -> u32 {
    7
}

fn default_max_packets_per_batch() -> usize {
    500
}

fn default_resend_timeout_ms() -> u64 {
    1000
}

fn default_staleness_timeout_ms() -> u64 {
    15_000
}

fn default_ping_interval_ms() -> u64 {
    5000
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_encryption() -> bool {
    true
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            min_mtu: default_min_mtu(),
            max_mtu: default_max_mtu(),
            max_connections: None,
            compression_threshold: default_compression_threshold(),
            compression_algorithm: default_compression_algorithm(),
            compression_level: default_compression_level(),
            max_packets_per_batch: default_max_packets_per_batch(),
            resend_timeout_ms: default_resend_timeout_ms(),
            staleness_timeout_ms: default_staleness_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            encryption: default_encryption(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let net = &self.network;
        if net.min_mtu < MIN_MTU {
            return Err(ConfigError::Invalid(format!(
                "network.min_mtu ({}) is below {MIN_MTU}",
                net.min_mtu
            )));
        }
        if net.min_mtu > net.max_mtu {
            return Err(ConfigError::Invalid(format!(
                "network.min_mtu ({}) is above network.max_mtu ({})",
                net.min_mtu, net.max_mtu
            )));
        }
        if net.max_packets_per_batch == 0 {
            return Err(ConfigError::Invalid(
                "network.max_packets_per_batch must be at least 1".into(),
            ));
        }
        self.compression()?;
        self.bind_address()?;
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.address, self.server.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server.address: {e}")))
    }

    pub fn compression(&self) -> Result<CompressionAlgorithm, ConfigError> {
        let name = &self.network.compression_algorithm;
        CompressionAlgorithm::from_name(name).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown network.compression_algorithm \"{name}\""))
        })
    }

    pub fn gamemode_numeric(&self) -> u8 {
        match self.server.gamemode.to_lowercase().as_str() {
            "creative" => 1,
            "adventure" => 2,
            "spectator" => 3,
            _ => 0,
        }
    }

    /// The transport settings, as plain values.
    pub fn raknet_config(&self, server_guid: i64) -> Result<RakNetConfig, ConfigError> {
        let net = &self.network;
        let motd = ServerMotd {
            edition: "MCPE".into(),
            motd: self.server.motd.clone(),
            protocol_version: bedrock_proto::packets::PROTOCOL_VERSION as u32,
            game_version: "1.26.0".into(),
            online_players: 0,
            max_players: self.server.max_players,
            server_guid,
            sub_name: self.server.sub_name.clone(),
            gamemode: self.server.gamemode.clone(),
            gamemode_numeric: self.gamemode_numeric(),
            ipv4_port: self.server.port,
            ipv6_port: self.server.port.wrapping_add(1),
        };

        let mut config = RakNetConfig::new(self.bind_address()?, server_guid, motd);
        config.max_connections = net
            .max_connections
            .unwrap_or(self.server.max_players as usize);
        config.min_mtu = net.min_mtu;
        config.max_mtu = net.max_mtu;
        config.resend_timeout = Duration::from_millis(net.resend_timeout_ms);
        config.staleness_timeout = Duration::from_millis(net.staleness_timeout_ms);
        config.ping_interval = Duration::from_millis(net.ping_interval_ms);
        config.tick_interval = Duration::from_millis(net.tick_interval_ms.max(1));
        Ok(config)
    }

    /// Starting batch state for a new connection. Compression stays off
    /// until negotiated.
    pub fn batch_config(&self) -> Result<BatchConfig, ConfigError> {
        Ok(BatchConfig {
            compression: self.compression()?,
            compression_level: self.network.compression_level,
            compression_threshold: self.network.compression_threshold as usize,
            compression_enabled: false,
            max_packets: self.network.max_packets_per_batch,
            max_decompressed_size: MAX_DECOMPRESSED_SIZE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        address = "0.0.0.0"
        port = 19132
        motd = "Test Server"
        max_players = 20
        gamemode = "creative"
    "#;

    #[test]
    fn network_and_logging_default() {
        let config = ServerConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.server.sub_name, "world");
        assert_eq!(config.network.min_mtu, MIN_MTU);
        assert_eq!(config.network.max_mtu, MAX_MTU);
        assert_eq!(config.network.max_packets_per_batch, 500);
        assert!(config.network.encryption);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.gamemode_numeric(), 1);
    }

    #[test]
    fn raknet_config_from_sections() {
        let toml_str = format!(
            "{MINIMAL}
            [network]
            max_mtu = 1400
            resend_timeout_ms = 250
            tick_interval_ms = 10
            "
        );
        let config = ServerConfig::parse(&toml_str).unwrap();
        let raknet = config.raknet_config(42).unwrap();
        assert_eq!(raknet.address, "0.0.0.0:19132".parse().unwrap());
        assert_eq!(raknet.max_connections, 20);
        assert_eq!(raknet.max_mtu, 1400);
        assert_eq!(raknet.resend_timeout, Duration::from_millis(250));
        assert_eq!(raknet.tick_interval, Duration::from_millis(10));
        assert_eq!(raknet.motd.server_guid, 42);
        assert_eq!(raknet.motd.protocol_version, 924);
    }

    #[test]
    fn batch_config_from_sections() {
        let toml_str = format!(
            "{MINIMAL}
            [network]
            compression_algorithm = \"snappy\"
            compression_threshold = 1
            max_packets_per_batch = 64
            "
        );
        let batch = ServerConfig::parse(&toml_str)
            .unwrap()
            .batch_config()
            .unwrap();
        assert_eq!(batch.compression, CompressionAlgorithm::Snappy);
        assert_eq!(batch.compression_threshold, 1);
        assert_eq!(batch.max_packets, 64);
        assert!(!batch.compression_enabled);
    }

    #[test]
    fn invalid_values_rejected() {
        let bad_algo = format!("{MINIMAL}\n[network]\ncompression_algorithm = \"lz4\"\n");
        assert!(matches!(
            ServerConfig::parse(&bad_algo),
            Err(ConfigError::Invalid(_))
        ));

        let bad_mtu = format!("{MINIMAL}\n[network]\nmin_mtu = 1500\nmax_mtu = 1400\n");
        assert!(ServerConfig::parse(&bad_mtu).is_err());

        let tiny_mtu = format!("{MINIMAL}\n[network]\nmin_mtu = 0\nmax_mtu = 48\n");
        assert!(matches!(
            ServerConfig::parse(&tiny_mtu),
            Err(ConfigError::Invalid(_))
        ));

        let bad_addr = MINIMAL.replace("0.0.0.0", "not-an-ip");
        assert!(ServerConfig::parse(&bad_addr).is_err());
    }

    #[test]
    fn missing_server_section() {
        assert!(matches!(
            ServerConfig::parse("[logging]\nlevel = \"debug\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn shipped_config_parses() {
        let config = ServerConfig::parse(include_str!("../server.toml")).unwrap();
        assert!(config.raknet_config(1).is_ok());
        assert!(config.batch_config().is_ok());
    }
}
