/// Node configuration — identity and collector connection parameters.
///
/// Baked in at build time from environment variables so every node in a
/// deployment is flashed from the same source:
///
/// ```text
/// DEVICE_ID=B WIFI_SSID=lab WIFI_PASSWORD=secret \
/// COLLECTOR_HOST=192.168.1.20 COLLECTOR_PORT=5000 cargo build --features xiao
/// ```
///
/// Unset variables fall back to `defaults`. `WIFI_SSID` has no default and
/// must be set. Loaded once at startup and
/// immutable afterwards.
use core::net::Ipv4Addr;

use crate::defaults;
use crate::error::ConfigError;
use crate::protocol::{parse_device_id, DeviceId};

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub device_id: DeviceId,
    pub wifi_ssid: &'static str,
    pub wifi_password: &'static str,
    pub collector_host: &'static str,
    pub collector_port: u16,
}

impl NodeConfig {
    pub fn new(
        device_id: &str,
        wifi_ssid: &'static str,
        wifi_password: &'static str,
        collector_host: &'static str,
        collector_port: u16,
    ) -> Result<Self, ConfigError> {
        if collector_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let device_id = parse_device_id(device_id)?;
        if wifi_ssid.is_empty() {
            return Err(ConfigError::EmptySsid);
        }
        Ok(Self {
            device_id,
            wifi_ssid,
            wifi_password,
            collector_host,
            collector_port,
        })
    }

    /// Configuration from build-time environment, with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match option_env!("COLLECTOR_PORT") {
            Some(p) => parse_port(p)?,
            None => defaults::COLLECTOR_PORT,
        };
        Self::new(
            option_env!("DEVICE_ID").unwrap_or(defaults::DEVICE_ID),
            option_env!("WIFI_SSID").unwrap_or(""),
            option_env!("WIFI_PASSWORD").unwrap_or(""),
            option_env!("COLLECTOR_HOST").unwrap_or(defaults::COLLECTOR_HOST),
            port,
        )
    }

    /// Collector address as an IPv4 literal (the no_std stack has no DNS).
    pub fn collector_ipv4(&self) -> Result<Ipv4Addr, ConfigError> {
        self.collector_host
            .parse()
            .map_err(|_| ConfigError::InvalidHost)
    }
}

fn parse_port(s: &str) -> Result<u16, ConfigError> {
    match s.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidPort),
        Ok(port) => Ok(port),
    }
}
