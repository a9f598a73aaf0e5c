use std::time::Duration;

use clap::Parser;

use crate::error::{ClientError, Result};

pub const DEFAULT_SERVER_ADDR: &str = "localhost:8080";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STRESS_CONCURRENCY: usize = 200;

/// Connection settings shared by every client handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    server_addr: String,
    connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>) -> Result<Self> {
        let server_addr = server_addr.into();
        if server_addr.trim().is_empty() {
            return Err(ClientError::MissingServerAddress);
        }
        Ok(ClientConfig {
            server_addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

/// Shape of a stress batch: `iterations` rounds of `concurrency` clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    pub iterations: usize,
    pub concurrency: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            iterations: 1,
            concurrency: DEFAULT_STRESS_CONCURRENCY,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "strcount", version, about = "Test client for the StringOperations RPC service")]
pub struct Cli {
    /// Server address
    #[arg(long, env = "STRCOUNT_SERVER", default_value = DEFAULT_SERVER_ADDR)]
    pub server: String,

    /// Connect timeout in milliseconds
    #[arg(long, env = "STRCOUNT_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Number of rounds run by `-concurrency`
    #[arg(long, env = "STRCOUNT_STRESS_ITERATIONS", default_value_t = 1)]
    pub stress_iterations: usize,

    /// Clients started per round by `-concurrency`
    #[arg(long, env = "STRCOUNT_STRESS_CONCURRENCY", default_value_t = DEFAULT_STRESS_CONCURRENCY)]
    pub stress_concurrency: usize,
}

impl Cli {
    pub fn into_configs(self) -> Result<(ClientConfig, StressConfig)> {
        let client = ClientConfig::new(self.server)?
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        let stress = StressConfig {
            iterations: self.stress_iterations,
            concurrency: self.stress_concurrency,
        };
        Ok((client, stress))
    }
}
