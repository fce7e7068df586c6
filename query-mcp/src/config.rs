use std::time::Duration;

use serde::Deserialize;

use crate::source::StreamOptions;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// WebSocket endpoint.
    pub path: String,
    pub metrics_path: String,
    pub health_path: String,
    /// Deadline applied by the session to every `tools/call`.
    #[serde(with = "millis")]
    pub call_timeout: Duration,
    /// Deadline applied by the executor to each tool run.
    #[serde(with = "millis")]
    pub tool_timeout: Duration,
    pub batch_size: usize,
    #[serde(with = "millis")]
    pub query_latency: Duration,
    #[serde(with = "millis")]
    pub batch_delay: Duration,
    pub stream_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9000,
            path: "/mcp".into(),
            metrics_path: "/metrics".into(),
            health_path: "/health".into(),
            call_timeout: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(30),
            batch_size: 5,
            query_latency: Duration::from_millis(50),
            batch_delay: Duration::from_millis(20),
            stream_capacity: 10,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            batch_size: self.batch_size.max(1),
            pacing: self.batch_delay,
            capacity: self.stream_capacity.max(1),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
