//! Proxy port availability check.
//!
//! The engine binds a local proxy on the configured port. A leftover engine (or
//! anything else) may still hold it, and such a process often accepts the
//! connection but never answers. So the probe is an HTTP request, not a bind:
//!
//! - connection refused: nobody listening, port is free
//! - request hangs until the timeout: something holds the port, busy
//! - any HTTP response: something is serving there, busy

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::traits::{BasePortProbe, PortStatus};

pub struct HttpPortProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPortProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        // Probing localhost must never go through an environment proxy
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .context("Failed to build port probe HTTP client")?;

        Ok(Self { client, timeout })
    }

    fn classify(port: u16, result: reqwest::Result<reqwest::Response>) -> PortStatus {
        match result {
            Ok(response) => {
                warn!(
                    port,
                    status = %response.status(),
                    "proxy port answered HTTP, treating as busy"
                );
                PortStatus::Busy
            }
            Err(e) if e.is_connect() => {
                debug!(port, "proxy port refused connection, free");
                PortStatus::Free
            }
            Err(e) if e.is_timeout() => {
                warn!(port, "proxy port accepted but did not answer, busy");
                PortStatus::Busy
            }
            Err(e) => {
                debug!(port, error = %e, "proxy port probe failed, treating as free");
                PortStatus::Free
            }
        }
    }
}

#[async_trait]
impl BasePortProbe for HttpPortProbe {
    async fn probe(&self, port: u16) -> PortStatus {
        let url = format!("http://localhost:{port}/");
        let result = self.client.head(&url).timeout(self.timeout).send().await;
        Self::classify(port, result)
    }
}
