// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into WorkerDeps for tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{BasePortProbe, BaseWebhookNotifier, PortStatus};

// =============================================================================
// Mock Port Probe
// =============================================================================

/// Returns scripted statuses in order, then `Free` once the script runs out.
#[derive(Clone, Default)]
pub struct MockPortProbe {
    statuses: Arc<Mutex<VecDeque<PortStatus>>>,
    probed_ports: Arc<Mutex<Vec<u16>>>,
}

impl MockPortProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(self, status: PortStatus) -> Self {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push_back(status);
        }
        self
    }

    /// Ports probed so far, in order
    pub fn probed_ports(&self) -> Vec<u16> {
        self.probed_ports
            .lock()
            .map(|ports| ports.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BasePortProbe for MockPortProbe {
    async fn probe(&self, port: u16) -> PortStatus {
        if let Ok(mut ports) = self.probed_ports.lock() {
            ports.push(port);
        }
        self.statuses
            .lock()
            .ok()
            .and_then(|mut statuses| statuses.pop_front())
            .unwrap_or(PortStatus::Free)
    }
}

// =============================================================================
// Mock Webhook Notifier
// =============================================================================

/// Arguments captured from a notify call
#[derive(Debug, Clone)]
pub struct WebhookCall {
    pub callback_url: String,
    pub payload: serde_json::Value,
}

#[derive(Clone, Default)]
pub struct MockWebhookNotifier {
    calls: Arc<Mutex<Vec<WebhookCall>>>,
    fail: bool,
}

impl MockWebhookNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call is recorded and then reported as a delivery failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<WebhookCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BaseWebhookNotifier for MockWebhookNotifier {
    async fn notify(&self, callback_url: &str, payload: &serde_json::Value) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(WebhookCall {
                callback_url: callback_url.to_string(),
                payload: payload.clone(),
            });
        }
        if self.fail {
            bail!("mock webhook receiver unavailable");
        }
        Ok(())
    }
}
