//! Worker dependencies (using traits for testability)
//!
//! Everything the capture cycle touches outside of the engine process is passed in
//! here explicitly: the job store, the port probe and the webhook notifier.

use anyhow::Result;
use std::sync::Arc;

use crate::config::CaptureConfig;
use crate::kernel::{
    BaseCaptureStore, BasePortProbe, BaseWebhookNotifier, HttpPortProbe, HttpWebhookNotifier,
};

/// Worker dependencies accessible to capture activities
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn BaseCaptureStore>,
    pub port_probe: Arc<dyn BasePortProbe>,
    pub webhook: Arc<dyn BaseWebhookNotifier>,
}

impl WorkerDeps {
    pub fn new(
        store: Arc<dyn BaseCaptureStore>,
        port_probe: Arc<dyn BasePortProbe>,
        webhook: Arc<dyn BaseWebhookNotifier>,
    ) -> Self {
        Self {
            store,
            port_probe,
            webhook,
        }
    }

    /// Wire the HTTP-backed probe and notifier around a shared client.
    pub fn from_config(
        config: &CaptureConfig,
        store: Arc<dyn BaseCaptureStore>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let port_probe = HttpPortProbe::new(config.probe_timeout)?;
        let webhook = HttpWebhookNotifier::new(http, config.webhook_timeout);

        Ok(Self::new(store, Arc::new(port_probe), Arc::new(webhook)))
    }
}
