use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::domains::captures::activities::ArchiveFormat;
use crate::kernel::TerminationPolicy;

/// Engine flags the capture runner sets itself; pass-through options may not redefine them.
pub const MANAGED_ENGINE_FLAGS: [&str; 5] = [
    "--output",
    "--format",
    "--json-summary-output",
    "--export-attachments-output",
    "--proxy-port",
];

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub capture: CaptureConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let capture = CaptureConfig::from_lookup(&lookup)?;

        Ok(Self {
            database_url,
            capture,
        })
    }
}

/// Settings consumed by the capture worker.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Root folder under which one directory per capture is created
    pub temporary_storage_path: PathBuf,
    /// When this path exists, the worker stops issuing new cycles
    pub deployment_sentinel_path: PathBuf,
    /// Produce gzipped WARC instead of WACZ
    pub downgrade_to_warc: bool,
    /// Engine program followed by its leading arguments
    pub engine_command: Vec<String>,
    /// Pass-through engine options, in invocation order
    pub engine_options: EngineOptions,
    /// Time allowed past the soft capture timeout before the engine is terminated
    pub timeout_fuse: Duration,
    /// Time between the terminate and kill signals
    pub termination_grace: Duration,
    /// Proxy port the worker starts hunting from
    pub proxy_port: u16,
    pub probe_timeout: Duration,
    pub webhook_timeout: Duration,
    /// Pause after a cycle that found nothing to do
    pub poll_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            temporary_storage_path: PathBuf::from("./storage"),
            deployment_sentinel_path: PathBuf::from("/tmp/capture-worker.stop"),
            downgrade_to_warc: false,
            engine_command: vec!["npx".to_string(), "scoop".to_string()],
            engine_options: EngineOptions::default(),
            timeout_fuse: Duration::from_secs(35),
            termination_grace: Duration::from_secs(5),
            proxy_port: 9000,
            probe_timeout: Duration::from_secs(1),
            webhook_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl CaptureConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let engine_options = match lookup("SCOOP_CLI_OPTIONS") {
            Some(raw) => EngineOptions::from_json(&raw).context("SCOOP_CLI_OPTIONS is invalid")?,
            None => defaults.engine_options,
        };

        let engine_command = match lookup("ENGINE_COMMAND") {
            Some(raw) => raw.split_whitespace().map(str::to_string).collect(),
            None => defaults.engine_command,
        };

        let config = Self {
            temporary_storage_path: lookup("TEMPORARY_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.temporary_storage_path),
            deployment_sentinel_path: lookup("DEPLOYMENT_SENTINEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.deployment_sentinel_path),
            downgrade_to_warc: lookup("DOWNGRADE_TO_WARC")
                .map(|raw| parse_flag(&raw))
                .transpose()
                .context("DOWNGRADE_TO_WARC must be a boolean")?
                .unwrap_or(defaults.downgrade_to_warc),
            engine_command,
            engine_options,
            timeout_fuse: lookup("SCOOP_TIMEOUT_FUSE")
                .map(|raw| raw.trim().parse::<u64>().map(Duration::from_secs))
                .transpose()
                .context("SCOOP_TIMEOUT_FUSE must be a number of seconds")?
                .unwrap_or(defaults.timeout_fuse),
            termination_grace: lookup("ENGINE_TERMINATION_GRACE_SECONDS")
                .map(|raw| raw.trim().parse::<u64>().map(Duration::from_secs))
                .transpose()
                .context("ENGINE_TERMINATION_GRACE_SECONDS must be a number of seconds")?
                .unwrap_or(defaults.termination_grace),
            proxy_port: lookup("PROXY_PORT")
                .map(|raw| raw.trim().parse::<u16>())
                .transpose()
                .context("PROXY_PORT must be a valid TCP port")?
                .unwrap_or(defaults.proxy_port),
            probe_timeout: lookup("PORT_PROBE_TIMEOUT_MS")
                .map(|raw| raw.trim().parse::<u64>().map(Duration::from_millis))
                .transpose()
                .context("PORT_PROBE_TIMEOUT_MS must be a number of milliseconds")?
                .unwrap_or(defaults.probe_timeout),
            webhook_timeout: lookup("WEBHOOK_TIMEOUT_SECONDS")
                .map(|raw| raw.trim().parse::<u64>().map(Duration::from_secs))
                .transpose()
                .context("WEBHOOK_TIMEOUT_SECONDS must be a number of seconds")?
                .unwrap_or(defaults.webhook_timeout),
            poll_interval: lookup("CAPTURE_POLL_INTERVAL_MS")
                .map(|raw| raw.trim().parse::<u64>().map(Duration::from_millis))
                .transpose()
                .context("CAPTURE_POLL_INTERVAL_MS must be a number of milliseconds")?
                .unwrap_or(defaults.poll_interval),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is sufficient to run captures.
    pub fn validate(&self) -> Result<()> {
        if self.engine_command.is_empty() {
            bail!("ENGINE_COMMAND must name a program");
        }
        if self.proxy_port == 0 {
            bail!("PROXY_PORT must be a valid, non-zero TCP port");
        }
        self.engine_options.capture_timeout()?;
        if let Some(flag) = self.engine_options.managed_flag() {
            bail!("engine option {flag} is set by the capture runner and cannot be overridden");
        }
        Ok(())
    }

    pub fn archive_format(&self) -> ArchiveFormat {
        if self.downgrade_to_warc {
            ArchiveFormat::WarcGzipped
        } else {
            ArchiveFormat::Wacz
        }
    }

    /// Hard bound on one engine run: soft capture timeout plus the fuse.
    pub fn engine_deadline(&self) -> Result<Duration> {
        Ok(self.engine_options.capture_timeout()? + self.timeout_fuse)
    }

    pub fn termination_policy(&self) -> TerminationPolicy {
        TerminationPolicy::new(self.termination_grace)
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("unrecognized boolean value: {other}"),
    }
}

/// Ordered `(flag, value)` options handed to the engine verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineOptions(IndexMap<String, serde_json::Value>);

impl Default for EngineOptions {
    fn default() -> Self {
        let mut options = Self::empty();
        options.set(Self::CAPTURE_TIMEOUT_FLAG, 45_000);
        options
    }
}

impl EngineOptions {
    /// Soft capture timeout, in milliseconds.
    pub const CAPTURE_TIMEOUT_FLAG: &'static str = "--capture-timeout";

    pub fn empty() -> Self {
        Self(IndexMap::new())
    }

    /// Parse a JSON object of `flag -> scalar` pairs, keeping their order.
    pub fn from_json(raw: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(raw).context("expected a JSON object")?;
        for (flag, value) in &options.0 {
            if value.is_array() || value.is_object() || value.is_null() {
                bail!("engine option {flag} must be a string, number or boolean");
            }
        }
        Ok(options)
    }

    pub fn set(&mut self, flag: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(flag.into(), value.into());
    }

    pub fn get(&self, flag: &str) -> Option<&serde_json::Value> {
        self.0.get(flag)
    }

    pub fn capture_timeout(&self) -> Result<Duration> {
        let value = self
            .get(Self::CAPTURE_TIMEOUT_FLAG)
            .context("engine options must define --capture-timeout")?;
        let millis = match value {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .context("--capture-timeout must be a non-negative number of milliseconds")?;
        Ok(Duration::from_millis(millis))
    }

    /// First option that collides with a flag the runner manages.
    pub fn managed_flag(&self) -> Option<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .find(|flag| MANAGED_ENGINE_FLAGS.contains(flag))
    }

    /// Flattened `flag value flag value ...` argument list.
    pub fn to_args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(flag, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                [flag.clone(), value]
            })
            .collect()
    }
}
