// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML session configuration with strict validation.
//!
//! Every section is optional; command-line arguments fill or override what the
//! file leaves out. Any invalid field results in a HardValidationError that
//! prevents the participant from starting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, PipeError, PipeResult};
use crate::types::{Capacity, SegmentName, XorKey};

/// Raw session section as parsed from YAML (before validation).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSessionConfig {
    segment: Option<String>,
    capacity: Option<i64>,
    source: Option<String>,
    key: Option<RawKey>,
}

/// Keys may be written as YAML integers (`42`) or strings (`"0x2A"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawKey {
    Number(i64),
    Text(String),
}

impl RawKey {
    fn validate(self) -> Result<XorKey, HardValidationError> {
        match self {
            Self::Number(n) => u8::try_from(n).map(XorKey::new).map_err(|_| {
                HardValidationError::InvalidFieldValue {
                    field: "session.key",
                    value: n.to_string(),
                    reason: "Key must fit in a single byte (0-255)".to_string(),
                }
            }),
            Self::Text(s) => s.parse(),
        }
    }
}

/// Upper bound on extra wake-up permits; a handful is enough in practice.
pub const MAX_WAKE_SLACK: u32 = 10_000;

/// Raw shutdown section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawShutdownConfig {
    #[serde(default = "default_drain_timeout_secs")]
    drain_timeout_secs: u32,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_wake_slack")]
    wake_slack: u32,
}

fn default_drain_timeout_secs() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_wake_slack() -> u32 {
    5
}

impl Default for RawShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            wake_slack: default_wake_slack(),
        }
    }
}

/// Raw consumer section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConsumerConfig {
    #[serde(default = "default_output")]
    output: String,
}

fn default_output() -> String {
    "output_receptor.txt".to_string()
}

impl Default for RawConsumerConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    session: RawSessionConfig,
    #[serde(default)]
    shutdown: RawShutdownConfig,
    #[serde(default)]
    consumer: RawConsumerConfig,
}

/// Validated session parameters. Absent values are filled from the CLI.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub segment: Option<SegmentName>,
    pub capacity: Option<Capacity>,
    pub source: Option<PathBuf>,
    pub key: Option<XorKey>,
}

/// Validated coordinator timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Number of drain polls before giving up on stragglers, i.e.
    /// `drain_timeout_secs` divided by the poll interval, rounded up.
    pub drain_ticks: u32,
    pub poll_interval: Duration,
    /// Extra permits posted beyond the sampled role counters.
    pub wake_slack: u32,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_ticks: default_drain_timeout_secs(),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            wake_slack: default_wake_slack(),
        }
    }
}

/// Validated consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub output: PathBuf,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(default_output()),
        }
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub session: SessionConfig,
    pub shutdown: ShutdownConfig,
    pub consumer: ConsumerConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> PipeResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PipeError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| PipeError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> PipeResult<Config> {
        // An empty document is a valid, all-defaults configuration.
        if content.trim().is_empty() {
            return Self::validate(RawConfig::default());
        }

        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| PipeError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> PipeResult<Config> {
        Ok(Config {
            session: Self::validate_session(raw.session)?,
            shutdown: Self::validate_shutdown(raw.shutdown)?,
            consumer: Self::validate_consumer(raw.consumer)?,
        })
    }

    fn validate_session(raw: RawSessionConfig) -> PipeResult<SessionConfig> {
        let segment = raw.segment.map(SegmentName::new).transpose()?;
        let capacity = raw.capacity.map(Capacity::new).transpose()?;
        let key = raw.key.map(RawKey::validate).transpose()?;

        let source = match raw.source {
            Some(s) if s.is_empty() => {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "session.source",
                    value: s,
                    reason: "Source path cannot be empty".to_string(),
                }
                .into())
            }
            other => other.map(PathBuf::from),
        };

        Ok(SessionConfig {
            segment,
            capacity,
            source,
            key,
        })
    }

    fn validate_shutdown(raw: RawShutdownConfig) -> PipeResult<ShutdownConfig> {
        if raw.drain_timeout_secs == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "shutdown.drain_timeout_secs",
                value: raw.drain_timeout_secs.to_string(),
                reason: "Drain timeout must be at least one tick".to_string(),
            }
            .into());
        }

        if raw.poll_interval_ms == 0 || raw.poll_interval_ms > 60_000 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "shutdown.poll_interval_ms",
                value: raw.poll_interval_ms.to_string(),
                reason: "Poll interval must be between 1ms and 60000ms".to_string(),
            }
            .into());
        }

        if raw.wake_slack == 0 || raw.wake_slack > MAX_WAKE_SLACK {
            return Err(HardValidationError::InvalidFieldValue {
                field: "shutdown.wake_slack",
                value: raw.wake_slack.to_string(),
                reason: format!("Wake slack must be between 1 and {}", MAX_WAKE_SLACK),
            }
            .into());
        }

        // The timeout is given in seconds; the coordinator counts polls.
        let timeout_ms = u64::from(raw.drain_timeout_secs) * 1000;
        let drain_ticks = u32::try_from(timeout_ms.div_ceil(raw.poll_interval_ms))
            .unwrap_or(u32::MAX)
            .max(1);

        Ok(ShutdownConfig {
            drain_ticks,
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
            wake_slack: raw.wake_slack,
        })
    }

    fn validate_consumer(raw: RawConsumerConfig) -> PipeResult<ConsumerConfig> {
        if raw.output.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "consumer.output",
                value: raw.output,
                reason: "Output path cannot be empty".to_string(),
            }
            .into());
        }
        Ok(ConsumerConfig {
            output: PathBuf::from(raw.output),
        })
    }
}
