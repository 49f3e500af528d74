//! Engine configuration.
//!
//! RULE: the engine only accepts a `ValidatedConfig`. Bad thresholds or a
//! malformed rule table are rejected here, before any classification runs.

use crate::{
    error::{EngineError, EngineResult},
    segment::{default_rules, SegmentRule},
    types::{Days, Score},
};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Largest supported bucket count. Scores are stored as `u8`.
pub const MAX_BUCKET_COUNT: Score = 100;

/// Which transactions count toward frequency and monetary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lookback {
    #[default]
    AllTime,
    TrailingDays { days: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RfmConfig {
    pub bucket_count: Score,
    pub lookback:     Lookback,
}

impl Default for RfmConfig {
    fn default() -> Self {
        Self {
            bucket_count: 5,
            lookback:     Lookback::AllTime,
        }
    }
}

/// Upper day bounds of each TAM band. Must be strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TamThresholds {
    pub active_max_days:   Days,
    pub at_risk_max_days:  Days,
    pub inactive_max_days: Days,
    pub lost_max_days:     Days,
}

impl Default for TamThresholds {
    fn default() -> Self {
        Self {
            active_max_days:   30,
            at_risk_max_days:  90,
            inactive_max_days: 180,
            lost_max_days:     365,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Minimum whole days between two At-Risk alerts for the same customer.
    pub cooldown_days:       Days,
    /// Attempts made to persist a ledger update before the failure is surfaced.
    pub persist_retries:     u32,
    /// Segment label that triggers a one-time VIP alert. `None` disables it.
    pub vip_segment:         Option<String>,
    pub sweep_interval_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            cooldown_days:       15,
            persist_retries:     3,
            vip_segment:         Some("Champions".into()),
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub rfm:           RfmConfig,
    pub tam:           TamThresholds,
    pub segments:      Vec<SegmentRule>,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct EngineConfigFile {
    rfm:           RfmConfig,
    tam:           TamThresholds,
    segments:      Option<Vec<SegmentRule>>,
    notifications: NotificationConfig,
}

impl From<EngineConfigFile> for EngineConfig {
    fn from(file: EngineConfigFile) -> Self {
        // An omitted rule table is generated for the configured bucket count.
        let segments = file
            .segments
            .unwrap_or_else(|| default_rules(file.rfm.bucket_count));
        Self {
            rfm: file.rfm,
            tam: file.tam,
            segments,
            notifications: file.notifications,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfigFile::default().into()
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing sections take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
    }

    pub fn from_json(content: &str) -> EngineResult<Self> {
        let file: EngineConfigFile = serde_json::from_str(content)?;
        Ok(file.into())
    }

    /// Defaults with a different bucket count and a rule table scaled to it.
    pub fn with_bucket_count(bucket_count: Score) -> Self {
        let mut config = Self::default();
        config.rfm.bucket_count = bucket_count;
        config.segments = default_rules(bucket_count);
        config
    }

    /// Check every constraint the engine relies on.
    pub fn validate(self) -> EngineResult<ValidatedConfig> {
        let k = self.rfm.bucket_count;
        if !(2..=MAX_BUCKET_COUNT).contains(&k) {
            return Err(EngineError::configuration(format!(
                "bucket_count must be in [2, {MAX_BUCKET_COUNT}], got {k}"
            )));
        }

        if let Lookback::TrailingDays { days: 0 } = self.rfm.lookback {
            return Err(EngineError::configuration("lookback window must be at least 1 day"));
        }

        let t = &self.tam;
        if t.active_max_days < 0 {
            return Err(EngineError::configuration(format!(
                "active_max_days must be non-negative, got {}",
                t.active_max_days
            )));
        }
        let increasing = t.active_max_days < t.at_risk_max_days
            && t.at_risk_max_days < t.inactive_max_days
            && t.inactive_max_days < t.lost_max_days;
        if !increasing {
            return Err(EngineError::configuration(format!(
                "TAM thresholds must be strictly increasing, got {}/{}/{}/{}",
                t.active_max_days, t.at_risk_max_days, t.inactive_max_days, t.lost_max_days
            )));
        }

        self.validate_rules()?;

        let n = &self.notifications;
        if n.cooldown_days < 1 {
            return Err(EngineError::configuration("cooldown_days must be at least 1"));
        }
        if n.persist_retries < 1 {
            return Err(EngineError::configuration("persist_retries must be at least 1"));
        }
        if n.sweep_interval_secs < 1 {
            return Err(EngineError::configuration("sweep_interval_secs must be at least 1"));
        }
        if let Some(vip) = &n.vip_segment {
            if !self.segments.iter().any(|r| &r.label == vip) {
                return Err(EngineError::configuration(format!(
                    "vip_segment '{vip}' is not a label in the segment table"
                )));
            }
        }

        Ok(ValidatedConfig(self))
    }

    fn validate_rules(&self) -> EngineResult<()> {
        let k = self.rfm.bucket_count;
        let Some(last) = self.segments.last() else {
            return Err(EngineError::configuration("segment table is empty"));
        };
        if !last.is_unconditional() {
            return Err(EngineError::configuration(format!(
                "last segment rule '{}' must be an unconditional catch-all",
                last.label
            )));
        }
        for rule in &self.segments {
            if rule.label.trim().is_empty() {
                return Err(EngineError::configuration("segment labels must be non-empty"));
            }
            for range in rule.ranges() {
                if range.min < 1 || range.max > k || range.min > range.max {
                    return Err(EngineError::configuration(format!(
                        "segment '{}' has range {}..={} outside [1, {k}]",
                        rule.label, range.min, range.max
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A configuration that passed `EngineConfig::validate`.
#[derive(Debug, Clone)]
pub struct ValidatedConfig(EngineConfig);

impl Deref for ValidatedConfig {
    type Target = EngineConfig;

    fn deref(&self) -> &EngineConfig {
        &self.0
    }
}
