//! Scan configuration and validation

use std::time::Duration;

use keyscan_crypto::encoding::p2pkh_digest;
use keyscan_crypto::Hash160;
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::range::{KeyRange, Percent};
use crate::step::StepBound;

/// Raw scan configuration as supplied by a front-end.
///
/// Numbers are kept as strings: range bounds in hex, steps in decimal, the
/// threshold as a decimal percentage. [`ScanConfig::validate`] turns this
/// into a [`ScanPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Hash160 as 40 hex digits, or a P2PKH address
    pub target: String,
    /// Range start (hex, optional 0x prefix)
    pub range_start: String,
    /// Range end (hex, optional 0x prefix)
    pub range_end: String,
    /// Smallest step (decimal)
    pub min_step: String,
    /// Largest step (decimal)
    pub max_step: String,
    /// Skip candidates below this percentage of the range (0 = off)
    #[serde(default)]
    pub threshold_percent: Option<String>,
    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Restart from the range start after passing the end
    #[serde(default = "default_wraparound")]
    pub wraparound: bool,
    /// Tested keys between progress events
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    /// Wall-clock limit in seconds (0 = unlimited)
    #[serde(default)]
    pub max_time_secs: u64,
    /// Seed for reproducible stepping
    #[serde(default)]
    pub seed: Option<u64>,
    /// Bound of the worker event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_workers() -> usize {
    1
}

fn default_wraparound() -> bool {
    true
}

fn default_report_interval() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            range_start: String::new(),
            range_end: String::new(),
            min_step: "1".to_string(),
            max_step: "1".to_string(),
            threshold_percent: None,
            workers: default_workers(),
            wraparound: default_wraparound(),
            report_interval: default_report_interval(),
            max_time_secs: 0,
            seed: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Settings every worker scans with.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub target: Hash160,
    pub step: StepBound,
    /// Positions below this are stepped over without derivation
    pub threshold: Option<BigUint>,
    pub wraparound: bool,
    pub report_interval: u64,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub range: KeyRange,
    pub options: ScanOptions,
    pub workers: usize,
    pub max_time: Option<Duration>,
    pub seed: Option<u64>,
    pub channel_capacity: usize,
}

impl ScanPlan {
    /// RNG for one worker: `seed + worker` when seeded, OS entropy otherwise
    pub fn rng_for(&self, worker: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
            None => StdRng::from_entropy(),
        }
    }
}

impl ScanConfig {
    /// Check every field and build the plan
    pub fn validate(&self) -> Result<ScanPlan, ConfigError> {
        let target = parse_target(&self.target)?;

        let start = parse_hex("range start", &self.range_start)?;
        let end = parse_hex("range end", &self.range_end)?;
        if end.bits() > 256 {
            return Err(ConfigError::RangeTooLarge);
        }
        let range = KeyRange::new(start, end)?;

        let min = parse_decimal("min step", &self.min_step)?;
        let max = parse_decimal("max step", &self.max_step)?;
        let step = StepBound::new(min, max)?;

        let threshold = match self.threshold_percent.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let percent: Percent = raw.parse()?;
                (!percent.is_zero()).then(|| range.threshold_at(&percent))
            }
        };

        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.report_interval == 0 {
            return Err(ConfigError::ZeroReportInterval);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }

        Ok(ScanPlan {
            range,
            options: ScanOptions {
                target,
                step,
                threshold,
                wraparound: self.wraparound,
                report_interval: self.report_interval,
            },
            workers: self.workers,
            max_time: (self.max_time_secs > 0).then(|| Duration::from_secs(self.max_time_secs)),
            seed: self.seed,
            channel_capacity: self.channel_capacity,
        })
    }
}

/// Hash160 hex in any case, or a Base58Check P2PKH address
pub fn parse_target(raw: &str) -> Result<Hash160, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::MissingTarget);
    }
    if raw.len() == Hash160::HEX_LEN {
        if let Ok(digest) = raw.parse::<Hash160>() {
            return Ok(digest);
        }
    }
    p2pkh_digest(raw).map_err(|_| ConfigError::InvalidTarget(raw.to_string()))
}

fn parse_hex(field: &'static str, raw: &str) -> Result<BigUint, ConfigError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let invalid = || ConfigError::InvalidHex {
        field,
        value: raw.to_string(),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(invalid)
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<BigUint, ConfigError> {
    let digits = raw.trim();
    let invalid = || ConfigError::InvalidDecimal {
        field,
        value: raw.to_string(),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    BigUint::parse_bytes(digits.as_bytes(), 10).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY5_HASH: &str = "4747e8746cddb33b0f7f95a90f89f89fb387cbb6";

    fn config() -> ScanConfig {
        ScanConfig {
            target: KEY5_HASH.to_string(),
            range_start: "1".to_string(),
            range_end: "64".to_string(),
            min_step: "1".to_string(),
            max_step: "10".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let plan = config().validate().unwrap();
        assert_eq!(plan.range.start(), &BigUint::from(1u32));
        assert_eq!(plan.range.end(), &BigUint::from(100u32));
        assert_eq!(plan.options.step.max(), &BigUint::from(10u32));
        assert_eq!(plan.options.target.to_hex(), KEY5_HASH);
        assert!(plan.options.threshold.is_none());
        assert!(plan.options.wraparound);
        assert_eq!(plan.options.report_interval, 1000);
        assert_eq!(plan.workers, 1);
        assert!(plan.max_time.is_none());
    }

    #[test]
    fn test_defaults_from_json() {
        let json = r#"{
            "target": "4747E8746CDDB33B0F7F95A90F89F89FB387CBB6",
            "range_start": "0x1",
            "range_end": "0xff",
            "min_step": "1",
            "max_step": "3"
        }"#;
        let config: ScanConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.workers, 1);
        assert!(config.wraparound);
        assert_eq!(config.report_interval, 1000);
        assert_eq!(config.channel_capacity, 1024);

        let plan = config.validate().unwrap();
        assert_eq!(plan.options.target.to_hex(), KEY5_HASH);
        assert_eq!(plan.range.end(), &BigUint::from(255u32));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let mut c = config();
        c.range_start = "64".to_string();
        c.range_end = "1".to_string();
        assert_eq!(c.validate().unwrap_err(), ConfigError::EmptyRange);

        c.range_end = "64".to_string();
        assert_eq!(c.validate().unwrap_err(), ConfigError::EmptyRange);
    }

    #[test]
    fn test_rejects_bad_steps() {
        let mut c = config();
        c.min_step = "11".to_string();
        assert_eq!(c.validate().unwrap_err(), ConfigError::StepOrder);

        c.min_step = "0".to_string();
        assert_eq!(c.validate().unwrap_err(), ConfigError::ZeroStep);

        c.min_step = "1.5".to_string();
        assert!(matches!(
            c.validate().unwrap_err(),
            ConfigError::InvalidDecimal { field: "min step", .. }
        ));
    }

    #[test]
    fn test_rejects_bad_hex() {
        let mut c = config();
        c.range_start = "xyz".to_string();
        assert!(matches!(
            c.validate().unwrap_err(),
            ConfigError::InvalidHex { field: "range start", .. }
        ));

        c.range_start = "0x".to_string();
        assert!(matches!(c.validate().unwrap_err(), ConfigError::InvalidHex { .. }));
    }

    #[test]
    fn test_rejects_range_beyond_256_bits() {
        let mut c = config();
        c.range_end = format!("1{}", "0".repeat(64));
        assert_eq!(c.validate().unwrap_err(), ConfigError::RangeTooLarge);

        c.range_end = "f".repeat(64);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_target_forms() {
        assert_eq!(parse_target(""), Err(ConfigError::MissingTarget));
        assert_eq!(
            parse_target("17Vu7st1U1KwymUKU4jJheHHGRVNqrcfLD").unwrap().to_hex(),
            KEY5_HASH
        );
        assert_eq!(
            parse_target("not-a-target"),
            Err(ConfigError::InvalidTarget("not-a-target".to_string()))
        );
        assert!(parse_target(&KEY5_HASH[..38]).is_err());
    }

    #[test]
    fn test_threshold() {
        let mut c = config();
        c.threshold_percent = Some("0".to_string());
        assert!(c.validate().unwrap().options.threshold.is_none());

        c.threshold_percent = Some("50".to_string());
        // 1 + 99 * 50 / 100
        assert_eq!(
            c.validate().unwrap().options.threshold,
            Some(BigUint::from(50u32))
        );

        c.threshold_percent = Some("150".to_string());
        assert_eq!(
            c.validate().unwrap_err(),
            ConfigError::InvalidThreshold("150".to_string())
        );
    }

    #[test]
    fn test_rejects_zero_counts() {
        let mut c = config();
        c.workers = 0;
        assert_eq!(c.validate().unwrap_err(), ConfigError::NoWorkers);

        let mut c = config();
        c.report_interval = 0;
        assert_eq!(c.validate().unwrap_err(), ConfigError::ZeroReportInterval);

        let mut c = config();
        c.channel_capacity = 0;
        assert_eq!(c.validate().unwrap_err(), ConfigError::ZeroChannelCapacity);
    }

    #[test]
    fn test_seeded_rngs_differ_per_worker() {
        use rand::Rng;

        let mut c = config();
        c.seed = Some(9);
        let plan = c.validate().unwrap();
        let a: u64 = plan.rng_for(0).gen();
        let b: u64 = plan.rng_for(1).gen();
        let again: u64 = plan.rng_for(0).gen();
        assert_ne!(a, b);
        assert_eq!(a, again);
    }
}
