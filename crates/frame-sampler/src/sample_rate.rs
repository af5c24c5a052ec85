//! Adaptive sampling interval selection.
//!
//! Videos are sampled once every SPF (seconds per frame) seconds, with SPF
//! picked from a configured table of duration ranges expressed in minutes.
//! Ranges are checked in declaration order and the first match wins.

use shared::{SamplingConfig, SpfRule};
use std::str::FromStr;
use tracing::warn;

/// Interval used when no range matches or the table is malformed
pub const DEFAULT_SPF: u32 = 1;

/// A duration range in minutes, written `"<min>~<max>"`, `"<min>~"` or `"~<max>"`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationRange {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl DurationRange {
    /// Whether a duration in seconds falls in this range.
    ///
    /// Bounded ranges are inclusive at both ends. A range without a lower
    /// bound never matches.
    pub fn matches(&self, duration_secs: f64) -> bool {
        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) => {
                duration_secs >= lower * 60.0 && duration_secs <= upper * 60.0
            }
            (Some(lower), None) => duration_secs >= lower * 60.0,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RangeError {
    #[error("range '{0}' is missing the '~' separator")]
    MissingSeparator(String),

    #[error("range '{0}' has a bound that is not a non-negative number")]
    InvalidBound(String),

    #[error("range '{0}' maps to a zero interval")]
    ZeroInterval(String),
}

impl FromStr for DurationRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lower, upper) = s
            .split_once('~')
            .ok_or_else(|| RangeError::MissingSeparator(s.to_string()))?;

        let bound = |text: &str| -> Result<Option<f64>, RangeError> {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            match text.parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => Ok(Some(value)),
                _ => Err(RangeError::InvalidBound(s.to_string())),
            }
        };

        Ok(Self {
            lower: bound(lower)?,
            upper: bound(upper)?,
        })
    }
}

/// Parsed duration-range table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleRateTable {
    entries: Vec<(DurationRange, u32)>,
}

impl SampleRateTable {
    /// Parse every rule, failing on the first malformed one
    pub fn try_from_rules(rules: &[SpfRule]) -> Result<Self, RangeError> {
        let entries = rules
            .iter()
            .map(|rule| {
                if rule.seconds == 0 {
                    return Err(RangeError::ZeroInterval(rule.range.clone()));
                }
                Ok((rule.range.parse::<DurationRange>()?, rule.seconds))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    /// Parse the rules; a malformed table selects [`DEFAULT_SPF`] for every video
    pub fn from_rules(rules: &[SpfRule]) -> Self {
        Self::try_from_rules(rules).unwrap_or_else(|e| {
            warn!(error = %e, "Invalid sampling table, every video uses the default interval");
            Self::default()
        })
    }

    /// Build the table from the `[sampling]` section.
    ///
    /// A rule that could not be read at load time invalidates the whole
    /// table, like a malformed range does.
    pub fn from_config(sampling: &SamplingConfig) -> Self {
        if let Some(reason) = sampling.invalid.first() {
            warn!(
                reason = %reason,
                rejected = sampling.invalid.len(),
                "Invalid sampling table, every video uses the default interval"
            );
            return Self::default();
        }
        Self::from_rules(&sampling.rules)
    }

    /// Pick the sampling interval for a video of the given duration
    pub fn select(&self, duration_secs: f64) -> u32 {
        self.entries
            .iter()
            .find(|(range, _)| range.matches(duration_secs))
            .map(|(_, seconds)| *seconds)
            .unwrap_or(DEFAULT_SPF)
    }
}

/// Pick the sampling interval for a duration straight from configured rules
pub fn select_interval(duration_secs: f64, rules: &[SpfRule]) -> u32 {
    SampleRateTable::from_rules(rules).select(duration_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, u32)]) -> Vec<SpfRule> {
        pairs
            .iter()
            .map(|(range, seconds)| SpfRule::new(*range, *seconds))
            .collect()
    }

    #[test]
    fn test_five_minute_video_uses_first_range() {
        let rules = table(&[("0~10", 2), ("10~", 1)]);
        assert_eq!(select_interval(300.0, &rules), 2);
    }

    #[test]
    fn test_open_ended_range() {
        let rules = table(&[("0~10", 2), ("10~", 5)]);
        assert_eq!(select_interval(601.0, &rules), 5);
        assert_eq!(select_interval(3600.0 * 3.0, &rules), 5);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let rules = table(&[("1~2", 3)]);
        assert_eq!(select_interval(60.0, &rules), 3);
        assert_eq!(select_interval(120.0, &rules), 3);
        assert_eq!(select_interval(120.5, &rules), DEFAULT_SPF);
        assert_eq!(select_interval(59.9, &rules), DEFAULT_SPF);
    }

    #[test]
    fn test_first_match_wins_over_later_overlaps() {
        let rules = table(&[("0~10", 2), ("0~100", 7), ("5~", 9)]);
        assert_eq!(select_interval(400.0, &rules), 2);

        let reordered = table(&[("5~", 9), ("0~10", 2)]);
        assert_eq!(select_interval(400.0, &reordered), 9);
    }

    #[test]
    fn test_upper_only_range_never_matches() {
        let rules = table(&[("~5", 4)]);
        assert_eq!(select_interval(10.0, &rules), DEFAULT_SPF);
    }

    #[test]
    fn test_no_match_falls_back_to_one() {
        let rules = table(&[("10~20", 4)]);
        assert_eq!(select_interval(30.0, &rules), DEFAULT_SPF);
        assert_eq!(select_interval(30.0, &[]), DEFAULT_SPF);
        assert_eq!(select_interval(f64::NAN, &rules), DEFAULT_SPF);
    }

    #[test]
    fn test_malformed_table_falls_back_to_one() {
        assert_eq!(select_interval(300.0, &table(&[("0~10", 2), ("ten~", 4)])), 1);
        assert_eq!(select_interval(300.0, &table(&[("0-10", 2)])), 1);
        assert_eq!(select_interval(300.0, &table(&[("0~10", 0)])), 1);
        assert_eq!(select_interval(300.0, &table(&[("-1~10", 3)])), 1);
    }

    #[test]
    fn test_missing_config_file_uses_one() {
        let config = shared::Config::from_file("/nonexistent/annotation-config.toml").unwrap();
        let table = SampleRateTable::from_config(&config.sampling);
        assert_eq!(table.select(900.0), DEFAULT_SPF);
        assert_eq!(table.select(30.0), DEFAULT_SPF);
    }

    #[test]
    fn test_rejected_rule_invalidates_table() {
        let sampling = SamplingConfig {
            rules: table(&[("10~", 5)]),
            invalid: vec!["rule 1: invalid value: integer `-2`, expected u32".to_string()],
        };
        assert_eq!(SampleRateTable::from_config(&sampling), SampleRateTable::default());
        assert_eq!(SampleRateTable::from_config(&sampling).select(900.0), DEFAULT_SPF);

        let sampling = SamplingConfig {
            rules: table(&[("10~", 5)]),
            invalid: Vec::new(),
        };
        assert_eq!(SampleRateTable::from_config(&sampling).select(900.0), 5);
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            "0.5~10".parse::<DurationRange>(),
            Ok(DurationRange {
                lower: Some(0.5),
                upper: Some(10.0)
            })
        );
        assert_eq!(
            " 10 ~ ".parse::<DurationRange>(),
            Ok(DurationRange {
                lower: Some(10.0),
                upper: None
            })
        );
        assert_eq!(
            "10".parse::<DurationRange>(),
            Err(RangeError::MissingSeparator("10".to_string()))
        );
    }
}
