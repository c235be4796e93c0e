use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::loader::ConfigError;
use crate::events::trigger::Trigger;

#[derive(Debug, Deserialize)]
pub struct FlowConfig {
    pub pipeline: String,
    pub description: Option<String>,
    /// Source database to extract the dimension tables from.
    pub source_db: PathBuf,
    /// Staging database all stages read from and write to.
    pub staging_db: PathBuf,
    /// Run history database.
    pub run_log: PathBuf,
    pub trigger: TriggerConfig,
}

impl FlowConfig {
    /// An in-process config for demos and tests: temp-path databases and
    /// the original's daily 09:00 schedule.
    pub fn example() -> Self {
        let dir = std::env::temp_dir();
        Self {
            pipeline: "product_model".to_string(),
            description: Some("Extract, normalize and merge the product dimensions".to_string()),
            source_db: dir.join("stageflow_source.db"),
            staging_db: dir.join("stageflow_staging.db"),
            run_log: dir.join("stageflow_runs.db"),
            trigger: TriggerConfig {
                trigger_type: "daily".to_string(),
                every: None,
                at: Some("09:00".to_string()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub trigger_type: String,
    /// For interval triggers: e.g. "60s", "5m"
    pub every: Option<String>,
    /// For daily triggers: "HH:MM" in UTC
    pub at: Option<String>,
}

impl TriggerConfig {
    pub fn to_trigger(&self) -> Result<Trigger, ConfigError> {
        match self.trigger_type.as_str() {
            "interval" => {
                let every = self.every.as_deref().ok_or_else(|| {
                    ConfigError::Trigger("interval trigger requires 'every'".to_string())
                })?;
                Ok(Trigger::Interval(parse_duration(every)?))
            }
            "daily" => {
                let at = self.at.as_deref().ok_or_else(|| {
                    ConfigError::Trigger("daily trigger requires 'at'".to_string())
                })?;
                let (hour, minute) = parse_time_of_day(at)?;
                Ok(Trigger::Daily { hour, minute })
            }
            other => Err(ConfigError::Trigger(format!(
                "unknown trigger type '{other}'"
            ))),
        }
    }
}

/// Parse "30s", "5m", "2h" into a duration.
fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let (value, unit) = s.split_at(s.len().saturating_sub(1));
    let n: u64 = value
        .parse()
        .map_err(|_| ConfigError::Trigger(format!("invalid duration '{s}'")))?;
    match unit {
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        _ => Err(ConfigError::Trigger(format!("invalid duration '{s}'"))),
    }
}

/// Parse "HH:MM" into an (hour, minute) pair.
fn parse_time_of_day(s: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::Trigger(format!("invalid time of day '{s}'"));
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_trigger_parses_units() {
        let cfg = TriggerConfig {
            trigger_type: "interval".to_string(),
            every: Some("5m".to_string()),
            at: None,
        };
        assert_eq!(
            cfg.to_trigger().unwrap(),
            Trigger::Interval(Duration::from_secs(300))
        );
    }

    #[test]
    fn daily_trigger_parses_time_of_day() {
        let cfg = TriggerConfig {
            trigger_type: "daily".to_string(),
            every: None,
            at: Some("09:00".to_string()),
        };
        assert_eq!(cfg.to_trigger().unwrap(), Trigger::Daily { hour: 9, minute: 0 });
    }

    #[test]
    fn out_of_range_time_is_rejected() {
        assert!(parse_time_of_day("24:00").is_err());
        assert!(parse_time_of_day("09:60").is_err());
        assert!(parse_time_of_day("nine").is_err());
    }

    #[test]
    fn unknown_trigger_type_is_rejected() {
        let cfg = TriggerConfig {
            trigger_type: "webhook".to_string(),
            every: None,
            at: None,
        };
        assert!(cfg.to_trigger().is_err());
    }
}
