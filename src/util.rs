use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{EngineError, EngineResult};

const GRAFANA_TOKEN: &str = "GRAFANA_TOKEN";

/// Token from the environment wins over the configured one.
pub fn get_grafana_token(configured: Option<&str>) -> Option<String> {
    std::env::var(GRAFANA_TOKEN)
        .ok()
        .filter(|token| !token.is_empty())
        .or_else(|| configured.map(str::to_string))
}

/// Parse the short interval notation used throughout the configuration
/// (`"500ms"`, `"30s"`, `"10m"`, `"1h"`, `"2d"`). A bare number is seconds.
pub fn parse_duration(value: &str) -> EngineResult<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);

    let amount: u64 = amount
        .parse()
        .map_err(|_| EngineError::Config(format!("invalid duration '{value}'")))?;

    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount * 60),
        "h" => Duration::from_secs(amount * 3600),
        "d" => Duration::from_secs(amount * 86_400),
        _ => {
            return Err(EngineError::Config(format!(
                "invalid duration unit in '{value}'"
            )));
        }
    };

    Ok(duration)
}

/// Human readable UTC for an epoch in seconds.
pub fn human_utc(epoch_secs: i64) -> String {
    Utc.timestamp_opt(epoch_secs, 0)
        .single()
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_secs.to_string())
}

/// Millisecond precision timestamp stamped on reported batches.
pub fn report_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse either an epoch (seconds or milliseconds) or an RFC 3339 string
/// into epoch milliseconds.
pub fn parse_timestamp_millis(raw: &str) -> Option<i64> {
    if let Ok(number) = raw.parse::<f64>() {
        return Some(epoch_to_millis(number));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.timestamp_millis())
}

/// Values below 10^11 are taken as seconds.
pub fn epoch_to_millis(value: f64) -> i64 {
    if value.abs() < 1e11 {
        (value * 1000.0) as i64
    } else {
        value as i64
    }
}
