// ABOUTME: Shared configuration helpers for Sparkbox crates
// ABOUTME: Exposes env variable names and range-checked env parsing

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use tracing::warn;

pub mod constants;

/// Read a numeric env var, falling back to `default` when unset, unparsable or out of range.
pub fn env_in_range<T>(name: &str, range: RangeInclusive<T>, default: T) -> T
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let Ok(raw) = std::env::var(name) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => value,
        Ok(value) => {
            warn!(
                "{}={} is outside {}..={}, using default {}",
                name,
                value,
                range.start(),
                range.end(),
                default
            );
            default
        }
        Err(_) => {
            warn!("{}='{}' is not valid, using default {}", name, raw, default);
            default
        }
    }
}

/// Read a string env var, treating empty values as unset.
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a boolean env var (`true`/`1`/`yes`), defaulting when unset.
pub fn env_flag(name: &str, default: bool) -> bool {
    env_string(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}
