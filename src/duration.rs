// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Duration parsing for Go-style duration strings.
//!
//! Kubernetes and APISIX objects express timeouts as strings such as `"500ms"`,
//! `"10s"` or `"1h30m"`. The same format is accepted in the controller
//! configuration file.

use anyhow::{bail, Context, Result};
use std::time::Duration;

const MILLIS_PER_SECOND: u64 = 1000;
const MILLIS_PER_MINUTE: u64 = 60_000;
const MILLIS_PER_HOUR: u64 = 3_600_000;

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// Supported units: `ms`, `s`, `m`, `h`. Several components may be chained
/// (`"1h30m"`, `"1m30s"`). A bare `"0"` is accepted as zero.
///
/// # Examples
///
/// ```
/// use apisix_ingress::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert!(parse_duration("10").is_err());
/// assert!(parse_duration("10x").is_err());
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, a component has no unit, the unit is
/// unknown, or the total overflows.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let input = duration_str.trim();
    if input.is_empty() {
        bail!("Duration string cannot be empty");
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_millis: u64 = 0;
    let mut rest = input;

    while !rest.is_empty() {
        let split_pos = rest
            .chars()
            .position(|c| !c.is_ascii_digit())
            .context("Duration must end with a unit (ms, s, m or h)")?;
        if split_pos == 0 {
            bail!("Duration '{duration_str}' has a unit without a value");
        }

        let (value_str, tail) = rest.split_at(split_pos);
        let value: u64 = value_str
            .parse()
            .context("Duration value must be a positive integer")?;

        let unit_len = tail
            .chars()
            .position(|c| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, remainder) = tail.split_at(unit_len);

        let factor = match unit {
            "ms" => 1,
            "s" => MILLIS_PER_SECOND,
            "m" => MILLIS_PER_MINUTE,
            "h" => MILLIS_PER_HOUR,
            _ => bail!("Unsupported duration unit '{unit}'. Use 'ms', 's', 'm' or 'h'"),
        };

        let component = value
            .checked_mul(factor)
            .context("Duration value too large (overflow)")?;
        total_millis = total_millis
            .checked_add(component)
            .context("Duration value too large (overflow)")?;
        rest = remainder;
    }

    Ok(Duration::from_millis(total_millis))
}

/// Render a duration in the format accepted by [`parse_duration`].
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % u128::from(MILLIS_PER_SECOND) != 0 {
        return format!("{millis}ms");
    }
    format!("{}s", duration.as_secs())
}

/// `serde(with = ...)` adapter for duration fields in configuration files.
pub mod human {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a duration as a Go-style string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    /// Deserialize a Go-style duration string.
    ///
    /// # Errors
    ///
    /// Fails when the string is not a valid duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod duration_tests;
