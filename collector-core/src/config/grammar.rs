#![allow(clippy::module_name_repetitions)]

//! `key=value` override grammar for [`ControllerConfig`].
//!
//! Host tooling accepts lines such as `open=21km close=17500 poll=30s`. Keys
//! are split on whitespace and `=`, while the value literals are recognized by
//! small `winnow` parsers so unit suffixes stay strict.

use core::{fmt, time::Duration};

use winnow::ascii::{digit1, float};
use winnow::combinator::{alt, opt};
use winnow::prelude::*;

use super::{ConfigError, ControllerConfig, Thresholds};

/// Recognized configuration keys.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigKey {
    Open,
    Close,
    Poll,
    Short,
    Long,
    Indeterminate,
    Unclassified,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 7] = [
        ConfigKey::Open,
        ConfigKey::Close,
        ConfigKey::Poll,
        ConfigKey::Short,
        ConfigKey::Long,
        ConfigKey::Indeterminate,
        ConfigKey::Unclassified,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ConfigKey::Open => "open",
            ConfigKey::Close => "close",
            ConfigKey::Poll => "poll",
            ConfigKey::Short => "short",
            ConfigKey::Long => "long",
            ConfigKey::Indeterminate => "indeterminate",
            ConfigKey::Unclassified => "unclassified",
        }
    }

    /// Case-insensitive key lookup.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.label().eq_ignore_ascii_case(name))
    }

    const fn is_altitude(self) -> bool {
        matches!(self, ConfigKey::Open | ConfigKey::Close)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors produced while applying an assignment line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigParseError<'a> {
    /// Token without an `=` separator.
    MissingEquals { token: &'a str },
    /// Key not in [`ConfigKey::ALL`].
    UnknownKey { key: &'a str },
    /// Altitude literal that is not a decimal with optional `m`/`km` suffix.
    InvalidAltitude { key: ConfigKey, value: &'a str },
    /// Duration literal that is not an integer with `ms`/`s`/`m` suffix.
    InvalidDuration { key: ConfigKey, value: &'a str },
    /// Value parsed but the resulting configuration is invalid.
    Rejected { key: ConfigKey, error: ConfigError },
}

impl fmt::Display for ConfigParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigParseError::MissingEquals { token } => {
                write!(f, "expected key=value, found `{token}`")
            }
            ConfigParseError::UnknownKey { key } => write!(f, "unknown key `{key}`"),
            ConfigParseError::InvalidAltitude { key, value } => {
                write!(f, "{key}: invalid altitude `{value}`")
            }
            ConfigParseError::InvalidDuration { key, value } => {
                write!(f, "{key}: invalid duration `{value}`")
            }
            ConfigParseError::Rejected { key, error } => write!(f, "{key}: {error}"),
        }
    }
}

/// Applies whitespace-separated `key=value` overrides on top of `base`.
///
/// Thresholds are validated together once the whole line is consumed, so
/// `open` and `close` may be moved in either order.
///
/// # Errors
///
/// Returns the first malformed token, unknown key, bad literal, or the
/// validation failure of the resulting configuration.
pub fn parse_assignments(
    line: &str,
    base: ControllerConfig,
) -> Result<ControllerConfig, ConfigParseError<'_>> {
    let mut config = base;
    let mut open_m = None;
    let mut close_m = None;
    let mut last_threshold_key = ConfigKey::Open;

    for token in line.split_ascii_whitespace() {
        let (name, value) = token
            .split_once('=')
            .ok_or(ConfigParseError::MissingEquals { token })?;
        let key = ConfigKey::lookup(name).ok_or(ConfigParseError::UnknownKey { key: name })?;

        if key.is_altitude() {
            let altitude = altitude_literal
                .parse(value)
                .map_err(|_| ConfigParseError::InvalidAltitude { key, value })?;
            last_threshold_key = key;
            if key == ConfigKey::Open {
                open_m = Some(altitude);
            } else {
                close_m = Some(altitude);
            }
            continue;
        }

        let duration = parse_duration(value)
            .ok_or(ConfigParseError::InvalidDuration { key, value })?;
        config = match key {
            ConfigKey::Poll => config.with_poll_interval(duration),
            ConfigKey::Short => config.with_short_retry_delay(duration),
            ConfigKey::Long => config.with_long_retry_delay(duration),
            ConfigKey::Indeterminate => config.with_indeterminate_delay(duration),
            ConfigKey::Unclassified => config.with_unclassified_delay(duration),
            ConfigKey::Open | ConfigKey::Close => Ok(config),
        }
        .map_err(|error| ConfigParseError::Rejected { key, error })?;
    }

    if open_m.is_some() || close_m.is_some() {
        let current = base.thresholds();
        let thresholds = Thresholds::new(
            open_m.unwrap_or(current.open_m()),
            close_m.unwrap_or(current.close_m()),
        )
        .map_err(|error| ConfigParseError::Rejected {
            key: last_threshold_key,
            error,
        })?;
        config = config.with_thresholds(thresholds);
    }

    Ok(config)
}

/// Parses a single duration literal such as `250ms`, `15s` or `2m`.
#[must_use]
pub fn parse_duration(value: &str) -> Option<Duration> {
    let (amount, unit) = duration_literal.parse(value).ok()?;
    match unit {
        DurationUnit::Millis => Some(Duration::from_millis(amount)),
        DurationUnit::Seconds => Some(Duration::from_secs(amount)),
        DurationUnit::Minutes => amount.checked_mul(60).map(Duration::from_secs),
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum DurationUnit {
    Millis,
    Seconds,
    Minutes,
}

fn altitude_literal(input: &mut &str) -> ModalResult<f64> {
    (float, opt(alt(("km".value(1_000.0), "m".value(1.0)))))
        .map(|(magnitude, scale): (f64, Option<f64>)| magnitude * scale.unwrap_or(1.0))
        .parse_next(input)
}

fn duration_literal(input: &mut &str) -> ModalResult<(u64, DurationUnit)> {
    (
        digit1.parse_to(),
        alt((
            "ms".value(DurationUnit::Millis),
            "s".value(DurationUnit::Seconds),
            "m".value(DurationUnit::Minutes),
        )),
    )
        .parse_next(input)
}
