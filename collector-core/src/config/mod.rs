//! Controller configuration validated once at startup.

use core::{fmt, time::Duration};

pub mod grammar;

pub use grammar::{ConfigKey, ConfigParseError, parse_assignments};

/// Default altitude above which the door opens.
pub const DEFAULT_OPEN_THRESHOLD_M: f64 = 20_000.0;
/// Default altitude below which the door closes.
pub const DEFAULT_CLOSE_THRESHOLD_M: f64 = 18_000.0;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_SHORT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_LONG_RETRY_DELAY: Duration = Duration::from_secs(25);
/// Wait after a reading without data. Shorter than the default poll interval,
/// matching the 10 s the microcontroller collector sleeps after a `None`
/// altitude; only the long retry tier is longer than the poll.
pub const DEFAULT_INDETERMINATE_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_UNCLASSIFIED_DELAY: Duration = Duration::from_secs(10);

/// Reasons a configuration is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Close threshold is not strictly below the open threshold.
    InvertedThresholds,
    /// A threshold is NaN or infinite.
    NonFiniteThreshold,
    /// Poll interval of zero would spin the loop.
    ZeroPollInterval,
    /// A fault delay of zero would spin the loop while a device keeps failing.
    ZeroFaultDelay,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvertedThresholds => {
                f.write_str("close threshold must be below open threshold")
            }
            ConfigError::NonFiniteThreshold => f.write_str("thresholds must be finite"),
            ConfigError::ZeroPollInterval => f.write_str("poll interval must be non-zero"),
            ConfigError::ZeroFaultDelay => f.write_str("fault delays must be non-zero"),
        }
    }
}

/// Open/close altitude pair forming the hysteresis band.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Thresholds {
    open_m: f64,
    close_m: f64,
}

impl Thresholds {
    /// Validates a threshold pair.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonFiniteThreshold`] for NaN or infinite values and
    /// [`ConfigError::InvertedThresholds`] unless `close_m < open_m`.
    pub fn new(open_m: f64, close_m: f64) -> Result<Self, ConfigError> {
        if !open_m.is_finite() || !close_m.is_finite() {
            return Err(ConfigError::NonFiniteThreshold);
        }
        if close_m >= open_m {
            return Err(ConfigError::InvertedThresholds);
        }
        Ok(Self { open_m, close_m })
    }

    #[must_use]
    pub const fn open_m(&self) -> f64 {
        self.open_m
    }

    #[must_use]
    pub const fn close_m(&self) -> f64 {
        self.close_m
    }

    /// Returns `true` when `altitude_m` lies inside the band (inclusive).
    #[must_use]
    pub fn contains(&self, altitude_m: f64) -> bool {
        (self.close_m..=self.open_m).contains(&altitude_m)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            open_m: DEFAULT_OPEN_THRESHOLD_M,
            close_m: DEFAULT_CLOSE_THRESHOLD_M,
        }
    }
}

/// Immutable controller configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    thresholds: Thresholds,
    poll_interval: Duration,
    short_retry_delay: Duration,
    long_retry_delay: Duration,
    indeterminate_delay: Duration,
    unclassified_delay: Duration,
}

impl ControllerConfig {
    /// Builds a configuration with the given thresholds and default delays.
    ///
    /// # Errors
    ///
    /// Propagates threshold validation failures from [`Thresholds::new`].
    pub fn new(open_m: f64, close_m: f64) -> Result<Self, ConfigError> {
        Thresholds::new(open_m, close_m).map(Self::from_thresholds)
    }

    /// Builds a configuration around already validated thresholds.
    #[must_use]
    pub const fn from_thresholds(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            poll_interval: DEFAULT_POLL_INTERVAL,
            short_retry_delay: DEFAULT_SHORT_RETRY_DELAY,
            long_retry_delay: DEFAULT_LONG_RETRY_DELAY,
            indeterminate_delay: DEFAULT_INDETERMINATE_DELAY,
            unclassified_delay: DEFAULT_UNCLASSIFIED_DELAY,
        }
    }

    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Replaces the poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroPollInterval`] for a zero duration.
    pub const fn with_poll_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        self.poll_interval = interval;
        Ok(self)
    }

    /// Replaces the first backoff tier, also used after a transient read error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroFaultDelay`] for a zero duration.
    pub const fn with_short_retry_delay(mut self, delay: Duration) -> Result<Self, ConfigError> {
        if delay.is_zero() {
            return Err(ConfigError::ZeroFaultDelay);
        }
        self.short_retry_delay = delay;
        Ok(self)
    }

    /// Replaces the second backoff tier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroFaultDelay`] for a zero duration.
    pub const fn with_long_retry_delay(mut self, delay: Duration) -> Result<Self, ConfigError> {
        if delay.is_zero() {
            return Err(ConfigError::ZeroFaultDelay);
        }
        self.long_retry_delay = delay;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroFaultDelay`] for a zero duration.
    pub const fn with_indeterminate_delay(mut self, delay: Duration) -> Result<Self, ConfigError> {
        if delay.is_zero() {
            return Err(ConfigError::ZeroFaultDelay);
        }
        self.indeterminate_delay = delay;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroFaultDelay`] for a zero duration.
    pub const fn with_unclassified_delay(mut self, delay: Duration) -> Result<Self, ConfigError> {
        if delay.is_zero() {
            return Err(ConfigError::ZeroFaultDelay);
        }
        self.unclassified_delay = delay;
        Ok(self)
    }

    #[must_use]
    pub const fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub const fn short_retry_delay(&self) -> Duration {
        self.short_retry_delay
    }

    #[must_use]
    pub const fn long_retry_delay(&self) -> Duration {
        self.long_retry_delay
    }

    #[must_use]
    pub const fn indeterminate_delay(&self) -> Duration {
        self.indeterminate_delay
    }

    #[must_use]
    pub const fn unclassified_delay(&self) -> Duration {
        self.unclassified_delay
    }

    /// Total wait after a failed re-initialization.
    #[must_use]
    pub const fn reinit_backoff(&self) -> Duration {
        self.short_retry_delay.saturating_add(self.long_retry_delay)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_thresholds(Thresholds::default())
    }
}
