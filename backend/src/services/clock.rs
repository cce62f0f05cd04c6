use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Process-wide source of "now" in the configured time zone.
///
/// Every schedule comparison is local-time ("HH:MM" against the wall clock),
/// so all components take the clock as a dependency instead of calling
/// `Utc::now()` directly. Tests pin both the instant and the zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;

    fn timezone(&self) -> Tz;
}

/// Wall clock in the zone named by the TIMEZONE env var.
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Reads TIMEZONE (default America/New_York). An unparseable name is
    /// logged and falls back to UTC rather than refusing to start.
    pub fn from_env() -> Self {
        let name =
            std::env::var("TIMEZONE").unwrap_or_else(|_| "America/New_York".to_string());
        let tz = match name.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                log::warn!("Unknown TIMEZONE '{}', falling back to UTC", name);
                chrono_tz::UTC
            }
        };
        Self::new(tz)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

/// Settable clock for tests.
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Tz>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Tz>) {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn timezone(&self) -> Tz {
        self.now().timezone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_returns_set_instant() {
        let start = chrono_tz::America::New_York
            .with_ymd_and_hms(2025, 6, 2, 10, 0, 0)
            .unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        let later = start + chrono::Duration::minutes(3);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_fixed_clock_timezone() {
        let start = chrono_tz::Europe::Madrid
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.timezone(), chrono_tz::Europe::Madrid);
    }

    #[test]
    fn test_system_clock_uses_configured_zone() {
        let clock = SystemClock::new(chrono_tz::America::New_York);
        assert_eq!(clock.timezone(), chrono_tz::America::New_York);
        assert_eq!(clock.now().timezone(), chrono_tz::America::New_York);
    }
}
