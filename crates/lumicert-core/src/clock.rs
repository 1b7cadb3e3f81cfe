//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Wall-clock source for tick timestamps."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, FixedOffset, Local};

/// Source of the instant stamped on each tick.
pub trait Clock: Send + Sync {
    /// Current local time with its UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Host wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        DateTime::<FixedOffset>::from(Local::now())
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn fixed_clock_returns_its_instant() {
        let instant = FixedOffset::east_opt(3600)
            .and_then(|offset| offset.with_ymd_and_hms(2024, 1, 2, 23, 0, 0).single())
            .expect("instant");
        assert_eq!(FixedClock(instant).now().hour(), 23);
    }

    #[test]
    fn system_clock_keeps_local_offset() {
        let now = SystemClock.now();
        let local = Local::now();
        assert_eq!(now.offset().local_minus_utc(), local.offset().local_minus_utc());
    }
}
