use chrono::{Duration, NaiveDateTime};

use crate::config::WindowConfig;

/// Half-open interval `[start, end)` of ledger timestamps considered
/// contemporary with an incoming currency date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TemporalWindow {
    pub fn around(currency: NaiveDateTime, config: &WindowConfig) -> Self {
        Self {
            start: currency - Duration::days(i64::from(config.days_before)),
            end: currency + Duration::days(i64::from(config.days_after)),
        }
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start && t < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_currency_date;

    fn dt(s: &str) -> NaiveDateTime {
        parse_currency_date(s).unwrap()
    }

    #[test]
    fn default_bounds() {
        let w = TemporalWindow::around(dt("2021-05-15"), &WindowConfig::default());
        assert_eq!(w.start, dt("2021-04-15"));
        assert_eq!(w.end, dt("2021-05-16"));
    }

    #[test]
    fn half_open() {
        let w = TemporalWindow::around(dt("2021-05-15 12:00:00"), &WindowConfig::default());
        assert!(w.contains(dt("2021-04-15 12:00:00")));
        assert!(w.contains(dt("2021-05-15 12:00:00")));
        assert!(w.contains(dt("2021-05-16 11:59:59")));
        assert!(!w.contains(dt("2021-05-16 12:00:00")));
        assert!(!w.contains(dt("2021-04-15 11:59:59")));
    }

    #[test]
    fn configurable_bounds() {
        let config = WindowConfig { days_before: 15, days_after: 15 };
        let w = TemporalWindow::around(dt("2021-05-15"), &config);
        assert!(w.contains(dt("2021-05-29")));
        assert!(!w.contains(dt("2021-04-29")));
    }
}
