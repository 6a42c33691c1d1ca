//! Per-sensor rolling climate statistics with calendar-aware bucket resets.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;
use std::f64::consts::PI;

/// Number of one-minute slots in the wind averaging window.
pub const WIND_SLOTS: usize = 10;

/// UTC calendar breakdown of an observation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarMark {
    pub year: i32,
    pub month: u32,
    /// Day of year, 1-based.
    pub day: u32,
    /// Days since Sunday.
    pub weekday: u32,
    pub hour: u32,
}

impl CalendarMark {
    pub fn from_epoch(epoch: i64) -> Self {
        let time: DateTime<Utc> = DateTime::from_timestamp(epoch, 0).unwrap_or_default();
        Self {
            year: time.year(),
            month: time.month(),
            day: time.ordinal(),
            weekday: time.weekday().num_days_from_sunday(),
            hour: time.hour(),
        }
    }
}

/// Most significant calendar boundary crossed between two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rollover {
    None,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Rollover {
    pub fn between(previous: Option<&CalendarMark>, next: &CalendarMark) -> Self {
        let previous = match previous {
            Some(mark) => mark,
            None => return Rollover::Year,
        };

        if next.year != previous.year {
            Rollover::Year
        } else if next.month != previous.month {
            Rollover::Month
        } else if next.weekday == 0 && previous.weekday == 6 {
            Rollover::Week
        } else if next.day != previous.day {
            Rollover::Day
        } else if next.hour != previous.hour {
            Rollover::Hour
        } else {
            Rollover::None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindSlot {
    pub direction: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RollingStats {
    pub tracked: Option<CalendarMark>,

    pub precip_rate: f64,
    pub precip_event: f64,
    pub precip_hourly: f64,
    pub precip_daily: f64,
    pub precip_weekly: f64,
    pub precip_monthly: f64,
    pub precip_yearly: f64,
    pub precip_total: f64,

    pub wind_direction: f64,
    pub wind_speed: f64,
    pub wind_gust: f64,
    pub wind_direction_avg10m: f64,
    pub wind_speed_avg10m: f64,
    pub wind_gust_daily_max: f64,

    #[serde(skip)]
    wind_slots: [WindSlot; WIND_SLOTS],
    #[serde(skip)]
    wind_index: usize,
}

impl RollingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation span into the statistics and return the boundary it crossed.
    ///
    /// `level` is the precipitation in mm that fell during `span` seconds. Wind values are
    /// the span's direction (degrees), average speed and gust.
    pub fn update(
        &mut self,
        epoch: i64,
        span: u32,
        level: f64,
        direction: f64,
        speed: f64,
        gust: f64,
    ) -> Rollover {
        let mark = CalendarMark::from_epoch(epoch);
        let rollover = Rollover::between(self.tracked.as_ref(), &mark);
        self.reset_buckets(rollover);

        if self.precip_rate == 0.0 {
            self.precip_event = level;
        } else {
            self.precip_event += level;
        }
        self.precip_hourly += level;
        self.precip_daily += level;
        self.precip_weekly += level;
        self.precip_monthly += level;
        self.precip_yearly += level;
        self.precip_total += level;
        self.precip_rate = if span > 0 {
            level * 3600.0 / span as f64
        } else {
            0.0
        };

        self.wind_direction = direction;
        self.wind_speed = speed;
        self.wind_gust = gust;
        self.wind_gust_daily_max = self.wind_gust_daily_max.max(gust);
        self.record_wind(span, direction, speed);

        self.tracked = Some(mark);
        rollover
    }

    /// Flag that rain has started ahead of the next observation.
    pub fn precipitation_started(&mut self) {
        if self.precip_rate == 0.0 {
            self.precip_rate = 0.01;
        }
    }

    pub fn wind_slots(&self) -> &[WindSlot; WIND_SLOTS] {
        &self.wind_slots
    }

    fn reset_buckets(&mut self, rollover: Rollover) {
        if rollover >= Rollover::Hour {
            self.precip_hourly = 0.0;
        }
        if rollover >= Rollover::Day {
            self.precip_daily = 0.0;
            self.wind_gust_daily_max = 0.0;
        }
        if rollover >= Rollover::Week {
            self.precip_weekly = 0.0;
        }
        if rollover >= Rollover::Month {
            self.precip_monthly = 0.0;
        }
        if rollover >= Rollover::Year {
            self.precip_yearly = 0.0;
        }
    }

    fn record_wind(&mut self, span: u32, direction: f64, speed: f64) {
        let minutes = (span as f64 / 60.0).round().max(1.0) as usize;
        // Past a full lap every slot holds the same pair; only the final index matters.
        let repeat = if minutes >= WIND_SLOTS {
            WIND_SLOTS + minutes % WIND_SLOTS
        } else {
            minutes
        };

        for _ in 0..repeat {
            self.wind_slots[self.wind_index] = WindSlot { direction, speed };
            self.wind_index = (self.wind_index + 1) % WIND_SLOTS;
        }

        let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
        for slot in &self.wind_slots {
            let radians = 2.0 * PI * slot.direction / 360.0;
            sin_sum += -slot.speed * radians.sin();
            cos_sum += -slot.speed * radians.cos();
        }
        sin_sum /= WIND_SLOTS as f64;
        cos_sum /= WIND_SLOTS as f64;

        self.wind_speed_avg10m = (sin_sum * sin_sum + cos_sum * cos_sum).sqrt();
        self.wind_direction_avg10m = sin_sum.atan2(cos_sum) * 360.0 / (2.0 * PI) + 180.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2021-06-15 (Tuesday) 10:00:00 UTC
    const TUESDAY_10H: i64 = 1_623_751_200;
    const HOUR: i64 = 3600;
    const DAY: i64 = 24 * HOUR;

    fn seeded() -> RollingStats {
        let mut stats = RollingStats::new();
        stats.update(TUESDAY_10H, 60, 1.0, 0.0, 0.0, 4.0);
        stats
    }

    #[test]
    fn first_update_is_a_year_boundary() {
        let mut stats = RollingStats::new();
        let first = stats.update(TUESDAY_10H, 60, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(first, Rollover::Year);
        let second = stats.update(TUESDAY_10H + 60, 60, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(second, Rollover::None);
    }

    #[test]
    fn rollover_priority() {
        let base = CalendarMark::from_epoch(TUESDAY_10H);
        let later = |offset: i64| CalendarMark::from_epoch(TUESDAY_10H + offset);
        assert_eq!(Rollover::between(Some(&base), &later(60)), Rollover::None);
        assert_eq!(Rollover::between(Some(&base), &later(HOUR)), Rollover::Hour);
        assert_eq!(Rollover::between(Some(&base), &later(DAY)), Rollover::Day);

        // Saturday 2021-06-19 23:30 to Sunday 2021-06-20 00:30
        let saturday = CalendarMark::from_epoch(TUESDAY_10H + 4 * DAY + 13 * HOUR + 1800);
        let sunday = CalendarMark::from_epoch(TUESDAY_10H + 5 * DAY - 10 * HOUR + 1800);
        assert_eq!(saturday.weekday, 6);
        assert_eq!(sunday.weekday, 0);
        assert_eq!(Rollover::between(Some(&saturday), &sunday), Rollover::Week);

        // 2021-06-30 to 2021-07-01
        let june = CalendarMark::from_epoch(TUESDAY_10H + 15 * DAY);
        let july = CalendarMark::from_epoch(TUESDAY_10H + 16 * DAY);
        assert_eq!(Rollover::between(Some(&june), &july), Rollover::Month);

        let next_year = CalendarMark::from_epoch(TUESDAY_10H + 365 * DAY);
        assert_eq!(Rollover::between(Some(&base), &next_year), Rollover::Year);
    }

    #[test]
    fn day_boundary_resets_hourly_and_daily_only() {
        let mut stats = seeded();
        stats.update(TUESDAY_10H + 60, 60, 0.5, 0.0, 0.0, 6.0);
        assert!((stats.precip_daily - 1.5).abs() < 1e-9);
        assert!((stats.wind_gust_daily_max - 6.0).abs() < 1e-9);

        let rollover = stats.update(TUESDAY_10H + DAY, 60, 0.0, 0.0, 0.0, 2.0);
        assert_eq!(rollover, Rollover::Day);
        assert_eq!(stats.precip_hourly, 0.0);
        assert_eq!(stats.precip_daily, 0.0);
        assert!((stats.wind_gust_daily_max - 2.0).abs() < 1e-9);
        assert!((stats.precip_weekly - 1.5).abs() < 1e-9);
        assert!((stats.precip_monthly - 1.5).abs() < 1e-9);
        assert!((stats.precip_yearly - 1.5).abs() < 1e-9);
        assert!((stats.precip_total - 1.5).abs() < 1e-9);
    }

    #[test]
    fn hour_boundary_resets_hourly_only() {
        let mut stats = seeded();
        stats.update(TUESDAY_10H + HOUR, 60, 0.25, 0.0, 0.0, 1.0);
        assert!((stats.precip_hourly - 0.25).abs() < 1e-9);
        assert!((stats.precip_daily - 1.25).abs() < 1e-9);
        assert!((stats.wind_gust_daily_max - 4.0).abs() < 1e-9);
    }

    #[test]
    fn rain_event_accumulates_until_rate_drops() {
        let mut stats = RollingStats::new();
        stats.update(TUESDAY_10H, 60, 0.5, 0.0, 0.0, 0.0);
        assert!((stats.precip_rate - 30.0).abs() < 1e-9);
        stats.update(TUESDAY_10H + 60, 60, 0.25, 0.0, 0.0, 0.0);
        assert!((stats.precip_event - 0.75).abs() < 1e-9);

        stats.update(TUESDAY_10H + 120, 60, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(stats.precip_rate, 0.0);
        stats.update(TUESDAY_10H + 180, 60, 0.1, 0.0, 0.0, 0.0);
        assert!((stats.precip_event - 0.1).abs() < 1e-9);
        assert!((stats.precip_total - 0.85).abs() < 1e-9);
    }

    #[test]
    fn zero_span_gives_zero_rate() {
        let mut stats = RollingStats::new();
        stats.update(TUESDAY_10H, 0, 1.0, 0.0, 0.0, 0.0);
        assert_eq!(stats.precip_rate, 0.0);
        assert!((stats.precip_total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rain_start_sets_sentinel_without_touching_buckets() {
        let mut stats = seeded();
        stats.update(TUESDAY_10H + 60, 60, 0.0, 0.0, 0.0, 0.0);
        let before = stats.clone();

        stats.precipitation_started();
        assert!((stats.precip_rate - 0.01).abs() < 1e-12);
        assert_eq!(stats.precip_event, before.precip_event);
        assert_eq!(stats.precip_daily, before.precip_daily);
        assert_eq!(stats.precip_total, before.precip_total);

        stats.precip_rate = 12.0;
        stats.precipitation_started();
        assert_eq!(stats.precip_rate, 12.0);
    }

    #[test]
    fn steady_wind_averages_to_itself() {
        let mut stats = RollingStats::new();
        for i in 0..10 {
            stats.update(TUESDAY_10H + i * 60, 60, 0.0, 90.0, 5.0, 7.0);
        }
        assert!((stats.wind_direction_avg10m - 90.0).abs() < 1e-6);
        assert!((stats.wind_speed_avg10m - 5.0).abs() < 1e-6);
        assert!((stats.wind_gust_daily_max - 7.0).abs() < 1e-9);
    }

    #[test]
    fn long_span_fills_multiple_slots() {
        let mut stats = RollingStats::new();
        stats.update(TUESDAY_10H, 300, 0.0, 180.0, 4.0, 0.0);
        let filled = stats.wind_slots().iter().filter(|s| s.speed == 4.0).count();
        assert_eq!(filled, 5);
        assert!((stats.wind_speed_avg10m - 2.0).abs() < 1e-6);
        assert!((stats.wind_direction_avg10m - 180.0).abs() < 1e-6);

        stats.update(TUESDAY_10H + 3600, 3600, 0.0, 270.0, 3.0, 0.0);
        assert!(stats.wind_slots().iter().all(|s| s.direction == 270.0));
    }
}
