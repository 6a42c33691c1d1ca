//! Registry of hubs and sensors with their accumulated statistics.

pub mod history;
pub mod hub;
pub mod sensor;
pub mod stats;

pub use history::BoundedQueue;
pub use hub::{Hub, RadioStatus, ResetFlags, HUB_MODEL};
pub use sensor::{
    PrecipitationType, Sensor, SensorCounters, SensorModel, SensorSnapshot, SensorStatus, Strike,
    WindSample,
};
pub use stats::{CalendarMark, RollingStats, Rollover};

use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

/// Counters for messages that never reach a hub or sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounters {
    pub invalid: u64,
    pub debug: u64,
    pub unknown: u64,
}

#[derive(Debug)]
pub struct AggregationStore {
    started: Instant,
    history: usize,
    hubs: Vec<Hub>,
    index: HashMap<String, usize>,
    pub counters: EventCounters,
}

impl AggregationStore {
    /// `history` bounds every per-sensor history queue.
    pub fn new(history: usize) -> Self {
        Self {
            started: Instant::now(),
            history,
            hubs: Vec::new(),
            index: HashMap::new(),
            counters: EventCounters::default(),
        }
    }

    /// Look up a hub by serial number, creating it on first reference.
    pub fn hub_mut(&mut self, serial: &str) -> &mut Hub {
        let position = match self.index.get(serial) {
            Some(&position) => position,
            None => {
                self.hubs.push(Hub::new(serial, self.history));
                self.index.insert(serial.to_string(), self.hubs.len() - 1);
                self.hubs.len() - 1
            }
        };
        &mut self.hubs[position]
    }

    pub fn hub(&self, serial: &str) -> Option<&Hub> {
        self.index.get(serial).map(|&position| &self.hubs[position])
    }

    pub fn hubs(&self) -> &[Hub] {
        &self.hubs
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Plain-text snapshot of the registry used by the stats control command.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Uptime: {}", format_uptime(self.uptime()));
        let _ = writeln!(out, "Invalid Events: {}", self.counters.invalid);
        let _ = writeln!(out, "Debug Events: {}", self.counters.debug);
        let _ = writeln!(out, "Unknown Events: {}", self.counters.unknown);
        let _ = writeln!(out, "Hubs: {}", self.hubs.len());

        for (i, hub) in self.hubs.iter().enumerate() {
            let _ = writeln!(out, "[{}]: {} v{}", i, hub.serial, hub.firmware);
            let _ = writeln!(out, "     Status Events: {}", hub.status_events);
            let _ = writeln!(out, "     Sensors: {}", hub.sensors().len());

            for (j, sensor) in hub.sensors().iter().enumerate() {
                let counters = &sensor.counters;
                let _ = writeln!(out, "     [{}]: {} v{}", j, sensor.serial, sensor.firmware);
                let _ = writeln!(out, "          Rain Start Events: {}", counters.rain);
                let _ = writeln!(out, "          Lightning Strike Events: {}", counters.strike);
                let _ = writeln!(out, "          Rapid Wind Events: {}", counters.wind);
                let _ = writeln!(out, "          Observation Events: {}", counters.observation);
                let _ = writeln!(out, "          Status Events: {}", counters.status);
            }
        }
        out
    }
}

/// `Dd.Hh.Mm.Ss`
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!(
        "{}d.{}h.{}m.{}s",
        secs / 86_400,
        secs % 86_400 / 3600,
        secs % 3600 / 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hubs_are_created_once() {
        let mut store = AggregationStore::new(8);
        store.hub_mut("HB-1").firmware = 35;
        store.hub_mut("HB-2");
        assert_eq!(store.hub_mut("HB-1").firmware, 35);
        assert_eq!(store.hubs().len(), 2);
        assert!(store.hub("HB-3").is_none());
    }

    #[test]
    fn uptime_format() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d.0h.0m.0s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d.1h.1m.1s");
    }

    #[test]
    fn report_lists_hubs_and_sensors() {
        let mut store = AggregationStore::new(8);
        store.counters.invalid = 2;
        let hub = store.hub_mut("HB-1");
        hub.firmware = 171;
        hub.status_events = 3;
        hub.sensor_mut("ST-1").counters.observation = 5;

        let report = store.report();
        assert!(report.starts_with("Uptime: 0d.0h.0m."));
        assert!(report.contains("Invalid Events: 2\n"));
        assert!(report.contains("Hubs: 1\n"));
        assert!(report.contains("[0]: HB-1 v171\n"));
        assert!(report.contains("     Status Events: 3\n"));
        assert!(report.contains("     [0]: ST-1 v0\n"));
        assert!(report.contains("          Observation Events: 5\n"));
    }
}
