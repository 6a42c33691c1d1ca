use super::sensor::Sensor;
use serde::Serialize;
use std::collections::HashMap;

pub const HUB_MODEL: &str = "WF-HB01";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RadioStatus {
    #[default]
    Off,
    On,
    Active,
}

impl RadioStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => RadioStatus::On,
            3 => RadioStatus::Active,
            _ => RadioStatus::Off,
        }
    }
}

/// Causes of the hub's last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetFlags {
    pub brownout: bool,
    pub pin: bool,
    pub power: bool,
    pub software: bool,
    pub watchdog: bool,
    pub window_watchdog: bool,
    pub low_power: bool,
}

impl ResetFlags {
    /// Parse a comma separated token list such as `"BOR,PIN,POR"`. Unknown tokens are ignored.
    pub fn parse(tokens: &str) -> Self {
        let mut flags = ResetFlags::default();
        for token in tokens.split(',').map(str::trim) {
            match token {
                "BOR" => flags.brownout = true,
                "PIN" => flags.pin = true,
                "POR" => flags.power = true,
                "SFT" => flags.software = true,
                "WDG" => flags.watchdog = true,
                "WWD" => flags.window_watchdog = true,
                "LPW" => flags.low_power = true,
                _ => {}
            }
        }
        flags
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RadioStats {
    pub version: u32,
    pub reboots: u32,
    pub i2c_errors: u32,
    pub status: RadioStatus,
}

#[derive(Debug, Clone)]
pub struct Hub {
    pub serial: String,
    pub model: &'static str,
    pub firmware: u32,
    pub uptime: u64,
    pub rssi: i32,
    pub reset_flags: ResetFlags,
    pub seq: u64,
    pub fs: [u64; 4],
    pub radio: RadioStats,
    pub mqtt: [u64; 2],
    pub last_update: i64,
    pub status_events: u64,
    sensors: Vec<Sensor>,
    index: HashMap<String, usize>,
    history: usize,
}

impl Hub {
    pub fn new(serial: &str, history: usize) -> Self {
        Self {
            serial: serial.to_string(),
            model: HUB_MODEL,
            firmware: 0,
            uptime: 0,
            rssi: 0,
            reset_flags: ResetFlags::default(),
            seq: 0,
            fs: [0; 4],
            radio: RadioStats::default(),
            mqtt: [0; 2],
            last_update: 0,
            status_events: 0,
            sensors: Vec::new(),
            index: HashMap::new(),
            history,
        }
    }

    /// Look up a sensor by serial number, creating it on first reference.
    pub fn sensor_mut(&mut self, serial: &str) -> &mut Sensor {
        let position = match self.index.get(serial) {
            Some(&position) => position,
            None => {
                self.sensors.push(Sensor::new(serial, self.history));
                self.index.insert(serial.to_string(), self.sensors.len() - 1);
                self.sensors.len() - 1
            }
        };
        &mut self.sensors[position]
    }

    pub fn sensor(&self, serial: &str) -> Option<&Sensor> {
        self.index.get(serial).map(|&position| &self.sensors[position])
    }

    /// Sensors in the order they were first seen.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_flags_parse_known_tokens() {
        let flags = ResetFlags::parse("BOR, PIN,POR ,XYZ,WDG");
        assert!(flags.brownout && flags.pin && flags.power && flags.watchdog);
        assert!(!flags.software && !flags.window_watchdog && !flags.low_power);
        assert_eq!(ResetFlags::parse(""), ResetFlags::default());
    }

    #[test]
    fn radio_status_codes() {
        assert_eq!(RadioStatus::from_code(0), RadioStatus::Off);
        assert_eq!(RadioStatus::from_code(1), RadioStatus::On);
        assert_eq!(RadioStatus::from_code(3), RadioStatus::Active);
        assert_eq!(RadioStatus::from_code(2), RadioStatus::Off);
    }

    #[test]
    fn sensors_keep_insertion_order() {
        let mut hub = Hub::new("HB-1", 4);
        hub.sensor_mut("ST-2").firmware = 129;
        hub.sensor_mut("AR-1");
        hub.sensor_mut("ST-2").last_update = 10;

        let serials: Vec<_> = hub.sensors().iter().map(|s| s.serial.as_str()).collect();
        assert_eq!(serials, vec!["ST-2", "AR-1"]);
        assert_eq!(hub.sensor("ST-2").map(|s| (s.firmware, s.last_update)), Some((129, 10)));
        assert!(hub.sensor("SK-9").is_none());
        assert_eq!(hub.model, HUB_MODEL);
    }
}
