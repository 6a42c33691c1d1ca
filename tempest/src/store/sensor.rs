use super::history::BoundedQueue;
use super::stats::RollingStats;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorModel {
    Air,
    Sky,
    Tempest,
    Unknown,
}

impl SensorModel {
    /// Infer the device model from its serial number prefix.
    pub fn from_serial(serial: &str) -> Self {
        if serial.starts_with("AR-") {
            SensorModel::Air
        } else if serial.starts_with("SK-") {
            SensorModel::Sky
        } else if serial.starts_with("ST-") {
            SensorModel::Tempest
        } else {
            SensorModel::Unknown
        }
    }

    pub fn has_air(self) -> bool {
        matches!(self, SensorModel::Air | SensorModel::Tempest)
    }

    pub fn has_sky(self) -> bool {
        matches!(self, SensorModel::Sky | SensorModel::Tempest)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrecipitationType {
    #[default]
    None,
    Rain,
    Hail,
}

impl PrecipitationType {
    pub fn from_code(code: f64) -> Self {
        match code as i64 {
            1 => PrecipitationType::Rain,
            2 => PrecipitationType::Hail,
            _ => PrecipitationType::None,
        }
    }
}

/// Decoded `sensor_status` bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorStatus {
    pub light_uv_failed: bool,
    pub precipitation_failed: bool,
    pub wind_failed: bool,
    pub humidity_failed: bool,
    pub temperature_failed: bool,
    pub pressure_failed: bool,
    pub lightning_disturber: bool,
    pub lightning_noise: bool,
    pub lightning_failed: bool,
}

impl SensorStatus {
    pub fn from_bits(bits: u32) -> Self {
        let bit = |n: u32| bits & (1 << n) != 0;
        Self {
            light_uv_failed: bit(8),
            precipitation_failed: bit(7),
            wind_failed: bit(6),
            humidity_failed: bit(5),
            temperature_failed: bit(4),
            pressure_failed: bit(3),
            lightning_disturber: bit(2),
            lightning_noise: bit(1),
            lightning_failed: bit(0),
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == SensorStatus::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Strike {
    pub time: i64,
    pub distance: f64,
    pub energy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindSample {
    pub time: i64,
    pub speed: f64,
    pub direction: f64,
}

/// Latest values reported by a sensor's observations and status messages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorSnapshot {
    pub battery: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub illuminance: f64,
    pub uv: f64,
    pub solar_radiation: f64,
    pub precip_type: PrecipitationType,
    pub precip_accumulated: f64,
    pub precip_local_day: f64,
    pub strike_distance: f64,
    pub strike_count: f64,
    pub wind_lull: f64,
    pub wind_avg: f64,
    pub wind_gust: f64,
    pub wind_direction: f64,
    pub wind_interval: u32,
    /// Report interval in seconds.
    pub report_interval: u32,
    pub uptime: u64,
    pub rssi: i32,
    pub status: SensorStatus,
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorCounters {
    pub rain: u64,
    pub strike: u64,
    pub wind: u64,
    pub observation: u64,
    pub status: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sensor {
    pub serial: String,
    pub model: SensorModel,
    pub firmware: u32,
    pub last_update: i64,
    /// Epoch of the most recent observation sample.
    pub last_observation: i64,
    pub snapshot: SensorSnapshot,
    pub rain_starts: BoundedQueue<i64>,
    pub strikes: BoundedQueue<Strike>,
    pub winds: BoundedQueue<WindSample>,
    pub counters: SensorCounters,
    pub stats: RollingStats,
}

impl Sensor {
    pub fn new(serial: &str, history: usize) -> Self {
        Self {
            serial: serial.to_string(),
            model: SensorModel::from_serial(serial),
            firmware: 0,
            last_update: 0,
            last_observation: 0,
            snapshot: SensorSnapshot::default(),
            rain_starts: BoundedQueue::new(history),
            strikes: BoundedQueue::new(history),
            winds: BoundedQueue::new(history),
            counters: SensorCounters::default(),
            stats: RollingStats::new(),
        }
    }

    pub fn latest_strike(&self) -> Option<&Strike> {
        self.strikes.latest()
    }
}
