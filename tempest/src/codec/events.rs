//! Wire shapes of the hub's UDP messages and their sample layouts.

use super::CodecError;
use serde::Deserialize;
use serde_json::Value;

/// `evt_precip` and `evt_strike`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeviceEvent {
    pub serial_number: String,
    pub hub_sn: String,
    pub evt: Vec<Value>,
}

/// `rapid_wind`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RapidWindEvent {
    pub serial_number: String,
    pub hub_sn: String,
    pub ob: Vec<Value>,
}

/// `obs_air`, `obs_sky` and `obs_st`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ObservationEvent {
    pub serial_number: String,
    pub hub_sn: String,
    pub obs: Vec<Value>,
    pub firmware_revision: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeviceStatusEvent {
    pub serial_number: String,
    pub hub_sn: String,
    pub timestamp: f64,
    pub uptime: f64,
    pub voltage: f64,
    pub firmware_revision: Value,
    pub rssi: f64,
    pub hub_rssi: f64,
    pub sensor_status: u32,
    pub debug: u8,
}

/// `hub_status`. The hub's own id travels in `serial_number`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HubStatusEvent {
    pub serial_number: String,
    pub firmware_revision: Value,
    pub uptime: f64,
    pub rssi: f64,
    pub timestamp: f64,
    pub reset_flags: String,
    pub seq: f64,
    pub fs: Vec<Value>,
    pub radio_stats: Vec<Value>,
    pub mqtt_stats: Vec<Value>,
}

impl DeviceEvent {
    pub fn ids(&self) -> Result<(&str, &str), CodecError> {
        device_ids(&self.serial_number, &self.hub_sn)
    }
}

impl RapidWindEvent {
    pub fn ids(&self) -> Result<(&str, &str), CodecError> {
        device_ids(&self.serial_number, &self.hub_sn)
    }
}

impl ObservationEvent {
    pub fn ids(&self) -> Result<(&str, &str), CodecError> {
        device_ids(&self.serial_number, &self.hub_sn)
    }
}

impl DeviceStatusEvent {
    pub fn ids(&self) -> Result<(&str, &str), CodecError> {
        device_ids(&self.serial_number, &self.hub_sn)
    }
}

fn device_ids<'a>(serial: &'a str, hub: &'a str) -> Result<(&'a str, &'a str), CodecError> {
    if serial.is_empty() {
        return Err(CodecError::MissingField("serial_number"));
    }
    if hub.is_empty() {
        return Err(CodecError::MissingField("hub_sn"));
    }
    Ok((serial, hub))
}

/// Numeric element `index`; `null`, missing and non-numeric entries read as 0.
pub fn number_at(values: &[Value], index: usize) -> f64 {
    values.get(index).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Firmware revisions arrive either as a number or as a numeric string.
pub fn firmware(value: &Value) -> u32 {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as u32).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn fields<'a>(
    sample: &'a Value,
    kind: &'static str,
    expected: usize,
) -> Result<&'a [Value], CodecError> {
    let values = sample.as_array().ok_or(CodecError::NotArray(kind))?;
    if values.len() < expected {
        return Err(CodecError::ShortSample {
            kind,
            found: values.len(),
            expected,
        });
    }
    Ok(values)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RainStartSample {
    pub epoch: i64,
}

impl RainStartSample {
    pub fn decode(evt: &[Value]) -> Result<Self, CodecError> {
        let values = sample_slice(evt, "evt_precip", 1)?;
        Ok(Self {
            epoch: number_at(values, 0) as i64,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeSample {
    pub epoch: i64,
    pub distance: f64,
    pub energy: f64,
}

impl StrikeSample {
    pub fn decode(evt: &[Value]) -> Result<Self, CodecError> {
        let values = sample_slice(evt, "evt_strike", 3)?;
        Ok(Self {
            epoch: number_at(values, 0) as i64,
            distance: number_at(values, 1),
            energy: number_at(values, 2),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RapidWindSample {
    pub epoch: i64,
    pub speed: f64,
    pub direction: f64,
}

impl RapidWindSample {
    pub fn decode(ob: &[Value]) -> Result<Self, CodecError> {
        let values = sample_slice(ob, "rapid_wind", 3)?;
        Ok(Self {
            epoch: number_at(values, 0) as i64,
            speed: number_at(values, 1),
            direction: number_at(values, 2),
        })
    }
}

fn sample_slice<'a>(
    values: &'a [Value],
    kind: &'static str,
    expected: usize,
) -> Result<&'a [Value], CodecError> {
    if values.len() < expected {
        return Err(CodecError::ShortSample {
            kind,
            found: values.len(),
            expected,
        });
    }
    Ok(values)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirSample {
    pub epoch: i64,
    pub pressure: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub strike_count: f64,
    pub strike_distance: f64,
    pub battery: f64,
    pub interval_minutes: u32,
}

impl AirSample {
    pub const FIELDS: usize = 8;

    pub fn decode(sample: &Value) -> Result<Self, CodecError> {
        let v = fields(sample, "obs_air", Self::FIELDS)?;
        Ok(Self {
            epoch: number_at(v, 0) as i64,
            pressure: number_at(v, 1),
            temperature: number_at(v, 2),
            humidity: number_at(v, 3),
            strike_count: number_at(v, 4),
            strike_distance: number_at(v, 5),
            battery: number_at(v, 6),
            interval_minutes: number_at(v, 7) as u32,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkySample {
    pub epoch: i64,
    pub illuminance: f64,
    pub uv: f64,
    pub precip_accumulated: f64,
    pub wind_lull: f64,
    pub wind_avg: f64,
    pub wind_gust: f64,
    pub wind_direction: f64,
    pub battery: f64,
    pub interval_minutes: u32,
    pub solar_radiation: f64,
    pub precip_local_day: f64,
    pub precip_type: f64,
    pub wind_interval: u32,
}

impl SkySample {
    pub const FIELDS: usize = 14;

    pub fn decode(sample: &Value) -> Result<Self, CodecError> {
        let v = fields(sample, "obs_sky", Self::FIELDS)?;
        Ok(Self {
            epoch: number_at(v, 0) as i64,
            illuminance: number_at(v, 1),
            uv: number_at(v, 2),
            precip_accumulated: number_at(v, 3),
            wind_lull: number_at(v, 4),
            wind_avg: number_at(v, 5),
            wind_gust: number_at(v, 6),
            wind_direction: number_at(v, 7),
            battery: number_at(v, 8),
            interval_minutes: number_at(v, 9) as u32,
            solar_radiation: number_at(v, 10),
            precip_local_day: number_at(v, 11),
            precip_type: number_at(v, 12),
            wind_interval: number_at(v, 13) as u32,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempestSample {
    pub epoch: i64,
    pub wind_lull: f64,
    pub wind_avg: f64,
    pub wind_gust: f64,
    pub wind_direction: f64,
    pub wind_interval: u32,
    pub pressure: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub illuminance: f64,
    pub uv: f64,
    pub solar_radiation: f64,
    pub precip_accumulated: f64,
    pub precip_type: f64,
    pub strike_distance: f64,
    pub strike_count: f64,
    pub battery: f64,
    pub interval_minutes: u32,
}

impl TempestSample {
    pub const FIELDS: usize = 18;

    pub fn decode(sample: &Value) -> Result<Self, CodecError> {
        let v = fields(sample, "obs_st", Self::FIELDS)?;
        Ok(Self {
            epoch: number_at(v, 0) as i64,
            wind_lull: number_at(v, 1),
            wind_avg: number_at(v, 2),
            wind_gust: number_at(v, 3),
            wind_direction: number_at(v, 4),
            wind_interval: number_at(v, 5) as u32,
            pressure: number_at(v, 6),
            temperature: number_at(v, 7),
            humidity: number_at(v, 8),
            illuminance: number_at(v, 9),
            uv: number_at(v, 10),
            solar_radiation: number_at(v, 11),
            precip_accumulated: number_at(v, 12),
            precip_type: number_at(v, 13),
            strike_distance: number_at(v, 14),
            strike_count: number_at(v, 15),
            battery: number_at(v, 16),
            interval_minutes: number_at(v, 17) as u32,
        })
    }
}

/// Decode every sample of an `obs` array before anything is applied.
pub fn decode_all<T>(
    obs: &[Value],
    decode: impl Fn(&Value) -> Result<T, CodecError>,
) -> Result<Vec<T>, CodecError> {
    obs.iter().map(decode).collect()
}
