//! Classifies hub datagrams and folds them into the aggregation store.

pub mod events;

use crate::store::{AggregationStore, PrecipitationType, SensorStatus, Strike, WindSample};
use crate::store::{RadioStatus, ResetFlags};
use events::{
    decode_all, firmware, number_at, AirSample, DeviceEvent, DeviceStatusEvent, HubStatusEvent,
    ObservationEvent, RainStartSample, RapidWindEvent, RapidWindSample, SkySample, StrikeSample,
    TempestSample,
};
use log::{debug, error, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("datagram is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no type tag")]
    MissingType,

    #[error("message has no {0}")]
    MissingField(&'static str),

    #[error("{0} sample is not an array")]
    NotArray(&'static str),

    #[error("{kind} sample has {found} fields, expected {expected}")]
    ShortSample {
        kind: &'static str,
        found: usize,
        expected: usize,
    },
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RainStart,
    LightningStrike,
    RapidWind,
    AirObservation,
    SkyObservation,
    TempestObservation,
    DeviceStatus,
    HubStatus,
    Debug,
    Unknown,
    Invalid,
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "evt_precip" => EventKind::RainStart,
            "evt_strike" => EventKind::LightningStrike,
            "rapid_wind" => EventKind::RapidWind,
            "obs_air" => EventKind::AirObservation,
            "obs_sky" => EventKind::SkyObservation,
            "obs_st" => EventKind::TempestObservation,
            "device_status" => EventKind::DeviceStatus,
            "hub_status" => EventKind::HubStatus,
            t if t.contains("debug") => EventKind::Debug,
            _ => EventKind::Unknown,
        }
    }

    /// Events worth relaying before the next interval elapses.
    pub fn notifies(self) -> bool {
        matches!(self, EventKind::RainStart | EventKind::LightningStrike)
    }
}

/// Outcome of applying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub kind: EventKind,
    /// Number of events or observation samples folded into the store.
    pub count: usize,
    pub notify: bool,
}

impl Applied {
    fn none(kind: EventKind) -> Self {
        Self {
            kind,
            count: 0,
            notify: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind != EventKind::Invalid
    }
}

/// Parse a raw datagram and apply it. Unparseable input is counted as invalid.
pub fn apply_datagram(store: &mut AggregationStore, datagram: &[u8]) -> Applied {
    match parse(datagram) {
        Ok(tree) => apply(store, &tree),
        Err(e) => {
            store.counters.invalid += 1;
            error!("[CODEC] Dropping datagram: {}", e);
            Applied::none(EventKind::Invalid)
        }
    }
}

pub fn parse(datagram: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(datagram)?;
    Ok(serde_json::from_str(text)?)
}

/// Apply one decoded message tree to the store.
pub fn apply(store: &mut AggregationStore, tree: &Value) -> Applied {
    let tag = match tree.get("type").and_then(Value::as_str) {
        Some(tag) => tag,
        None => {
            store.counters.invalid += 1;
            error!("[CODEC] Dropping message: {}", CodecError::MissingType);
            return Applied::none(EventKind::Invalid);
        }
    };

    let kind = EventKind::from_tag(tag);
    let result = match kind {
        EventKind::RainStart => apply_rain_start(store, tree),
        EventKind::LightningStrike => apply_strike(store, tree),
        EventKind::RapidWind => apply_rapid_wind(store, tree),
        EventKind::AirObservation => apply_air(store, tree),
        EventKind::SkyObservation => apply_sky(store, tree),
        EventKind::TempestObservation => apply_tempest(store, tree),
        EventKind::DeviceStatus => apply_device_status(store, tree),
        EventKind::HubStatus => apply_hub_status(store, tree),
        EventKind::Debug => {
            store.counters.debug += 1;
            debug!("[CODEC] Discarding debug message '{}'", tag);
            return Applied::none(kind);
        }
        EventKind::Unknown | EventKind::Invalid => {
            store.counters.unknown += 1;
            warn!("[CODEC] Unknown message type '{}'", tag);
            return Applied::none(EventKind::Unknown);
        }
    };

    match result {
        Ok(count) => Applied {
            kind,
            count,
            notify: kind.notifies() && count > 0,
        },
        Err(e) => {
            store.counters.invalid += 1;
            error!("[CODEC] Failed to decode '{}' message: {}", tag, e);
            Applied::none(kind)
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(tree: &'a Value) -> Result<T> {
    Ok(T::deserialize(tree)?)
}

fn apply_rain_start(store: &mut AggregationStore, tree: &Value) -> Result<usize> {
    let event: DeviceEvent = decode(tree)?;
    let (serial, hub) = event.ids()?;
    let sample = RainStartSample::decode(&event.evt)?;

    let sensor = store.hub_mut(hub).sensor_mut(serial);
    sensor.rain_starts.push(sample.epoch);
    sensor.stats.precipitation_started();
    sensor.last_update = sample.epoch;
    sensor.counters.rain += 1;
    Ok(1)
}

fn apply_strike(store: &mut AggregationStore, tree: &Value) -> Result<usize> {
    let event: DeviceEvent = decode(tree)?;
    let (serial, hub) = event.ids()?;
    let sample = StrikeSample::decode(&event.evt)?;

    let sensor = store.hub_mut(hub).sensor_mut(serial);
    sensor.strikes.push(Strike {
        time: sample.epoch,
        distance: sample.distance,
        energy: sample.energy,
    });
    sensor.last_update = sample.epoch;
    sensor.counters.strike += 1;
    Ok(1)
}

fn apply_rapid_wind(store: &mut AggregationStore, tree: &Value) -> Result<usize> {
    let event: RapidWindEvent = decode(tree)?;
    let (serial, hub) = event.ids()?;
    let sample = RapidWindSample::decode(&event.ob)?;

    let sensor = store.hub_mut(hub).sensor_mut(serial);
    sensor.winds.push(WindSample {
        time: sample.epoch,
        speed: sample.speed,
        direction: sample.direction,
    });
    sensor.snapshot.wind_avg = sample.speed;
    sensor.snapshot.wind_direction = sample.direction;
    sensor.last_update = sample.epoch;
    sensor.counters.wind += 1;
    Ok(1)
}

fn apply_air(store: &mut AggregationStore, tree: &Value) -> Result<usize> {
    let event: ObservationEvent = decode(tree)?;
    let (serial, hub) = event.ids()?;
    let samples = decode_all(&event.obs, AirSample::decode)?;

    let sensor = store.hub_mut(hub).sensor_mut(serial);
    apply_firmware(&mut sensor.firmware, &event.firmware_revision);
    for s in &samples {
        let snapshot = &mut sensor.snapshot;
        snapshot.pressure = s.pressure;
        snapshot.temperature = s.temperature;
        snapshot.humidity = s.humidity;
        snapshot.strike_count = s.strike_count;
        snapshot.strike_distance = s.strike_distance;
        snapshot.battery = s.battery;
        snapshot.report_interval = s.interval_minutes.saturating_mul(60);

        sensor
            .stats
            .update(s.epoch, snapshot.report_interval, 0.0, 0.0, 0.0, 0.0);
        sensor.last_update = s.epoch;
        sensor.last_observation = s.epoch;
        sensor.counters.observation += 1;
    }
    Ok(samples.len())
}

fn apply_sky(store: &mut AggregationStore, tree: &Value) -> Result<usize> {
    let event: ObservationEvent = decode(tree)?;
    let (serial, hub) = event.ids()?;
    let samples = decode_all(&event.obs, SkySample::decode)?;

    let sensor = store.hub_mut(hub).sensor_mut(serial);
    apply_firmware(&mut sensor.firmware, &event.firmware_revision);
    for s in &samples {
        let snapshot = &mut sensor.snapshot;
        snapshot.illuminance = s.illuminance;
        snapshot.uv = s.uv;
        snapshot.precip_accumulated = s.precip_accumulated;
        snapshot.wind_lull = s.wind_lull;
        snapshot.wind_avg = s.wind_avg;
        snapshot.wind_gust = s.wind_gust;
        snapshot.wind_direction = s.wind_direction;
        snapshot.battery = s.battery;
        snapshot.report_interval = s.interval_minutes.saturating_mul(60);
        snapshot.solar_radiation = s.solar_radiation;
        snapshot.precip_local_day = s.precip_local_day;
        snapshot.precip_type = PrecipitationType::from_code(s.precip_type);
        snapshot.wind_interval = s.wind_interval;

        sensor.stats.update(
            s.epoch,
            snapshot.report_interval,
            s.precip_accumulated,
            s.wind_direction,
            s.wind_avg,
            s.wind_gust,
        );
        sensor.last_update = s.epoch;
        sensor.last_observation = s.epoch;
        sensor.counters.observation += 1;
    }
    Ok(samples.len())
}

fn apply_tempest(store: &mut AggregationStore, tree: &Value) -> Result<usize> {
    let event: ObservationEvent = decode(tree)?;
    let (serial, hub) = event.ids()?;
    let samples = decode_all(&event.obs, TempestSample::decode)?;

    let sensor = store.hub_mut(hub).sensor_mut(serial);
    apply_firmware(&mut sensor.firmware, &event.firmware_revision);
    for s in &samples {
        let snapshot = &mut sensor.snapshot;
        snapshot.wind_lull = s.wind_lull;
        snapshot.wind_avg = s.wind_avg;
        snapshot.wind_gust = s.wind_gust;
        snapshot.wind_direction = s.wind_direction;
        snapshot.wind_interval = s.wind_interval;
        snapshot.pressure = s.pressure;
        snapshot.temperature = s.temperature;
        snapshot.humidity = s.humidity;
        snapshot.illuminance = s.illuminance;
        snapshot.uv = s.uv;
        snapshot.solar_radiation = s.solar_radiation;
        snapshot.precip_accumulated = s.precip_accumulated;
        snapshot.precip_type = PrecipitationType::from_code(s.precip_type);
        snapshot.strike_distance = s.strike_distance;
        snapshot.strike_count = s.strike_count;
        snapshot.battery = s.battery;
        snapshot.report_interval = s.interval_minutes.saturating_mul(60);

        sensor.stats.update(
            s.epoch,
            snapshot.report_interval,
            s.precip_accumulated,
            s.wind_direction,
            s.wind_avg,
            s.wind_gust,
        );
        sensor.last_update = s.epoch;
        sensor.last_observation = s.epoch;
        sensor.counters.observation += 1;
    }
    Ok(samples.len())
}

fn apply_device_status(store: &mut AggregationStore, tree: &Value) -> Result<usize> {
    let event: DeviceStatusEvent = decode(tree)?;
    let (serial, hub_serial) = event.ids()?;

    let hub = store.hub_mut(hub_serial);
    hub.last_update = event.timestamp as i64;
    hub.rssi = event.hub_rssi as i32;

    let sensor = hub.sensor_mut(serial);
    let snapshot = &mut sensor.snapshot;
    snapshot.uptime = event.uptime as u64;
    snapshot.battery = event.voltage;
    snapshot.rssi = event.rssi as i32;
    snapshot.status = SensorStatus::from_bits(event.sensor_status);
    snapshot.debug = event.debug != 0;
    apply_firmware(&mut sensor.firmware, &event.firmware_revision);
    sensor.last_update = event.timestamp as i64;
    sensor.counters.status += 1;
    Ok(1)
}

fn apply_hub_status(store: &mut AggregationStore, tree: &Value) -> Result<usize> {
    let event: HubStatusEvent = decode(tree)?;
    if event.serial_number.is_empty() {
        return Err(CodecError::MissingField("serial_number"));
    }

    let hub = store.hub_mut(&event.serial_number);
    apply_firmware(&mut hub.firmware, &event.firmware_revision);
    hub.uptime = event.uptime as u64;
    hub.rssi = event.rssi as i32;
    hub.last_update = event.timestamp as i64;
    hub.reset_flags = ResetFlags::parse(&event.reset_flags);
    hub.seq = event.seq as u64;
    for (i, counter) in hub.fs.iter_mut().enumerate() {
        *counter = number_at(&event.fs, i) as u64;
    }
    hub.radio.version = number_at(&event.radio_stats, 0) as u32;
    hub.radio.reboots = number_at(&event.radio_stats, 1) as u32;
    hub.radio.i2c_errors = number_at(&event.radio_stats, 2) as u32;
    hub.radio.status = RadioStatus::from_code(number_at(&event.radio_stats, 3) as i64);
    for (i, counter) in hub.mqtt.iter_mut().enumerate() {
        *counter = number_at(&event.mqtt_stats, i) as u64;
    }
    hub.status_events += 1;
    Ok(1)
}

fn apply_firmware(target: &mut u32, revision: &Value) {
    if !revision.is_null() {
        *target = firmware(revision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> AggregationStore {
        AggregationStore::new(16)
    }

    fn sky_sample(epoch: i64, accumulated: f64, minutes: u32) -> Value {
        json!([epoch, 9000, 3.2, accumulated, 0.3, 1.2, 2.4, 180, 3.5, minutes, 130, null, 1, 3])
    }

    #[test]
    fn rain_start_then_sky_observation() {
        let mut store = store();
        let rain = json!({"serial_number":"SK-1","type":"evt_precip","hub_sn":"HB-1","evt":[1000]});
        let applied = apply(&mut store, &rain);
        assert_eq!(applied.kind, EventKind::RainStart);
        assert!(applied.notify);

        {
            let stats = &store.hub("HB-1").and_then(|h| h.sensor("SK-1")).unwrap().stats;
            assert!((stats.precip_rate - 0.01).abs() < 1e-12);
            assert_eq!(stats.precip_total, 0.0);
            assert_eq!(stats.precip_event, 0.0);
        }

        let obs = json!({
            "serial_number": "SK-1", "type": "obs_sky", "hub_sn": "HB-1",
            "obs": [sky_sample(1060, 0.5, 1)], "firmware_revision": 43
        });
        let applied = apply(&mut store, &obs);
        assert_eq!(applied.count, 1);
        assert!(!applied.notify);

        let sensor = store.hub("HB-1").and_then(|h| h.sensor("SK-1")).unwrap();
        assert!((sensor.stats.precip_rate - 30.0).abs() < 1e-9);
        assert!((sensor.stats.precip_hourly - 0.5).abs() < 1e-9);
        assert!((sensor.stats.precip_event - 0.5).abs() < 1e-9);
        assert_eq!(sensor.snapshot.precip_type, PrecipitationType::Rain);
        assert_eq!(sensor.snapshot.precip_local_day, 0.0);
        assert_eq!(sensor.firmware, 43);
        assert_eq!(sensor.rain_starts.latest(), Some(&1000));
    }

    #[test]
    fn observations_apply_oldest_first() {
        let mut store = store();
        let obs = json!({
            "serial_number": "ST-1", "type": "obs_st", "hub_sn": "HB-1",
            "obs": [
                [1000, 0.1, 1.0, 2.0, 90, 3, 1010.0, 20.0, 60, 100, 1.0, 10, 0.0, 0, 0, 0, 2.6, 1],
                [1060, 0.1, 1.0, 2.0, 90, 3, 1011.0, 21.0, 61, 100, 1.0, 10, 0.2, 1, 12, 1, 2.6, 1],
                [1120, 0.1, 1.0, 2.0, 90, 3, 1012.0, 22.0, 62, 100, 1.0, 10, 0.3, 1, 14, 2, 2.6, 1]
            ]
        });
        let applied = apply(&mut store, &obs);
        assert_eq!(applied.count, 3);

        let sensor = store.hub("HB-1").and_then(|h| h.sensor("ST-1")).unwrap();
        assert_eq!(sensor.last_update, 1120);
        assert_eq!(sensor.counters.observation, 3);
        assert_eq!(sensor.snapshot.temperature, 22.0);
        assert_eq!(sensor.snapshot.report_interval, 60);
        assert!((sensor.stats.precip_total - 0.5).abs() < 1e-9);
        // 0.2 then 0.3 belong to one rain event
        assert!((sensor.stats.precip_event - 0.5).abs() < 1e-9);
    }

    #[test]
    fn short_sample_rejects_whole_message() {
        let mut store = store();
        let obs = json!({
            "serial_number": "SK-1", "type": "obs_sky", "hub_sn": "HB-1",
            "obs": [sky_sample(1000, 0.1, 1), [1060, 1.0]]
        });
        let applied = apply(&mut store, &obs);
        assert_eq!(applied.count, 0);
        assert_eq!(store.counters.invalid, 1);
        assert!(store.hubs().is_empty());
    }

    #[test]
    fn oversized_report_interval_saturates() {
        let mut store = store();
        let obs = json!({
            "serial_number": "SK-1", "type": "obs_sky", "hub_sn": "HB-1",
            "obs": [sky_sample(1000, 0.1, 100_000_000)]
        });
        let applied = apply(&mut store, &obs);
        assert_eq!(applied.count, 1);

        let sensor = store.hub("HB-1").and_then(|h| h.sensor("SK-1")).unwrap();
        assert_eq!(sensor.snapshot.report_interval, u32::MAX);
        assert!(sensor.stats.precip_rate.is_finite());
    }

    #[test]
    fn air_observation_advances_calendar() {
        let mut store = store();
        let obs = json!({
            "serial_number": "AR-1", "type": "obs_air", "hub_sn": "HB-1",
            "obs": [[1000, 1012.5, 18.5, 70, 2, 8, 3.46, 1]]
        });
        assert_eq!(apply(&mut store, &obs).count, 1);
        let sensor = store.hub("HB-1").and_then(|h| h.sensor("AR-1")).unwrap();
        assert!(sensor.stats.tracked.is_some());
        assert_eq!(sensor.snapshot.pressure, 1012.5);
        assert_eq!(sensor.snapshot.strike_count, 2.0);
    }

    #[test]
    fn strike_and_rapid_wind_events() {
        let mut store = store();
        let strike = json!({"serial_number":"AR-1","type":"evt_strike","hub_sn":"HB-1","evt":[1493322445,27,3848]});
        assert!(apply(&mut store, &strike).notify);

        let wind = json!({"serial_number":"SK-1","type":"rapid_wind","hub_sn":"HB-1","ob":[1493322445,2.3,128]});
        let applied = apply(&mut store, &wind);
        assert_eq!(applied.count, 1);
        assert!(!applied.notify);

        let hub = store.hub("HB-1").unwrap();
        let strike = hub.sensor("AR-1").and_then(|s| s.latest_strike().copied()).unwrap();
        assert_eq!((strike.distance, strike.energy), (27.0, 3848.0));
        let sky = hub.sensor("SK-1").unwrap();
        assert_eq!(sky.winds.len(), 1);
        assert_eq!(sky.snapshot.wind_direction, 128.0);
    }

    #[test]
    fn device_status_updates_parent_hub() {
        let mut store = store();
        let status = json!({
            "serial_number": "AR-1", "type": "device_status", "hub_sn": "HB-1",
            "timestamp": 1510855923, "uptime": 2189, "voltage": 3.50, "firmware_revision": 17,
            "rssi": -17, "hub_rssi": -87, "sensor_status": 0b1_0000_0001, "debug": 0
        });
        assert_eq!(apply(&mut store, &status).count, 1);

        let hub = store.hub("HB-1").unwrap();
        assert_eq!(hub.last_update, 1510855923);
        assert_eq!(hub.rssi, -87);
        let sensor = hub.sensor("AR-1").unwrap();
        assert_eq!(sensor.snapshot.rssi, -17);
        assert!(sensor.snapshot.status.light_uv_failed);
        assert!(sensor.snapshot.status.lightning_failed);
        assert_eq!(sensor.firmware, 17);
    }

    #[test]
    fn hub_status_uses_serial_number_as_hub() {
        let mut store = store();
        let status = json!({
            "serial_number": "HB-00000001", "type": "hub_status", "firmware_revision": "35",
            "uptime": 1670133, "rssi": -62, "timestamp": 1495724691, "reset_flags": "BOR,PIN,POR",
            "seq": 48, "fs": [1, 0, 15675411, 524288], "radio_stats": [2, 1, 0, 3, 2839],
            "mqtt_stats": [1, 0]
        });
        assert_eq!(apply(&mut store, &status).count, 1);

        let hub = store.hub("HB-00000001").unwrap();
        assert_eq!(hub.firmware, 35);
        assert_eq!(hub.fs, [1, 0, 15675411, 524288]);
        assert_eq!(hub.radio.status, RadioStatus::Active);
        assert!(hub.reset_flags.brownout && hub.reset_flags.power);
        assert_eq!(hub.status_events, 1);
        assert!(hub.sensors().is_empty());
    }

    #[test]
    fn debug_unknown_and_invalid_are_counted() {
        let mut store = store();
        apply(&mut store, &json!({"type": "hub_debug"}));
        apply(&mut store, &json!({"type": "light_debug", "serial_number": "ST-1"}));
        apply(&mut store, &json!({"type": "mystery"}));
        apply(&mut store, &json!({"serial_number": "ST-1"}));
        apply_datagram(&mut store, b"{not json");
        apply_datagram(&mut store, &[0xff, 0xfe]);

        assert_eq!(store.counters.debug, 2);
        assert_eq!(store.counters.unknown, 1);
        assert_eq!(store.counters.invalid, 3);
        assert!(store.hubs().is_empty());
    }

    #[test]
    fn datagram_entry_point() {
        let mut store = store();
        let datagram = br#"{"serial_number":"SK-1","type":"evt_precip","hub_sn":"HB-1","evt":[1000]}"#;
        let applied = apply_datagram(&mut store, datagram);
        assert!(applied.is_valid() && applied.notify);
        assert_eq!(store.hubs().len(), 1);
    }
}
