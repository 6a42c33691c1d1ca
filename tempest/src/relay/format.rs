//! Wire encodings of the aggregated state.

use super::{RelayState, Result};
use crate::config::OutputFormat;
use crate::conversions::{
    celsius_to_fahrenheit, epoch_to_dateutc, format_number, hpa_to_inhg, mm_to_in, ms_to_mph,
};
use crate::store::hub::RadioStats;
use crate::store::{Hub, ResetFlags, RollingStats, Sensor, SensorModel, SensorSnapshot, Strike};
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: String,
    pub content_type: &'static str,
}

/// Build every payload due for one transmission, in hub then sensor order.
pub fn build(state: &mut RelayState, format: OutputFormat) -> Result<Vec<Payload>> {
    let content_type = format.content_type();
    let bodies = match format {
        OutputFormat::Json => state.passthrough.drain(),
        OutputFormat::Rest => {
            let mut bodies = Vec::new();
            for hub in state.store.hubs() {
                for (i, sensor) in hub.sensors().iter().enumerate() {
                    bodies.push(rest(hub, i, sensor)?);
                }
            }
            bodies
        }
        OutputFormat::Ecowitt => state
            .store
            .hubs()
            .iter()
            .flat_map(|hub| {
                hub.sensors()
                    .iter()
                    .enumerate()
                    .map(move |(i, sensor)| ecowitt(hub, i, sensor))
            })
            .collect(),
    };

    Ok(bodies
        .into_iter()
        .map(|body| Payload { body, content_type })
        .collect())
}

#[derive(Serialize)]
struct HubView<'a> {
    serial: &'a str,
    model: &'a str,
    firmware: u32,
    uptime: u64,
    rssi: i32,
    last_update: i64,
    reset_flags: &'a ResetFlags,
    radio: &'a RadioStats,
}

#[derive(Serialize)]
struct SensorDocument<'a> {
    hub: HubView<'a>,
    channel: usize,
    serial: &'a str,
    model: SensorModel,
    firmware: u32,
    last_update: i64,
    snapshot: &'a SensorSnapshot,
    last_strike: Option<&'a Strike>,
    stats: &'a RollingStats,
}

/// JSON document for one sensor. `index` is the sensor's position within its hub.
pub fn rest(hub: &Hub, index: usize, sensor: &Sensor) -> Result<String> {
    let document = SensorDocument {
        hub: HubView {
            serial: &hub.serial,
            model: hub.model,
            firmware: hub.firmware,
            uptime: hub.uptime,
            rssi: hub.rssi,
            last_update: hub.last_update,
            reset_flags: &hub.reset_flags,
            radio: &hub.radio,
        },
        channel: index + 1,
        serial: &sensor.serial,
        model: sensor.model,
        firmware: sensor.firmware,
        last_update: sensor.last_update,
        snapshot: &sensor.snapshot,
        last_strike: sensor.latest_strike(),
        stats: &sensor.stats,
    };
    Ok(serde_json::to_string(&document)?)
}

/// Ecowitt form fields for one sensor channel.
pub fn ecowitt(hub: &Hub, index: usize, sensor: &Sensor) -> String {
    let ch = format!("_wf{}=", index + 1);
    let num = format_number;
    let snapshot = &sensor.snapshot;
    let stats = &sensor.stats;
    let mut out = String::new();

    let _ = write!(out, "PASSKEY={}", hub.serial);
    let _ = write!(out, "&stationtype={}_V{}.0.0", hub.model, hub.firmware);
    let _ = write!(out, "&dateutc={}", epoch_to_dateutc(hub.last_update));
    let _ = write!(out, "&batt{}{}", ch, num(snapshot.battery));

    if sensor.model.has_air() {
        let strike = sensor.latest_strike().copied().unwrap_or(Strike {
            time: 0,
            distance: 0.0,
            energy: 0.0,
        });
        // A strike newer than the last observation is not counted there yet.
        let mut strikes = snapshot.strike_count;
        if strike.time > sensor.last_observation {
            strikes += 1.0;
        }

        let _ = write!(out, "&tempf{}{}", ch, num(celsius_to_fahrenheit(snapshot.temperature)));
        let _ = write!(out, "&humidity{}{}", ch, num(snapshot.humidity));
        let _ = write!(out, "&baromrelin{}0", ch);
        let _ = write!(out, "&baromabsin{}{}", ch, num(hpa_to_inhg(snapshot.pressure)));
        let _ = write!(out, "&lightning{}{}", ch, num(strike.distance));
        let _ = write!(out, "&lightning_time{}{}", ch, strike.time);
        let _ = write!(out, "&lightning_energy{}{}", ch, num(strike.energy));
        let _ = write!(out, "&lightning_num{}{}", ch, num(strikes));
    }

    if sensor.model.has_sky() {
        let _ = write!(out, "&uv{}{}", ch, num(snapshot.uv));
        let _ = write!(out, "&solarradiation{}{}", ch, num(snapshot.solar_radiation));

        let rain = [
            ("rainratein", stats.precip_rate),
            ("eventrainin", stats.precip_event),
            ("hourlyrainin", stats.precip_hourly),
            ("dailyrainin", stats.precip_daily),
            ("weeklyrainin", stats.precip_weekly),
            ("monthlyrainin", stats.precip_monthly),
            ("yearlyrainin", stats.precip_yearly),
            ("totalrainin", stats.precip_total),
        ];
        for (field, mm) in rain {
            let _ = write!(out, "&{}{}{}", field, ch, num(mm_to_in(mm)));
        }

        let _ = write!(out, "&winddir{}{}", ch, num(stats.wind_direction));
        let _ = write!(out, "&winddir_avg10m{}{}", ch, num(stats.wind_direction_avg10m));
        let wind = [
            ("windspeedmph", stats.wind_speed),
            ("windspdmph_avg10m", stats.wind_speed_avg10m),
            ("windgustmph", stats.wind_gust),
            ("maxdailygust", stats.wind_gust_daily_max),
        ];
        for (field, ms) in wind {
            let _ = write!(out, "&{}{}{}", field, ch, num(ms_to_mph(ms)));
        }
    }

    let _ = write!(out, "&freq=RSSI{}", hub.rssi);
    let _ = write!(out, "&model={}", hub.model);
    out
}
