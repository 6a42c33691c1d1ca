//! Unit conversions between the metric values reported by the hub and the imperial units
//! expected by Ecowitt-style collectors.

use chrono::DateTime;

const HPA_PER_INHG: f64 = 33.863886666667;
const MM_PER_IN: f64 = 25.4;
const MS_PER_KMH: f64 = 0.27777777777778;
const KM_PER_MI: f64 = 1.609344;

pub fn celsius_to_fahrenheit(value: f64) -> f64 {
    value * 1.8 + 32.0
}

pub fn hpa_to_inhg(value: f64) -> f64 {
    value / HPA_PER_INHG
}

pub fn mm_to_in(value: f64) -> f64 {
    value / MM_PER_IN
}

pub fn ms_to_kmh(value: f64) -> f64 {
    value / MS_PER_KMH
}

pub fn km_to_mi(value: f64) -> f64 {
    value / KM_PER_MI
}

/// Meters per second to miles per hour.
pub fn ms_to_mph(value: f64) -> f64 {
    km_to_mi(ms_to_kmh(value))
}

/// Format an epoch as the `dateutc` field (`YYYY-mm-dd+HH:MM:SS`).
pub fn epoch_to_dateutc(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d+%H:%M:%S")
        .to_string()
}

/// Render a float the way collectors expect: integers without a fraction, everything else
/// with at most four decimals and no trailing zeros.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }

    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
