//! # Plunger (end effector) service types
//!
//! The plunger controller publishes sensor samples and accepts demands as
//! single-key JSON objects, e.g. `{"pump": 100}` or `{"tare": 1}`. The
//! demand struct below serialises to exactly that format by skipping all
//! unset fields.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A sensor sample published by the plunger controller.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
pub struct PlungerSample {
    /// Raw contact force reading from the load cell, dimensionless counts
    pub force: f64,

    /// Vacuum pump pressure sensor reading, dimensionless counts
    pub pump_sensor: f64,

    /// Heater block temperature in degrees Celsius
    #[serde(default)]
    pub temperature: f64,
}

/// Demands sent to the plunger controller.
///
/// The controller expects one key per message, so build these with the
/// constructor functions rather than by struct literal.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PlungerDems {
    /// Zero the load cell. Any value is accepted, 1 by convention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tare: Option<i32>,

    /// Vacuum pump power, 0 to 100 percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pump: Option<u8>,

    /// Heater setpoint in degrees Celsius
    #[serde(rename = "setTemp", skip_serializing_if = "Option::is_none")]
    pub set_temp: Option<f64>,

    /// Ring light brightness, 0 to 255
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,

    /// Direct RGB value for each LED in the ring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leds: Option<Vec<[u8; 3]>>,

    /// Ring light hue, 0 to 360 degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<f64>,

    /// Ring light saturation, 0 to 100 percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,

    /// Ring light lightness, 0 to 100 percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lightness: Option<f64>,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl PlungerDems {
    pub fn tare() -> Self {
        Self {
            tare: Some(1),
            ..Default::default()
        }
    }

    pub fn pump(power: u8) -> Self {
        Self {
            pump: Some(power.min(100)),
            ..Default::default()
        }
    }

    pub fn set_temp(temp_degc: f64) -> Self {
        Self {
            set_temp: Some(temp_degc),
            ..Default::default()
        }
    }

    pub fn brightness(level: u8) -> Self {
        Self {
            brightness: Some(level),
            ..Default::default()
        }
    }

    pub fn leds(colours: Vec<[u8; 3]>) -> Self {
        Self {
            leds: Some(colours),
            ..Default::default()
        }
    }

    pub fn hsl(hue: f64, saturation: f64, lightness: f64) -> Self {
        Self {
            hue: Some(hue),
            saturation: Some(saturation),
            lightness: Some(lightness),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_single_key_serialisation() {
        let json = serde_json::to_string(&PlungerDems::pump(100)).unwrap();
        assert_eq!(json, r#"{"pump":100}"#);

        let json = serde_json::to_string(&PlungerDems::tare()).unwrap();
        assert_eq!(json, r#"{"tare":1}"#);

        let json = serde_json::to_string(&PlungerDems::set_temp(41.5)).unwrap();
        assert_eq!(json, r#"{"setTemp":41.5}"#);
    }

    #[test]
    fn test_pump_power_clamped() {
        assert_eq!(PlungerDems::pump(255).pump, Some(100));
    }

    #[test]
    fn test_sample_parse() {
        let raw = r#"{"force": 1234.0, "pump_sensor": 87.0}"#;
        let sample: PlungerSample = serde_json::from_str(raw).unwrap();
        assert!((sample.force - 1234.0).abs() < 1e-12);
        assert_eq!(sample.temperature, 0.0);
    }
}
