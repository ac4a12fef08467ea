//! # Arm executable library
//!
//! This library provides all modules used by the sample handler executable,
//! `arm_exec`. The executable itself is a thin cyclic wrapper around these
//! modules.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod align_ctrl;
pub mod arm_client;
pub mod data_store;
pub mod depth_ctrl;
pub mod motion;
pub mod params;
pub mod plunger_client;
pub mod safety;
pub mod sequence;
pub mod spatial;
pub mod station;
pub mod tc_processor;
pub mod tc_server;
pub mod vision_client;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Target period of one control cycle in seconds.
pub const CYCLE_PERIOD_S: f64 = 0.02;

/// Number of control cycles per second.
pub const CYCLE_FREQUENCY_HZ: f64 = 1.0 / CYCLE_PERIOD_S;
