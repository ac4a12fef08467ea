//! # Equipment interfaces
//!
//! Wire-level types for the three external services the software consumes:
//! the arm actuator server, the fiducial vision detector, and the plunger
//! (force sensor + peripherals) microcontroller bridge.

pub mod arm;
pub mod plunger;
pub mod vision;
