//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the arm software: the
//! telecommand set, wire types for the actuator/vision/plunger services, and
//! the monitored zmq socket abstraction.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommand definitions
pub mod tc;

/// Command and response definitions for equipment (arm, vision, plunger)
pub mod eqpt;

/// Network module
pub mod net;
