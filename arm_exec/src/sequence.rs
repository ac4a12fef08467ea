//! # Pick and place sequencing
//!
//! Tick-based verification of the vacuum grip. After a press the pump is
//! switched on and the pump pressure sensor is watched: a held sample keeps
//! the line pressure low, a missed grip lets it float high. Both the grip
//! and the release are verified with bounded retries rather than assumed.
//!
//! The verifiers are decision logic only, they return actions for the
//! executive to carry out so they can be ticked in tests without hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for grip and release verification.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Pump power applied while gripping, 0 to 100 percent
    pub grip_pump_power: u8,

    /// Pump sensor reading below which the sample is considered held
    pub held_pressure_threshold: f64,

    /// Pump sensor reading above which the vacuum is considered released
    pub released_pressure_threshold: f64,

    /// Ticks allowed for the vacuum to draw down after the pump starts
    pub prime_ticks: u32,

    /// Consecutive held readings required to confirm the grip
    pub hold_confirm_ticks: u32,

    /// Base ticks allowed for the vacuum to decay after the pump stops. Each
    /// release retry waits one base period longer than the last.
    pub release_wait_ticks: u32,

    /// Re-seat attempts before a grip is abandoned
    pub max_seat_retries: u32,

    /// Retries before a release is abandoned
    pub max_release_retries: u32,
}

/// Verifies a vacuum grip after a press.
pub struct GripVerifier {
    params: Params,
    state: GripState,
    ticks: u32,
    confirm_ticks: u32,
    retries: u32,
}

/// Verifies a release after the pump is stopped.
pub struct ReleaseVerifier {
    params: Params,
    active: bool,
    ticks: u32,
    retries: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What the executive must do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceAction {
    /// Nothing, keep ticking
    None,

    /// Set the vacuum pump power
    SetPump(u8),

    /// The grip failed, press the plunger onto the sample again and resume
    /// ticking
    Reseat,

    /// Verification complete
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GripState {
    Idle,
    Priming,
    Checking,
}

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("Sample not held after {0} seat attempts")]
    GripFailed(u32),

    #[error("Vacuum not released after {0} attempts")]
    ReleaseFailed(u32),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            grip_pump_power: 100,
            held_pressure_threshold: 150.0,
            released_pressure_threshold: 400.0,
            prime_ticks: 50,
            hold_confirm_ticks: 10,
            release_wait_ticks: 50,
            max_seat_retries: 3,
            max_release_retries: 20,
        }
    }
}

impl Default for GripVerifier {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl Default for ReleaseVerifier {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl GripVerifier {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            state: GripState::Idle,
            ticks: 0,
            confirm_ticks: 0,
            retries: 0,
        }
    }

    /// Begin verifying a fresh grip. Returns the action to perform first.
    pub fn start(&mut self) -> SequenceAction {
        self.state = GripState::Priming;
        self.ticks = 0;
        self.confirm_ticks = 0;
        self.retries = 0;

        SequenceAction::SetPump(self.params.grip_pump_power)
    }

    /// Advance one tick with the latest pump sensor reading.
    pub fn step(&mut self, pump_sensor: f64) -> Result<SequenceAction, SequenceError> {
        match self.state {
            GripState::Idle => Ok(SequenceAction::None),

            GripState::Priming => {
                self.ticks += 1;

                if self.ticks >= self.params.prime_ticks {
                    self.state = GripState::Checking;
                    self.ticks = 0;
                    self.confirm_ticks = 0;
                }

                Ok(SequenceAction::None)
            }

            GripState::Checking => {
                self.ticks += 1;

                if pump_sensor < self.params.held_pressure_threshold {
                    self.confirm_ticks += 1;

                    if self.confirm_ticks >= self.params.hold_confirm_ticks {
                        info!("Grip confirmed, pump pressure {:.0}", pump_sensor);
                        self.state = GripState::Idle;
                        return Ok(SequenceAction::Done);
                    }

                    return Ok(SequenceAction::None);
                }

                self.confirm_ticks = 0;

                // Pressure never drew down in the allotted time, re-seat
                if self.ticks >= self.params.prime_ticks {
                    self.retries += 1;

                    if self.retries > self.params.max_seat_retries {
                        self.state = GripState::Idle;
                        return Err(SequenceError::GripFailed(self.retries - 1));
                    }

                    warn!(
                        "Grip not held (pump pressure {:.0}), re-seating, attempt {}",
                        pump_sensor, self.retries
                    );

                    self.state = GripState::Priming;
                    self.ticks = 0;
                    return Ok(SequenceAction::Reseat);
                }

                Ok(SequenceAction::None)
            }
        }
    }
}

impl ReleaseVerifier {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            active: false,
            ticks: 0,
            retries: 0,
        }
    }

    /// Begin verifying a release. Returns the action to perform first.
    pub fn start(&mut self) -> SequenceAction {
        self.active = true;
        self.ticks = 0;
        self.retries = 0;

        SequenceAction::SetPump(0)
    }

    /// Advance one tick with the latest pump sensor reading.
    pub fn step(&mut self, pump_sensor: f64) -> Result<SequenceAction, SequenceError> {
        if !self.active {
            return Ok(SequenceAction::None);
        }

        self.ticks += 1;

        if pump_sensor > self.params.released_pressure_threshold {
            info!("Release confirmed, pump pressure {:.0}", pump_sensor);
            self.active = false;
            return Ok(SequenceAction::Done);
        }

        // Each retry waits one base period longer than the last, giving the
        // vacuum progressively more time to decay
        if self.ticks >= self.params.release_wait_ticks * (self.retries + 1) {
            self.retries += 1;

            if self.retries > self.params.max_release_retries {
                self.active = false;
                return Err(SequenceError::ReleaseFailed(self.retries - 1));
            }

            warn!(
                "Vacuum still holding (pump pressure {:.0}), retrying release, attempt {}",
                pump_sensor, self.retries
            );

            self.ticks = 0;
            return Ok(SequenceAction::SetPump(0));
        }

        Ok(SequenceAction::None)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn short_params() -> Params {
        Params {
            prime_ticks: 3,
            hold_confirm_ticks: 2,
            release_wait_ticks: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_grip_held_first_try() {
        let mut v = GripVerifier::new(short_params());

        assert_eq!(v.start(), SequenceAction::SetPump(100));

        // Priming ticks
        for _ in 0..3 {
            assert_eq!(v.step(500.0).unwrap(), SequenceAction::None);
        }

        // Pressure drawn down, two confirms then done
        assert_eq!(v.step(100.0).unwrap(), SequenceAction::None);
        assert_eq!(v.step(100.0).unwrap(), SequenceAction::Done);
    }

    #[test]
    fn test_grip_reseats_then_holds() {
        let mut v = GripVerifier::new(short_params());
        v.start();

        // Prime, then never draws down, so a re-seat is requested
        for _ in 0..3 {
            v.step(500.0).unwrap();
        }
        let mut reseat_seen = false;
        for _ in 0..3 {
            if v.step(500.0).unwrap() == SequenceAction::Reseat {
                reseat_seen = true;
                break;
            }
        }
        assert!(reseat_seen);

        // After the re-seat the vacuum holds
        for _ in 0..3 {
            v.step(500.0).unwrap();
        }
        assert_eq!(v.step(50.0).unwrap(), SequenceAction::None);
        assert_eq!(v.step(50.0).unwrap(), SequenceAction::Done);
    }

    #[test]
    fn test_grip_fails_after_max_retries() {
        let mut v = GripVerifier::new(short_params());
        v.start();

        let mut result = Ok(SequenceAction::None);
        for _ in 0..200 {
            result = v.step(500.0);
            if result.is_err() {
                break;
            }
        }

        assert!(matches!(result, Err(SequenceError::GripFailed(3))));
    }

    #[test]
    fn test_release_confirms() {
        let mut v = ReleaseVerifier::new(short_params());

        assert_eq!(v.start(), SequenceAction::SetPump(0));
        assert_eq!(v.step(100.0).unwrap(), SequenceAction::None);
        assert_eq!(v.step(450.0).unwrap(), SequenceAction::Done);
    }

    #[test]
    fn test_release_dwell_grows_each_retry() {
        let mut v = ReleaseVerifier::new(short_params());
        v.start();

        // Vacuum never decays, count the ticks between successive retries
        let mut dwells = Vec::new();
        let mut since_retry = 0;
        for _ in 0..60 {
            since_retry += 1;
            match v.step(50.0) {
                Ok(SequenceAction::SetPump(0)) => {
                    dwells.push(since_retry);
                    since_retry = 0;
                }
                Ok(_) => (),
                Err(_) => break,
            }
        }

        // Base wait of 3 ticks, then one base period longer per retry
        assert_eq!(&dwells[..3], &[3, 6, 9]);
    }

    #[test]
    fn test_release_fails_after_max_retries() {
        let mut v = ReleaseVerifier::new(Params {
            release_wait_ticks: 2,
            max_release_retries: 2,
            ..Default::default()
        });
        v.start();

        let mut result = Ok(SequenceAction::None);
        for _ in 0..50 {
            result = v.step(50.0);
            if result.is_err() {
                break;
            }
        }

        assert!(matches!(result, Err(SequenceError::ReleaseFailed(2))));
    }
}
