//! # Safety supervisor
//!
//! Watches every force sample coming from the plunger and owns the
//! interlocks which can stop the arm: the hard force threshold, the near
//! threshold warning band, collision latching, and the emergency stop.
//!
//! The supervisor never talks to the arm itself. It emits [`SafetyEvent`]s
//! which the executive turns into actuator calls, so the supervisor stays
//! testable without any networking.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{error, info, warn};
use serde::Deserialize;

use comms_if::eqpt::plunger::PlungerSample;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for the safety supervisor.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Default hard force threshold in load cell counts. Exceeding it powers
    /// the arm off.
    pub force_threshold: f64,

    /// Fraction of the threshold at which the warning band starts. A sample
    /// inside the band pauses motion without powering off.
    pub warn_ratio: f64,

    /// Elevated threshold used while a press operation is legitimately
    /// loading the plunger.
    pub press_force_threshold: f64,

    /// Number of cycles the force must stay below half the default threshold
    /// before an elevated press threshold is restored to the default.
    pub press_restore_dwell_ticks: u32,

    /// If true a latched collision clears itself after
    /// `collision_unblock_confirms` consecutive collision-free status
    /// reports. If false an explicit reset is required.
    pub collision_auto_unblock: bool,

    /// Consecutive clear reports needed for the auto-unblock policy.
    pub collision_unblock_confirms: u32,
}

/// The safety supervisor state.
pub struct SafetySupervisor {
    params: Params,

    /// Threshold currently in force, either the default or the press value
    active_threshold: f64,

    /// True while the press threshold is elevated
    press_elevated: bool,

    /// Cycles spent below half the default threshold while elevated
    below_half_ticks: u32,

    /// Latched on the first over-threshold sample, cleared only by reset
    tripped: bool,

    /// Force and threshold captured at the trip, for error reporting
    trip_info: Option<(f64, f64)>,

    /// True while the last sample was inside the warning band
    warning: bool,

    /// True while motion is paused by the warning band
    paused_by_warning: bool,

    emergency_stopped: bool,

    collided: bool,

    /// Consecutive collision-free reports, for the auto-unblock policy
    collision_clear_count: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Actions the executive must take on the arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyEvent {
    /// Power the arm off. Emitted exactly once per trip.
    PowerOff,

    /// Pause arm motion.
    Pause,

    /// Resume arm motion after the warning band cleared.
    Unpause,
}

#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error("Force {force:.0} exceeded the threshold {threshold:.0}, arm powered off")]
    ForceThresholdExceeded { force: f64, threshold: f64 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            force_threshold: 10000.0,
            warn_ratio: 0.9,
            press_force_threshold: 30000.0,
            press_restore_dwell_ticks: 100,
            collision_auto_unblock: false,
            collision_unblock_confirms: 10,
        }
    }
}

impl Default for SafetySupervisor {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl SafetySupervisor {
    pub fn new(params: Params) -> Self {
        let active_threshold = params.force_threshold;

        Self {
            params,
            active_threshold,
            press_elevated: false,
            below_half_ticks: 0,
            tripped: false,
            trip_info: None,
            warning: false,
            paused_by_warning: false,
            emergency_stopped: false,
            collided: false,
            collision_clear_count: 0,
        }
    }

    /// Replace the parameters, used at init once the file is loaded.
    pub fn set_params(&mut self, params: Params) {
        self.active_threshold = params.force_threshold;
        self.params = params;
    }

    /// Process the force samples received this cycle.
    ///
    /// Every sample is checked, not just the newest, so a threshold crossing
    /// between polls cannot be missed. Returns the events the executive must
    /// act on, in order.
    pub fn ingest_cycle(&mut self, samples: &[PlungerSample]) -> Vec<SafetyEvent> {
        let mut events = Vec::new();

        for sample in samples {
            self.ingest_sample(sample, &mut events);
        }

        // Press threshold restoration dwell, counted in cycles
        if self.press_elevated {
            let latest_below_half = samples
                .last()
                .map(|s| s.force < self.params.force_threshold * 0.5)
                .unwrap_or(false);

            if latest_below_half {
                self.below_half_ticks += 1;
                if self.below_half_ticks >= self.params.press_restore_dwell_ticks {
                    self.restore_threshold();
                }
            } else {
                self.below_half_ticks = 0;
            }
        }

        events
    }

    fn ingest_sample(&mut self, sample: &PlungerSample, events: &mut Vec<SafetyEvent>) {
        // Hard threshold, edge triggered so the power off goes out once
        if sample.force > self.active_threshold {
            if !self.tripped {
                error!(
                    "Force {:.0} exceeded the threshold {:.0}, powering off",
                    sample.force, self.active_threshold
                );
                self.tripped = true;
                self.trip_info = Some((sample.force, self.active_threshold));
                events.push(SafetyEvent::PowerOff);
            }
            return;
        }

        // Warning band, pause on entry and resume on exit
        let warn_level = self.active_threshold * self.params.warn_ratio;

        if sample.force > warn_level {
            if !self.warning {
                warn!(
                    "Force {:.0} is within {:.0}% of the threshold, pausing",
                    sample.force,
                    self.params.warn_ratio * 100.0
                );
                self.warning = true;

                if !self.paused_by_warning {
                    self.paused_by_warning = true;
                    events.push(SafetyEvent::Pause);
                }
            }
        } else if self.warning {
            self.warning = false;

            if self.paused_by_warning && !self.tripped && !self.emergency_stopped {
                self.paused_by_warning = false;
                events.push(SafetyEvent::Unpause);
            }
        }
    }

    /// Raise the active threshold to the press value.
    ///
    /// Called before an operation which legitimately loads the plunger, so a
    /// seating force doesn't trip the interlock. The default threshold is
    /// restored once the force has dwelt below half the default.
    pub fn elevate_press_threshold(&mut self) {
        if !self.press_elevated {
            info!(
                "Force threshold elevated to {:.0} for press",
                self.params.press_force_threshold
            );
            self.press_elevated = true;
            self.below_half_ticks = 0;
            self.active_threshold = self.params.press_force_threshold;
        }
    }

    fn restore_threshold(&mut self) {
        info!(
            "Force threshold restored to {:.0}",
            self.params.force_threshold
        );
        self.press_elevated = false;
        self.below_half_ticks = 0;
        self.active_threshold = self.params.force_threshold;
    }

    /// Update the latched collision flag from an arm status report.
    pub fn update_collision(&mut self, collided: bool) {
        if collided {
            if !self.collided {
                error!("Arm reported a collision, motion blocked");
            }
            self.collided = true;
            self.collision_clear_count = 0;
        } else if self.collided && self.params.collision_auto_unblock {
            self.collision_clear_count += 1;
            if self.collision_clear_count >= self.params.collision_unblock_confirms {
                info!(
                    "Collision flag cleared after {} clear reports",
                    self.collision_clear_count
                );
                self.collided = false;
                self.collision_clear_count = 0;
            }
        }
    }

    /// Engage the emergency stop. Safe to call from any state.
    pub fn emergency_stop(&mut self) {
        if !self.emergency_stopped {
            error!("Emergency stop engaged");
        }
        self.emergency_stopped = true;
    }

    /// Operator reset. Clears the trip, collision and emergency stop latches.
    pub fn reset(&mut self) {
        info!("Safety reset by operator");
        self.tripped = false;
        self.trip_info = None;
        self.warning = false;
        self.paused_by_warning = false;
        self.emergency_stopped = false;
        self.collided = false;
        self.collision_clear_count = 0;
        self.restore_threshold();
    }

    /// True when controllers are allowed to command motion.
    pub fn motion_allowed(&self) -> bool {
        !self.hard_blocked() && !self.paused_by_warning
    }

    /// True when a latched condition blocks motion until a reset.
    ///
    /// A warning-band pause is not a hard block, it clears itself once the
    /// force drops and an in-flight operation survives it.
    pub fn hard_blocked(&self) -> bool {
        self.tripped || self.emergency_stopped || self.collided
    }

    pub fn tripped(&self) -> bool {
        self.tripped
    }

    pub fn emergency_stopped(&self) -> bool {
        self.emergency_stopped
    }

    pub fn collided(&self) -> bool {
        self.collided
    }

    pub fn active_threshold(&self) -> f64 {
        self.active_threshold
    }

    /// The error behind a tripped interlock, `None` when no trip is latched.
    pub fn trip_error(&self) -> Option<SafetyError> {
        self.trip_info
            .map(|(force, threshold)| SafetyError::ForceThresholdExceeded { force, threshold })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn sample(force: f64) -> PlungerSample {
        PlungerSample {
            force,
            pump_sensor: 0.0,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_over_threshold_powers_off_once() {
        let mut sup = SafetySupervisor::new(Params::default());

        let events = sup.ingest_cycle(&[sample(11000.0), sample(12000.0)]);

        assert_eq!(events, vec![SafetyEvent::PowerOff]);
        assert!(sup.tripped());
        assert!(!sup.motion_allowed());

        // Further over-threshold samples must not emit again
        let events = sup.ingest_cycle(&[sample(15000.0)]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_warning_band_pauses_without_power_off() {
        let mut sup = SafetySupervisor::new(Params::default());

        let events = sup.ingest_cycle(&[sample(9500.0)]);
        assert_eq!(events, vec![SafetyEvent::Pause]);
        assert!(!sup.tripped());

        // Dropping back out of the band resumes
        let events = sup.ingest_cycle(&[sample(2000.0)]);
        assert_eq!(events, vec![SafetyEvent::Unpause]);
        assert!(sup.motion_allowed());
    }

    #[test]
    fn test_trip_latches_a_typed_error() {
        let mut sup = SafetySupervisor::new(Params::default());
        assert!(sup.trip_error().is_none());

        sup.ingest_cycle(&[sample(12000.0)]);

        match sup.trip_error() {
            Some(SafetyError::ForceThresholdExceeded { force, threshold }) => {
                assert_eq!(force, 12000.0);
                assert_eq!(threshold, 10000.0);
            }
            None => panic!("no trip error latched"),
        }

        sup.reset();
        assert!(sup.trip_error().is_none());
    }

    #[test]
    fn test_warning_pause_is_not_a_hard_block() {
        let mut sup = SafetySupervisor::new(Params::default());

        // Inside the warning band motion is paused but nothing is latched
        sup.ingest_cycle(&[sample(9500.0)]);
        assert!(!sup.motion_allowed());
        assert!(!sup.hard_blocked());

        // A trip is a latched block
        sup.ingest_cycle(&[sample(12000.0)]);
        assert!(sup.hard_blocked());
    }

    #[test]
    fn test_press_threshold_dwell_restore() {
        let params = Params {
            press_restore_dwell_ticks: 3,
            ..Default::default()
        };
        let mut sup = SafetySupervisor::new(params);

        sup.elevate_press_threshold();
        assert_eq!(sup.active_threshold(), 30000.0);

        // A seating force above the default threshold must not trip now
        let events = sup.ingest_cycle(&[sample(12000.0)]);
        assert!(events.is_empty());
        assert!(!sup.tripped());

        // Dwell below half the default threshold restores the default
        for _ in 0..2 {
            sup.ingest_cycle(&[sample(1000.0)]);
            assert_eq!(sup.active_threshold(), 30000.0);
        }
        sup.ingest_cycle(&[sample(1000.0)]);
        assert_eq!(sup.active_threshold(), 10000.0);
    }

    #[test]
    fn test_press_dwell_resets_on_high_force() {
        let params = Params {
            press_restore_dwell_ticks: 2,
            ..Default::default()
        };
        let mut sup = SafetySupervisor::new(params);

        sup.elevate_press_threshold();
        sup.ingest_cycle(&[sample(1000.0)]);
        sup.ingest_cycle(&[sample(8000.0)]);
        sup.ingest_cycle(&[sample(1000.0)]);
        assert_eq!(sup.active_threshold(), 30000.0);

        sup.ingest_cycle(&[sample(1000.0)]);
        assert_eq!(sup.active_threshold(), 10000.0);
    }

    #[test]
    fn test_collision_requires_explicit_reset_by_default() {
        let mut sup = SafetySupervisor::new(Params::default());

        sup.update_collision(true);
        assert!(!sup.motion_allowed());

        for _ in 0..100 {
            sup.update_collision(false);
        }
        assert!(sup.collided());

        sup.reset();
        assert!(sup.motion_allowed());
    }

    #[test]
    fn test_collision_auto_unblock_policy() {
        let params = Params {
            collision_auto_unblock: true,
            collision_unblock_confirms: 3,
            ..Default::default()
        };
        let mut sup = SafetySupervisor::new(params);

        sup.update_collision(true);
        sup.update_collision(false);
        sup.update_collision(false);
        assert!(sup.collided());

        sup.update_collision(false);
        assert!(!sup.collided());
    }

    #[test]
    fn test_emergency_stop_blocks_motion() {
        let mut sup = SafetySupervisor::new(Params::default());

        sup.emergency_stop();
        assert!(!sup.motion_allowed());

        // A warning clearing must not resume motion while stopped
        sup.ingest_cycle(&[sample(9500.0)]);
        let events = sup.ingest_cycle(&[sample(100.0)]);
        assert!(!events.contains(&SafetyEvent::Unpause));
    }
}
