//! # Motion facade
//!
//! Thin layer between the controllers and the arm. It enforces the speed
//! caps, and owns the jog keep-alive thread the robot needs because it
//! treats jog demands as perishable.
//!
//! The facade holds the only handle to the arm, so a controller cannot
//! bypass the caps or leave a jog running by talking to the client directly.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;

use comms_if::eqpt::arm::{ArmMode, ArmStatus};

use crate::arm_client::{ArmClientError, ArmInterface};
use crate::spatial::Pose;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for the motion facade.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Cap on commanded translation speed in meters/second
    pub max_trans_speed_ms: f64,

    /// Cap on commanded rotation speed in radians/second
    pub max_rot_speed_rads: f64,

    /// Period of the jog keep-alive refresh in milliseconds
    pub jog_refresh_period_ms: u64,

    /// Default acceleration for linear moves in meters/second^2
    pub move_accel_ms2: f64,
}

/// The motion facade.
pub struct MotionFacade {
    arm: Arc<Mutex<Box<dyn ArmInterface>>>,

    params: Params,

    /// True while the keep-alive thread should be refreshing the jog
    jog_active: Arc<AtomicBool>,

    /// Signals the keep-alive thread to exit
    shutdown: Arc<AtomicBool>,

    keepalive_handle: Option<thread::JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            max_trans_speed_ms: 0.25,
            max_rot_speed_rads: 0.2617994,
            jog_refresh_period_ms: 10,
            move_accel_ms2: 0.1,
        }
    }
}

impl MotionFacade {
    /// Create the facade and start its keep-alive thread.
    pub fn new(arm: Box<dyn ArmInterface>, params: Params) -> Self {
        let arm = Arc::new(Mutex::new(arm));
        let jog_active = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let keepalive_handle = Some(spawn_keepalive(
            arm.clone(),
            jog_active.clone(),
            shutdown.clone(),
            params.jog_refresh_period_ms,
        ));

        Self {
            arm,
            params,
            jog_active,
            shutdown,
            keepalive_handle,
        }
    }

    /// Command a Cartesian jog, capping each axis to the configured limits.
    ///
    /// The keep-alive thread refreshes this demand until [`Self::stop_jog`]
    /// is called, so callers must always pair the two.
    pub fn jog(&self, mut velocity: [f64; 6]) -> Result<(), ArmClientError> {
        for v in velocity.iter_mut().take(3) {
            *v = v.clamp(-self.params.max_trans_speed_ms, self.params.max_trans_speed_ms);
        }
        for v in velocity.iter_mut().skip(3) {
            *v = v.clamp(-self.params.max_rot_speed_rads, self.params.max_rot_speed_rads);
        }

        self.arm.lock().unwrap().jog(velocity)?;
        self.jog_active.store(true, Ordering::Relaxed);

        Ok(())
    }

    /// Stop jogging, cancelling the keep-alive first so a refresh cannot
    /// race the stop.
    pub fn stop_jog(&self) -> Result<(), ArmClientError> {
        self.jog_active.store(false, Ordering::Relaxed);
        self.arm.lock().unwrap().jog_stop()
    }

    /// Move the TCP in a straight line through the given poses.
    pub fn move_linear(&self, waypoints: &[Pose], speed_ms: f64) -> Result<(), ArmClientError> {
        let speed = speed_ms.min(self.params.max_trans_speed_ms);

        self.arm
            .lock()
            .unwrap()
            .move_linear(waypoints, speed, self.params.move_accel_ms2)
    }

    pub fn set_mode(&self, mode: ArmMode) -> Result<(), ArmClientError> {
        self.arm.lock().unwrap().set_mode(mode)
    }

    pub fn pause(&self) -> Result<(), ArmClientError> {
        self.arm.lock().unwrap().pause()
    }

    pub fn unpause(&self) -> Result<(), ArmClientError> {
        self.arm.lock().unwrap().unpause()
    }

    pub fn power(&self, on: bool) -> Result<(), ArmClientError> {
        self.arm.lock().unwrap().power(on)
    }

    pub fn get_tcp_pose(&self) -> Result<Pose, ArmClientError> {
        self.arm.lock().unwrap().get_tcp_pose()
    }

    pub fn get_status(&self) -> Result<ArmStatus, ArmClientError> {
        self.arm.lock().unwrap().get_status()
    }

    pub fn reset_collision(&self) -> Result<(), ArmClientError> {
        self.arm.lock().unwrap().reset_collision()
    }

    /// Zero all motion and power the arm off. Used by the emergency stop and
    /// the hard force interlock.
    pub fn halt_and_power_off(&self) -> Result<(), ArmClientError> {
        self.jog_active.store(false, Ordering::Relaxed);

        let mut arm = self.arm.lock().unwrap();
        arm.jog_stop()?;
        arm.power(false)
    }

    pub fn max_trans_speed_ms(&self) -> f64 {
        self.params.max_trans_speed_ms
    }

    pub fn max_rot_speed_rads(&self) -> f64 {
        self.params.max_rot_speed_rads
    }
}

impl Drop for MotionFacade {
    fn drop(&mut self) {
        self.jog_active.store(false, Ordering::Relaxed);
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(jh) = self.keepalive_handle.take() {
            if jh.join().is_err() {
                warn!("Jog keep-alive thread panicked");
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn spawn_keepalive(
    arm: Arc<Mutex<Box<dyn ArmInterface>>>,
    jog_active: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    period_ms: u64,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        info!("Jog keep-alive thread started, period {} ms", period_ms);

        while !shutdown.load(Ordering::Relaxed) {
            if jog_active.load(Ordering::Relaxed) {
                if let Err(e) = arm.lock().unwrap().jog_refresh() {
                    warn!("Jog refresh failed: {}", e);
                }
            }

            thread::sleep(Duration::from_millis(period_ms));
        }

        info!("Jog keep-alive thread stopped");
    })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::arm_client::test_util::MockArm;

    #[test]
    fn test_jog_speeds_are_capped() {
        let mock = MockArm::new();
        let log = mock.log();
        let facade = MotionFacade::new(Box::new(mock), Params::default());

        facade.jog([1.0, -1.0, 0.1, 1.0, 0.0, 0.0]).unwrap();

        let jogs = log.lock().unwrap().jogs.clone();
        let v = jogs.last().unwrap();
        assert!((v[0] - 0.25).abs() < 1e-12);
        assert!((v[1] + 0.25).abs() < 1e-12);
        assert!((v[2] - 0.1).abs() < 1e-12);
        assert!((v[3] - 0.2617994).abs() < 1e-12);

        facade.stop_jog().unwrap();
    }

    #[test]
    fn test_keepalive_refreshes_until_stopped() {
        let mock = MockArm::new();
        let log = mock.log();
        let facade = MotionFacade::new(
            Box::new(mock),
            Params {
                jog_refresh_period_ms: 1,
                ..Default::default()
            },
        );

        facade.jog([0.0, 0.0, -0.001, 0.0, 0.0, 0.0]).unwrap();
        thread::sleep(Duration::from_millis(20));
        facade.stop_jog().unwrap();

        let refreshes_at_stop = log.lock().unwrap().num_refreshes;
        assert!(refreshes_at_stop > 0);

        // No further refreshes once stopped
        thread::sleep(Duration::from_millis(20));
        assert_eq!(log.lock().unwrap().num_refreshes, refreshes_at_stop);
    }

    #[test]
    fn test_halt_powers_off() {
        let mock = MockArm::new();
        let log = mock.log();
        let facade = MotionFacade::new(Box::new(mock), Params::default());

        facade.jog([0.0, 0.0, -0.001, 0.0, 0.0, 0.0]).unwrap();
        facade.halt_and_power_off().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.power_calls, vec![false]);
        assert!(log.jog_stops >= 1);
    }
}
