//! # Arm client
//!
//! Networking abstractions to connect to the arm actuator server, plus the
//! [`ArmInterface`] trait the rest of the software uses to drive the arm.
//! Controllers talk to the trait, not the client, so tests can substitute a
//! simulated arm.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::arm::{ArmDems, ArmMode, ArmResponse, ArmStatus, PoseWire},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

use crate::spatial::Pose;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Interface to the arm actuator.
///
/// All motion issued by the software passes through this trait. Implementors
/// must treat each call as synchronous: when a method returns `Ok` the demand
/// has been accepted by the actuator.
pub trait ArmInterface: Send {
    /// Move the TCP in a straight line through the given poses.
    fn move_linear(
        &mut self,
        waypoints: &[Pose],
        speed_ms: f64,
        accel_ms2: f64,
    ) -> Result<(), ArmClientError>;

    /// Start or update a Cartesian jog, `[vx, vy, vz, wx, wy, wz]` in
    /// meters/second and radians/second.
    fn jog(&mut self, velocity: [f64; 6]) -> Result<(), ArmClientError>;

    /// Refresh the last jog demand before it expires on the robot.
    fn jog_refresh(&mut self) -> Result<(), ArmClientError>;

    /// Stop jogging, zeroing all axes.
    fn jog_stop(&mut self) -> Result<(), ArmClientError>;

    fn set_mode(&mut self, mode: ArmMode) -> Result<(), ArmClientError>;

    fn pause(&mut self) -> Result<(), ArmClientError>;

    fn unpause(&mut self) -> Result<(), ArmClientError>;

    fn power(&mut self, on: bool) -> Result<(), ArmClientError>;

    fn get_tcp_pose(&mut self) -> Result<Pose, ArmClientError>;

    fn get_status(&mut self) -> Result<ArmStatus, ArmClientError>;

    fn reset_collision(&mut self) -> Result<(), ArmClientError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// ZMQ-backed client for the arm actuator server.
pub struct ArmClient {
    dems_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ArmClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("The client is not connected to the server")]
    NotConnected,

    #[error("Could not send demands to the server: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a message from the server: {0}")]
    RecvError(zmq::Error),

    #[error("Could not serialize the data: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the response from the server: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The server rejected the demands: {0}")]
    DemsRejected(String),

    #[error("The arm reported an equipment error: {0}")]
    EqptError(String),

    #[error("Unexpected response to {0}: {1:?}")]
    UnexpectedResponse(&'static str, ArmResponse),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmClient {
    /// Create a new instance of the arm client.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, ArmClientError> {
        // Create the socket options
        let dems_socket_options = SocketOptions {
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 100,
            send_timeout: 10,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        // Create the socket
        let dems_socket = MonitoredSocket::new(
            ctx,
            zmq::REQ,
            dems_socket_options,
            &params.arm_dems_endpoint,
        )
        .map_err(ArmClientError::SocketError)?;

        Ok(Self { dems_socket })
    }

    /// Send demands to the server and read back its response.
    fn transact(&mut self, dems: &ArmDems) -> Result<ArmResponse, ArmClientError> {
        // If not connected return now
        if !self.dems_socket.connected() {
            return Err(ArmClientError::NotConnected);
        }

        // Serialize the demands
        let dems_str =
            serde_json::to_string(dems).map_err(ArmClientError::SerializationError)?;

        // Send the demands to the server
        self.dems_socket
            .send(&dems_str, 0)
            .map_err(ArmClientError::SendError)?;

        // Recieve response back from the server
        let msg = self
            .dems_socket
            .recv_msg(0)
            .map_err(ArmClientError::RecvError)?;

        let response: ArmResponse = serde_json::from_str(msg.as_str().unwrap_or(""))
            .map_err(ArmClientError::DeserializeError)?;

        // Rejections and equipment faults are errors whatever the demand was
        match response {
            ArmResponse::DemsInvalid(reason) => Err(ArmClientError::DemsRejected(reason)),
            ArmResponse::EqptError(reason) => Err(ArmClientError::EqptError(reason)),
            r => Ok(r),
        }
    }

    /// Send a demand for which the only nominal response is `DemsOk`.
    fn transact_ok(&mut self, name: &'static str, dems: &ArmDems) -> Result<(), ArmClientError> {
        match self.transact(dems)? {
            ArmResponse::DemsOk => Ok(()),
            r => Err(ArmClientError::UnexpectedResponse(name, r)),
        }
    }
}

impl ArmInterface for ArmClient {
    fn move_linear(
        &mut self,
        waypoints: &[Pose],
        speed_ms: f64,
        accel_ms2: f64,
    ) -> Result<(), ArmClientError> {
        let wire: Vec<PoseWire> = waypoints.iter().map(|p| p.to_wire()).collect();

        match self.transact(&ArmDems::MoveLinear {
            waypoints: wire,
            speed_ms,
            accel_ms2,
        })? {
            ArmResponse::DemsOk | ArmResponse::JointAngles(_) => Ok(()),
            r => Err(ArmClientError::UnexpectedResponse("move_linear", r)),
        }
    }

    fn jog(&mut self, velocity: [f64; 6]) -> Result<(), ArmClientError> {
        self.transact_ok("jog", &ArmDems::JogStart { velocity })
    }

    fn jog_refresh(&mut self) -> Result<(), ArmClientError> {
        self.transact_ok("jog_refresh", &ArmDems::JogRefresh)
    }

    fn jog_stop(&mut self) -> Result<(), ArmClientError> {
        self.transact_ok("jog_stop", &ArmDems::JogStop)
    }

    fn set_mode(&mut self, mode: ArmMode) -> Result<(), ArmClientError> {
        self.transact_ok("set_mode", &ArmDems::SetMode(mode))
    }

    fn pause(&mut self) -> Result<(), ArmClientError> {
        self.transact_ok("pause", &ArmDems::Pause)
    }

    fn unpause(&mut self) -> Result<(), ArmClientError> {
        self.transact_ok("unpause", &ArmDems::Unpause)
    }

    fn power(&mut self, on: bool) -> Result<(), ArmClientError> {
        self.transact_ok("power", &ArmDems::Power { on })
    }

    fn get_tcp_pose(&mut self) -> Result<Pose, ArmClientError> {
        match self.transact(&ArmDems::GetTcpPose)? {
            ArmResponse::TcpPose(wire) => Ok(Pose::from_wire(&wire)),
            r => Err(ArmClientError::UnexpectedResponse("get_tcp_pose", r)),
        }
    }

    fn get_status(&mut self) -> Result<ArmStatus, ArmClientError> {
        match self.transact(&ArmDems::GetStatus)? {
            ArmResponse::Status(status) => Ok(status),
            r => Err(ArmClientError::UnexpectedResponse("get_status", r)),
        }
    }

    fn reset_collision(&mut self) -> Result<(), ArmClientError> {
        self.transact_ok("reset_collision", &ArmDems::ResetCollision)
    }
}

// ------------------------------------------------------------------------------------------------
// TEST UTILITIES
// ------------------------------------------------------------------------------------------------

/// A recording arm used by controller tests in place of the real client.
#[cfg(test)]
pub mod test_util {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Everything the mock arm has been asked to do.
    #[derive(Debug, Default, Clone)]
    pub struct MockLog {
        pub jogs: Vec<[f64; 6]>,
        pub num_refreshes: u64,
        pub jog_stops: u64,
        pub power_calls: Vec<bool>,
        pub pauses: u64,
        pub unpauses: u64,
        pub moves: Vec<Vec<Pose>>,
        pub modes: Vec<ArmMode>,
        pub collision_resets: u64,
    }

    pub struct MockArm {
        log: Arc<Mutex<MockLog>>,
        pub tcp_pose: Pose,
    }

    impl MockArm {
        pub fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(MockLog::default())),
                tcp_pose: Pose::default(),
            }
        }

        /// Handle to the call log, shared with the mock after it is moved
        /// into a facade.
        pub fn log(&self) -> Arc<Mutex<MockLog>> {
            self.log.clone()
        }
    }

    impl ArmInterface for MockArm {
        fn move_linear(
            &mut self,
            waypoints: &[Pose],
            _speed_ms: f64,
            _accel_ms2: f64,
        ) -> Result<(), ArmClientError> {
            self.log.lock().unwrap().moves.push(waypoints.to_vec());
            Ok(())
        }

        fn jog(&mut self, velocity: [f64; 6]) -> Result<(), ArmClientError> {
            self.log.lock().unwrap().jogs.push(velocity);
            Ok(())
        }

        fn jog_refresh(&mut self) -> Result<(), ArmClientError> {
            self.log.lock().unwrap().num_refreshes += 1;
            Ok(())
        }

        fn jog_stop(&mut self) -> Result<(), ArmClientError> {
            let mut log = self.log.lock().unwrap();
            log.jog_stops += 1;
            log.jogs.push([0.0; 6]);
            Ok(())
        }

        fn set_mode(&mut self, mode: ArmMode) -> Result<(), ArmClientError> {
            self.log.lock().unwrap().modes.push(mode);
            Ok(())
        }

        fn pause(&mut self) -> Result<(), ArmClientError> {
            self.log.lock().unwrap().pauses += 1;
            Ok(())
        }

        fn unpause(&mut self) -> Result<(), ArmClientError> {
            self.log.lock().unwrap().unpauses += 1;
            Ok(())
        }

        fn power(&mut self, on: bool) -> Result<(), ArmClientError> {
            self.log.lock().unwrap().power_calls.push(on);
            Ok(())
        }

        fn get_tcp_pose(&mut self) -> Result<Pose, ArmClientError> {
            Ok(self.tcp_pose)
        }

        fn get_status(&mut self) -> Result<ArmStatus, ArmClientError> {
            Ok(ArmStatus {
                mode: ArmMode::Automatic,
                paused: false,
                collided: false,
                powered: true,
            })
        }

        fn reset_collision(&mut self) -> Result<(), ArmClientError> {
            self.log.lock().unwrap().collision_resets += 1;
            Ok(())
        }
    }
}
