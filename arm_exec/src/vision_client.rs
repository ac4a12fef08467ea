//! # Vision client
//!
//! Receives tag detections streamed by the vision process over UDP. The
//! socket is non-blocking and fully drained on every poll so controllers
//! always see the freshest frame rather than a queued backlog.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::net::UdpSocket;

use chrono::{DateTime, Duration, Utc};
use log::warn;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use comms_if::{eqpt::vision::TagMessage, net::NetParams};

use crate::spatial::Pose;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest datagram the vision process will send.
const MAX_DATAGRAM_SIZE: usize = 8192;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A timestamped tag observation in the camera frame.
#[derive(Debug, Clone, Copy)]
pub struct TagObservation {
    pub tag_id: u32,

    /// Pose of the tag in the camera frame
    pub pose: Pose,

    /// Yaw of the tag about the camera boresight in radians, as reported by
    /// the vision process
    pub yaw_rad: f64,

    /// Local receive time of the detection
    pub observed_at: DateTime<Utc>,
}

/// Receiver for the vision feed.
pub struct VisionClient {
    socket: UdpSocket,

    /// Latest observation per tag
    latest: HashMap<u32, TagObservation>,

    /// Receive time of the last observation returned per tag, used for the
    /// strictly-newer-than-last-returned semantics of [`Self::latest`]
    last_returned: HashMap<u32, DateTime<Utc>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum VisionClientError {
    #[error("Could not bind the vision UDP socket: {0}")]
    BindError(std::io::Error),

    #[error("Could not configure the vision UDP socket: {0}")]
    ConfigError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VisionClient {
    /// Create a new vision client bound to the configured UDP address.
    pub fn new(params: &NetParams) -> Result<Self, VisionClientError> {
        let socket =
            UdpSocket::bind(&params.vision_udp_addr).map_err(VisionClientError::BindError)?;
        socket
            .set_nonblocking(true)
            .map_err(VisionClientError::ConfigError)?;

        Ok(Self {
            socket,
            latest: HashMap::new(),
            last_returned: HashMap::new(),
        })
    }

    /// Drain all pending datagrams, keeping only the newest observation of
    /// each tag. Non-blocking, call once per control cycle.
    pub fn poll(&mut self) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let len = match self.socket.recv(&mut buf) {
                Ok(len) => len,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Vision socket recv error: {}", e);
                    break;
                }
            };

            let raw = match std::str::from_utf8(&buf[..len]) {
                Ok(s) => s,
                Err(_) => {
                    warn!("Non-UTF8 vision datagram dropped");
                    continue;
                }
            };

            match TagMessage::from_json(raw) {
                Ok(msg) => self.ingest(msg),
                Err(e) => warn!("Malformed vision datagram dropped: {}", e),
            }
        }
    }

    /// Get the latest observation of the given tag.
    ///
    /// Returns `None` if no observation newer than the last one returned has
    /// arrived, or if the newest one is older than the staleness window.
    /// Each observation is therefore handed out at most once.
    pub fn latest(&mut self, tag_id: u32, staleness: Duration) -> Option<TagObservation> {
        let obs = *self.latest.get(&tag_id)?;

        if let Some(last) = self.last_returned.get(&tag_id) {
            if obs.observed_at <= *last {
                return None;
            }
        }

        if Utc::now().signed_duration_since(obs.observed_at) > staleness {
            return None;
        }

        self.last_returned.insert(tag_id, obs.observed_at);
        Some(obs)
    }

    fn ingest(&mut self, msg: TagMessage) {
        let now = Utc::now();

        for (tag_id, det) in msg.detections {
            let q = Quaternion::new(
                det.quaternion.w,
                det.quaternion.x,
                det.quaternion.y,
                det.quaternion.z,
            );

            self.latest.insert(
                tag_id,
                TagObservation {
                    tag_id,
                    pose: Pose::new(
                        Vector3::new(det.x, det.y, det.z),
                        UnitQuaternion::from_quaternion(q),
                    ),
                    yaw_rad: det.yaw,
                    observed_at: now,
                },
            );
        }
    }
}
