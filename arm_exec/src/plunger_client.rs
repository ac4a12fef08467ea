//! # Plunger client
//!
//! Connects to the plunger controller, which publishes force and pump
//! pressure samples and accepts single-key JSON demands.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;

use comms_if::{
    eqpt::plunger::{PlungerDems, PlungerSample},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PlungerClient {
    samp_socket: MonitoredSocket,

    dems_socket: MonitoredSocket,

    /// Most recent sample seen, kept so controllers can poll between
    /// publishes
    latest_sample: Option<PlungerSample>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum PlungerClientError {
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
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PlungerClient {
    /// Create a new instance of the plunger client.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, PlungerClientError> {
        let samp_socket_options = SocketOptions {
            subscribe_topic: Some(String::new()),
            recv_timeout: 0,
            block_on_first_connect: false,
            ..Default::default()
        };
        let dems_socket_options = SocketOptions {
            connect_timeout: 1000,
            linger: 1,
            recv_timeout: 100,
            send_timeout: 10,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let samp_socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            samp_socket_options,
            &params.plunger_samp_endpoint,
        )
        .map_err(PlungerClientError::SocketError)?;
        let dems_socket = MonitoredSocket::new(
            ctx,
            zmq::REQ,
            dems_socket_options,
            &params.plunger_dems_endpoint,
        )
        .map_err(PlungerClientError::SocketError)?;

        Ok(Self {
            samp_socket,
            dems_socket,
            latest_sample: None,
        })
    }

    /// Drain all pending samples from the socket, returning them in arrival
    /// order.
    ///
    /// Non-blocking. The safety supervisor must see every sample, not just
    /// the latest, so threshold crossings between polls are not missed.
    pub fn drain_samples(&mut self) -> Vec<PlungerSample> {
        let mut samples = Vec::new();

        loop {
            match self.samp_socket.recv_msg(zmq::DONTWAIT) {
                Ok(msg) => match serde_json::from_str(msg.as_str().unwrap_or("")) {
                    Ok(sample) => {
                        self.latest_sample = Some(sample);
                        samples.push(sample);
                    }
                    Err(e) => warn!("Malformed plunger sample dropped: {}", e),
                },
                Err(zmq::Error::EAGAIN) => break,
                Err(e) => {
                    warn!("Plunger sample recv error: {}", e);
                    break;
                }
            }
        }

        samples
    }

    /// The most recent sample seen by any previous drain.
    pub fn latest_sample(&self) -> Option<PlungerSample> {
        self.latest_sample
    }

    /// Send a demand to the plunger controller.
    ///
    /// The controller acknowledges every demand with a short reply which is
    /// read and discarded here.
    pub fn send_demands(&mut self, dems: &PlungerDems) -> Result<(), PlungerClientError> {
        if !self.dems_socket.connected() {
            return Err(PlungerClientError::NotConnected);
        }

        let dems_str =
            serde_json::to_string(dems).map_err(PlungerClientError::SerializationError)?;

        self.dems_socket
            .send(&dems_str, 0)
            .map_err(PlungerClientError::SendError)?;

        self.dems_socket
            .recv_msg(0)
            .map_err(PlungerClientError::RecvError)?;

        Ok(())
    }
}
