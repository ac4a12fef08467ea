//! # Telecommand server
//!
//! Listens for telecommands from the operator console on a REP socket. The
//! socket is polled without blocking once per cycle, and every received TC
//! must be answered before the next can arrive.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    tc::{Tc, TcParseError, TcResponse},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct TcServer {
    socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum TcServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not recieve a message from the client: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send a response to the client: {0}")]
    SendError(zmq::Error),

    #[error("Could not parse the recieved TC: {0}")]
    ParseError(TcParseError),

    #[error("Could not serialize the response: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TcServer {
    /// Create a new telecommand server bound to the configured endpoint.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, TcServerError> {
        let socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: 0,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::REP, socket_options, &params.tc_endpoint)
            .map_err(TcServerError::SocketError)?;

        Ok(Self { socket })
    }

    /// Get the next pending telecommand, if any.
    ///
    /// Non-blocking. A malformed TC is an error the caller should log, the
    /// response to the client is sent here so the REP cycle stays valid.
    pub fn recieve_tc(&mut self) -> Result<Option<Tc>, TcServerError> {
        let msg = match self.socket.recv_msg(zmq::DONTWAIT) {
            Ok(m) => m,
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(TcServerError::RecvError(e)),
        };

        match Tc::from_json(msg.as_str().unwrap_or("")) {
            Ok(tc) => Ok(Some(tc)),
            Err(e) => {
                self.send_response(&TcResponse::Error(format!("{}", e)))?;
                Err(TcServerError::ParseError(e))
            }
        }
    }

    /// Send the response to the last received telecommand.
    pub fn send_response(&mut self, response: &TcResponse) -> Result<(), TcServerError> {
        let raw =
            serde_json::to_string(response).map_err(TcServerError::SerializationError)?;

        self.socket
            .send(&raw, 0)
            .map_err(TcServerError::SendError)
    }
}
