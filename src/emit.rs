use crate::config::OscConfig;
use crate::error::{EmitError, Result};
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use tracing::{debug, trace};

/// Marker mode output address
pub const ADDR_STICKER_ANGLE: &str = "/sax/angle";
/// Expression mode smile intensity address
pub const ADDR_SMILE: &str = "/face/smile";
/// Expression mode binary smile flag address
pub const ADDR_EXPRESSION: &str = "/face/expression";

/// Fire-and-forget OSC sender.
///
/// Telemetry is best-effort real-time: a dropped message is preferable to a
/// stalled frame loop, so the socket is non-blocking and every send failure
/// is swallowed after a trace log. No acknowledgment, no retry.
pub struct OscEmitter {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscEmitter {
    pub fn new(config: &OscConfig) -> Result<Self> {
        let endpoint = format!("{}:{}", config.host, config.port);
        let target = endpoint
            .to_socket_addrs()
            .map_err(|e| EmitError::Endpoint {
                endpoint: endpoint.clone(),
                details: e.to_string(),
            })?
            .next()
            .ok_or_else(|| EmitError::Endpoint {
                endpoint: endpoint.clone(),
                details: "No address resolved".to_string(),
            })?;

        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| EmitError::Socket {
            details: e.to_string(),
        })?;
        socket.set_nonblocking(true).map_err(|e| EmitError::Socket {
            details: e.to_string(),
        })?;

        debug!("OSC emitter targeting {}", target);
        Ok(Self { socket, target })
    }

    /// Send one float to the given OSC address. Never blocks, never fails.
    pub fn send(&self, address: &str, value: f32) {
        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args: vec![OscType::Float(value)],
        });

        let buf = match encoder::encode(&packet) {
            Ok(buf) => buf,
            Err(e) => {
                trace!("OSC encode failed for {}: {}", address, e);
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&buf, self.target) {
            trace!("OSC send to {} failed: {}", self.target, e);
        }
    }
}
