//! Request/response transport to the array server.


use std::io;
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};

use tracing::{debug, info, warn};

use crate::error::{JbodError, Result};
use crate::geometry::{BLOCK_SIZE, Block};
use crate::proto::{Opcode, read_frame, write_frame};

/// Payload names the role of the block buffer for one call.
pub enum Payload<'a> {
    /// The opcode carries no block.
    None,
    /// The block is sent with the request.
    Send(&'a Block),
    /// A block returned by the server is copied here.
    Recv(&'a mut Block),
}

/// Transport executes one opcode against the array and returns the server status.
pub trait Transport {
    /// call sends one request and blocks until its response arrives.
    ///
    /// # Errors
    /// Returns an error if the request or response cannot be transferred.
    fn call(&mut self, opcode: Opcode, payload: Payload<'_>) -> Result<u16>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn call(&mut self, opcode: Opcode, payload: Payload<'_>) -> Result<u16> {
        (**self).call(opcode, payload)
    }
}

/// TcpTransport speaks the frame protocol over a single TCP connection.
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self { stream: None }
    }

    /// `connect` opens the connection to `ip:port`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `ip` is not an IP literal, `StateViolation` if a
    /// connection is already open, and `Io` if the connection cannot be established.
    pub fn connect(&mut self, ip: &str, port: u16) -> Result<()> {
        if self.stream.is_some() {
            return Err(JbodError::StateViolation("transport is already connected"));
        }
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| JbodError::InvalidArgument("server address is not an IP literal"))?;
        let addr = SocketAddr::new(ip, port);
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        info!(%addr, "connected to array server");
        self.stream = Some(stream);
        Ok(())
    }

    /// `disconnect` closes the connection if one is open.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!("disconnected from array server");
        }
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn exchange(stream: &mut TcpStream, opcode: Opcode, payload: Payload<'_>) -> io::Result<u16> {
        let raw = opcode.encode();
        let (outgoing, incoming) = match payload {
            Payload::None => (None, None),
            Payload::Send(block) => (Some(block), None),
            Payload::Recv(block) => (None, Some(block)),
        };
        write_frame(stream, raw, 0, outgoing)?;

        let mut scratch = [0u8; BLOCK_SIZE];
        let header = match incoming {
            Some(block) => {
                let header = read_frame(stream, block)?;
                if header.status == 0 && !header.has_block() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "successful read response carried no block",
                    ));
                }
                header
            }
            None => {
                let header = read_frame(stream, &mut scratch)?;
                if header.has_block() {
                    warn!(?opcode, "response carried an unexpected block; discarded");
                }
                header
            }
        };
        if header.opcode != raw {
            debug!(
                sent = raw,
                echoed = header.opcode,
                "response opcode differs from request"
            );
        }
        Ok(header.status)
    }
}

impl Transport for TcpTransport {
    fn call(&mut self, opcode: Opcode, payload: Payload<'_>) -> Result<u16> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(JbodError::StateViolation("transport is not connected"));
        };
        match Self::exchange(stream, opcode, payload) {
            Ok(status) => {
                debug!(?opcode, status, "call complete");
                Ok(status)
            }
            Err(err) => {
                warn!(?opcode, error = %err, "call failed; dropping connection");
                self.disconnect();
                Err(err.into())
            }
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
