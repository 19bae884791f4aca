use std::io;
use std::net::{TcpListener, TcpStream};

use tracing::{info, warn};

use super::{ReferenceArray, Status};
use crate::geometry::BLOCK_SIZE;
use crate::proto::{Command, Opcode, read_frame, write_frame};

/// `serve` accepts connections one at a time and answers their requests until each
/// peer disconnects. Returns only if accepting fails.
///
/// # Errors
/// Returns the error from `accept`.
pub fn serve(listener: &TcpListener, array: &mut ReferenceArray) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept()?;
        info!(%peer, "client connected");
        match handle_connection(stream, array) {
            Ok(requests) => info!(%peer, requests, "client disconnected"),
            Err(err) => warn!(%peer, error = %err, "connection aborted"),
        }
    }
}

/// `handle_connection` answers frames on `stream` until the peer closes it.
///
/// # Returns
/// The number of requests served.
///
/// # Errors
/// Returns any I/O error other than the peer closing the connection.
pub fn handle_connection(mut stream: TcpStream, array: &mut ReferenceArray) -> io::Result<u64> {
    stream.set_nodelay(true)?;
    let mut served = 0u64;
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        let header = match read_frame(&mut stream, &mut block) {
            Ok(header) => header,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(served),
            Err(err) => return Err(err),
        };
        let command = Opcode::decode(header.opcode).map(|op| op.command).ok();

        let status = if command == Some(Command::WriteBlock) && !header.has_block() {
            Status::BadCommand
        } else {
            array.execute(header.opcode, &mut block)
        };

        let reply = (status == Status::Ok && command == Some(Command::ReadBlock)).then_some(&block);
        write_frame(&mut stream, header.opcode, status as u16, reply)?;
        served += 1;
    }
}
