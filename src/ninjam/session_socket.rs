//! TCP transport for the session
//!
//! Thin wrapper that owns the stream and the deframer.  Reads are on a short
//! timeout so the controller loop can interleave receive, upload drain and
//! keepalive without extra threads.  We build the socket through socket2 so
//! the IP TOS bits mark the stream low delay.
use log::{debug, info};
use simple_error::bail;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::common::box_error::BoxError;

use super::client_message::ClientMessage;
use super::server_message::{FrameReader, ServerMessage};

const TOS_LOW_DELAY: u32 = 0x10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct SessionSocket {
    stream: TcpStream,
    reader: FrameReader,
}

impl SessionSocket {
    pub fn connect(host: &str, port: u16) -> Result<SessionSocket, BoxError> {
        let addr = match (host, port).to_socket_addrs()?.next() {
            Some(a) => a,
            None => bail!("could not resolve {}", host),
        };
        let sock = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        sock.set_tos(TOS_LOW_DELAY)?;
        sock.connect_timeout(&addr.into(), CONNECT_TIMEOUT)?;
        let stream: TcpStream = sock.into();
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        info!("connected to {}:{}", host, port);
        Ok(SessionSocket {
            stream,
            reader: FrameReader::new(),
        })
    }

    pub fn send(&mut self, msg: &ClientMessage) -> Result<(), BoxError> {
        let mut wire = vec![];
        msg.serialize_to(&mut wire)?;
        debug!("send {}", msg);
        self.stream.write_all(&wire)?;
        Ok(())
    }

    /// next parsed message, or None when nothing arrived within the read
    /// timeout.  A zero byte read means the server hung up on us.
    pub fn recv(&mut self) -> Result<Option<ServerMessage>, BoxError> {
        let mut chunk = [0u8; 4096];
        loop {
            // drain anything already buffered first
            while let Some((msg_type, payload)) = self.reader.next_frame()? {
                if let Some(msg) = ServerMessage::parse(msg_type, &payload)? {
                    return Ok(Some(msg));
                }
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => bail!("server closed the connection"),
                Ok(n) => self.reader.feed(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
