//! Scale attached through a serial-to-TCP server.

use fill_core::ScaleChannel;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const CHUNK: usize = 256;
// A zero read timeout is rejected by the OS.
const MIN_WAIT: Duration = Duration::from_micros(100);

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("failed to connect to scale at {addr}: {source}")]
    Connect { addr: String, source: io::Error },
}

pub struct TcpScaleChannel {
    stream: TcpStream,
    buf: [u8; CHUNK],
    start: usize,
    end: usize,
}

impl TcpScaleChannel {
    pub fn connect(addr: &str) -> Result<Self, ScaleError> {
        let stream = TcpStream::connect(addr).map_err(|source| ScaleError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        info!("Connected to scale at {}", addr);
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: [0; CHUNK],
            start: 0,
            end: 0,
        }
    }
}

impl ScaleChannel for TcpScaleChannel {
    fn read_byte(&mut self, wait: Duration) -> io::Result<Option<u8>> {
        if self.start < self.end {
            let byte = self.buf[self.start];
            self.start += 1;
            return Ok(Some(byte));
        }

        self.stream.set_read_timeout(Some(wait.max(MIN_WAIT)))?;
        match self.stream.read(&mut self.buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "scale connection closed",
            )),
            Ok(n) => {
                self.start = 1;
                self.end = n;
                Ok(Some(self.buf[0]))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }
}
