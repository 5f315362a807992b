//! Digital I/O over Modbus TCP remote I/O.
//!
//! Pins map one-to-one onto coil addresses (pumps, valves) and discrete
//! input addresses (flow switches). Each call blocks on a private runtime so
//! the control thread stays synchronous.

use fill_core::{Level, MachineIO};
use std::collections::HashMap;
use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ModbusError {
    #[error("invalid Modbus address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        source: AddrParseError,
    },
    #[error("failed to create Modbus runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error("failed to connect to Modbus TCP at {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },
    #[error("timed out connecting to Modbus TCP at {0}")]
    ConnectTimeout(SocketAddr),
}

pub struct ModbusIo {
    runtime: Runtime,
    ctx: Context,
    addr: SocketAddr,
    request_timeout: Duration,
    last_inputs: HashMap<u8, Level>,
}

impl ModbusIo {
    pub fn connect(addr: &str, request_timeout: Duration) -> Result<Self, ModbusError> {
        let socket_addr: SocketAddr = addr.parse().map_err(|source| ModbusError::InvalidAddress {
            addr: addr.to_string(),
            source,
        })?;

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ModbusError::Runtime)?;

        let ctx = runtime
            .block_on(timeout(request_timeout, tcp::connect(socket_addr)))
            .map_err(|_| ModbusError::ConnectTimeout(socket_addr))?
            .map_err(|source| ModbusError::Connect {
                addr: socket_addr,
                source,
            })?;
        info!("Connected to Modbus TCP at {}", socket_addr);

        Ok(Self {
            runtime,
            ctx,
            addr: socket_addr,
            request_timeout,
            last_inputs: HashMap::new(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl MachineIO for ModbusIo {
    fn write_output(&mut self, pin: u8, level: Level) {
        let request = self.ctx.write_single_coil(u16::from(pin), level.is_high());
        match self.runtime.block_on(timeout(self.request_timeout, request)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Modbus write of coil {} failed: {}", pin, e),
            Err(_) => warn!("Modbus write of coil {} timed out", pin),
        }
    }

    /// A failed read holds the last good level for the pin.
    fn read_input(&mut self, pin: u8) -> Level {
        let request = self.ctx.read_discrete_inputs(u16::from(pin), 1);
        let read = match self.runtime.block_on(timeout(self.request_timeout, request)) {
            Ok(Ok(bits)) => bits.first().copied(),
            Ok(Err(e)) => {
                warn!("Modbus read of input {} failed: {}", pin, e);
                None
            }
            Err(_) => {
                warn!("Modbus read of input {} timed out", pin);
                None
            }
        };

        match read {
            Some(bit) => {
                let level = Level::from_bool(bit);
                self.last_inputs.insert(pin, level);
                level
            }
            None => self.last_inputs.get(&pin).copied().unwrap_or_default(),
        }
    }
}
