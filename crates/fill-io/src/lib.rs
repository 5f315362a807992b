pub mod hal_modbus;
pub mod metrics;
pub mod scale_tcp;

pub use hal_modbus::{ModbusError, ModbusIo};
pub use metrics::{init_metrics, serve_metrics};
pub use scale_tcp::{ScaleError, TcpScaleChannel};
