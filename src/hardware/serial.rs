//! Serial Port Abstractions
//!
//! Shared types and helpers for async serial communication with the controller.
//!
//! # Types
//!
//! - [`SerialPortIO`]: Trait alias combining AsyncRead + AsyncWrite for serial ports
//! - [`DynSerial`]: Type-erased boxed serial port
//!
//! # Utilities
//!
//! - [`open_serial_async`]: Open a serial port with spawn_blocking
//! - [`drain_serial_buffer`]: Drain stale data from a serial port
//!
//! # Example
//!
//! ```rust,ignore
//! use rot2prog_tracker::hardware::serial::{open_serial_async, DynSerial};
//!
//! let port: DynSerial = Box::new(open_serial_async("/dev/ttyUSB0", 9600).await?);
//! ```

use crate::error::{RotorError, RotorResult};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a serial port. This includes:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::io::DuplexStream` (testing)
/// - [`MockSerialPort`](crate::hardware::mock_serial::MockSerialPort)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Open a serial port asynchronously using spawn_blocking.
///
/// Applies the controller's line settings: 8 data bits, no parity, one stop
/// bit, no flow control. Response deadlines are enforced by the caller, not
/// by the port.
///
/// # Errors
///
/// Returns `Connect` if the port cannot be opened or spawn_blocking fails.
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
) -> RotorResult<tokio_serial::SerialStream> {
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| RotorError::Connect(format!("{port_path_owned}: {e}")))
    })
    .await
    .map_err(|e| RotorError::Connect(format!("spawn_blocking for serial port opening failed: {e}")))?
}

/// Drain stale data from a serial port buffer.
///
/// Reads and discards until the line has been quiet for `quiet`, `deadline`
/// has passed, or an error occurs. Used to resynchronise framing after a
/// malformed or abandoned response. A line that never goes quiet is given up
/// on at the deadline.
///
/// # Returns
///
/// Total number of bytes discarded.
pub async fn drain_serial_buffer<R: AsyncRead + Unpin>(
    port: &mut R,
    quiet: Duration,
    deadline: Duration,
) -> usize {
    let mut discard = [0u8; 64];
    let deadline = tokio::time::Instant::now() + deadline;
    let mut total_discarded = 0usize;

    loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            tracing::warn!(total_discarded, "Serial line still busy at drain deadline");
            break;
        }

        let wait = quiet.min(deadline.saturating_duration_since(now));
        match tokio::time::timeout(wait, port.read(&mut discard)).await {
            Ok(Ok(0)) => break, // EOF
            Ok(Ok(n)) => {
                total_discarded += n;
            }
            Ok(Err(_)) => break, // I/O error, abort drain
            Err(_) if wait < quiet => continue, // Deadline reached
            Err(_) => break, // Line quiet
        }
    }

    total_discarded
}
