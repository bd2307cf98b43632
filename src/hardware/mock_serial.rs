//! Mock serial port for exercising the controller without hardware
//!
//! `MockSerialPort` implements `AsyncRead` and `AsyncWrite` and is handed to the
//! code under test; the paired `MockDeviceHarness` stays with the test and plays
//! the controller's part: it sees every byte written and decides what comes back.
//!
//! # Architecture
//!
//! A pair of unbounded channels simulates the two directions of the line:
//! - `MockSerialPort` (given to application): implements AsyncRead/AsyncWrite
//! - `MockDeviceHarness` (kept in test): scripts device behavior
//!
//! # Example
//!
//! ```rust,ignore
//! use rot2prog_tracker::hardware::mock_serial;
//!
//! let (port, mut harness) = mock_serial::new();
//! let controller = RotorController::new(Box::new(port), Default::default(), Default::default());
//!
//! let task = tokio::spawn(async move { controller.status().await });
//! harness.expect_and_respond(&STATUS, &response_bytes(10.0, 20.0, res)).await;
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// The client-facing side of the mock serial port
#[derive(Debug)]
pub struct MockSerialPort {
    /// Channel to send written data to the harness
    writes_tx: UnboundedSender<Vec<u8>>,
    /// Channel to receive data from the harness to be read
    reads_rx: UnboundedReceiver<Vec<u8>>,
    /// Data received from the harness but not yet read by the client
    read_buffer: VecDeque<u8>,
}

/// The test-facing side for controlling the mock serial port
#[derive(Debug)]
pub struct MockDeviceHarness {
    /// Channel to receive data written by the client
    writes_rx: UnboundedReceiver<Vec<u8>>,
    /// Channel to send data to the client for it to read
    reads_tx: UnboundedSender<Vec<u8>>,
    /// Data received from the client but not yet consumed by the test
    write_buffer: Vec<u8>,
}

/// Creates a new connected pair of `MockSerialPort` and `MockDeviceHarness`
pub fn new() -> (MockSerialPort, MockDeviceHarness) {
    let (client_to_harness_tx, client_to_harness_rx) = mpsc::unbounded_channel();
    let (harness_to_client_tx, harness_to_client_rx) = mpsc::unbounded_channel();

    let port = MockSerialPort {
        writes_tx: client_to_harness_tx,
        reads_rx: harness_to_client_rx,
        read_buffer: VecDeque::new(),
    };

    let harness = MockDeviceHarness {
        writes_rx: client_to_harness_rx,
        reads_tx: harness_to_client_tx,
        write_buffer: Vec::new(),
    };

    (port, harness)
}

// =============================================================================
// MockSerialPort Implementations
// =============================================================================

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.read_buffer.is_empty() {
            match self.reads_rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.read_buffer.extend(chunk),
                // Harness dropped: end-of-file
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }

        let to_read = std::cmp::min(buf.remaining(), self.read_buffer.len());
        let chunk: Vec<u8> = self.read_buffer.drain(..to_read).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.writes_tx.send(buf.to_vec()) {
            Ok(_) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device harness disconnected",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// =============================================================================
// MockDeviceHarness Implementations
// =============================================================================

impl MockDeviceHarness {
    /// Sends bytes to the client as if the controller had transmitted them.
    ///
    /// # Errors
    /// Returns error if the client port has been dropped
    pub fn send_response(&self, data: &[u8]) -> Result<(), &'static str> {
        self.reads_tx
            .send(data.to_vec())
            .map_err(|_| "Failed to send response: client port disconnected")
    }

    /// Waits until the client has written exactly `len` more bytes and returns them.
    ///
    /// # Panics
    /// Panics if the bytes do not arrive within 2 seconds.
    pub async fn next_write(&mut self, len: usize) -> Vec<u8> {
        use tokio::time::{timeout, Duration};

        while self.write_buffer.len() < len {
            match timeout(Duration::from_secs(2), self.writes_rx.recv()).await {
                Ok(Some(chunk)) => self.write_buffer.extend_from_slice(&chunk),
                Ok(None) => panic!("Client-side port closed while expecting a write."),
                Err(_) => panic!(
                    "Timeout waiting for write. Expected {} bytes, have {:02x?}",
                    len, self.write_buffer
                ),
            }
        }

        self.write_buffer.drain(..len).collect()
    }

    /// Waits for the client to write specific bytes and asserts they match.
    ///
    /// # Panics
    /// Panics on timeout or mismatch.
    pub async fn expect_write(&mut self, expected: &[u8]) {
        let actual = self.next_write(expected.len()).await;
        assert_eq!(
            actual, expected,
            "Mismatch in expected write. Expected {:02x?}, got {:02x?}",
            expected, actual
        );
    }

    /// Expects a write and sends a response in one operation
    pub async fn expect_and_respond(&mut self, expected: &[u8], response: &[u8]) {
        self.expect_write(expected).await;
        if let Err(e) = self.send_response(response) {
            panic!("{e}");
        }
    }

    /// Returns everything written so far without waiting.
    pub fn pending_writes(&mut self) -> Vec<u8> {
        loop {
            match self.writes_rx.try_recv() {
                Ok(chunk) => self.write_buffer.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        std::mem::take(&mut self.write_buffer)
    }
}
