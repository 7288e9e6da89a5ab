//! Serial transport
//!
//! Byte-level access to an open serial link. The session only ever talks to
//! the [`Transport`] trait, so tests and alternative links can inject their
//! own implementation; [`SerialTransport`] is the `serialport`-backed default.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::DEFAULT_BAUD_RATE;

/// How often the serial read loop re-checks for buffered bytes
const READ_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Byte stream over an open serial connection
pub trait Transport: Send {
    /// Write all bytes to the link
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`
    ///
    /// Returns the number of bytes read; 0 means nothing arrived within the
    /// timeout. Implementations must not block past `timeout`.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Discard any received bytes not yet consumed
    fn discard_input(&mut self) -> io::Result<()>;
}

/// Transport over a physical serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port and configure it for relay communication (8N1, no
    /// flow control), clearing any stale buffered data
    pub fn open(port_name: &str, baud_rate: Option<u32>) -> Result<Self, serialport::Error> {
        let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

        // Short port timeout; read() does its own deadline accounting via
        // bytes_to_read polling
        let mut port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(100))
            .open()?;

        configure_port(port.as_mut())?;
        port.clear(serialport::ClearBuffer::All)?;

        Ok(Self { port })
    }

    /// Wrap an already-open port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;

        loop {
            let available = self
                .port
                .bytes_to_read()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))? as usize;

            if available > 0 {
                let to_read = available.min(buf.len());
                match self.port.read(&mut buf[..to_read]) {
                    Ok(n) => return Ok(n),
                    Err(ref e)
                        if e.kind() == io::ErrorKind::TimedOut
                            || e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
            }

            if Instant::now() >= deadline {
                return Ok(0);
            }
            std::thread::sleep(READ_POLL_INTERVAL);
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Configure a serial port for relay module communication
fn configure_port(port: &mut dyn SerialPort) -> Result<(), serialport::Error> {
    // Standard 8N1 configuration required by the relay hardware
    port.set_data_bits(serialport::DataBits::Eight)?;
    port.set_parity(serialport::Parity::None)?;
    port.set_stop_bits(serialport::StopBits::One)?;
    port.set_flow_control(serialport::FlowControl::None)?;
    Ok(())
}
