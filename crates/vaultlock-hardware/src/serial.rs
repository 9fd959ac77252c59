//! Serial link to a physical fingerprint module.
//!
//! 8 data bits, no parity, one stop bit at the configured baud rate
//! (57 600 by default).
//!
//! `serialport` I/O is blocking, so every port access runs on tokio's
//! blocking pool and the runtime thread never stalls on the UART.

use crate::{HardwareError, Result, traits::SensorLink};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::{
    io::{self, Read, Write},
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::info;
use vaultlock_core::SensorConfig;

/// Per-call blocking limit of the port; reads are only issued when bytes
/// are already waiting.
const PORT_TIMEOUT: Duration = Duration::from_millis(5);

/// Byte access the link needs from a port.
pub trait PortIo: Read + Write + Send + 'static {
    /// Number of received bytes waiting to be read.
    fn bytes_waiting(&mut self) -> io::Result<u32>;
}

impl PortIo for Box<dyn SerialPort> {
    fn bytes_waiting(&mut self) -> io::Result<u32> {
        Ok(self.bytes_to_read()?)
    }
}

pub struct SerialSensorLink<P: PortIo = Box<dyn SerialPort>> {
    port: Arc<Mutex<P>>,
    name: String,
}

impl SerialSensorLink {
    /// Open the port named in the sensor configuration.
    ///
    /// # Errors
    /// Returns `HardwareError::Serial` if the port cannot be opened.
    pub fn open(config: &SensorConfig) -> Result<Self> {
        if config.port.is_empty() {
            return Err(HardwareError::configuration("sensor port path is empty"));
        }

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(PORT_TIMEOUT)
            .open()?;

        info!(port = %config.port, baud = config.baud_rate, "sensor serial link opened");
        Ok(Self::from_port(port, config.port.clone()))
    }
}

impl<P: PortIo> SerialSensorLink<P> {
    /// Wrap an already opened port.
    pub fn from_port(port: P, name: impl Into<String>) -> Self {
        Self {
            port: Arc::new(Mutex::new(port)),
            name: name.into(),
        }
    }

    /// Run `op` against the port on the blocking pool.
    async fn with_port<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut P) -> io::Result<T> + Send + 'static,
    {
        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || {
            let mut port = port
                .lock()
                .map_err(|_| HardwareError::communication("serial port lock poisoned"))?;
            op(&mut *port).map_err(HardwareError::from)
        })
        .await
        .map_err(|error| HardwareError::communication(format!("serial I/O task failed: {error}")))?
    }
}

impl<P: PortIo> std::fmt::Debug for SerialSensorLink<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSensorLink")
            .field("port", &self.name)
            .finish()
    }
}

impl<P: PortIo> SensorLink for SerialSensorLink<P> {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let frame = bytes.to_vec();
        self.with_port(move |port| {
            port.write_all(&frame)?;
            port.flush()
        })
        .await
    }

    async fn try_read_byte(&mut self) -> Result<Option<u8>> {
        self.with_port(|port| {
            if port.bytes_waiting()? == 0 {
                return Ok(None);
            }
            let mut byte = [0u8; 1];
            match port.read(&mut byte)? {
                0 => Ok(None),
                _ => Ok(Some(byte[0])),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::thread::{self, ThreadId};

    /// In-memory port that records which thread touched it.
    #[derive(Default)]
    struct MemoryPort {
        incoming: VecDeque<u8>,
        written: Vec<u8>,
        io_threads: Vec<ThreadId>,
    }

    impl Read for MemoryPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.io_threads.push(thread::current().id());
            match (self.incoming.pop_front(), buf.first_mut()) {
                (Some(byte), Some(slot)) => {
                    *slot = byte;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    impl Write for MemoryPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.io_threads.push(thread::current().id());
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl PortIo for MemoryPort {
        fn bytes_waiting(&mut self) -> io::Result<u32> {
            Ok(self.incoming.len() as u32)
        }
    }

    #[tokio::test]
    async fn test_port_io_runs_on_blocking_pool() {
        let runtime_thread = thread::current().id();
        let port = MemoryPort {
            incoming: VecDeque::from([0xEF]),
            ..Default::default()
        };
        let mut link = SerialSensorLink::from_port(port, "memory");

        link.write_all(&[0xEF, 0x01]).await.unwrap();
        assert_eq!(link.try_read_byte().await.unwrap(), Some(0xEF));
        assert_eq!(link.try_read_byte().await.unwrap(), None);

        let port = link.port.lock().unwrap();
        assert_eq!(port.written, vec![0xEF, 0x01]);
        assert!(!port.io_threads.is_empty());
        assert!(port.io_threads.iter().all(|id| *id != runtime_thread));
    }

    #[test]
    fn test_open_rejects_empty_path() {
        let config = SensorConfig {
            port: String::new(),
            ..SensorConfig::default()
        };
        assert!(matches!(
            SerialSensorLink::open(&config),
            Err(HardwareError::ConfigurationError { .. })
        ));
    }
}
