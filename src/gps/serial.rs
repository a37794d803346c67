// src/gps/serial.rs
//! Serial receiver link.
//!
//! Reader and writer tasks own the port; the pipeline only sees the channel
//! buffers, so polling never blocks on the device.

use super::link::{ByteSink, ByteSource};
use crate::error::{Result, TimerError};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_serial::SerialPortBuilderExt;

const READ_BUF: usize = 512;

pub struct SerialLink {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: VecDeque<u8>,
    closed: bool,
}

impl SerialLink {
    /// Open `port` and start the reader/writer tasks. Must run inside a tokio runtime.
    pub fn open(port: &str, baudrate: u32) -> Result<Self> {
        log::info!("Connecting to GPS on {} at {} baud...", port, baudrate);

        let serial = tokio_serial::new(port, baudrate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()
            .map_err(|e| TimerError::Connection(format!("Failed to open serial port {}: {}", port, e)))?;
        let (mut reader, mut writer) = tokio::io::split(serial);

        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        tokio::spawn(async move {
            let mut buf = [0u8; READ_BUF];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break, // EOF
                    Ok(n) => {
                        if in_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Error reading from serial port: {}", e);
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if let Err(e) = writer.write_all(&bytes).await {
                    log::warn!("Error writing to serial port: {}", e);
                    break;
                }
            }
        });

        log::info!("Connected to {}", port);
        Ok(Self {
            inbound,
            outbound,
            pending: VecDeque::new(),
            closed: false,
        })
    }

    /// The reader task has stopped (port gone or EOF)
    pub fn is_closed(&self) -> bool {
        self.closed && self.pending.is_empty()
    }
}

impl ByteSource for SerialLink {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        while self.pending.len() < buf.len() {
            match self.inbound.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        self.pending.read_available(buf)
    }
}

impl ByteSink for SerialLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "serial writer stopped"))
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TimerError::Other(format!("Failed to list serial ports: {}", e)))?;
    Ok(ports
        .into_iter()
        .map(|p| format!("{} - {:?}", p.port_name, p.port_type))
        .collect())
}
