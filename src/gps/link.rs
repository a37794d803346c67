// src/gps/link.rs
//! Byte-level seams between the pipeline and whatever drives the receiver

use std::collections::VecDeque;
use std::io;

/// Non-blocking supply of bytes the driver has already received
pub trait ByteSource {
    /// Copy up to `buf.len()` pending bytes into `buf`; 0 means nothing pending
    fn read_available(&mut self, buf: &mut [u8]) -> usize;
}

/// Outbound path to the receiver (configuration commands)
pub trait ByteSink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl ByteSource for VecDeque<u8> {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len());
        for (dst, src) in buf.iter_mut().zip(self.drain(..n)) {
            *dst = src;
        }
        n
    }
}

impl ByteSink for Vec<u8> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}
