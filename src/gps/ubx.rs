// src/gps/ubx.rs
//! u-blox CFG-RATE command used once at start-up to set the navigation rate

use super::link::ByteSink;
use std::io;

const SYNC: [u8; 2] = [0xB5, 0x62];
const CLASS_CFG: u8 = 0x06;
const ID_CFG_RATE: u8 = 0x08;

/// Fletcher-8 over class, id, length and payload
fn fletcher8(bytes: &[u8]) -> (u8, u8) {
    bytes.iter().fold((0u8, 0u8), |(a, b), &x| {
        let a = a.wrapping_add(x);
        (a, b.wrapping_add(a))
    })
}

/// Build a CFG-RATE frame for `rate_hz` (clamped to 1..=25 Hz), GPS time reference
pub fn cfg_rate(rate_hz: u8) -> Vec<u8> {
    let meas_ms = 1000u16 / u16::from(rate_hz.clamp(1, 25));
    let mut payload = Vec::with_capacity(6);
    payload.extend_from_slice(&meas_ms.to_le_bytes());
    payload.extend_from_slice(&1u16.to_le_bytes()); // navRate: one measurement per solution
    payload.extend_from_slice(&1u16.to_le_bytes()); // timeRef: GPS

    let mut frame = Vec::with_capacity(14);
    frame.extend_from_slice(&SYNC);
    frame.push(CLASS_CFG);
    frame.push(ID_CFG_RATE);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&payload);
    let (ck_a, ck_b) = fletcher8(&frame[2..]);
    frame.push(ck_a);
    frame.push(ck_b);
    frame
}

/// Send the rate command through the receiver link
pub fn send_rate(sink: &mut impl ByteSink, rate_hz: u8) -> io::Result<()> {
    log::info!("Setting GPS measurement rate to {} Hz", rate_hz.clamp(1, 25));
    sink.send(&cfg_rate(rate_hz))
}
