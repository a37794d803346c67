// src/gps/nmea.rs
//! NMEA sentence validation and GGA/RMC decoding

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// Knots to metres per second
pub const KNOTS_TO_MPS: f32 = 0.514444;

// GGA field indices ('*' counts as a separator, so the checksum is the last field)
mod gga {
    pub const LAT: usize = 2;
    pub const LAT_HEMI: usize = 3;
    pub const LON: usize = 4;
    pub const LON_HEMI: usize = 5;
    pub const FIX_QUALITY: usize = 6;
    pub const SATELLITES: usize = 7;
    pub const HDOP: usize = 8;
    pub const ALTITUDE: usize = 9;
    pub const MIN_FIELDS: usize = 10;
}

// RMC field indices
mod rmc {
    pub const TIME: usize = 1;
    pub const STATUS: usize = 2;
    pub const LAT: usize = 3;
    pub const LAT_HEMI: usize = 4;
    pub const LON: usize = 5;
    pub const LON_HEMI: usize = 6;
    pub const SPEED_KNOTS: usize = 7;
    pub const COURSE: usize = 8;
    pub const DATE: usize = 9;
    pub const MIN_FIELDS: usize = 9;
}

/// Sentence types the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceKind {
    Gga,
    Rmc,
    Other,
}

/// Values decoded from a GGA (fix data) sentence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgaData {
    pub lat: f64,
    pub lon: f64,
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: f32,
    pub alt_m: f32,
}

/// Values decoded from an RMC (recommended minimum) sentence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmcData {
    pub lat: f64,
    pub lon: f64,
    pub speed_mps: f32,
    pub course_deg: f32,
    pub utc: Option<DateTime<Utc>>,
}

/// XOR of every byte of `body` up to (not including) `'*'`
pub fn checksum(body: &str) -> u8 {
    body.bytes().take_while(|&b| b != b'*').fold(0, |acc, b| acc ^ b)
}

/// Check the trailing `*hh` checksum of a sentence whose `'$'` is stripped
pub fn checksum_ok(body: &str) -> bool {
    let Some(star) = body.find('*') else {
        return false;
    };
    let Some(hex) = body.get(star + 1..star + 3) else {
        return false;
    };
    match u8::from_str_radix(hex, 16) {
        Ok(expected) => checksum(&body[..star]) == expected,
        Err(_) => false,
    }
}

/// Split a sentence body into fields; the checksum becomes the last field
pub fn tokenize(body: &str) -> Vec<&str> {
    body.split([',', '*']).collect()
}

/// Validate the checksum of a full `$...*hh` sentence and split it.
///
/// Returns `None` when the checksum is missing, malformed or wrong.
pub fn validate(sentence: &str) -> Option<Vec<&str>> {
    let body = sentence.strip_prefix('$').unwrap_or(sentence);
    if checksum_ok(body) {
        Some(tokenize(body))
    } else {
        None
    }
}

/// Classify by sentence id, ignoring the talker (GP, GN, GL, ...)
pub fn sentence_kind(fields: &[&str]) -> SentenceKind {
    match fields.first() {
        Some(id) if id.len() >= 5 && id.ends_with("GGA") => SentenceKind::Gga,
        Some(id) if id.len() >= 5 && id.ends_with("RMC") => SentenceKind::Rmc,
        _ => SentenceKind::Other,
    }
}

/// `ddmm.mmmm` to signed decimal degrees; `'S'` and `'W'` are negative
pub fn degrees_minutes_to_decimal(dm: f64, hemisphere: char) -> f64 {
    let degrees = (dm / 100.0).floor();
    let minutes = dm - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        'S' | 'W' => -decimal,
        _ => decimal,
    }
}

pub fn knots_to_mps(knots: f32) -> f32 {
    knots * KNOTS_TO_MPS
}

fn field<'a>(fields: &[&'a str], idx: usize) -> &'a str {
    fields.get(idx).copied().unwrap_or("")
}

fn parse_or<T: std::str::FromStr>(fields: &[&str], idx: usize, default: T) -> T {
    field(fields, idx).trim().parse().unwrap_or(default)
}

fn hemisphere(fields: &[&str], idx: usize) -> char {
    field(fields, idx).chars().next().unwrap_or(' ')
}

/// Position from a (value, hemisphere) field pair; non-positive means no data
fn coordinate(fields: &[&str], value: usize, hemi: usize) -> Option<f64> {
    let dm: f64 = parse_or(fields, value, 0.0);
    if dm <= 0.0 {
        return None;
    }
    Some(degrees_minutes_to_decimal(dm, hemisphere(fields, hemi)))
}

/// Decode a GGA sentence
pub fn parse_gga(fields: &[&str]) -> Option<GgaData> {
    if fields.len() < gga::MIN_FIELDS {
        return None;
    }
    let lat = coordinate(fields, gga::LAT, gga::LAT_HEMI)?;
    let lon = coordinate(fields, gga::LON, gga::LON_HEMI)?;

    Some(GgaData {
        lat,
        lon,
        fix_quality: parse_or(fields, gga::FIX_QUALITY, 0),
        satellites: parse_or(fields, gga::SATELLITES, 0),
        hdop: parse_or(fields, gga::HDOP, super::data::NO_HDOP),
        alt_m: parse_or(fields, gga::ALTITUDE, 0.0),
    })
}

/// Decode an RMC sentence; status other than `'A'` is rejected
pub fn parse_rmc(fields: &[&str]) -> Option<RmcData> {
    if fields.len() < rmc::MIN_FIELDS || field(fields, rmc::STATUS) != "A" {
        return None;
    }
    let lat = coordinate(fields, rmc::LAT, rmc::LAT_HEMI)?;
    let lon = coordinate(fields, rmc::LON, rmc::LON_HEMI)?;

    Some(RmcData {
        lat,
        lon,
        speed_mps: knots_to_mps(parse_or(fields, rmc::SPEED_KNOTS, 0.0)),
        course_deg: parse_or(fields, rmc::COURSE, 0.0),
        utc: parse_utc(field(fields, rmc::TIME), field(fields, rmc::DATE)),
    })
}

/// `hhmmss[.sss]` + `ddmmyy` to a UTC timestamp
fn parse_utc(time: &str, date: &str) -> Option<DateTime<Utc>> {
    if time.len() < 6 || date.len() < 6 {
        return None;
    }
    let num = |s: &str, range: std::ops::Range<usize>| s.get(range)?.parse::<u32>().ok();

    let day = num(date, 0..2)?;
    let month = num(date, 2..4)?;
    let year = num(date, 4..6)? as i32 + 2000;

    let hour = num(time, 0..2)?;
    let minute = num(time, 2..4)?;
    let seconds: f64 = time.get(4..)?.parse().ok()?;
    let millis = ((seconds.fract() * 1000.0).round() as u32).min(999);

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_milli_opt(hour, minute, seconds.trunc() as u32, millis)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

#[cfg(test)]
pub(crate) fn sentence(body: &str) -> String {
    format!("${}*{:02X}", body, checksum(body))
}
