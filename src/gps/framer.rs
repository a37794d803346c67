// src/gps/framer.rs
//! Byte stream to NMEA sentence framing with a bounded line buffer

/// Shortest line worth handing to the decoders
const MIN_SENTENCE_LEN: usize = 5;

/// Line buffers are never allowed to shrink below this
pub const MIN_LINE_MAX: usize = 96;

/// Accumulates bytes into newline-terminated sentences.
///
/// A line longer than `line_max` is dropped as a whole; the overflow is
/// counted and the framer resynchronises on the next terminator.
#[derive(Debug)]
pub struct SentenceFramer {
    line: String,
    line_max: usize,
    overflowed: bool,
    overflows: u32,
}

impl SentenceFramer {
    pub fn new(line_max: usize) -> Self {
        let line_max = line_max.max(MIN_LINE_MAX);
        Self {
            line: String::with_capacity(line_max),
            line_max,
            overflowed: false,
            overflows: 0,
        }
    }

    pub fn line_max(&self) -> usize {
        self.line_max
    }

    /// Number of lines dropped because they outgrew the buffer
    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    /// Feed one byte. Returns a complete candidate sentence on `'\n'`.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\r' => None,
            b'\n' => {
                let dropped = std::mem::replace(&mut self.overflowed, false);
                let line = std::mem::take(&mut self.line);
                self.line.reserve(self.line_max);
                if dropped || line.len() <= MIN_SENTENCE_LEN || !line.starts_with('$') {
                    return None;
                }
                Some(line)
            }
            _ if self.overflowed => None,
            _ => {
                if self.line.len() < self.line_max {
                    // NMEA is ASCII; anything else is line noise
                    self.line.push(if byte.is_ascii() { byte as char } else { '?' });
                } else {
                    log::trace!("NMEA line exceeded {} bytes, dropping", self.line_max);
                    self.line.clear();
                    self.overflowed = true;
                    self.overflows += 1;
                }
                None
            }
        }
    }

    /// Lazily frame a chunk of bytes into sentences
    pub fn feed<'a>(&'a mut self, bytes: &'a [u8]) -> impl Iterator<Item = String> + 'a {
        bytes.iter().filter_map(move |&b| self.push(b))
    }
}
