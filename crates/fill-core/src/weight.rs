//! Scale telemetry: line framing over the serial channel and weight parsing.
//!
//! The scale streams ASCII lines such as `ST,GS,+  015.0 kg`. The sign marks
//! a stable or settling reading, not polarity, so it is never applied to the
//! value.

use crate::config::SerialPolicy;
use crate::hal::ScaleChannel;
use std::time::{Duration, Instant};

const LINE_MAX: usize = 511;
const NUMERAL_MAX: usize = 31;
const TARE_COMMAND: &[u8] = b"T\r\n";

/// One parsed scale reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightSample {
    Value(f64),
    /// No complete line arrived inside the read window.
    NoSample,
}

/// Outcome of framing one line from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    Timeout,
}

/// Extract the weight from one raw scale line.
pub fn parse(line: &str) -> WeightSample {
    let Some(sign_at) = line.find(['+', '-']) else {
        return WeightSample::Value(0.0);
    };

    let rest = line[sign_at + 1..].trim_start_matches(' ');
    let mut numeral = String::with_capacity(NUMERAL_MAX);
    let mut seen_point = false;
    for c in rest.chars() {
        if numeral.len() >= NUMERAL_MAX {
            break;
        }
        match c {
            '0'..='9' => numeral.push(c),
            '.' if !seen_point => {
                seen_point = true;
                numeral.push(c);
            }
            _ => break,
        }
    }

    WeightSample::Value(numeral.parse::<f64>().unwrap_or(0.0))
}

pub struct WeightSource<S: ScaleChannel> {
    channel: S,
    policy: SerialPolicy,
    buffer: Vec<u8>,
}

impl<S: ScaleChannel> WeightSource<S> {
    pub fn new(channel: S, policy: SerialPolicy) -> Self {
        Self {
            channel,
            policy,
            buffer: Vec::with_capacity(LINE_MAX),
        }
    }

    /// Accumulate bytes until `\n` or until `deadline` passes.
    ///
    /// `\r` is dropped. Bytes beyond the line buffer are discarded, the line
    /// still ends at the next `\n`.
    pub fn read_line(&mut self, deadline: Instant) -> LineRead {
        let poll = self.policy.poll_interval();
        loop {
            let now = Instant::now();
            if now >= deadline {
                log::debug!("Timeout reading scale");
                return LineRead::Timeout;
            }
            let wait = poll.min(deadline - now);

            match self.channel.read_byte(wait) {
                Ok(Some(b'\r')) => {}
                Ok(Some(b'\n')) => {
                    let line = String::from_utf8_lossy(&self.buffer).into_owned();
                    self.buffer.clear();
                    return LineRead::Line(line);
                }
                Ok(Some(byte)) => {
                    if self.buffer.len() < LINE_MAX {
                        self.buffer.push(byte);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Scale channel read failed: {}", e);
                    std::thread::sleep(wait);
                }
            }
        }
    }

    /// Read one line within the configured window and parse it.
    pub fn sample(&mut self) -> WeightSample {
        let deadline = Instant::now() + self.policy.line_window();
        match self.read_line(deadline) {
            LineRead::Line(line) => parse(&line),
            LineRead::Timeout => WeightSample::NoSample,
        }
    }

    /// Ask the scale to zero itself.
    pub fn request_tare(&mut self) -> std::io::Result<()> {
        log::info!("Sending tare command to scale");
        self.buffer.clear();
        self.channel.write_all(TARE_COMMAND)
    }

    pub fn poll_interval(&self) -> Duration {
        self.policy.poll_interval()
    }

    pub fn channel_mut(&mut self) -> &mut S {
        &mut self.channel
    }
}


#[cfg(test)]
mod proptest_parse {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn formatted_readings_round_trip(
            value in 0.0f64..2000.0,
            pad in 0usize..4,
            sign in prop::sample::select(vec!['+', '-']),
        ) {
            let line = format!("ST,GS,{}{}{:06.1} kg", sign, " ".repeat(pad), value);
            let expected = format!("{:.1}", value).parse::<f64>().unwrap();
            prop_assert_eq!(parse(&line), WeightSample::Value(expected));
        }

        #[test]
        fn never_negative(line in "\\PC{0,64}") {
            match parse(&line) {
                WeightSample::Value(v) => prop_assert!(v >= 0.0),
                WeightSample::NoSample => prop_assert!(false, "parse never yields NoSample"),
            }
        }
    }
}
