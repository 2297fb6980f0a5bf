// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The sensor feed: a line-oriented source of JSON readings from the sensor board.
//!
//! Each line is a JSON object mapping `"A0"` through `"A5"` to the raw analog value of that
//! channel, e.g. `{"A0": 512, "A1": 1023, ...}`.

use std::{io, time::Duration};

use serde_json::Value;

use crate::CHANNEL_COUNT;

#[cfg(test)]
pub mod mock;
mod serial;

pub use serial::SerialSource;

/// The value a channel takes when the reading doesn't carry a usable value for it. It's the top
/// of the sensors' range, which is never below any sensible threshold.
pub const INACTIVE_VALUE: i64 = 1023;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("malformed reading: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("reading is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("error reading from sensor: {0}")]
    Transport(io::Error),

    #[error("unable to open serial port: {0}")]
    Open(#[from] serialport::Error),

    #[error("sensor feed closed")]
    Closed,
}

/// A blocking source of sensor lines.
pub trait LineSource: Send {
    /// Waits for the next line. Returns `Ok(None)` if no complete line arrived within the read
    /// timeout, so the caller gets a chance to check for shutdown.
    fn next_line(&mut self) -> Result<Option<String>, SensorError>;
}

/// One decoded sensor reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorReading {
    values: [i64; CHANNEL_COUNT],
}

impl SensorReading {
    /// Decodes a line. Channels that are missing or don't hold an integer read as inactive.
    pub fn parse(line: &str) -> Result<SensorReading, SensorError> {
        let value: Value = serde_json::from_str(line)?;
        let object = value
            .as_object()
            .ok_or_else(|| SensorError::NotAnObject(line.to_string()))?;

        Ok(SensorReading {
            values: std::array::from_fn(|channel| {
                object
                    .get(&format!("A{}", channel))
                    .and_then(Value::as_i64)
                    .unwrap_or(INACTIVE_VALUE)
            }),
        })
    }

    /// Returns the value of a channel.
    pub fn value(&self, channel: usize) -> Option<i64> {
        self.values.get(channel).copied()
    }

    /// Returns every channel's value in channel order.
    pub fn values(&self) -> &[i64; CHANNEL_COUNT] {
        &self.values
    }

    /// Returns true if the channel's value is below the threshold. Lower is more pressure.
    pub fn is_active(&self, channel: usize, threshold: i64) -> bool {
        self.value(channel).is_some_and(|value| value < threshold)
    }
}

/// Opens the serial port the sensor board is attached to.
pub fn open_source(
    port: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<Box<dyn LineSource>, SensorError> {
    Ok(Box::new(SerialSource::open(port, baud_rate, read_timeout)?))
}

/// Lists the serial ports on this machine.
pub fn list_ports() -> Result<Vec<String>, SensorError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => format!(
                "{} (USB {:04x}:{:04x}{})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product
                    .map(|product| format!(" {}", product))
                    .unwrap_or_default()
            ),
            _ => port.port_name,
        })
        .collect())
}
