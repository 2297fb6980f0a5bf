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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_PORT: &str = "/dev/ttyACM0";
const DEFAULT_BAUD_RATE: u32 = 115200;
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// A YAML representation of the serial sensor feed.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Serial {
    /// The serial port the sensor board is attached to.
    port: Option<String>,

    /// The baud rate of the port (default: 115200).
    baud_rate: Option<u32>,

    /// How long a single read may block before the control loop gets another turn,
    /// e.g. "1s" or "250ms".
    read_timeout: Option<String>,
}

impl Serial {
    /// Returns the serial port.
    pub fn port(&self) -> &str {
        self.port.as_deref().unwrap_or(DEFAULT_PORT)
    }

    /// Returns the baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)
    }

    /// Returns the read timeout.
    pub fn read_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.read_timeout {
            Some(read_timeout) => Ok(DurationString::from_string(read_timeout.clone())
                .map_err(|e| {
                    ConfigError::Invalid(format!("read_timeout '{}': {}", read_timeout, e))
                })?
                .into()),
            None => Ok(DEFAULT_READ_TIMEOUT),
        }
    }
}
