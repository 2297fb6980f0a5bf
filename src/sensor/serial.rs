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
use std::{
    io::{self, BufRead, BufReader},
    time::Duration,
};

use serialport::SerialPort;
use tracing::info;

use super::{LineSource, SensorError};

/// Reads sensor lines from a serial port.
pub struct SerialSource {
    reader: BufReader<Box<dyn SerialPort>>,
    /// Bytes of a line that was cut off by a read timeout.
    partial: Vec<u8>,
}

impl SerialSource {
    /// Opens the port. Reads block for at most the read timeout.
    pub fn open(port: &str, baud_rate: u32, read_timeout: Duration) -> Result<SerialSource, SensorError> {
        let serial_port = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()?;
        info!(
            port,
            baud_rate,
            read_timeout = read_timeout.as_millis(),
            "Serial port open."
        );

        Ok(SerialSource {
            reader: BufReader::new(serial_port),
            partial: Vec::new(),
        })
    }
}

impl LineSource for SerialSource {
    fn next_line(&mut self) -> Result<Option<String>, SensorError> {
        read_record(&mut self.reader, &mut self.partial)
    }
}

/// Reads one line. A timeout leaves whatever arrived in `partial` so the rest of the line is
/// picked up by the next call.
fn read_record<R: BufRead>(reader: &mut R, partial: &mut Vec<u8>) -> Result<Option<String>, SensorError> {
    match reader.read_until(b'\n', partial) {
        Ok(0) if partial.is_empty() => Err(SensorError::Closed),
        Ok(_) => {
            let line = String::from_utf8_lossy(partial).trim().to_string();
            partial.clear();
            if line.is_empty() {
                Ok(None)
            } else {
                Ok(Some(line))
            }
        }
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(None)
        }
        Err(e) => Err(SensorError::Transport(e)),
    }
}
