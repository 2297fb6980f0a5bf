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
use tracing::{debug, error, info, span, warn, Level};

use crate::registry::{GateOutcome, VoiceRegistry};
use crate::sensor::{LineSource, SensorError, SensorReading};
use crate::shutdown::ShutdownHandle;
use crate::CHANNEL_COUNT;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Sensor(#[from] SensorError),
}

/// The control loop. Reads the sensor feed and gates each channel's voice on every reading.
pub struct Dispatcher {
    source: Box<dyn LineSource>,
    registry: VoiceRegistry,
    threshold: i64,
    shutdown: ShutdownHandle,
}

impl Dispatcher {
    pub fn new(
        source: Box<dyn LineSource>,
        registry: VoiceRegistry,
        threshold: i64,
        shutdown: ShutdownHandle,
    ) -> Dispatcher {
        Dispatcher {
            source,
            registry,
            threshold,
            shutdown,
        }
    }

    /// Runs until shutdown is requested or the sensor feed fails. Blocks, so it belongs on a
    /// blocking thread. Every voice is stopped before this returns.
    pub fn run(mut self) -> Result<(), DispatchError> {
        let span = span!(Level::INFO, "dispatcher");
        let _enter = span.enter();

        info!(threshold = self.threshold, "Dispatcher started.");

        let result = loop {
            if self.shutdown.is_requested() {
                info!(
                    active = self.registry.active_count(),
                    releasing = self.registry.releasing_count(),
                    "Shutdown requested."
                );
                break Ok(());
            }

            match self.source.next_line() {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => continue,
                Err(e) => {
                    error!(err = %e, "Sensor feed failed.");
                    break Err(DispatchError::Sensor(e));
                }
            }
        };

        self.registry.stop_all();
        info!("All voices stopped.");
        result
    }

    /// Decodes one line and applies it. Lines that don't decode are dropped.
    pub fn handle_line(&mut self, line: &str) {
        match SensorReading::parse(line) {
            Ok(reading) => {
                debug!(values = ?reading.values(), "Reading");
                self.apply(&reading);
            }
            Err(e) => warn!(line, err = %e, "Ignoring invalid input"),
        }
    }

    /// Gates every channel against the threshold, in channel order.
    pub fn apply(&mut self, reading: &SensorReading) {
        for channel in 0..CHANNEL_COUNT {
            let active = reading.is_active(channel, self.threshold);
            match self.registry.gate(channel, active) {
                Ok(GateOutcome::Started) => debug!(channel, value = reading.value(channel), "Channel on"),
                Ok(GateOutcome::Stopped) => debug!(channel, "Channel off"),
                Ok(GateOutcome::Suppressed) | Ok(GateOutcome::Idle) => {}
                Err(e) => error!(channel, err = %e, "Unable to gate channel"),
            }
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }
}
