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
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::Device;
use crate::samples::SampleBank;
use crate::voice::{VoiceError, VoicePlayer};
use crate::CHANNEL_COUNT;

/// What gating a channel did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// A new voice was started.
    Started,
    /// The channel was already playing.
    Suppressed,
    /// The playing voice was stopped.
    Stopped,
    /// The channel was already silent.
    Idle,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("channel {0} does not exist")]
    InvalidChannel(usize),

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

/// Holds at most one voice per channel. Only the control thread touches the slots.
///
/// Voices that leave a slot are parked until their thread has released the stream, so gating never
/// waits on a voice thread. `stop_all` is the only place that does.
pub struct VoiceRegistry {
    bank: Arc<SampleBank>,
    device: Arc<dyn Device>,
    slots: [Option<VoicePlayer>; CHANNEL_COUNT],
    releasing: Vec<VoicePlayer>,
}

impl VoiceRegistry {
    /// Creates an empty registry whose voices play from the bank on the device.
    pub fn new(bank: Arc<SampleBank>, device: Arc<dyn Device>) -> VoiceRegistry {
        VoiceRegistry {
            bank,
            device,
            slots: Default::default(),
            releasing: Vec::new(),
        }
    }

    /// Applies a gate to a channel. An active gate starts a voice unless one is already playing,
    /// an inactive gate stops whatever is playing.
    pub fn gate(&mut self, channel: usize, active: bool) -> Result<GateOutcome, RegistryError> {
        let buffer = self
            .bank
            .buffer(channel)
            .ok_or(RegistryError::InvalidChannel(channel))?
            .clone();
        self.reap();
        let slot = &mut self.slots[channel];

        // A voice that finished on its own counts as an empty slot.
        if slot.as_ref().is_some_and(|voice| voice.state().is_terminal()) {
            debug!(channel, "Clearing finished voice");
            self.releasing.extend(slot.take());
        }

        match (active, slot.is_some()) {
            (true, true) => Ok(GateOutcome::Suppressed),
            (true, false) => {
                let voice = VoicePlayer::new(channel, buffer, self.device.clone());
                voice.start()?;
                debug!(channel, "Voice started");
                *slot = Some(voice);
                Ok(GateOutcome::Started)
            }
            (false, true) => {
                if let Some(voice) = slot.take() {
                    voice.stop();
                    self.releasing.push(voice);
                }
                Ok(GateOutcome::Stopped)
            }
            (false, false) => Ok(GateOutcome::Idle),
        }
    }

    /// Stops every voice in channel order and waits for each to release its stream, including
    /// voices still releasing from earlier gates.
    pub fn stop_all(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(voice) = slot.take() {
                if voice.stop() {
                    info!(channel = voice.channel(), "Stopped voice");
                }
                voice.join();
            }
        }
        for voice in self.releasing.drain(..) {
            voice.join();
        }
    }

    /// Drops parked voices whose threads have exited.
    fn reap(&mut self) {
        self.releasing.retain(|voice| !voice.is_released());
    }

    /// Returns the number of stopped or finished voices still releasing their streams.
    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }

    /// Returns the number of channels with a playing voice.
    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|voice| voice.is_playing())
            .count()
    }

    /// Returns the voice in the given slot, if any. The voice may have finished.
    #[cfg(test)]
    pub fn voice(&self, channel: usize) -> Option<&VoicePlayer> {
        self.slots.get(channel).and_then(Option::as_ref)
    }
}

impl Drop for VoiceRegistry {
    fn drop(&mut self) {
        self.reap();
        if self.slots.iter().any(Option::is_some) || !self.releasing.is_empty() {
            warn!("Voice registry dropped with live voices, stopping them");
            self.stop_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::audio::mock;
    use crate::testutil::eventually;
    use crate::voice::VoiceState;

    fn bank(len: usize) -> Arc<SampleBank> {
        Arc::new(SampleBank::build(
            &vec![0.1; len],
            vec![0.2; len],
            vec![0.3; len],
            [0.0, 4.0, 7.0, 9.0],
            0.5,
            44100,
        ))
    }

    fn registry(len: usize) -> (VoiceRegistry, mock::Device) {
        let device = mock::Device::with_timing("mock-registry", 44100, 64, Duration::from_millis(1));
        (
            VoiceRegistry::new(bank(len), Arc::new(device.clone())),
            device,
        )
    }

    #[test]
    fn test_gate_on_starts_one_voice() {
        let (mut registry, device) = registry(1_000_000);

        assert_eq!(GateOutcome::Started, registry.gate(2, true).unwrap());
        assert_eq!(GateOutcome::Suppressed, registry.gate(2, true).unwrap());
        assert_eq!(1, registry.active_count());
        assert_eq!(VoiceState::Playing, registry.voice(2).unwrap().state());
        eventually(|| device.opened() == 1, "Stream never opened");
        assert!(registry.voice(1).is_none());

        registry.stop_all();
        assert_eq!(1, device.closed());
    }

    #[test]
    fn test_gate_off_stops_and_clears() {
        let (mut registry, device) = registry(1_000_000);

        registry.gate(4, true).unwrap();
        eventually(|| device.opened() == 1, "Stream never opened");
        assert_eq!(GateOutcome::Stopped, registry.gate(4, false).unwrap());
        assert!(registry.voice(4).is_none());
        assert_eq!(0, registry.active_count());
        assert_eq!(GateOutcome::Idle, registry.gate(4, false).unwrap());
        eventually(|| device.closed() == 1, "Stream never released");
    }

    #[test]
    fn test_gate_off_does_not_wait_for_release() {
        let (mut registry, device) = registry(1_000_000);
        device.slow_close(Duration::from_millis(500));

        for channel in 0..CHANNEL_COUNT {
            registry.gate(channel, true).unwrap();
        }
        eventually(|| device.opened() == CHANNEL_COUNT, "Streams never opened");

        let start = Instant::now();
        for channel in 0..CHANNEL_COUNT {
            assert_eq!(GateOutcome::Stopped, registry.gate(channel, false).unwrap());
        }
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(0, device.closed());
        assert_eq!(0, registry.active_count());
        assert_eq!(CHANNEL_COUNT, registry.releasing_count());

        // Released voices are dropped by later gates.
        eventually(|| device.closed() == CHANNEL_COUNT, "Streams never released");
        eventually(
            || {
                registry.gate(0, false).unwrap();
                registry.releasing_count() == 0
            },
            "Released voices never reaped",
        );
    }

    #[test]
    fn test_stop_all_waits_for_releasing_voices() {
        let (mut registry, device) = registry(1_000_000);
        device.slow_close(Duration::from_millis(100));

        registry.gate(3, true).unwrap();
        eventually(|| device.opened() == 1, "Stream never opened");
        registry.gate(3, false).unwrap();

        registry.stop_all();
        assert_eq!(1, device.closed());
        assert_eq!(0, registry.releasing_count());
    }

    #[test]
    fn test_refused_stream_is_retried() {
        let (mut registry, device) = registry(1_000_000);
        device.fail_open(true);

        assert_eq!(GateOutcome::Started, registry.gate(1, true).unwrap());
        eventually(
            || registry.voice(1).unwrap().state() == VoiceState::Stopped,
            "Voice never stopped",
        );
        assert_eq!(0, device.opened());

        // The stopped voice counts as an empty slot, so the next active gate tries again.
        device.fail_open(false);
        assert_eq!(GateOutcome::Started, registry.gate(1, true).unwrap());
        eventually(|| device.opened() == 1, "Stream never opened");
        assert_eq!(1, registry.active_count());

        registry.stop_all();
        assert_eq!(1, device.closed());
    }

    #[test]
    fn test_completed_voice_leaves_stale_slot() {
        let (mut registry, device) = registry(256);

        registry.gate(0, true).unwrap();
        eventually(
            || registry.voice(0).unwrap().state() == VoiceState::Completed,
            "Voice never completed",
        );
        assert_eq!(0, registry.active_count());

        // A finished voice is cleared without a stop.
        assert_eq!(GateOutcome::Idle, registry.gate(0, false).unwrap());
        assert!(registry.voice(0).is_none());

        registry.gate(0, true).unwrap();
        eventually(
            || registry.voice(0).unwrap().state() == VoiceState::Completed,
            "Voice never completed",
        );

        // An active gate after completion starts a fresh voice.
        assert_eq!(GateOutcome::Started, registry.gate(0, true).unwrap());
        eventually(|| device.opened() == 3, "Fresh voice never opened a stream");

        registry.stop_all();
        assert_eq!(3, device.closed());
    }

    #[test]
    fn test_invalid_channel() {
        let (mut registry, _device) = registry(16);
        assert!(matches!(
            registry.gate(6, true),
            Err(RegistryError::InvalidChannel(6))
        ));
        assert!(matches!(
            registry.gate(usize::MAX, false),
            Err(RegistryError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_stop_all() {
        let (mut registry, device) = registry(1_000_000);
        for channel in 0..CHANNEL_COUNT {
            registry.gate(channel, true).unwrap();
        }
        assert_eq!(CHANNEL_COUNT, registry.active_count());
        eventually(|| device.opened() == CHANNEL_COUNT, "Streams never opened");

        registry.stop_all();
        assert_eq!(0, registry.active_count());
        assert!((0..CHANNEL_COUNT).all(|c| registry.voice(c).is_none()));
        assert_eq!(CHANNEL_COUNT, device.opened());
        assert_eq!(CHANNEL_COUNT, device.closed());
    }
}
