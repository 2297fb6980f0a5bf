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

//! A voice plays one sample buffer once on its own output stream.
//!
//! The voice's cursor and state are shared between three parties: the control thread that starts
//! and stops it, the voice thread that owns the output stream, and the audio backend that pulls
//! samples. Only atomics cross those boundaries.

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use crate::audio::{Device, Pull};

/// How often the voice thread checks whether its stream should be released.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The lifecycle of a voice. Stopped and Completed are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum VoiceState {
    Created = 0,
    Playing = 1,
    Stopped = 2,
    Completed = 3,
}

impl VoiceState {
    fn from_u8(value: u8) -> VoiceState {
        match value {
            0 => VoiceState::Created,
            1 => VoiceState::Playing,
            2 => VoiceState::Stopped,
            _ => VoiceState::Completed,
        }
    }

    /// Returns true if the voice will never play again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VoiceState::Stopped | VoiceState::Completed)
    }
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoiceState::Created => "created",
            VoiceState::Playing => "playing",
            VoiceState::Stopped => "stopped",
            VoiceState::Completed => "completed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("voice for channel {channel} cannot start, it is already {state}")]
    AlreadyStarted { channel: usize, state: VoiceState },

    #[error("unable to spawn voice thread: {0}")]
    Spawn(#[from] io::Error),
}

/// State shared with the voice thread and the render callback.
struct Shared {
    state: AtomicU8,
    cursor: AtomicUsize,
    /// Set by stop() so the render callback ends even if it races the state change.
    stop_requested: AtomicBool,
}

impl Shared {
    fn state(&self) -> VoiceState {
        VoiceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves from one state to another. Returns false if the voice wasn't in the from state.
    fn transition(&self, from: VoiceState, to: VoiceState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Fills one chunk from the buffer at the cursor. Runs on the audio backend's thread.
fn render(buffer: &[f32], shared: &Shared, out: &mut [f32]) -> Pull {
    if shared.stop_requested.load(Ordering::Acquire) || shared.state() != VoiceState::Playing {
        out.fill(0.0);
        return Pull::EndOfStream;
    }

    let cursor = shared.cursor.load(Ordering::Acquire).min(buffer.len());
    let count = (buffer.len() - cursor).min(out.len());
    out[..count].copy_from_slice(&buffer[cursor..cursor + count]);
    out[count..].fill(0.0);

    let cursor = cursor + count;
    shared.cursor.store(cursor, Ordering::Release);

    if cursor >= buffer.len() {
        shared.transition(VoiceState::Playing, VoiceState::Completed);
        Pull::EndOfStream
    } else {
        Pull::Continue
    }
}

/// Plays one buffer on one channel, once.
pub struct VoicePlayer {
    channel: usize,
    buffer: Arc<[f32]>,
    device: Arc<dyn Device>,
    shared: Arc<Shared>,
    join_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl VoicePlayer {
    /// Creates a voice that will play the buffer on the device. Nothing plays until start().
    pub fn new(channel: usize, buffer: Arc<[f32]>, device: Arc<dyn Device>) -> VoicePlayer {
        VoicePlayer {
            channel,
            buffer,
            device,
            shared: Arc::new(Shared {
                state: AtomicU8::new(VoiceState::Created as u8),
                cursor: AtomicUsize::new(0),
                stop_requested: AtomicBool::new(false),
            }),
            join_handle: Mutex::new(None),
        }
    }

    /// Starts playback on a new voice thread.
    pub fn start(&self) -> Result<(), VoiceError> {
        if !self.shared.transition(VoiceState::Created, VoiceState::Playing) {
            return Err(VoiceError::AlreadyStarted {
                channel: self.channel,
                state: self.state(),
            });
        }

        let channel = self.channel;
        let buffer = self.buffer.clone();
        let device = self.device.clone();
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("voice-{}", channel))
            .spawn(move || play(channel, buffer, device, shared));

        match spawned {
            Ok(join_handle) => {
                *self.join_handle.lock() = Some(join_handle);
                Ok(())
            }
            Err(e) => {
                self.shared
                    .transition(VoiceState::Playing, VoiceState::Stopped);
                Err(VoiceError::Spawn(e))
            }
        }
    }

    /// Stops playback. Safe to call from any thread at any time. Returns true if this call
    /// stopped the voice, false if it had already finished.
    pub fn stop(&self) -> bool {
        self.shared.stop_requested.store(true, Ordering::Release);
        let stopped = self
            .shared
            .transition(VoiceState::Playing, VoiceState::Stopped)
            || self
                .shared
                .transition(VoiceState::Created, VoiceState::Stopped);
        if stopped {
            debug!(channel = self.channel, "Voice stopped");
        }
        stopped
    }

    /// Waits for the voice thread to release its stream.
    pub fn join(&self) {
        let join_handle = self.join_handle.lock().take();
        if let Some(join_handle) = join_handle {
            if join_handle.join().is_err() {
                error!(channel = self.channel, "Voice thread panicked");
            }
        }
    }

    /// Returns true once the voice thread has exited, or if it never ran. Joining a released
    /// voice does not block.
    pub fn is_released(&self) -> bool {
        self.join_handle
            .lock()
            .as_ref()
            .map_or(true, |join_handle| join_handle.is_finished())
    }

    /// Returns the current state.
    pub fn state(&self) -> VoiceState {
        self.shared.state()
    }

    /// Returns true while the voice is playing.
    pub fn is_playing(&self) -> bool {
        self.state() == VoiceState::Playing
    }

    /// Returns how many samples of the buffer have been handed to the device.
    pub fn position(&self) -> usize {
        self.shared.cursor.load(Ordering::Acquire)
    }

    /// Returns the channel this voice plays.
    pub fn channel(&self) -> usize {
        self.channel
    }
}

impl Drop for VoicePlayer {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

impl fmt::Debug for VoicePlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoicePlayer")
            .field("channel", &self.channel)
            .field("state", &self.state())
            .field("position", &self.position())
            .field("len", &self.buffer.len())
            .finish()
    }
}

/// The voice thread. Owns the output stream from open to close.
fn play(channel: usize, buffer: Arc<[f32]>, device: Arc<dyn Device>, shared: Arc<Shared>) {
    let span = span!(Level::INFO, "voice", channel);
    let _enter = span.enter();

    if shared.state().is_terminal() {
        debug!("Voice stopped before its stream opened");
        return;
    }

    let render_shared = shared.clone();
    let opened = device.open_stream(Box::new(move |out: &mut [f32]| {
        render(&buffer, &render_shared, out)
    }));
    let stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            error!(err = %e, device = %device, "Unable to open output stream");
            shared.stop_requested.store(true, Ordering::Release);
            shared.transition(VoiceState::Playing, VoiceState::Stopped);
            return;
        }
    };
    debug!("Voice playing");

    loop {
        let state = shared.state();
        if state.is_terminal() {
            debug!(%state, "Voice finished");
            break;
        }
        if stream.has_failed() {
            error!(device = %device, "Output device failed, stopping voice");
            shared.stop_requested.store(true, Ordering::Release);
            shared.transition(VoiceState::Playing, VoiceState::Stopped);
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    stream.close();
    info!(position = shared.cursor.load(Ordering::Acquire), "Voice released stream");
}
