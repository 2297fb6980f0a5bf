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
use std::{fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod mock;

/// What a render callback reports after filling a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    /// More audio follows.
    Continue,
    /// The source has nothing more to play. The chunk that returned this is still played, and the
    /// callback will not be asked for more.
    EndOfStream,
}

/// Fills a mono chunk of samples. Runs on the audio backend's thread.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) -> Pull + Send + 'static>;

/// Errors raised while talking to an audio backend.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no device found with name {0}")]
    DeviceNotFound(String),

    #[error("no default output device available")]
    NoDefaultDevice,

    #[error("device {device} has no output configuration supporting {sample_rate}Hz")]
    UnsupportedSampleRate { device: String, sample_rate: u32 },

    #[error("device {device} uses unsupported sample format {format}")]
    UnsupportedSampleFormat { device: String, format: String },

    #[error("unable to build output stream: {0}")]
    BuildStream(#[from] ::cpal::BuildStreamError),

    #[error("unable to start output stream: {0}")]
    PlayStream(#[from] ::cpal::PlayStreamError),

    #[error("audio backend error: {0}")]
    Backend(String),
}

/// An output device that voices open their streams on.
pub trait Device: fmt::Display + Send + Sync {
    /// The sample rate that all streams on this device run at.
    fn sample_rate(&self) -> u32;

    /// Opens and starts a mono output stream that pulls audio from `render`. The stream belongs
    /// to the thread that opened it and is released with [`OutputStream::close`].
    fn open_stream(&self, render: RenderCallback) -> Result<Box<dyn OutputStream>, AudioError>;
}

/// A running output stream.
pub trait OutputStream {
    /// Returns true if the backend reported an error since the stream started.
    fn has_failed(&self) -> bool;

    /// Stops the stream and releases the device.
    fn close(self: Box<Self>);
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, AudioError> {
    cpal::Device::list()
}

/// Gets the device described by the audio configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, AudioError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, config.sample_rate())));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
