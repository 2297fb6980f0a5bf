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

//! Sample loading and the per-channel sample bank.
//!
//! This module provides:
//! - Decoding of sample files into mono f32 at the output sample rate
//! - The bank of six buffers the voices play from, built once at startup

mod bank;
mod loader;

pub use bank::{SampleBank, KICK_CHANNEL, NOTE_COUNT, SNARE_CHANNEL};
pub use loader::LoadError;
