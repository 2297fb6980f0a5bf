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

//! Varispeed pitch shifting.
//!
//! Pitch is changed by reading the source at a different rate, so duration changes along with
//! pitch. Samples are picked by nearest neighbour with no interpolation or filtering.

/// The largest shift, in either direction, that `shift` will apply.
pub const MAX_SEMITONES: f32 = 48.0;

/// Returns the playback rate for the given semitone offset.
pub fn rate_factor(semitones: f32) -> f64 {
    2f64.powf(semitones as f64 / 12.0)
}

/// Returns true if the offset is finite and no larger than `MAX_SEMITONES` either way.
pub fn in_range(semitones: f32) -> bool {
    semitones.is_finite() && semitones.abs() <= MAX_SEMITONES
}

/// Shifts the mono samples by the given number of semitones.
///
/// Output sample `k` is input sample `round(k * factor)`, stopping at the first index that falls
/// outside the input, so the output is roughly `len / factor` samples long. A shift of zero returns
/// the input unchanged. Offsets are clamped to `MAX_SEMITONES` and a non-finite offset is treated
/// as zero.
pub fn shift(samples: &[f32], semitones: f32) -> Vec<f32> {
    let semitones = if semitones.is_finite() {
        semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES)
    } else {
        0.0
    };
    let factor = rate_factor(semitones);
    let mut shifted = Vec::with_capacity((samples.len() as f64 / factor).ceil() as usize);

    // Ties round to even so that x.5 positions land on the same sample every time.
    shifted.extend(
        (0usize..)
            .map(|k| (k as f64 * factor).round_ties_even() as usize)
            .take_while(|&index| index < samples.len())
            .map(|index| samples[index]),
    );

    shifted
}
