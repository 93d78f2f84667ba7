//! Smoothed per-band noise floor from a rolling window of small feature values.

use super::fixed::Q4;
use super::CHANNEL_COUNT;

/// Candidates kept per band, sorted ascending.
const SLOTS: usize = 16;
/// Frames after which a candidate is dropped.
const MAX_AGE: i16 = 100;
/// Starting floor and value of empty slots, Q4.
const INITIAL_FLOOR: i16 = 1600;
const EMPTY_SLOT: i16 = 10_000;

/// Smoothing factors toward lower and higher medians, Q15.
const SMOOTHING_DOWN: i32 = 6553;
const SMOOTHING_UP: i32 = 32439;

#[derive(Debug, Clone)]
pub(crate) struct NoiseFloor {
    age: [[i16; SLOTS]; CHANNEL_COUNT],
    smallest: [[i16; SLOTS]; CHANNEL_COUNT],
    floor: [i16; CHANNEL_COUNT],
}

impl Default for NoiseFloor {
    fn default() -> Self {
        Self {
            age: [[0; SLOTS]; CHANNEL_COUNT],
            smallest: [[EMPTY_SLOT; SLOTS]; CHANNEL_COUNT],
            floor: [INITIAL_FLOOR; CHANNEL_COUNT],
        }
    }
}

impl NoiseFloor {
    /// Insert this frame's feature for `channel` and return the updated floor.
    ///
    /// `frames_seen` is the number of frames that passed the energy gate
    /// before this one.
    pub fn update(&mut self, feature: Q4, channel: usize, frames_seen: u32) -> Q4 {
        let value = feature.raw();
        let age = &mut self.age[channel];
        let smallest = &mut self.smallest[channel];

        // Age every candidate, dropping those that expire.
        for i in 0..SLOTS {
            if age[i] != MAX_AGE {
                age[i] = age[i].wrapping_add(1);
            } else {
                for j in i..SLOTS - 1 {
                    smallest[j] = smallest[j + 1];
                    age[j] = age[j + 1];
                }
                age[SLOTS - 1] = MAX_AGE + 1;
                smallest[SLOTS - 1] = EMPTY_SLOT;
            }
        }

        // Insert in sorted position if it beats any candidate.
        let position = smallest.partition_point(|&v| v <= value);
        if position < SLOTS {
            for i in (position + 1..SLOTS).rev() {
                smallest[i] = smallest[i - 1];
                age[i] = age[i - 1];
            }
            smallest[position] = value;
            age[position] = 1;
        }

        let median = if frames_seen > 2 {
            smallest[2]
        } else if frames_seen > 0 {
            smallest[0]
        } else {
            INITIAL_FLOOR
        };

        let floor = &mut self.floor[channel];
        let alpha = if frames_seen == 0 {
            0
        } else if median < *floor {
            SMOOTHING_DOWN
        } else {
            SMOOTHING_UP
        };

        let mixed = (alpha + 1) * i32::from(*floor)
            + (i32::from(i16::MAX) - alpha) * i32::from(median)
            + 16_384;
        *floor = (mixed >> 15) as i16;
        Q4::from_raw(*floor)
    }
}
