//! Band-limited sample-rate conversion by windowed-sinc interpolation.
//!
//! ## Design
//!
//! Every output instant is evaluated directly from the input history using a
//! tabulated sinc kernel. The kernel is addressed by a fixed-point phase
//! (12 fractional bits) and linearly interpolated between table entries, so
//! any ratio in [1/256, 256] is supported without rational approximation.
//! When downsampling the kernel is stretched by `1 / ratio`, which moves its
//! cutoff below the output Nyquist frequency.
//!
//! Input is staged in a linear history buffer. When the unread tail runs low,
//! the live window is compacted to the front and refilled from the caller's
//! block. After the final block the buffer is padded with zeros so the last
//! output samples still see a full kernel.
//!
//! A ratio of exactly 1.0 still runs the filter. It is not a passthrough.
//!
//! ## Usage
//!
//! ```ignore
//! let mut src = SampleRateConverter::new(44_100, 8_000)?;
//! let mut out = src.convert(&block_a, false);
//! out.extend(src.convert(&block_b, true));
//! ```

use std::ops::{Add, Sub};
use std::sync::OnceLock;

use tracing::info;

use super::{AudioSource, InMemorySource, SampleArray};
use crate::error::{AudioError, Result};

/// Largest supported up- or downsampling factor.
pub const MAX_RATIO: f64 = 256.0;

/// Table entries per zero crossing of the kernel.
const INDEX_INC: usize = 128;
/// Zero crossings on each side of the kernel center.
const ZERO_CROSSINGS: usize = 20;
const COEFF_HALF_LEN: usize = INDEX_INC * ZERO_CROSSINGS;
/// Passband edge as a fraction of the lower Nyquist frequency.
const CUTOFF: f64 = 0.9;
const KAISER_BETA: f64 = 8.0;

/// Output samples produced per internal step of [`SampleRateConverter::convert`].
const SCRATCH_LEN: usize = 4096;

// ── Fixed-point kernel phase ────────────────────────────────────────────────

const SHIFT_BITS: u32 = 12;
const PHASE_ONE: i32 = 1 << SHIFT_BITS;

/// Position within the coefficient table, 12 fractional bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Phase(i32);

impl Phase {
    const ZERO: Phase = Phase(0);

    fn from_f64(value: f64) -> Self {
        Self((value * f64::from(PHASE_ONE)).round() as i32)
    }

    fn from_int(value: i32) -> Self {
        Self(value << SHIFT_BITS)
    }

    fn whole(self) -> usize {
        (self.0 >> SHIFT_BITS) as usize
    }

    fn fraction(self) -> f64 {
        f64::from(self.0 & (PHASE_ONE - 1)) / f64::from(PHASE_ONE)
    }

    fn times(self, n: i32) -> Self {
        Self(self.0 * n)
    }

    /// Number of whole `step`s that fit into `self`.
    fn steps_of(self, step: Phase) -> i32 {
        self.0 / step.0
    }
}

impl Add for Phase {
    type Output = Phase;
    fn add(self, rhs: Phase) -> Phase {
        Phase(self.0 + rhs.0)
    }
}

impl Sub for Phase {
    type Output = Phase;
    fn sub(self, rhs: Phase) -> Phase {
        Phase(self.0 - rhs.0)
    }
}

// ── Kernel table ────────────────────────────────────────────────────────────

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Zeroth-order modified Bessel function of the first kind.
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..64 {
        term *= half / k as f64;
        let squared = term * term;
        sum += squared;
        if squared < sum * 1e-16 {
            break;
        }
    }
    sum
}

/// Right half of the Kaiser-windowed sinc kernel plus two guard entries.
fn coefficients() -> &'static [f32] {
    static TABLE: OnceLock<Vec<f32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let norm = bessel_i0(KAISER_BETA);
        (0..COEFF_HALF_LEN + 2)
            .map(|i| {
                let x = i as f64 / INDEX_INC as f64;
                let r = x / ZERO_CROSSINGS as f64;
                if r > 1.0 {
                    return 0.0;
                }
                let window = bessel_i0(KAISER_BETA * (1.0 - r * r).sqrt()) / norm;
                (CUTOFF * sinc(CUTOFF * x) * window) as f32
            })
            .collect()
    })
}

/// Keep the fractional part of `x`, always in [0, 1).
fn fmod_one(x: f64) -> f64 {
    let rem = x - x.round();
    if rem < 0.0 {
        rem + 1.0
    } else {
        rem
    }
}

// ── Filter state ────────────────────────────────────────────────────────────

/// Progress report of one [`SampleRateConverter::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Conversion {
    /// Input samples copied into the filter history.
    pub consumed: usize,
    /// Output samples written.
    pub produced: usize,
}

#[derive(Debug, Clone)]
struct SincFilter {
    ratio: f64,
    coeffs: &'static [f32],
    /// Input samples needed on either side of an output instant.
    half_len: usize,
    buffer: Vec<f32>,
    b_len: usize,
    b_current: usize,
    b_end: usize,
    /// End of real input once the final block has been staged.
    b_real_end: Option<usize>,
    /// Fractional input position of the next output sample.
    last_position: f64,
}

impl SincFilter {
    fn new(ratio: f64) -> Self {
        let coeffs = coefficients();

        let per_side = (COEFF_HALF_LEN as f64 + 2.0) / INDEX_INC as f64;
        let b_len = (3 * ((per_side * MAX_RATIO + 1.0).round() as usize)).max(4096) + 1;

        let mut count = per_side;
        if ratio < 1.0 {
            count /= ratio;
        }
        let half_len = count.round() as usize + 1;

        Self {
            ratio,
            coeffs,
            half_len,
            buffer: vec![0.0; b_len + 1],
            b_len,
            b_current: 0,
            b_end: 0,
            b_real_end: None,
            last_position: 0.0,
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.b_current = 0;
        self.b_end = 0;
        self.b_real_end = None;
        self.last_position = 0.0;
    }

    fn samples_in_hand(&self) -> usize {
        (self.b_end + self.b_len - self.b_current) % self.b_len
    }

    fn advance(&mut self, input_index: f64) -> f64 {
        let rem = fmod_one(input_index);
        self.b_current = (self.b_current + (input_index - rem).round() as usize) % self.b_len;
        rem
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], end_of_input: bool) -> Conversion {
        let mut consumed = 0;
        let mut produced = 0;

        let mut input_index = self.advance(self.last_position);
        let terminate = 1.0 / self.ratio + 1e-20;

        let float_increment = INDEX_INC as f64 * self.ratio.min(1.0);
        let increment = Phase::from_f64(float_increment);
        let scale = float_increment / INDEX_INC as f64;

        while produced < output.len() {
            if self.samples_in_hand() <= self.half_len {
                self.prepare_data(input, &mut consumed, end_of_input);
                if self.samples_in_hand() <= self.half_len {
                    break;
                }
            }

            if let Some(real_end) = self.b_real_end {
                if self.b_current as f64 + input_index + terminate > real_end as f64 {
                    break;
                }
            }

            let start = Phase::from_f64(input_index * float_increment);
            output[produced] = (scale * self.calc_output(increment, start)) as f32;
            produced += 1;

            input_index = self.advance(input_index + 1.0 / self.ratio);
        }

        self.last_position = input_index;
        Conversion { consumed, produced }
    }

    /// Refill the history buffer from `input`, compacting when the tail runs out.
    fn prepare_data(&mut self, input: &[f32], consumed: &mut usize, end_of_input: bool) {
        if self.b_real_end.is_some() {
            return;
        }

        let half = self.half_len;
        let mut len = if self.b_current == 0 {
            // Fresh state: the first `half` slots stay zero as left history.
            self.b_current = half;
            self.b_end = half;
            self.b_len - 2 * half
        } else if self.b_end + half + 1 < self.b_len {
            self.b_len.saturating_sub(self.b_current + half)
        } else {
            self.compact();
            self.b_len.saturating_sub(self.b_current + half)
        };

        len = len
            .min(input.len() - *consumed)
            .min(self.b_len - self.b_end);
        self.buffer[self.b_end..self.b_end + len]
            .copy_from_slice(&input[*consumed..*consumed + len]);
        self.b_end += len;
        *consumed += len;

        if end_of_input && *consumed == input.len() && self.b_end - self.b_current < 2 * half {
            if self.b_len - self.b_end < half + 5 {
                self.compact();
            }
            self.b_real_end = Some(self.b_end);
            let pad = (half + 5).min(self.b_len - self.b_end);
            self.buffer[self.b_end..self.b_end + pad].fill(0.0);
            self.b_end += pad;
        }
    }

    /// Move the live window (plus `half_len` of left history) to the front.
    fn compact(&mut self) {
        let held = self.b_end - self.b_current;
        self.buffer
            .copy_within(self.b_current - self.half_len..self.b_end, 0);
        self.b_current = self.half_len;
        self.b_end = self.b_current + held;
    }

    fn coefficient(&self, index: Phase) -> f64 {
        let i = index.whole();
        let a = f64::from(self.coeffs[i]);
        let b = f64::from(self.coeffs[i + 1]);
        a + index.fraction() * (b - a)
    }

    fn calc_output(&self, increment: Phase, start: Phase) -> f64 {
        let max_index = Phase::from_int(COEFF_HALF_LEN as i32);

        // Left half, walking from the oldest tap toward the center.
        let mut filter_index = start;
        let coeff_count = (max_index - filter_index).steps_of(increment);
        filter_index = filter_index + increment.times(coeff_count);
        let mut data_index = self.b_current as isize - coeff_count as isize;
        if data_index < 0 {
            let steps = -data_index;
            filter_index = filter_index - increment.times(steps as i32);
            data_index += steps;
        }

        let mut left = 0.0;
        while filter_index >= Phase::ZERO {
            left += self.coefficient(filter_index) * f64::from(self.buffer[data_index as usize]);
            filter_index = filter_index - increment;
            data_index += 1;
        }

        // Right half, walking from the newest tap back toward the center.
        let mut filter_index = increment - start;
        let coeff_count = (max_index - filter_index).steps_of(increment);
        filter_index = filter_index + increment.times(coeff_count);
        let mut data_index = self.b_current + 1 + coeff_count as usize;

        let mut right = 0.0;
        loop {
            right += self.coefficient(filter_index) * f64::from(self.buffer[data_index]);
            filter_index = filter_index - increment;
            data_index -= 1;
            if filter_index <= Phase::ZERO {
                break;
            }
        }

        left + right
    }
}

// ── Public converter ────────────────────────────────────────────────────────

/// Streams mono f32 audio from one sample rate to another.
///
/// State carries over between calls, so a signal of any length can be fed
/// in bounded chunks. Mark the last chunk with `is_final` to flush the tail.
#[derive(Debug, Clone)]
pub struct SampleRateConverter {
    input_rate: u32,
    output_rate: u32,
    filter: SincFilter,
    scratch: Vec<f32>,
}

impl SampleRateConverter {
    /// Create a converter.
    ///
    /// # Errors
    /// Returns [`AudioError::RatioOutOfRange`] unless
    /// `output_rate / input_rate` lies in [1/256, 256].
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        let ratio = f64::from(output_rate) / f64::from(input_rate);
        if !(1.0 / MAX_RATIO..=MAX_RATIO).contains(&ratio) {
            return Err(AudioError::RatioOutOfRange {
                input_rate,
                output_rate,
            });
        }

        let filter = SincFilter::new(ratio);
        info!(
            input_rate,
            output_rate,
            ratio,
            half_len = filter.half_len,
            "sample rate converter ready"
        );

        Ok(Self {
            input_rate,
            output_rate,
            filter,
            scratch: vec![0.0; SCRATCH_LEN],
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// `output_rate / input_rate`.
    pub fn ratio(&self) -> f64 {
        self.filter.ratio
    }

    /// Consume from `input` and write up to `output.len()` resampled samples.
    ///
    /// Not all of `input` is necessarily consumed; resubmit the remainder.
    /// Once `is_final` has been passed and the tail is drained, further calls
    /// produce nothing until [`reset`](Self::reset).
    pub fn process(&mut self, input: &[f32], output: &mut [f32], is_final: bool) -> Conversion {
        self.filter.process(input, output, is_final)
    }

    /// Convert a whole block, returning every output sample it yields.
    pub fn convert(&mut self, input: &[f32], is_final: bool) -> SampleArray {
        let mut out = SampleArray::with_capacity((input.len() as f64 * self.filter.ratio) as usize + 1);
        let mut offset = 0;
        loop {
            let step = self
                .filter
                .process(&input[offset..], &mut self.scratch, is_final);
            offset += step.consumed;
            out.extend_from_slice(&self.scratch[..step.produced]);
            if step.consumed == 0 && step.produced == 0 {
                break;
            }
        }
        out
    }

    /// Forget all history, as if freshly constructed.
    pub fn reset(&mut self) {
        self.filter.reset();
    }
}

/// Resample an entire source into memory.
pub fn resample_source(source: &dyn AudioSource, output_rate: u32) -> Result<InMemorySource> {
    const BLOCK: usize = 65_536;

    let mut converter = SampleRateConverter::new(source.sample_rate(), output_rate)?;
    let total = source.size();
    let mut out = SampleArray::with_capacity((total as f64 * converter.ratio()) as usize + 1);

    let mut start = 0;
    loop {
        let end = (start + BLOCK).min(total);
        let block = source.get_samples(start, end)?;
        out.extend(converter.convert(&block, end == total));
        if end == total {
            break;
        }
        start = end;
    }

    Ok(InMemorySource::new(out, output_rate))
}
