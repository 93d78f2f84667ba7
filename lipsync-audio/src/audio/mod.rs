//! Audio sources and the transforms applied to them before analysis.
//!
//! Every signal in this crate is mono `f32` at a fixed sample rate, exposed
//! through [`AudioSource`]. Sources are random-access: a caller asks for a
//! frame range and receives a freshly allocated [`SampleArray`].
//!
//! ```text
//! WaveFileReader ─┐
//!                 ├─► AudioSource ─► DcCorrection ─► SampleRateConverter ─► i16 frames
//! InMemorySource ─┘
//! ```

pub mod dc_offset;
pub mod resample;
pub mod wave;
pub mod writer;

use std::sync::Arc;

use crate::error::{AudioError, Result};

/// Mono f32 samples, nominally in [-1.0, 1.0]. One element per frame.
pub type SampleArray = Vec<f32>;

/// A finite, mono, fixed-rate signal with random-access range reads.
///
/// Implementors must be safe to read from several threads at once; every
/// call returns an independent buffer.
pub trait AudioSource: Send + Sync {
    /// Frame rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Total number of mono frames.
    fn size(&self) -> usize;

    /// Read frames `start..end`.
    ///
    /// # Errors
    /// Returns [`AudioError::Range`] unless `start <= end <= size()`.
    fn get_samples(&self, start: usize, end: usize) -> Result<SampleArray>;

    /// Duration in whole centiseconds, rounded down.
    fn duration_cs(&self) -> usize {
        if self.sample_rate() == 0 {
            return 0;
        }
        (self.size() as u64 * 100 / self.sample_rate() as u64) as usize
    }
}

/// Validate a requested frame range against a source length.
pub(crate) fn check_range(start: usize, end: usize, frame_count: usize) -> Result<()> {
    if start > end || end > frame_count {
        return Err(AudioError::Range {
            start,
            end,
            frame_count,
        });
    }
    Ok(())
}

/// An owned signal held entirely in memory.
///
/// Cloning is cheap; the samples are shared.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl InMemorySource {
    pub fn new(samples: SampleArray, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Borrow the full signal.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl AudioSource for InMemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn size(&self) -> usize {
        self.samples.len()
    }

    fn get_samples(&self, start: usize, end: usize) -> Result<SampleArray> {
        check_range(start, end, self.samples.len())?;
        Ok(self.samples[start..end].to_vec())
    }
}

/// A view of frames `offset..offset + len` of another source.
pub struct SourceSegment<'a> {
    inner: &'a dyn AudioSource,
    offset: usize,
    len: usize,
}

impl<'a> SourceSegment<'a> {
    /// # Errors
    /// Returns [`AudioError::Range`] if the window does not fit `inner`.
    pub fn new(inner: &'a dyn AudioSource, start: usize, end: usize) -> Result<Self> {
        check_range(start, end, inner.size())?;
        Ok(Self {
            inner,
            offset: start,
            len: end - start,
        })
    }
}

impl AudioSource for SourceSegment<'_> {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn size(&self) -> usize {
        self.len
    }

    fn get_samples(&self, start: usize, end: usize) -> Result<SampleArray> {
        check_range(start, end, self.len)?;
        self.inner
            .get_samples(self.offset + start, self.offset + end)
    }
}

/// Convert a float sample to signed 16-bit, clamping to [-1, 1] first.
///
/// Maps -1.0 to `i16::MIN` and 1.0 to `i16::MAX`.
pub fn float_to_i16(sample: f32) -> i16 {
    let sample = sample.clamp(-1.0, 1.0);
    let span = i16::MAX as f32 - i16::MIN as f32;
    (((sample + 1.0) / 2.0) * span + i16::MIN as f32) as i16
}
