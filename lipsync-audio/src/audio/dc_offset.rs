//! DC offset estimation and removal.
//!
//! Recordings from cheap interfaces often carry a constant bias. It inflates
//! the energy of the lowest band and confuses voice activity detection, so it
//! is measured once from the head of the clip and subtracted everywhere.

use super::{AudioSource, SampleArray};
use crate::error::Result;

/// Offsets smaller than one 16-bit step are left alone.
pub const DEFAULT_EPSILON: f32 = 1.0 / 32_768.0;

/// Estimate the DC offset of a source.
///
/// Clips longer than four seconds are averaged over the first three seconds,
/// with the weight fading linearly to zero across the fourth. Shorter clips
/// are averaged in full.
pub fn dc_offset(source: &dyn AudioSource) -> Result<f32> {
    let rate = source.sample_rate() as usize;
    let (flat, fading) = if source.size() > 4 * rate {
        (3 * rate, rate)
    } else {
        (source.size(), 0)
    };
    if flat == 0 {
        return Ok(0.0);
    }

    let samples = source.get_samples(0, flat + fading)?;
    let mut sum: f64 = samples[..flat].iter().map(|&s| f64::from(s)).sum();
    for (i, &s) in samples[flat..].iter().enumerate() {
        let weight = (fading - i) as f64 / fading as f64;
        sum += f64::from(s) * weight;
    }

    let total_weight = flat as f64 + (fading as f64 + 1.0) / 2.0;
    Ok((sum / total_weight) as f32)
}

/// An affine correction `sample * factor + offset`.
///
/// `factor` shrinks the signal just enough that a full-scale sample stays in
/// [-1, 1] after the offset is added.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcCorrection {
    pub offset: f32,
    pub factor: f32,
}

impl DcCorrection {
    pub fn new(offset: f32) -> Self {
        Self {
            offset,
            factor: 1.0 / (1.0 + offset.abs()),
        }
    }

    pub fn apply(&self, samples: &mut SampleArray) {
        for s in samples.iter_mut() {
            *s = *s * self.factor + self.offset;
        }
    }
}

/// Correction that cancels the measured offset of `source`, or `None` if it
/// is below `epsilon`.
pub fn remove_dc_offset(source: &dyn AudioSource, epsilon: f32) -> Result<Option<DcCorrection>> {
    let offset = dc_offset(source)?;
    if offset.abs() < epsilon {
        return Ok(None);
    }
    tracing::debug!(offset, "removing DC offset");
    Ok(Some(DcCorrection::new(-offset)))
}
