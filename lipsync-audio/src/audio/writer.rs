//! Export of any [`AudioSource`] as a mono 32-bit float WAVE file.

use std::path::Path;

use super::AudioSource;
use crate::error::Result;

const BLOCK: usize = 16_384;

/// Write `source` to `path`, replacing any existing file.
pub fn write_wave_file(path: impl AsRef<Path>, source: &dyn AudioSource) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: source.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;

    let total = source.size();
    let mut start = 0;
    while start < total {
        let end = (start + BLOCK).min(total);
        for sample in source.get_samples(start, end)? {
            writer.write_sample(sample)?;
        }
        start = end;
    }

    writer.finalize()?;
    tracing::debug!(path = %path.as_ref().display(), frames = total, "wrote WAVE file");
    Ok(())
}
