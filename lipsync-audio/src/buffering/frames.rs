//! Fixed-length i16 frames assembled across block boundaries.

use crate::audio::float_to_i16;
use crate::vad::FRAME_LENGTH;

/// One detector frame of 16-bit PCM.
pub type Frame = [i16; FRAME_LENGTH];

/// Accumulates f32 samples into [`Frame`]s.
///
/// A partially filled frame is held until more samples arrive. When the
/// stream ends it is simply dropped: the detector only accepts full frames.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    frame: Frame,
    filled: usize,
    emitted: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            frame: [0; FRAME_LENGTH],
            filled: 0,
            emitted: 0,
        }
    }

    /// Append `samples`, calling `on_frame` for every frame that completes.
    pub fn push(&mut self, samples: &[f32], mut on_frame: impl FnMut(&Frame)) {
        for &sample in samples {
            self.frame[self.filled] = float_to_i16(sample);
            self.filled += 1;
            if self.filled == FRAME_LENGTH {
                on_frame(&self.frame);
                self.filled = 0;
                self.emitted += 1;
            }
        }
    }

    /// Samples waiting for the next frame to fill.
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Frames handed out since construction.
    pub fn frames_emitted(&self) -> usize {
        self.emitted
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
