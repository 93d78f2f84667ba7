//! Regrouping of streamed samples into fixed-size analysis frames.
//!
//! Resampled audio arrives in blocks whose lengths have nothing to do with
//! the detector's 10 ms frame. [`FrameAssembler`] converts each sample to
//! 16-bit PCM and hands out complete frames as soon as they fill, carrying
//! any remainder over to the next block.

pub mod frames;

pub use frames::FrameAssembler;
