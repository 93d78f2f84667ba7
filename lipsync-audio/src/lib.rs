//! # lipsync-audio
//!
//! Audio front-end for lip-sync generation.
//!
//! ## Architecture
//!
//! ```text
//! WAVE file → WaveFileReader (positioned reads, mono f32)
//!                    │
//!              DC correction
//!                    │
//!        SampleRateConverter (windowed sinc) → 8 kHz
//!                    │
//!         FrameAssembler → 80-sample i16 frames
//!                    │
//!   VoiceActivityDetector (fixed-point GMM, one decision per 10 ms)
//!                    │
//!  ActivityTimeline → gap filling, tail trimming → Vec<ActivitySegment>
//! ```
//!
//! Every stage is usable on its own; [`detect_voice_activity`] wires them
//! together for a whole clip.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod activity;
pub mod audio;
pub mod buffering;
pub mod error;
pub mod vad;

// Convenience re-exports for downstream crates
pub use activity::{detect_voice_activity, ActivityConfig, ActivitySegment, ActivityTimeline};
pub use audio::resample::SampleRateConverter;
pub use audio::wave::{WaveFileInfo, WaveFileReader};
pub use audio::{AudioSource, InMemorySource, SampleArray};
pub use error::{AudioError, Result};
pub use vad::{Aggressiveness, VoiceActivityDetector};
