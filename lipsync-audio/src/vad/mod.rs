//! Fixed-point voice activity detection on 8 kHz audio.
//!
//! [`VoiceActivityDetector`] classifies 10 ms frames (80 samples of 16-bit
//! PCM at 8 kHz) as speech or non-speech. Each frame is split into six
//! sub-bands, the per-band log energies are scored against adaptive Gaussian
//! mixture models of noise and speech, and the raw decision is smoothed by a
//! hangover that extends speech runs past their last voiced frame.
//!
//! The detector adapts continuously: decisions on the first few hundred
//! milliseconds of a signal are less reliable than later ones.

pub mod fixed;

mod filterbank;
mod gmm;
mod noise_floor;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use filterbank::FilterBank;
use gmm::{GmmModel, Thresholds};

/// Samples per frame: 10 ms at 8 kHz.
pub const FRAME_LENGTH: usize = 80;
/// Sample rate the detector operates at.
pub const SAMPLE_RATE: u32 = 8_000;

/// Number of sub-bands.
pub(crate) const CHANNEL_COUNT: usize = 6;

/// Speech run length after which the long hangover applies.
const MAX_SPEECH_FRAMES: i16 = 6;

/// How readily the detector reports speech.
///
/// More aggressive modes are more restrictive: a positive decision is more
/// likely to be real speech, at the cost of missing quiet speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Aggressiveness {
    #[default]
    Quality,
    LowBitrate,
    Aggressive,
    VeryAggressive,
}

impl Aggressiveness {
    pub const ALL: [Aggressiveness; 4] = [
        Aggressiveness::Quality,
        Aggressiveness::LowBitrate,
        Aggressiveness::Aggressive,
        Aggressiveness::VeryAggressive,
    ];

    fn thresholds(self) -> Thresholds {
        let (local, global) = match self {
            Aggressiveness::Quality => (24, 57),
            Aggressiveness::LowBitrate => (37, 100),
            Aggressiveness::Aggressive => (82, 285),
            Aggressiveness::VeryAggressive => (94, 1100),
        };
        Thresholds { local, global }
    }

    /// Hangover after short and long speech runs, in frames.
    fn hangover(self) -> (i16, i16) {
        match self {
            Aggressiveness::Quality | Aggressiveness::LowBitrate => (8, 14),
            Aggressiveness::Aggressive | Aggressiveness::VeryAggressive => (6, 9),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Aggressiveness::Quality => "quality",
            Aggressiveness::LowBitrate => "low-bitrate",
            Aggressiveness::Aggressive => "aggressive",
            Aggressiveness::VeryAggressive => "very-aggressive",
        }
    }
}

impl fmt::Display for Aggressiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggressiveness {
    type Err = String;

    /// Accepts the kebab-case names or the numeric levels `0`–`3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" | "0" => Ok(Aggressiveness::Quality),
            "low-bitrate" | "lowbitrate" | "1" => Ok(Aggressiveness::LowBitrate),
            "aggressive" | "2" => Ok(Aggressiveness::Aggressive),
            "very-aggressive" | "veryaggressive" | "3" => Ok(Aggressiveness::VeryAggressive),
            other => Err(format!(
                "unknown aggressiveness '{other}' (expected quality, low-bitrate, aggressive or very-aggressive)"
            )),
        }
    }
}

/// Frame-by-frame speech detector for 8 kHz, 16-bit mono audio.
///
/// One instance tracks one signal; feed frames in order.
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    aggressiveness: Aggressiveness,
    filter_bank: FilterBank,
    model: GmmModel,
    /// Frames of hangover left.
    over_hang: i16,
    /// Length of the current speech run, capped at [`MAX_SPEECH_FRAMES`].
    num_of_speech: i16,
}

impl VoiceActivityDetector {
    pub fn new(aggressiveness: Aggressiveness) -> Self {
        Self {
            aggressiveness,
            filter_bank: FilterBank::default(),
            model: GmmModel::default(),
            over_hang: 0,
            num_of_speech: 0,
        }
    }

    pub fn aggressiveness(&self) -> Aggressiveness {
        self.aggressiveness
    }

    /// Frames so far that carried enough energy to update the models.
    pub fn frames_adapted(&self) -> u32 {
        self.model.frame_counter()
    }

    /// Classify one frame. Returns `true` for speech.
    ///
    /// # Panics
    /// If `frame` is not exactly [`FRAME_LENGTH`] samples long.
    pub fn process(&mut self, frame: &[i16]) -> bool {
        assert_eq!(
            frame.len(),
            FRAME_LENGTH,
            "VAD frames must be {FRAME_LENGTH} samples at {SAMPLE_RATE} Hz"
        );

        let features = self.filter_bank.features(frame);
        let speech = self.model.classify(
            &features.bands,
            features.total_energy,
            self.aggressiveness.thresholds(),
        );
        self.smooth(speech)
    }

    /// Hangover: keep reporting speech for a while after a run ends.
    fn smooth(&mut self, speech: bool) -> bool {
        let (short_hangover, long_hangover) = self.aggressiveness.hangover();
        if speech {
            self.num_of_speech += 1;
            if self.num_of_speech > MAX_SPEECH_FRAMES {
                self.num_of_speech = MAX_SPEECH_FRAMES;
                self.over_hang = long_hangover;
            } else {
                self.over_hang = short_hangover;
            }
            true
        } else {
            self.num_of_speech = 0;
            if self.over_hang > 0 {
                self.over_hang -= 1;
                true
            } else {
                false
            }
        }
    }

    /// Return to the freshly constructed state, keeping the aggressiveness.
    pub fn reset(&mut self) {
        self.filter_bank.reset();
        self.model.reset();
        self.over_hang = 0;
        self.num_of_speech = 0;
    }
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(Aggressiveness::default())
    }
}
