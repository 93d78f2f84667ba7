//! Voice-activity timeline for a whole clip.
//!
//! ```text
//! AudioSource ─► DC correction ─► SampleRateConverter (→ 8 kHz) ─► FrameAssembler
//!                                                                      │
//!                                   VoiceActivityDetector ◄────────────┘
//!                                           │ one decision per centisecond
//!                                           ▼
//!                 ActivityTimeline ─► re-check first utterance ─► fill gaps ─► trim tails
//! ```
//!
//! The detector needs some signal before its models settle, so the first
//! utterance it reports is thrown away and the audio up to its end is run a
//! second time through the same, now adapted, detector.

use std::path::Path;
use std::thread;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::dc_offset::{remove_dc_offset, DcCorrection, DEFAULT_EPSILON};
use crate::audio::resample::SampleRateConverter;
use crate::audio::{AudioSource, SourceSegment};
use crate::buffering::FrameAssembler;
use crate::error::{AudioError, Result};
use crate::vad::{self, Aggressiveness, VoiceActivityDetector};

/// Tuning for [`detect_voice_activity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityConfig {
    pub aggressiveness: Aggressiveness,
    /// Pauses up to this many centiseconds are bridged.
    pub max_gap_cs: usize,
    /// Centiseconds cut from the end of each utterance.
    pub tail_cs: usize,
    /// Equal time slices analyzed in parallel, each with its own detector.
    pub segment_count: usize,
    /// Source frames read per block.
    pub block_size: usize,
    /// DC offsets smaller than this are not corrected.
    pub dc_epsilon: f32,
    pub reprocess_first_utterance: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            aggressiveness: Aggressiveness::Aggressive,
            max_gap_cs: 5,
            tail_cs: 5,
            segment_count: 1,
            block_size: 8_192,
            dc_epsilon: DEFAULT_EPSILON,
            reprocess_first_utterance: true,
        }
    }
}

impl ActivityConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid activity config")?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading activity config {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

/// A span of voice activity, in centiseconds from the start of the clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivitySegment {
    pub start: usize,
    pub end: usize,
}

impl ActivitySegment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> usize {
        self.end - self.start
    }
}

/// Sorted, disjoint activity spans within `[0, end)`.
///
/// Touching or overlapping spans are merged on insertion, so two spans in
/// the timeline are always separated by at least one inactive centisecond.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityTimeline {
    end: usize,
    segments: Vec<ActivitySegment>,
}

impl ActivityTimeline {
    pub fn new(end: usize) -> Self {
        Self {
            end,
            segments: Vec::new(),
        }
    }

    /// Length of the timeline in centiseconds.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn segments(&self) -> &[ActivitySegment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<ActivitySegment> {
        self.segments
    }

    pub fn first(&self) -> Option<ActivitySegment> {
        self.segments.first().copied()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Mark `[start, end)` active, clipped to the timeline.
    pub fn set(&mut self, start: usize, end: usize) {
        let end = end.min(self.end);
        if start >= end {
            return;
        }

        let first = self.segments.partition_point(|s| s.end < start);
        let last = self.segments.partition_point(|s| s.start <= end);
        let mut merged = ActivitySegment::new(start, end);
        if first < last {
            merged.start = merged.start.min(self.segments[first].start);
            merged.end = merged.end.max(self.segments[last - 1].end);
        }
        self.segments.splice(first..last, [merged]);
    }

    /// Mark `[start, end)` inactive, splitting spans as needed.
    pub fn clear(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let mut kept = Vec::with_capacity(self.segments.len() + 1);
        for s in self.segments.drain(..) {
            if s.end <= start || s.start >= end {
                kept.push(s);
                continue;
            }
            if s.start < start {
                kept.push(ActivitySegment::new(s.start, start));
            }
            if s.end > end {
                kept.push(ActivitySegment::new(end, s.end));
            }
        }
        self.segments = kept;
    }

    /// Bridge pauses of at most `max_gap` centiseconds.
    pub fn fill_gaps(&mut self, max_gap: usize) {
        let gaps: Vec<(usize, usize)> = self
            .segments
            .windows(2)
            .filter(|pair| pair[1].start - pair[0].end <= max_gap)
            .map(|pair| (pair[0].end, pair[1].start))
            .collect();
        for (start, end) in gaps {
            self.set(start, end);
        }
    }

    /// Cut `tail` centiseconds from every span longer than `tail` that ends
    /// before the end of the timeline.
    pub fn trim_tails(&mut self, tail: usize) {
        let snapshot = self.segments.clone();
        for s in snapshot {
            if s.duration() > tail && s.end < self.end {
                self.clear(s.end - tail, s.end);
            }
        }
    }
}

fn cs_to_frames(cs: usize, sample_rate: u32) -> usize {
    (cs as u64 * u64::from(sample_rate) / 100) as usize
}

/// Stream `source` through the detector, reporting each frame's decision.
///
/// Returns the number of frames processed.
fn run_pass(
    source: &dyn AudioSource,
    detector: &mut VoiceActivityDetector,
    correction: Option<DcCorrection>,
    block_size: usize,
    mut on_frame: impl FnMut(usize, bool),
) -> Result<usize> {
    let mut converter = SampleRateConverter::new(source.sample_rate(), vad::SAMPLE_RATE)?;
    let mut assembler = FrameAssembler::new();
    let total = source.size();
    let block_size = block_size.max(1);

    let mut frame_index = 0;
    let mut start = 0;
    loop {
        let end = (start + block_size).min(total);
        let mut block = source.get_samples(start, end)?;
        if let Some(correction) = &correction {
            correction.apply(&mut block);
        }
        let resampled = converter.convert(&block, end == total);
        assembler.push(&resampled, |frame| {
            on_frame(frame_index, detector.process(frame));
            frame_index += 1;
        });
        if end == total {
            break;
        }
        start = end;
    }
    debug!(
        frames = assembler.frames_emitted(),
        dropped = assembler.pending(),
        "pass done"
    );
    Ok(assembler.frames_emitted())
}

/// Activity of one self-contained stretch of audio, relative to its start.
fn analyze(
    source: &dyn AudioSource,
    correction: Option<DcCorrection>,
    config: &ActivityConfig,
) -> Result<ActivityTimeline> {
    let mut detector = VoiceActivityDetector::new(config.aggressiveness);
    let mut activity = ActivityTimeline::new(source.duration_cs());

    run_pass(source, &mut detector, correction, config.block_size, |cs, speech| {
        if speech {
            activity.set(cs, cs + 1);
        }
    })?;

    if config.reprocess_first_utterance {
        if let Some(first) = activity.first() {
            debug!(start = first.start, end = first.end, "re-checking first utterance");
            activity.clear(first.start, first.end);
            let head = SourceSegment::new(source, 0, cs_to_frames(first.end, source.sample_rate()))?;
            // Same detector: adapted models and hangover carry into the re-check.
            run_pass(&head, &mut detector, correction, config.block_size, |cs, speech| {
                if speech {
                    activity.set(cs, cs + 1);
                }
            })?;
        }
    }

    debug!(
        utterances = activity.len(),
        frames_adapted = detector.frames_adapted(),
        "activity pass done"
    );
    Ok(activity)
}

/// Detect voice activity across a whole clip.
///
/// # Errors
/// Propagates read errors from `source` and fails with
/// [`AudioError::RatioOutOfRange`] if its rate cannot be converted to 8 kHz.
pub fn detect_voice_activity(
    source: &dyn AudioSource,
    config: &ActivityConfig,
) -> Result<Vec<ActivitySegment>> {
    let duration = source.duration_cs();
    let correction = remove_dc_offset(source, config.dc_epsilon)?;
    let segment_count = config.segment_count.max(1);

    let ranges: Vec<(usize, usize)> = (0..segment_count)
        .map(|i| (i * duration / segment_count, (i + 1) * duration / segment_count))
        .collect();

    let mut activity = ActivityTimeline::new(duration);
    let results: Vec<(usize, Result<ActivityTimeline>)> = if segment_count == 1 {
        vec![(0, analyze(source, correction, config))]
    } else {
        thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .iter()
                .map(|&(start, end)| {
                    let handle = scope.spawn(move || {
                        let rate = source.sample_rate();
                        let segment =
                            SourceSegment::new(source, cs_to_frames(start, rate), cs_to_frames(end, rate))?;
                        analyze(&segment, correction, config)
                    });
                    (start, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(start, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(AudioError::Other(anyhow::anyhow!(
                            "activity worker for segment at {start} cs panicked"
                        )))
                    });
                    (start, result)
                })
                .collect()
        })
    };

    for (offset, result) in results {
        for s in result?.segments() {
            activity.set(s.start + offset, s.end + offset);
        }
    }

    activity.fill_gaps(config.max_gap_cs);
    activity.trim_tails(config.tail_cs);

    info!(
        sections = activity.len(),
        duration_cs = duration,
        aggressiveness = %config.aggressiveness,
        "voice activity detected"
    );
    debug!(
        "sections: {}",
        activity
            .segments()
            .iter()
            .map(|s| format!("{}-{}", s.start, s.end))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(activity.into_segments())
}
