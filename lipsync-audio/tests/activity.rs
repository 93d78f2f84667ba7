mod common;

use std::f64::consts::PI;

use common::{Encoding, WaveBuilder};
use lipsync_audio::{
    detect_voice_activity, ActivityConfig, ActivitySegment, Aggressiveness, AudioSource, InMemorySource,
    WaveFileReader,
};

const TONE_HZ: f64 = 1_500.0;
const AMPLITUDE: f64 = 0.25;

/// A 1.5 kHz tone wherever `active` says so, silence elsewhere.
fn bursts(rate: u32, active: &[(usize, usize)]) -> impl Fn(usize) -> f64 + '_ {
    move |n| {
        let cs = n * 100 / rate as usize;
        if active.iter().any(|&(a, b)| cs >= a && cs < b) {
            AMPLITUDE * (2.0 * PI * TONE_HZ * n as f64 / f64::from(rate)).sin()
        } else {
            0.0
        }
    }
}

fn render(rate: u32, total_cs: usize, active: &[(usize, usize)]) -> InMemorySource {
    let frames = total_cs * rate as usize / 100;
    let signal = bursts(rate, active);
    InMemorySource::new((0..frames).map(|n| signal(n) as f32).collect(), rate)
}

fn assert_single_burst(segments: &[ActivitySegment]) {
    assert_eq!(segments.len(), 1, "{segments:?}");
    let s = segments[0];
    assert!((95..=115).contains(&s.start), "start {}", s.start);
    assert!((185..=220).contains(&s.end), "end {}", s.end);
}

#[test]
fn tone_burst_is_one_section() {
    let source = render(16_000, 300, &[(100, 200)]);
    let segments = detect_voice_activity(&source, &ActivityConfig::default()).unwrap();
    assert_single_burst(&segments);
}

#[test]
fn separate_bursts_stay_separate() {
    let source = render(16_000, 400, &[(100, 150), (250, 300)]);
    let segments = detect_voice_activity(&source, &ActivityConfig::default()).unwrap();
    assert_eq!(segments.len(), 2, "{segments:?}");
    assert!(segments[0].end < segments[1].start);
    assert!(segments[0].start >= 95 && segments[1].end <= 320, "{segments:?}");
}

#[test]
fn sections_are_sorted_and_disjoint() {
    let source = render(22_050, 500, &[(50, 90), (140, 200), (300, 310), (380, 460)]);
    let segments = detect_voice_activity(&source, &ActivityConfig::default()).unwrap();
    assert!(!segments.is_empty());
    for pair in segments.windows(2) {
        assert!(pair[0].end < pair[1].start, "{segments:?}");
    }
    for s in &segments {
        assert!(s.start < s.end && s.end <= 500, "{s:?}");
    }
}

#[test]
fn parallel_slices_cover_the_same_burst() {
    let source = render(16_000, 300, &[(100, 200)]);
    let config = ActivityConfig {
        segment_count: 4,
        ..ActivityConfig::default()
    };
    let segments = detect_voice_activity(&source, &config).unwrap();
    assert!(!segments.is_empty());
    let covered: usize = segments.iter().map(ActivitySegment::duration).sum();
    assert!(covered >= 80, "{segments:?}");
    for s in &segments {
        assert!(s.start >= 90 && s.end <= 225, "{segments:?}");
    }
}

#[test]
fn silence_has_no_sections_at_any_level() {
    let source = render(44_100, 200, &[]);
    for aggressiveness in Aggressiveness::ALL {
        let config = ActivityConfig {
            aggressiveness,
            ..ActivityConfig::default()
        };
        assert!(detect_voice_activity(&source, &config).unwrap().is_empty());
    }
}

#[test]
fn dc_offset_does_not_create_activity() {
    let mut samples = render(16_000, 300, &[(100, 200)]).samples().to_vec();
    for s in &mut samples {
        *s += 0.05;
    }
    let source = InMemorySource::new(samples, 16_000);
    let segments = detect_voice_activity(&source, &ActivityConfig::default()).unwrap();
    assert_single_burst(&segments);
}

#[test]
fn wave_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let rate = 44_100;
    let total_cs = 300;
    let active = [(100, 200)];
    let signal = bursts(rate, &active);
    let path = WaveBuilder::new(Encoding::Int16, 2, rate)
        .with_signal(Encoding::Int16, total_cs * rate as usize / 100, &[&signal, &signal])
        .write_to(dir.path(), "burst.wav");

    let reader = WaveFileReader::open(&path).unwrap();
    assert_eq!(reader.duration_cs(), total_cs);
    let segments = detect_voice_activity(&reader, &ActivityConfig::default()).unwrap();
    assert_single_burst(&segments);
}
