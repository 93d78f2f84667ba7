mod common;

use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use common::{sine, triangle, Encoding, WaveBuilder};
use lipsync_audio::audio::wave::SampleFormat;
use lipsync_audio::{AudioError, AudioSource, WaveFileReader};

const PERIOD: usize = 48;

fn expected_format(encoding: Encoding) -> SampleFormat {
    match encoding {
        Encoding::UInt8 => SampleFormat::UInt8,
        Encoding::Int16 => SampleFormat::Int16,
        Encoding::Int24 => SampleFormat::Int24,
        Encoding::Int32 => SampleFormat::Int32,
        Encoding::Float32 => SampleFormat::Float32,
        Encoding::Float64 => SampleFormat::Float64,
    }
}

#[test]
fn every_encoding_decodes_within_its_epsilon() {
    let dir = tempfile::tempdir().unwrap();
    let signal = sine(PERIOD);
    let frames = PERIOD * 20;

    for encoding in Encoding::ALL {
        for extensible in [false, true] {
            let mut builder = WaveBuilder::new(encoding, 1, 16_000).with_signal(encoding, frames, &[&signal]);
            builder.extensible = extensible;
            let path = builder.write_to(dir.path(), &format!("{encoding:?}-{extensible}.wav"));

            let reader = WaveFileReader::open(&path).unwrap();
            assert_eq!(reader.info().sample_format, expected_format(encoding));
            assert_eq!(reader.size(), frames);

            let samples = reader.get_samples(0, frames).unwrap();
            let tolerance = encoding.epsilon() + 1e-6;
            for (i, &s) in samples.iter().enumerate() {
                assert!(
                    (f64::from(s) - signal(i)).abs() <= f64::from(tolerance),
                    "{encoding:?} extensible={extensible} frame {i}: {s} vs {}",
                    signal(i)
                );
            }
        }
    }
}

#[test]
fn float32_round_trips_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let signal = triangle(PERIOD);
    let path = WaveBuilder::new(Encoding::Float32, 1, 22_050)
        .with_signal(Encoding::Float32, 500, &[&signal])
        .write_to(dir.path(), "f32.wav");

    let reader = WaveFileReader::open(&path).unwrap();
    let samples = reader.get_samples(0, 500).unwrap();
    for (i, &s) in samples.iter().enumerate() {
        assert_eq!(s, signal(i) as f32, "frame {i}");
    }
}

#[test]
fn ten_second_stereo_float_file() {
    let dir = tempfile::tempdir().unwrap();
    // 1 kHz at 48 kHz is a 48-sample period.
    let left = sine(PERIOD);
    let right = triangle(PERIOD);
    let frames = 480_000;
    let path = WaveBuilder::new(Encoding::Float32, 2, 48_000)
        .with_signal(Encoding::Float32, frames, &[&left, &right])
        .write_to(dir.path(), "stereo.wav");

    let reader = WaveFileReader::open(&path).unwrap();
    let info = reader.info();
    assert_eq!(info.frame_rate, 48_000);
    assert_eq!(info.channel_count, 2);
    assert_eq!(info.frame_count, 480_000);
    assert_eq!(reader.duration_cs(), 1_000);

    let samples = reader.get_samples(0, frames).unwrap();
    assert_eq!(samples.len(), frames);
    for (i, &s) in samples.iter().enumerate().step_by(7) {
        let expected = (left(i) as f32 + right(i) as f32) / 2.0;
        assert_abs_diff_eq!(s, expected, epsilon = 1e-6);
    }
}

#[test]
fn split_reads_concatenate() {
    let dir = tempfile::tempdir().unwrap();
    let signal = sine(PERIOD);
    let path = WaveBuilder::new(Encoding::Int24, 3, 44_100)
        .with_signal(Encoding::Int24, 1_000, &[&signal, &signal, &signal])
        .write_to(dir.path(), "split.wav");
    let reader = WaveFileReader::open(&path).unwrap();

    let whole = reader.get_samples(0, 1_000).unwrap();
    for (a, b, c) in [(0, 0, 1_000), (0, 333, 1_000), (17, 18, 900), (999, 1_000, 1_000), (500, 500, 500)] {
        let mut joined = reader.get_samples(a, b).unwrap();
        joined.extend(reader.get_samples(b, c).unwrap());
        assert_eq!(joined, whole[a..c].to_vec(), "split {a}..{b}..{c}");
    }
}

#[test]
fn empty_ranges_are_empty() {
    let dir = tempfile::tempdir().unwrap();
    let signal = sine(PERIOD);
    let path = WaveBuilder::new(Encoding::Int16, 1, 8_000)
        .with_signal(Encoding::Int16, 100, &[&signal])
        .write_to(dir.path(), "short.wav");
    let reader = WaveFileReader::open(&path).unwrap();
    for n in [0, 50, 100] {
        assert!(reader.get_samples(n, n).unwrap().is_empty());
    }
}

#[test]
fn out_of_range_reads_fail_but_reader_stays_usable() {
    let dir = tempfile::tempdir().unwrap();
    let signal = sine(PERIOD);
    let path = WaveBuilder::new(Encoding::Int16, 1, 8_000)
        .with_signal(Encoding::Int16, 100, &[&signal])
        .write_to(dir.path(), "range.wav");
    let reader = WaveFileReader::open(&path).unwrap();

    let err = reader.get_samples(90, 101).unwrap_err();
    assert!(matches!(err, AudioError::Range { start: 90, end: 101, frame_count: 100 }));
    assert!(matches!(reader.get_samples(10, 5), Err(AudioError::Range { .. })));
    assert_eq!(reader.get_samples(90, 100).unwrap().len(), 10);
}

#[test]
fn zero_byte_file_is_invalid_container() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.wav");
    std::fs::write(&path, b"").unwrap();
    assert!(matches!(
        WaveFileReader::open(&path),
        Err(AudioError::InvalidContainer(_))
    ));
}

#[test]
fn missing_data_chunk_is_invalid_container() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = WaveBuilder::new(Encoding::Int16, 1, 8_000);
    builder.include_data_chunk = false;
    let path = builder.write_to(dir.path(), "nodata.wav");

    match WaveFileReader::open(&path) {
        Err(AudioError::InvalidContainer(message)) => assert_eq!(message, "missing data chunk"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn unsupported_codec_is_named() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = WaveBuilder::new(Encoding::Int16, 1, 8_000);
    builder.codec = 0x566F;
    let path = builder.write_to(dir.path(), "vorbis.wav");

    match WaveFileReader::open(&path) {
        Err(AudioError::UnsupportedFormat(message)) => {
            assert!(message.contains("0x566F"), "{message}")
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn extensible_with_unknown_subformat_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = WaveBuilder::new(Encoding::Int16, 1, 8_000);
    builder.extensible = true;
    builder.codec = 0x0055; // MP3
    let path = builder.write_to(dir.path(), "mp3.wav");
    assert!(matches!(
        WaveFileReader::open(&path),
        Err(AudioError::UnsupportedFormat(_))
    ));
}

#[test]
fn unknown_chunks_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let signal = sine(PERIOD);
    let mut builder = WaveBuilder::new(Encoding::Int16, 1, 8_000).with_signal(Encoding::Int16, 96, &[&signal]);
    // Odd length exercises the pad byte.
    builder.extra_chunk = Some((*b"LIST", vec![1, 2, 3, 4, 5]));
    let path = builder.write_to(dir.path(), "list.wav");

    let reader = WaveFileReader::open(&path).unwrap();
    assert_eq!(reader.size(), 96);
    assert_eq!(reader.info().data_offset, 12 + 24 + 14 + 8);
}

#[test]
fn nonexistent_path_is_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.wav");
    assert!(matches!(
        WaveFileReader::open(&path),
        Err(AudioError::FileNotFound { .. })
    ));
}

#[test]
fn directory_is_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        WaveFileReader::open(dir.path()),
        Err(AudioError::FileNotFound { .. })
    ));
}

#[test]
fn concurrent_reads_match_sequential_reads() {
    let dir = tempfile::tempdir().unwrap();
    let signal = sine(PERIOD);
    let frames = 48_000;
    let path = WaveBuilder::new(Encoding::Int16, 2, 48_000)
        .with_signal(Encoding::Int16, frames, &[&signal, &signal])
        .write_to(dir.path(), "concurrent.wav");
    let reader = Arc::new(WaveFileReader::open(&path).unwrap());

    let ranges: Vec<(usize, usize)> = (0..16).map(|i| (i * 2_500, i * 2_500 + 9_000)).collect();
    let sequential: Vec<_> = ranges
        .iter()
        .map(|&(a, b)| reader.get_samples(a, b).unwrap())
        .collect();

    let handles: Vec<_> = ranges
        .iter()
        .map(|&(a, b)| {
            let reader = Arc::clone(&reader);
            thread::spawn(move || reader.get_samples(a, b).unwrap())
        })
        .collect();
    for (handle, expected) in handles.into_iter().zip(&sequential) {
        assert_eq!(&handle.join().unwrap(), expected);
    }
}

#[tokio::test]
async fn async_reads_run_on_blocking_pool() {
    let dir = tempfile::tempdir().unwrap();
    let signal = triangle(PERIOD);
    let path = WaveBuilder::new(Encoding::Float64, 1, 16_000)
        .with_signal(Encoding::Float64, 16_000, &[&signal])
        .write_to(dir.path(), "async.wav");
    let reader = Arc::new(WaveFileReader::open(&path).unwrap());

    let tasks: Vec<_> = (0..8)
        .map(|i| tokio::spawn(Arc::clone(&reader).get_samples_async(i * 2_000, (i + 1) * 2_000)))
        .collect();
    let mut joined = Vec::new();
    for task in tasks {
        joined.extend(task.await.unwrap().unwrap());
    }
    assert_eq!(joined, reader.get_samples(0, 16_000).unwrap());
}

#[test]
fn close_is_idempotent_and_blocks_reads() {
    let dir = tempfile::tempdir().unwrap();
    let signal = sine(PERIOD);
    let path = WaveBuilder::new(Encoding::UInt8, 1, 8_000)
        .with_signal(Encoding::UInt8, 100, &[&signal])
        .write_to(dir.path(), "close.wav");
    let reader = WaveFileReader::open(&path).unwrap();

    reader.close();
    reader.close();
    assert!(reader.is_closed());
    assert!(matches!(reader.get_samples(0, 10), Err(AudioError::Closed)));
    // Metadata stays available.
    assert_eq!(reader.size(), 100);
}

#[test]
fn reads_files_written_by_hound() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hound.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 11_025,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let values: Vec<i16> = (0..1_000).map(|i| ((i * 37) % 20_000 - 10_000) as i16).collect();
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &v in &values {
        writer.write_sample(v).unwrap();
    }
    writer.finalize().unwrap();

    let reader = WaveFileReader::open(&path).unwrap();
    assert_eq!(reader.sample_rate(), 11_025);
    let samples = reader.get_samples(0, values.len()).unwrap();
    for (&s, &v) in samples.iter().zip(&values) {
        assert_eq!(s, f32::from(v) / 32_768.0);
    }
}
