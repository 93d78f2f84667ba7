//! Synthesized WAVE fixtures shared by the integration tests.
#![allow(dead_code)]

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

pub const PCM: u16 = 0x0001;
pub const IEEE_FLOAT: u16 = 0x0003;
pub const EXTENSIBLE: u16 = 0xFFFE;

/// The six on-disk encodings the reader supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    UInt8,
    Int16,
    Int24,
    Int32,
    Float32,
    Float64,
}

impl Encoding {
    pub const ALL: [Encoding; 6] = [
        Encoding::UInt8,
        Encoding::Int16,
        Encoding::Int24,
        Encoding::Int32,
        Encoding::Float32,
        Encoding::Float64,
    ];

    pub fn codec(self) -> u16 {
        match self {
            Encoding::Float32 | Encoding::Float64 => IEEE_FLOAT,
            _ => PCM,
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            Encoding::UInt8 => 8,
            Encoding::Int16 => 16,
            Encoding::Int24 => 24,
            Encoding::Int32 | Encoding::Float32 => 32,
            Encoding::Float64 => 64,
        }
    }

    pub fn epsilon(self) -> f32 {
        match self {
            Encoding::UInt8 => 1.0 / 128.0,
            Encoding::Int16 => 1.0 / 32_768.0,
            Encoding::Int24 => 1.0 / 8_388_608.0,
            Encoding::Int32 => 1.0 / 2_147_483_648.0,
            Encoding::Float32 | Encoding::Float64 => 0.0,
        }
    }

    /// Quantize one sample the way a typical encoder would.
    pub fn encode(self, value: f64, out: &mut Vec<u8>) {
        fn quantize(value: f64, scale: f64, min: f64, max: f64) -> i64 {
            (value * scale).round().clamp(min, max) as i64
        }
        match self {
            Encoding::UInt8 => {
                let v = quantize(value, 128.0, -128.0, 127.0) + 128;
                out.push(v as u8);
            }
            Encoding::Int16 => {
                let v = quantize(value, 32_768.0, -32_768.0, 32_767.0) as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
            Encoding::Int24 => {
                let v = quantize(value, 8_388_608.0, -8_388_608.0, 8_388_607.0) as i32;
                out.extend_from_slice(&v.to_le_bytes()[..3]);
            }
            Encoding::Int32 => {
                let v = quantize(value, 2_147_483_648.0, -2_147_483_648.0, 2_147_483_647.0) as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
            Encoding::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            Encoding::Float64 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

/// Builder for RIFF/WAVE byte images.
#[derive(Debug, Clone)]
pub struct WaveBuilder {
    pub codec: u16,
    pub bits: u16,
    pub channels: u16,
    pub rate: u32,
    /// Wrap the format in a `WAVE_FORMAT_EXTENSIBLE` descriptor.
    pub extensible: bool,
    pub include_data_chunk: bool,
    /// Extra chunk inserted between `fmt ` and `data`.
    pub extra_chunk: Option<([u8; 4], Vec<u8>)>,
    pub data: Vec<u8>,
}

impl WaveBuilder {
    pub fn new(encoding: Encoding, channels: u16, rate: u32) -> Self {
        Self {
            codec: encoding.codec(),
            bits: encoding.bits(),
            channels,
            rate,
            extensible: false,
            include_data_chunk: true,
            extra_chunk: None,
            data: Vec::new(),
        }
    }

    /// Interleave `channels` (one function per channel) for `frames` frames.
    pub fn with_signal(mut self, encoding: Encoding, frames: usize, channels: &[&dyn Fn(usize) -> f64]) -> Self {
        assert_eq!(channels.len(), usize::from(self.channels));
        self.data.clear();
        for i in 0..frames {
            for channel in channels {
                encoding.encode(channel(i), &mut self.data);
            }
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let block_align = self.channels * self.bits / 8;

        let mut fmt = Vec::new();
        let format_tag = if self.extensible { EXTENSIBLE } else { self.codec };
        fmt.extend_from_slice(&format_tag.to_le_bytes());
        fmt.extend_from_slice(&self.channels.to_le_bytes());
        fmt.extend_from_slice(&self.rate.to_le_bytes());
        fmt.extend_from_slice(&(self.rate * u32::from(block_align)).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&self.bits.to_le_bytes());
        if self.extensible {
            fmt.extend_from_slice(&22u16.to_le_bytes()); // cbSize
            fmt.extend_from_slice(&self.bits.to_le_bytes()); // valid bits
            fmt.extend_from_slice(&0u32.to_le_bytes()); // channel mask
            // Subformat GUID: codec in the first two bytes.
            fmt.extend_from_slice(&self.codec.to_le_bytes());
            fmt.extend_from_slice(&[
                0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
            ]);
        }

        let mut body = b"WAVE".to_vec();
        push_chunk(&mut body, b"fmt ", &fmt);
        if let Some((id, payload)) = &self.extra_chunk {
            push_chunk(&mut body, id, payload);
        }
        if self.include_data_chunk {
            push_chunk(&mut body, b"data", &self.data);
        }

        let mut file = b"RIFF".to_vec();
        file.extend_from_slice(&(body.len() as u32).to_le_bytes());
        file.extend_from_slice(&body);
        file
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("write fixture");
        path
    }
}

fn push_chunk(out: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

/// Sine with a period of `period` samples.
pub fn sine(period: usize) -> impl Fn(usize) -> f64 {
    move |i| {
        let t = (i % period) as f64 / period as f64;
        (t * 2.0 * PI).sin()
    }
}

/// Triangle in phase with [`sine`] of the same period.
pub fn triangle(period: usize) -> impl Fn(usize) -> f64 {
    move |i| {
        let t = (i % period) as f64 / period as f64;
        (((t + 0.75) % 1.0) * 4.0 - 2.0).abs() - 1.0
    }
}

/// `frames` samples of a sine at `freq` Hz and `rate` Hz.
pub fn sine_wave(freq: f64, rate: u32, frames: usize, amplitude: f64) -> Vec<f32> {
    (0..frames)
        .map(|n| (amplitude * (2.0 * PI * freq * n as f64 / f64::from(rate)).sin()) as f32)
        .collect()
}

/// A buzzy, speech-like vowel: 15 harmonics of `f0` with 1/k roll-off.
pub fn voiced(f0: f64, rate: u32, frames: usize, amplitude: f64) -> Vec<f32> {
    let norm: f64 = (1..=15).map(|k| 1.0 / k as f64).sum();
    (0..frames)
        .map(|n| {
            let t = n as f64 / f64::from(rate);
            let v: f64 = (1..=15)
                .map(|k| (2.0 * PI * f0 * k as f64 * t).sin() / k as f64)
                .sum();
            (amplitude * v / norm) as f32
        })
        .collect()
}
