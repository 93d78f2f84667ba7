//! RIFF/WAVE container reader with on-demand, positioned range decoding.
//!
//! ## Design
//!
//! The header is parsed once at open time into an immutable [`WaveFileInfo`].
//! Its [`SampleFormat`] selects the decoder; every `get_samples` call maps the
//! frame range to a byte window and issues a single positioned read, so
//! concurrent callers never contend for a shared file cursor. Multi-channel
//! frames are averaged down to mono while decoding.
//!
//! Only uncompressed PCM (8/16/24/32-bit) and IEEE float (32/64-bit) data is
//! supported, including both wrapped in the extensible format.
//!
//! ## Usage
//!
//! ```ignore
//! let reader = WaveFileReader::open("take-01.wav")?;
//! let first_second = reader.get_samples(0, reader.sample_rate() as usize)?;
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use super::{check_range, AudioSource, SampleArray};
use crate::error::{AudioError, Result};

/// Upper bound on channels. Not a format limit, just common sense.
pub const MAX_CHANNEL_COUNT: u16 = 6;

/// Highest accepted frame rate in Hz.
pub const MAX_FRAME_RATE: u32 = 192_000;

/// Largest frame count a reader will expose.
pub const MAX_FRAME_COUNT: u64 = i32::MAX as u64;

// ---------------------------------------------------------------------------
// Codec tags
// ---------------------------------------------------------------------------

/// The 16-bit format tag of a `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Codec(pub u16);

impl Codec {
    pub const PCM: Codec = Codec(0x0001);
    pub const IEEE_FLOAT: Codec = Codec(0x0003);
    pub const EXTENSIBLE: Codec = Codec(0xFFFE);

    /// Human-readable name for well-known tags.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0x0001 => "PCM",
            0x0002 => "Microsoft ADPCM",
            0x0003 => "IEEE Float",
            0x0005 => "IBM CVSD",
            0x0006 => "Microsoft A-law",
            0x0007 => "Microsoft µ-law",
            0x0008 => "Microsoft DTS",
            0x0009 => "DRM",
            0x000A => "WMA 9 Speech",
            0x0010 => "OKI-ADPCM",
            0x0011 => "Intel IMA/DVI-ADPCM",
            0x0020 => "Yamaha ADPCM",
            0x0031 => "Microsoft GSM 6.10",
            0x0040 => "Antex G.721 ADPCM",
            0x0045 => "ITU G.726 ADPCM",
            0x0050 => "MPEG",
            0x0055 => "ISO/MPEG Layer 3",
            0x0092 => "AC3 SPDIF",
            0x00FF => "AAC",
            0x0160 => "WMA",
            0x0161 => "WMA Pro",
            0x0162 => "WMA Pro",
            0x0163 => "WMA Lossless",
            0x1600 => "MPEG-2/4 AAC",
            0x1610 => "MPEG-4 HE-AAC",
            0x2000 => "Dolby AC3",
            0x2001 => "DTS",
            0x674F => "Ogg Vorbis",
            0x6750 => "Ogg Vorbis",
            0xF1AC => "Free Lossless Audio Codec FLAC",
            0xFFFE => "Extensible",
            0xFFFF => "Development",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Sample formats
// ---------------------------------------------------------------------------

/// On-disk encoding of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SampleFormat {
    UInt8,
    Int16,
    Int24,
    Int32,
    Float32,
    Float64,
}

impl SampleFormat {
    fn from_codec(codec: Codec, bits_per_sample: u16) -> Result<Self> {
        let bad_depth = || {
            AudioError::UnsupportedFormat(format!(
                "unsupported bit depth for {codec} data: {bits_per_sample} bits per sample"
            ))
        };
        match codec {
            Codec::PCM => match bits_per_sample {
                8 => Ok(Self::UInt8),
                16 => Ok(Self::Int16),
                24 => Ok(Self::Int24),
                32 => Ok(Self::Int32),
                _ => Err(bad_depth()),
            },
            Codec::IEEE_FLOAT => match bits_per_sample {
                32 => Ok(Self::Float32),
                64 => Ok(Self::Float64),
                _ => Err(bad_depth()),
            },
            other => Err(AudioError::UnsupportedFormat(format!(
                "unsupported audio codec: {other}; only the uncompressed codecs {} and {} are supported",
                Codec::PCM,
                Codec::IEEE_FLOAT
            ))),
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::Int16 => 2,
            Self::Int24 => 3,
            Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Largest decoding error relative to the analog value.
    pub fn quantization_epsilon(self) -> f32 {
        match self {
            Self::UInt8 => 1.0 / 128.0,
            Self::Int16 => 1.0 / 32_768.0,
            Self::Int24 => 1.0 / 8_388_608.0,
            Self::Int32 => 1.0 / 2_147_483_648.0,
            Self::Float32 | Self::Float64 => 0.0,
        }
    }

    /// Decode interleaved frames, appending one averaged sample per frame.
    fn decode_into(self, bytes: &[u8], channel_count: usize, out: &mut SampleArray) {
        match self {
            Self::UInt8 => downmix::<1>(bytes, channel_count, 1.0 / 128.0, out, |b| {
                (i32::from(b[0]) - 0x80) as f32
            }),
            Self::Int16 => downmix::<2>(bytes, channel_count, 1.0 / 32_768.0, out, |b| {
                f32::from(i16::from_le_bytes(b))
            }),
            Self::Int24 => downmix::<3>(bytes, channel_count, 1.0 / 8_388_608.0, out, |b| {
                // Place in the top three bytes, then shift back to sign-extend.
                (i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8) as f32
            }),
            Self::Int32 => downmix::<4>(bytes, channel_count, 1.0 / 2_147_483_648.0, out, |b| {
                i32::from_le_bytes(b) as f32
            }),
            Self::Float32 => downmix::<4>(bytes, channel_count, 1.0, out, f32::from_le_bytes),
            Self::Float64 => {
                let factor = 1.0 / channel_count as f64;
                for frame in bytes.chunks_exact(8 * channel_count) {
                    let sum: f64 = frame.chunks_exact(8).map(|s| f64::from_le_bytes(le_array(s))).sum();
                    out.push((sum * factor) as f32);
                }
            }
        }
    }
}

fn le_array<const W: usize>(slice: &[u8]) -> [u8; W] {
    let mut raw = [0u8; W];
    raw.copy_from_slice(slice);
    raw
}

fn downmix<const W: usize>(
    bytes: &[u8],
    channel_count: usize,
    scale: f32,
    out: &mut SampleArray,
    decode: impl Fn([u8; W]) -> f32,
) {
    let factor = scale / channel_count as f32;
    for frame in bytes.chunks_exact(W * channel_count) {
        let sum: f32 = frame.chunks_exact(W).map(|s| decode(le_array(s))).sum();
        out.push(sum * factor);
    }
}

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// Immutable description of an opened WAVE file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveFileInfo {
    pub sample_format: SampleFormat,
    pub channel_count: u16,
    pub frame_rate: u32,
    pub frame_count: usize,
    pub bytes_per_frame: usize,
    /// Byte offset of the first sample of the `data` chunk.
    pub data_offset: u64,
}

struct FormatInfo {
    sample_format: SampleFormat,
    channel_count: u16,
    frame_rate: u32,
    bytes_per_frame: usize,
}

struct DataInfo {
    offset: u64,
    byte_count: u64,
}

/// Little-endian field reader over the container header.
struct HeaderReader<R> {
    inner: R,
    len: u64,
}

fn header_io(e: io::Error) -> AudioError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        AudioError::InvalidContainer("unexpected end of file".into())
    } else {
        AudioError::Io(e)
    }
}

impl<R: Read + Seek> HeaderReader<R> {
    fn new(inner: R, len: u64) -> Self {
        Self { inner, len }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut raw = [0u8; N];
        self.inner.read_exact(&mut raw).map_err(header_io)?;
        Ok(raw)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        self.read_array()
    }

    fn skip(&mut self, count: i64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(count)).map_err(header_io)?;
        Ok(())
    }

    fn position(&mut self) -> Result<u64> {
        self.inner.stream_position().map_err(header_io)
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position)).map_err(header_io)?;
        Ok(())
    }
}

fn round_up_to_even(n: u64) -> u64 {
    (n + 1) & !1
}

fn parse_format_chunk<R: Read + Seek>(
    reader: &mut HeaderReader<R>,
    chunk_size: u64,
) -> Result<FormatInfo> {
    let mut codec = Codec(reader.read_u16()?);

    let channel_count = reader.read_u16()?;
    if channel_count > MAX_CHANNEL_COUNT {
        return Err(AudioError::UnsupportedFormat(format!(
            "channel count {channel_count} exceeds maximum value of {MAX_CHANNEL_COUNT}"
        )));
    }
    if channel_count == 0 {
        return Err(AudioError::UnsupportedFormat("file declares zero channels".into()));
    }

    let frame_rate = reader.read_u32()?;
    if frame_rate > MAX_FRAME_RATE {
        return Err(AudioError::UnsupportedFormat(format!(
            "sample rate {frame_rate} exceeds maximum of {MAX_FRAME_RATE}"
        )));
    }

    reader.skip(4)?; // bytes per second
    let bytes_per_frame = usize::from(reader.read_u16()?);
    let mut bits_per_sample = reader.read_u16()?;

    if chunk_size > 16 {
        let extension_size = reader.read_u16()?;
        if extension_size >= 22 {
            bits_per_sample = reader.read_u16()?; // valid bits
            reader.skip(4)?; // channel mask
            let sub_format = Codec(reader.read_u16()?);
            if codec == Codec::EXTENSIBLE {
                codec = sub_format;
            }
        }
    }

    let sample_format = SampleFormat::from_codec(codec, bits_per_sample)?;
    if bytes_per_frame != sample_format.bytes_per_sample() * usize::from(channel_count) {
        return Err(AudioError::UnsupportedFormat(format!(
            "unsupported sample structure: {bytes_per_frame} bytes per frame for {channel_count} channels of {bits_per_sample}-bit {codec}"
        )));
    }

    Ok(FormatInfo {
        sample_format,
        channel_count,
        frame_rate,
        bytes_per_frame,
    })
}

fn parse_wave_info<R: Read + Seek>(reader: &mut HeaderReader<R>) -> Result<WaveFileInfo> {
    if &reader.read_fourcc()? != b"RIFF" {
        return Err(AudioError::InvalidContainer("missing RIFF header".into()));
    }

    let root_size = u64::from(reader.read_u32()?);
    let expected_end = reader.position()? + root_size;
    if reader.len < expected_end {
        return Err(AudioError::InvalidContainer(format!(
            "file is incomplete: header declares {expected_end} bytes, found {}",
            reader.len
        )));
    }

    let wave_id = reader.read_fourcc()?;
    if &wave_id != b"WAVE" {
        return Err(AudioError::InvalidContainer(format!(
            "file format is not WAVE, but {}",
            String::from_utf8_lossy(&wave_id)
        )));
    }

    let mut format: Option<FormatInfo> = None;
    let mut data: Option<DataInfo> = None;

    while reader.position()? < expected_end && (format.is_none() || data.is_none()) {
        let chunk_id = reader.read_fourcc()?;
        let chunk_size = u64::from(reader.read_u32()?);
        let chunk_end = round_up_to_even(reader.position()? + chunk_size);
        match &chunk_id {
            b"fmt " => format = Some(parse_format_chunk(reader, chunk_size)?),
            b"data" => {
                data = Some(DataInfo {
                    offset: reader.position()?,
                    byte_count: chunk_size,
                })
            }
            _ => {}
        }
        reader.set_position(chunk_end)?;
    }

    let format = format.ok_or_else(|| AudioError::InvalidContainer("missing format chunk".into()))?;
    let data = data.ok_or_else(|| AudioError::InvalidContainer("missing data chunk".into()))?;

    let available = reader.len.saturating_sub(data.offset);
    let byte_count = if data.byte_count > available {
        warn!(
            declared = data.byte_count,
            available, "data chunk extends past end of file, clamping"
        );
        available
    } else {
        data.byte_count
    };

    let frame_count = byte_count / format.bytes_per_frame as u64;
    if frame_count > MAX_FRAME_COUNT {
        return Err(AudioError::UnsupportedFormat(format!(
            "cannot read audio file with more than {MAX_FRAME_COUNT} samples per channel"
        )));
    }

    Ok(WaveFileInfo {
        sample_format: format.sample_format,
        channel_count: format.channel_count,
        frame_rate: format.frame_rate,
        frame_count: frame_count as usize,
        bytes_per_frame: format.bytes_per_frame,
        data_offset: data.offset,
    })
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// An open WAVE file exposed as a mono [`AudioSource`].
///
/// Reads take a shared lock and never move a file cursor, so any number of
/// threads may call [`get_samples`](AudioSource::get_samples) concurrently.
pub struct WaveFileReader {
    path: PathBuf,
    info: WaveFileInfo,
    /// `None` once closed.
    file: RwLock<Option<File>>,
}

impl WaveFileReader {
    /// Open and validate a WAVE file.
    ///
    /// # Errors
    /// - [`AudioError::FileNotFound`] if `path` is not a readable file.
    /// - [`AudioError::InvalidContainer`] for malformed or truncated headers.
    /// - [`AudioError::UnsupportedFormat`] for codecs, depths, channel counts
    ///   or rates this reader does not handle.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let not_found = || AudioError::FileNotFound {
            path: path.to_path_buf(),
        };

        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => not_found(),
            _ => AudioError::Io(e),
        })?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        let info = {
            let mut header = HeaderReader::new(BufReader::new(&file), metadata.len());
            parse_wave_info(&mut header)?
        };

        info!(
            path = %path.display(),
            format = ?info.sample_format,
            channels = info.channel_count,
            frame_rate = info.frame_rate,
            frames = info.frame_count,
            "opened WAVE file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            file: RwLock::new(Some(file)),
        })
    }

    pub fn info(&self) -> &WaveFileInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the file handle. Calling this more than once is harmless.
    ///
    /// Reads issued afterwards fail with [`AudioError::Closed`].
    pub fn close(&self) {
        self.file.write().take();
    }

    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    /// Run [`get_samples`](AudioSource::get_samples) on tokio's blocking pool.
    pub async fn get_samples_async(self: Arc<Self>, start: usize, end: usize) -> Result<SampleArray> {
        tokio::task::spawn_blocking(move || self.get_samples(start, end))
            .await
            .map_err(|e| AudioError::Other(e.into()))?
    }
}

impl AudioSource for WaveFileReader {
    fn sample_rate(&self) -> u32 {
        self.info.frame_rate
    }

    fn size(&self) -> usize {
        self.info.frame_count
    }

    fn get_samples(&self, start: usize, end: usize) -> Result<SampleArray> {
        check_range(start, end, self.info.frame_count)?;

        let frames = end - start;
        let mut out = SampleArray::with_capacity(frames);
        if frames == 0 {
            return Ok(out);
        }

        let mut bytes = vec![0u8; frames * self.info.bytes_per_frame];
        let offset = self.info.data_offset + (start * self.info.bytes_per_frame) as u64;
        {
            let guard = self.file.read();
            let file = guard.as_ref().ok_or(AudioError::Closed)?;
            read_exact_at(file, &mut bytes, offset)?;
        }

        self.info.sample_format.decode_into(
            &bytes,
            usize::from(self.info.channel_count),
            &mut out,
        );
        Ok(out)
    }
}

impl fmt::Debug for WaveFileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaveFileReader")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("closed", &self.is_closed())
            .finish()
    }
}
