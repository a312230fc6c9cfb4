//! Audio Encoder - 基于 symphonia / opus 的片段编码器
//!
//! 支持：
//! - f32 采样 → 16-bit PCM WAV
//! - f32 采样 → Opus (OGG 容器)
//! - 同格式片段文件的顺序拼接

use ogg::reading::PacketReader;
use ogg::writing::PacketWriter;
use opus::{Application, Channels, Decoder, Encoder};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::ports::{AudioEncoderPort, AudioFormat, EncodeError, EncodeResult};

const DEFAULT_OPUS_BITRATE: u32 = 32000;
/// Opus 帧长 20ms
const OPUS_FRAME_MS: usize = 20;
const OPUS_MAX_PACKET: usize = 4000;

/// 片段编码器
pub struct SegmentEncoder {
    format: AudioFormat,
    opus_bitrate: u32,
}

/// 解码后的单声道 PCM
#[derive(Debug)]
struct Pcm {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SegmentEncoder {
    pub fn new(format: AudioFormat, opus_bitrate: Option<u32>) -> Self {
        Self {
            format,
            opus_bitrate: opus_bitrate.unwrap_or(DEFAULT_OPUS_BITRATE),
        }
    }

    fn render(&self, pcm: &Pcm) -> Result<Vec<u8>, EncodeError> {
        match self.format {
            AudioFormat::Wav => Ok(encode_wav(pcm)),
            AudioFormat::Opus => self.encode_opus(pcm),
        }
    }

    fn decode(&self, path: &Path) -> Result<Pcm, EncodeError> {
        match self.format {
            AudioFormat::Wav => decode_wav(path),
            AudioFormat::Opus => decode_opus(path),
        }
    }

    /// 将 PCM 编码为 Opus (OGG 容器)
    fn encode_opus(&self, pcm: &Pcm) -> Result<Vec<u8>, EncodeError> {
        let sample_rate = opus_compatible_rate(pcm.sample_rate);
        let samples = resample(&pcm.samples, pcm.sample_rate, sample_rate);

        let mut encoder = Encoder::new(sample_rate, Channels::Mono, Application::Voip)
            .map_err(|e| EncodeError::EncodingError(format!("Failed to create Opus encoder: {}", e)))?;
        encoder
            .set_bitrate(opus::Bitrate::Bits(self.opus_bitrate as i32))
            .map_err(|e| EncodeError::EncodingError(format!("Failed to set bitrate: {}", e)))?;

        let pre_skip = encoder.get_lookahead().map(|l| l as u16).unwrap_or(312);
        let pcm_i16 = to_i16(&samples);
        let frame_size = sample_rate as usize * OPUS_FRAME_MS / 1000;

        let mut ogg_data = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut ogg_data);
            writer
                .write_packet(opus_head(sample_rate, pre_skip), 0, ogg::PacketWriteEndInfo::EndPage, 0)
                .map_err(|e| EncodeError::EncodingError(format!("Failed to write Opus head: {}", e)))?;
            writer
                .write_packet(opus_tags(), 0, ogg::PacketWriteEndInfo::EndPage, 0)
                .map_err(|e| EncodeError::EncodingError(format!("Failed to write Opus tags: {}", e)))?;

            // granule position 以 48kHz 计
            let granule_scale = 48000.0 / sample_rate as f64;
            let frame_granule = (frame_size as f64 * granule_scale) as u64;
            let mut granule_pos = (pre_skip as f64 * granule_scale) as u64;

            // 额外的静音帧用于冲出编码器缓冲
            let flush_frames = (pre_skip as usize + frame_size - 1) / frame_size;
            let mut frames: Vec<Vec<i16>> = pcm_i16
                .chunks(frame_size)
                .map(|chunk| {
                    let mut frame = chunk.to_vec();
                    frame.resize(frame_size, 0);
                    frame
                })
                .collect();
            frames.extend(std::iter::repeat(vec![0i16; frame_size]).take(flush_frames.max(1)));

            let total = frames.len();
            let mut out = vec![0u8; OPUS_MAX_PACKET];
            for (idx, frame) in frames.iter().enumerate() {
                let len = encoder
                    .encode(frame, &mut out)
                    .map_err(|e| EncodeError::EncodingError(format!("Opus encode failed: {}", e)))?;
                granule_pos += frame_granule;
                let end_info = if idx + 1 == total {
                    ogg::PacketWriteEndInfo::EndStream
                } else {
                    ogg::PacketWriteEndInfo::NormalPacket
                };
                writer
                    .write_packet(out[..len].to_vec(), 0, end_info, granule_pos)
                    .map_err(|e| EncodeError::EncodingError(format!("Failed to write Opus packet: {}", e)))?;
            }
        }

        Ok(ogg_data)
    }
}

impl AudioEncoderPort for SegmentEncoder {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn encode(
        &self,
        samples: &[f32],
        sample_rate: u32,
        dest: &Path,
    ) -> Result<EncodeResult, EncodeError> {
        if sample_rate == 0 {
            return Err(EncodeError::InvalidInput("sample rate is zero".to_string()));
        }
        let pcm = Pcm {
            samples: samples.to_vec(),
            sample_rate,
        };
        let bytes = self.render(&pcm)?;
        write_atomic(dest, &bytes)?;

        tracing::debug!(
            path = %dest.display(),
            format = %self.format,
            size = bytes.len(),
            "Encoded segment audio"
        );

        Ok(EncodeResult {
            path: dest.to_path_buf(),
            duration_ms: duration_ms(samples.len(), sample_rate),
            size_bytes: bytes.len() as u64,
        })
    }

    fn concat(&self, sources: &[PathBuf], dest: &Path) -> Result<EncodeResult, EncodeError> {
        if sources.is_empty() {
            return Err(EncodeError::InvalidInput("nothing to concatenate".to_string()));
        }

        let mut merged: Vec<f32> = Vec::new();
        let mut sample_rate = 0u32;
        for source in sources {
            let pcm = self.decode(source)?;
            if sample_rate == 0 {
                sample_rate = pcm.sample_rate;
            }
            merged.extend(resample(&pcm.samples, pcm.sample_rate, sample_rate));
        }

        let pcm = Pcm {
            samples: merged,
            sample_rate,
        };
        let bytes = self.render(&pcm)?;
        write_atomic(dest, &bytes)?;

        Ok(EncodeResult {
            path: dest.to_path_buf(),
            duration_ms: duration_ms(pcm.samples.len(), sample_rate),
            size_bytes: bytes.len() as u64,
        })
    }
}

impl Default for SegmentEncoder {
    fn default() -> Self {
        Self::new(AudioFormat::Wav, None)
    }
}

fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), EncodeError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, dest)?;
    Ok(())
}

fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples as u64 * 1000 / sample_rate as u64
}

fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

/// 单声道 16-bit PCM WAV
fn encode_wav(pcm: &Pcm) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let num_channels: u16 = 1;
    let byte_rate = pcm.sample_rate * num_channels as u32 * (bits_per_sample / 8) as u32;
    let block_align = num_channels * (bits_per_sample / 8);

    let data = to_i16(&pcm.samples);
    let data_size = data.len() * 2;
    let mut wav = Vec::with_capacity(44 + data_size);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&((36 + data_size) as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&num_channels.to_le_bytes());
    wav.extend_from_slice(&pcm.sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_size as u32).to_le_bytes());
    for sample in data {
        wav.extend_from_slice(&sample.to_le_bytes());
    }
    wav
}

/// 使用 symphonia 解码 WAV，多声道取平均
fn decode_wav(path: &Path) -> Result<Pcm, EncodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| EncodeError::DecodingError(format!("Probe failed: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| EncodeError::DecodingError("No audio track found".to_string()))?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| EncodeError::DecodingError("Unknown sample rate".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| EncodeError::DecodingError(format!("Decoder creation failed: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(EncodeError::DecodingError(format!("Packet read error: {}", e)));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Decode error (skipping packet)");
                continue;
            }
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        let channels = spec.channels.count().max(1);
        let mut buf = SampleBuffer::<f32>::new(frames as u64, spec);
        buf.copy_interleaved_ref(decoded);
        let interleaved = &buf.samples()[..frames * channels];
        samples.extend(
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    Ok(Pcm {
        samples,
        sample_rate,
    })
}

/// 解码本编码器写出的单声道 Ogg/Opus 文件
fn decode_opus(path: &Path) -> Result<Pcm, EncodeError> {
    let file = File::open(path)?;
    let mut reader = PacketReader::new(BufReader::new(file));

    let head = reader
        .read_packet()
        .map_err(|e| EncodeError::DecodingError(e.to_string()))?
        .ok_or_else(|| EncodeError::DecodingError("Missing Opus head".to_string()))?;
    let (sample_rate, pre_skip) = parse_opus_head(&head.data)?;

    // OpusTags
    reader
        .read_packet()
        .map_err(|e| EncodeError::DecodingError(e.to_string()))?;

    let mut decoder = Decoder::new(sample_rate, Channels::Mono)
        .map_err(|e| EncodeError::DecodingError(format!("Failed to create Opus decoder: {}", e)))?;
    let max_frame = sample_rate as usize * 120 / 1000;
    let mut out = vec![0i16; max_frame];
    let mut samples: Vec<f32> = Vec::new();

    while let Some(packet) = reader
        .read_packet()
        .map_err(|e| EncodeError::DecodingError(e.to_string()))?
    {
        let n = decoder
            .decode(&packet.data, &mut out, false)
            .map_err(|e| EncodeError::DecodingError(format!("Opus decode failed: {}", e)))?;
        samples.extend(out[..n].iter().map(|&s| s as f32 / 32768.0));
    }

    let skip = (pre_skip as usize).min(samples.len());
    samples.drain(..skip);
    Ok(Pcm {
        samples,
        sample_rate,
    })
}

fn parse_opus_head(data: &[u8]) -> Result<(u32, u16), EncodeError> {
    if data.len() < 19 || &data[0..8] != b"OpusHead" {
        return Err(EncodeError::DecodingError("Invalid Opus head".to_string()));
    }
    let pre_skip = u16::from_le_bytes([data[10], data[11]]);
    let rate = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
    Ok((opus_compatible_rate(rate), pre_skip))
}

/// Opus 支持: 8000, 12000, 16000, 24000, 48000
fn opus_compatible_rate(sample_rate: u32) -> u32 {
    match sample_rate {
        8000 | 12000 | 16000 | 24000 | 48000 => sample_rate,
        r if r <= 8000 => 8000,
        r if r <= 12000 => 12000,
        r if r <= 16000 => 16000,
        r if r <= 24000 => 24000,
        _ => 48000,
    }
}

/// 单声道线性重采样
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;
    let last = samples.len() - 1;
    (0..new_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = (pos as usize).min(last);
            let frac = (pos - idx as f64) as f32;
            let s0 = samples[idx];
            let s1 = samples[(idx + 1).min(last)];
            s0 + (s1 - s0) * frac
        })
        .collect()
}

/// Opus Head 包 (RFC 7845)
fn opus_head(sample_rate: u32, pre_skip: u16) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(1); // channels
    head.extend_from_slice(&pre_skip.to_le_bytes());
    head.extend_from_slice(&sample_rate.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0); // mapping family
    head
}

fn opus_tags() -> Vec<u8> {
    let vendor = "pronouncex";
    let mut tags = Vec::new();
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor.as_bytes());
    tags.extend_from_slice(&0u32.to_le_bytes());
    tags
}

#[cfg(test)]
fn wav_info(bytes: &[u8]) -> Option<(u32, u16)> {
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }
    let rate = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
    let channels = u16::from_le_bytes([bytes[22], bytes[23]]);
    Some((rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tone(seconds: f32, sample_rate: u32) -> Vec<f32> {
        let n = (seconds * sample_rate as f32) as usize;
        (0..n)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / sample_rate as f32).sin() * 0.3)
            .collect()
    }

    #[test]
    fn test_encode_wav_header() {
        let dir = tempdir().unwrap();
        let encoder = SegmentEncoder::default();
        let dest = dir.path().join("a.wav");

        let result = encoder.encode(&tone(1.0, 16000), 16000, &dest).unwrap();
        assert!(result.duration_ms >= 990 && result.duration_ms <= 1010);

        let bytes = std::fs::read(&dest).unwrap();
        assert_eq!(wav_info(&bytes), Some((16000, 1)));
        assert_eq!(bytes.len() as u64, result.size_bytes);
    }

    #[test]
    fn test_concat_wav_sums_durations() {
        let dir = tempdir().unwrap();
        let encoder = SegmentEncoder::default();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        encoder.encode(&tone(0.5, 22050), 22050, &a).unwrap();
        encoder.encode(&tone(0.25, 22050), 22050, &b).unwrap();

        let merged = dir.path().join("merged.wav");
        let result = encoder.concat(&[a, b], &merged).unwrap();
        assert!(result.duration_ms >= 740 && result.duration_ms <= 760);
        assert!(merged.exists());
    }

    #[test]
    fn test_encode_and_concat_opus() {
        let dir = tempdir().unwrap();
        let encoder = SegmentEncoder::new(AudioFormat::Opus, Some(24000));
        let a = dir.path().join("a.ogg");
        let b = dir.path().join("b.ogg");
        encoder.encode(&tone(0.5, 22050), 22050, &a).unwrap();
        encoder.encode(&tone(0.5, 22050), 22050, &b).unwrap();

        let bytes = std::fs::read(&a).unwrap();
        assert_eq!(&bytes[0..4], b"OggS");

        let merged = dir.path().join("merged.ogg");
        let result = encoder.concat(&[a, b], &merged).unwrap();
        assert!(result.duration_ms >= 900);
    }

    #[test]
    fn test_concat_requires_sources() {
        let dir = tempdir().unwrap();
        let encoder = SegmentEncoder::default();
        assert!(encoder.concat(&[], &dir.path().join("x.wav")).is_err());
    }
}
