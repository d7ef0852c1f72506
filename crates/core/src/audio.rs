//! Raw audio payloads and the WAV container used at the transcription boundary

use std::io::Cursor;
use std::time::Duration;

use crate::{Error, Result};

/// Sample rates accepted on either side of the transport
pub const SUPPORTED_SAMPLE_RATES: [u32; 6] = [8000, 16000, 22050, 24000, 44100, 48000];

/// Bytes per 16-bit PCM sample
const PCM16_SAMPLE_WIDTH: usize = 2;

/// Interleaved 16-bit little-endian PCM audio
#[derive(Clone, PartialEq, Eq)]
pub struct AudioRaw {
    /// PCM16 LE bytes
    pub data: Vec<u8>,
    /// Samples per second
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub num_channels: u16,
}

impl std::fmt::Debug for AudioRaw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRaw")
            .field("bytes", &self.data.len())
            .field("sample_rate", &self.sample_rate)
            .field("num_channels", &self.num_channels)
            .finish()
    }
}

impl AudioRaw {
    /// Mono audio from raw PCM16 bytes
    pub fn mono(data: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            data,
            sample_rate,
            num_channels: 1,
        }
    }

    /// Mono audio from decoded samples
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::mono(data, sample_rate)
    }

    /// Number of samples per channel
    pub fn num_frames(&self) -> usize {
        let channels = self.num_channels.max(1) as usize;
        self.data.len() / (PCM16_SAMPLE_WIDTH * channels)
    }

    /// Playback duration
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.num_frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Wrap PCM16 LE bytes in a WAV container.
///
/// A trailing odd byte cannot form a sample and is dropped.
pub fn encode_wav(pcm: &[u8], sample_rate: u32, num_channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: num_channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
        for chunk in pcm.chunks_exact(PCM16_SAMPLE_WIDTH) {
            writer
                .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
                .map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;
    }

    Ok(cursor.into_inner())
}

fn wav_error(err: hound::Error) -> Error {
    Error::Audio(format!("WAV encoding failed: {}", err))
}
