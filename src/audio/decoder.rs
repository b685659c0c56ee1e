// Audio decoder using Symphonia
// Decodes an in-memory clip to interleaved f32 PCM

use bytes::Bytes;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::AudioBuffer;
use crate::error::{AudioError, Result};

pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl AudioDecoder {
    /// Probe the bytes and prepare a decoder for the first audio track
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

        // No extension to go on, rely on content probing
        let probed = symphonia::default::get_probe()
            .format(&Hint::new(), mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::DecodeFailure(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::DecodeFailure("No audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::DecodeFailure(format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    /// Decode next packet, returns interleaved f32 samples
    /// Returns None when end of stream is reached
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(AudioError::DecodeFailure(format!("Failed to read packet: {}", e)))
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    // Codec params can omit the layout; trust the decoded spec
                    let spec = *decoded.spec();
                    self.channels = spec.channels.count();
                    self.sample_rate = spec.rate;

                    let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    samples.copy_interleaved_ref(decoded);
                    return Ok(Some(samples.samples().to_vec()));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!("Decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => return Err(AudioError::DecodeFailure(format!("Decode failed: {}", e))),
            }
        }
    }

    /// Decode the whole clip into one buffer at its native rate
    pub fn decode_all(mut self) -> Result<AudioBuffer> {
        let mut samples = Vec::new();
        while let Some(chunk) = self.decode_next()? {
            samples.extend_from_slice(&chunk);
        }

        if samples.is_empty() {
            return Err(AudioError::DecodeFailure("No audio frames decoded".to_string()));
        }

        let channels = u16::try_from(self.channels).map_err(|_| {
            AudioError::DecodeFailure(format!("Unsupported channel count: {}", self.channels))
        })?;

        Ok(AudioBuffer::new(samples, self.sample_rate, channels))
    }
}

/// Decode a complete clip held in memory
pub fn decode_clip(data: Bytes) -> Result<AudioBuffer> {
    AudioDecoder::from_bytes(data)?.decode_all()
}
