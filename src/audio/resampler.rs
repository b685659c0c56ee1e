// Sample rate conversion using rubato
// Clips are converted once at decode time so the output callback never resamples

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use super::AudioBuffer;
use crate::error::{AudioError, Result};

/// Convert a decoded buffer to `target_rate`, returning it unchanged if it already matches
pub fn resample_to(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    let input_rate = buffer.sample_rate();
    if input_rate == target_rate || buffer.frames() == 0 {
        return Ok(buffer);
    }
    if input_rate == 0 || target_rate == 0 {
        return Err(AudioError::DecodeFailure(format!(
            "Cannot resample {}Hz to {}Hz",
            input_rate, target_rate
        )));
    }

    let channels = buffer.channels();
    debug!(
        "Resampling clip from {}Hz to {}Hz ({} channels, {} frames)",
        input_rate,
        target_rate,
        channels,
        buffer.frames()
    );

    let planar_input = deinterleave(buffer.samples(), channels as usize);
    let input_frames = planar_input[0].len();
    let ratio = target_rate as f64 / input_rate as f64;
    let expected_frames = (input_frames as f64 * ratio).round() as usize;

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        channels as usize,
    )
    .map_err(|e| AudioError::DecodeFailure(format!("Failed to create resampler: {}", e)))?;

    // Output starts `delay` frames late; keep flushing until the whole clip is out
    let delay = resampler.output_delay();
    let mut planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| AudioError::DecodeFailure(format!("Resampling failed: {}", e)))?;

    let wanted = delay + expected_frames;
    let mut flushes = 0;
    while planar_output[0].len() < wanted && flushes <= wanted + 8 {
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| AudioError::DecodeFailure(format!("Resampler flush failed: {}", e)))?;
        for (channel, samples) in planar_output.iter_mut().zip(tail) {
            channel.extend(samples);
        }
        flushes += 1;
    }

    for channel in &mut planar_output {
        channel.drain(..delay.min(channel.len()));
        channel.truncate(expected_frames);
    }

    let samples = interleave(&planar_output);
    if samples.is_empty() {
        return Err(AudioError::DecodeFailure(format!(
            "Resampling {} frames to {}Hz left no audio",
            input_frames, target_rate
        )));
    }

    Ok(AudioBuffer::new(samples, target_rate, channels))
}

/// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];

    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }

    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut interleaved = Vec::with_capacity(frames * planar.len());

    for frame in 0..frames {
        for channel in planar {
            interleaved.push(channel[frame]);
        }
    }

    interleaved
}
