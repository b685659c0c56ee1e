// Audio context abstraction
// The player only talks to these traits; cpal/symphonia live behind CpalContext

pub mod decoder;
pub mod mixer;
pub mod output;
pub mod resampler;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AudioError, Result};

pub use output::{CpalContext, CpalContextFactory};

/// Lifecycle of a created context. "Not created" is the absence of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Decoded, ready-to-play sample data
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Build a buffer from interleaved samples
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub(crate) fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// One-shot playback node bound to a buffer; consumed when started
#[derive(Debug)]
pub struct SourceNode {
    buffer: AudioBuffer,
}

impl SourceNode {
    pub fn new(buffer: AudioBuffer) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    /// Route this source through a gain stage
    pub fn connect(self, gain: GainNode) -> Voice {
        Voice { source: self, gain }
    }
}

/// Scalar volume multiplier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainNode {
    gain: f32,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

/// A source routed through a gain node, ready to be connected to the destination
#[derive(Debug)]
pub struct Voice {
    source: SourceNode,
    gain: GainNode,
}

impl Voice {
    pub fn buffer(&self) -> &AudioBuffer {
        self.source.buffer()
    }

    pub fn gain(&self) -> f32 {
        self.gain.gain()
    }
}

/// Handle to an audio processing graph and its output destination
#[async_trait]
pub trait AudioContext: Send + Sync {
    fn state(&self) -> ContextState;

    /// Sample rate of the destination
    fn sample_rate(&self) -> u32;

    /// Move a suspended context to running
    async fn resume(&self) -> Result<()>;

    /// Decode raw bytes into a buffer playable on this context
    async fn decode_audio_data(&self, data: Bytes) -> Result<AudioBuffer>;

    fn create_buffer_source(&self, buffer: AudioBuffer) -> Result<SourceNode> {
        Ok(SourceNode::new(buffer))
    }

    fn create_gain(&self, gain: f32) -> Result<GainNode> {
        if !gain.is_finite() {
            return Err(AudioError::PlaybackConstruction(format!("invalid gain {}", gain)));
        }
        Ok(GainNode::new(gain))
    }

    /// Connect the voice to the destination and start it immediately
    fn start(&self, voice: Voice) -> Result<()>;
}

/// Creates audio contexts on demand
pub trait ContextFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn AudioContext>>;
}

impl<F> ContextFactory for F
where
    F: Fn() -> Result<Arc<dyn AudioContext>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn AudioContext>> {
        self()
    }
}
