// Audio output using cpal
// The stream lives on its own thread; voices reach the callback through a ring buffer

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedBufferSize};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::{mpsc, Arc};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::mixer::{Mixer, MAX_VOICES};
use super::{decoder, resampler, AudioBuffer, AudioContext, ContextFactory, ContextState, Voice};
use crate::config::PlayerConfig;
use crate::error::{AudioError, Result};

/// Voices started but not yet picked up by the callback
const VOICE_QUEUE_SIZE: usize = MAX_VOICES;

/// Upper bound on the mix scratch buffer; longer callbacks are mixed in slices
const MAX_CALLBACK_FRAMES: usize = 4096;

type VoiceProducer = ringbuf::HeapProd<Voice>;
type VoiceConsumer = ringbuf::HeapCons<Voice>;

enum StreamCommand {
    Resume(oneshot::Sender<Result<()>>),
    Close,
}

/// Native audio context: default (or named) cpal output device plus symphonia decoding
pub struct CpalContext {
    commands: Mutex<mpsc::Sender<StreamCommand>>,
    voices: Mutex<VoiceProducer>,
    state: Mutex<ContextState>,
    sample_rate: u32,
}

impl CpalContext {
    /// Open the output device and build its stream
    pub fn open(output_device: Option<&str>, start_suspended: bool) -> Result<Self> {
        let rb = HeapRb::<Voice>::new(VOICE_QUEUE_SIZE);
        let (producer, consumer) = rb.split();

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let device_name = output_device.map(str::to_string);

        // cpal streams are not Send on every host, so the stream never leaves this thread
        thread::Builder::new()
            .name("clipsloth-output".to_string())
            .spawn(move || {
                let (stream, sample_rate) =
                    match Self::build_output(device_name.as_deref(), consumer, start_suspended) {
                        Ok(opened) => opened,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                let _ = ready_tx.send(Ok(sample_rate));
                Self::serve(stream, command_rx);
            })
            .map_err(|e| AudioError::PlatformUnsupported(format!("Failed to spawn output thread: {}", e)))?;

        let sample_rate = ready_rx.recv().map_err(|_| {
            AudioError::PlatformUnsupported("Output thread exited during startup".to_string())
        })??;

        let state = if start_suspended {
            ContextState::Suspended
        } else {
            ContextState::Running
        };

        Ok(Self {
            commands: Mutex::new(command_tx),
            voices: Mutex::new(producer),
            state: Mutex::new(state),
            sample_rate,
        })
    }

    fn build_output(
        device_name: Option<&str>,
        consumer: VoiceConsumer,
        start_suspended: bool,
    ) -> Result<(Stream, u32)> {
        let host = cpal::default_host();
        let device = Self::select_device(&host, device_name)?;

        let config = device.default_output_config().map_err(|e| {
            AudioError::PlatformUnsupported(format!("Failed to get default output config: {}", e))
        })?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        let mixer = Mixer::new(channels);

        let callback_frames = match config.buffer_size() {
            SupportedBufferSize::Range { max, .. } => (*max as usize).min(MAX_CALLBACK_FRAMES),
            SupportedBufferSize::Unknown => MAX_CALLBACK_FRAMES,
        };
        let scratch_len = callback_frames.max(1) * channels.max(1) as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), consumer, mixer, scratch_len)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), consumer, mixer, scratch_len)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), consumer, mixer, scratch_len)?
            }
            format => {
                return Err(AudioError::PlatformUnsupported(format!(
                    "Unsupported sample format: {:?}",
                    format
                )))
            }
        };

        if start_suspended {
            // Some hosts start streams on build
            if let Err(e) = stream.pause() {
                debug!("Could not pause freshly built stream: {}", e);
            }
        } else {
            stream
                .play()
                .map_err(|e| AudioError::PlatformUnsupported(format!("Failed to start stream: {}", e)))?;
        }

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            channels,
            suspended = start_suspended,
            "Opened audio output"
        );

        Ok((stream, sample_rate))
    }

    fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<Device> {
        if let Some(name) = name {
            match host.output_devices() {
                Ok(mut devices) => {
                    if let Some(device) = devices.find(|d| d.name().map(|n| n == name).unwrap_or(false)) {
                        return Ok(device);
                    }
                    warn!("Output device {:?} not found, falling back to default", name);
                }
                Err(e) => warn!("Failed to enumerate output devices: {}", e),
            }
        }

        host.default_output_device()
            .ok_or_else(|| AudioError::PlatformUnsupported("No output device available".to_string()))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &Device,
        config: &StreamConfig,
        mut consumer: VoiceConsumer,
        mut mixer: Mixer,
        scratch_len: usize,
    ) -> Result<Stream> {
        // Allocated once here, never inside the callback
        let mut scratch = vec![0.0f32; scratch_len];

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // Voices beyond the mixer's capacity wait in the queue
                    while mixer.has_room() {
                        match consumer.try_pop() {
                            Some(voice) => mixer.add(voice),
                            None => break,
                        };
                    }

                    for chunk in data.chunks_mut(scratch.len()) {
                        let mix = &mut scratch[..chunk.len()];
                        mixer.render(mix);
                        for (sample, &value) in chunk.iter_mut().zip(mix.iter()) {
                            *sample = T::from_sample(value.clamp(-1.0, 1.0));
                        }
                    }
                },
                move |err| {
                    error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::PlatformUnsupported(format!("Failed to build output stream: {}", e)))
    }

    /// Owns the stream until the context goes away
    fn serve(stream: Stream, commands: mpsc::Receiver<StreamCommand>) {
        for command in commands {
            match command {
                StreamCommand::Resume(reply) => {
                    let result = stream
                        .play()
                        .map_err(|e| AudioError::ResumeFailure(e.to_string()));
                    let _ = reply.send(result);
                }
                StreamCommand::Close => break,
            }
        }
        debug!("Audio output stream closed");
    }
}

#[async_trait]
impl AudioContext for CpalContext {
    fn state(&self) -> ContextState {
        *self.state.lock()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn resume(&self) -> Result<()> {
        if self.state() == ContextState::Closed {
            return Err(AudioError::ResumeFailure("context is closed".to_string()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .lock()
            .send(StreamCommand::Resume(reply_tx))
            .map_err(|_| AudioError::ResumeFailure("output thread has stopped".to_string()))?;

        reply_rx
            .await
            .map_err(|_| AudioError::ResumeFailure("output thread has stopped".to_string()))??;

        *self.state.lock() = ContextState::Running;
        Ok(())
    }

    async fn decode_audio_data(&self, data: Bytes) -> Result<AudioBuffer> {
        let target_rate = self.sample_rate;
        tokio::task::spawn_blocking(move || {
            let buffer = decoder::decode_clip(data)?;
            resampler::resample_to(buffer, target_rate)
        })
        .await
        .map_err(|e| AudioError::DecodeFailure(format!("Decode task failed: {}", e)))?
    }

    fn start(&self, voice: Voice) -> Result<()> {
        if self.state() == ContextState::Closed {
            return Err(AudioError::PlaybackConstruction("context is closed".to_string()));
        }

        self.voices
            .lock()
            .try_push(voice)
            .map_err(|_| AudioError::PlaybackConstruction("too many voices pending".to_string()))
    }
}

impl Drop for CpalContext {
    fn drop(&mut self) {
        *self.state.lock() = ContextState::Closed;
        let _ = self.commands.lock().send(StreamCommand::Close);
    }
}

/// Opens a [`CpalContext`] with the configured device and start policy
#[derive(Debug, Clone, Default)]
pub struct CpalContextFactory {
    output_device: Option<String>,
    start_suspended: bool,
}

impl CpalContextFactory {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            output_device: config.output_device.clone(),
            start_suspended: config.start_suspended,
        }
    }
}

impl ContextFactory for CpalContextFactory {
    fn create(&self) -> Result<Arc<dyn AudioContext>> {
        let context = CpalContext::open(self.output_device.as_deref(), self.start_suspended)?;
        Ok(Arc::new(context))
    }
}
