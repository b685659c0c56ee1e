// Voice mixer driven by the output callback
// Every started voice is summed into the output until its buffer runs out

use std::sync::Arc;

use super::Voice;

/// Voices sounding at once; the voice list never grows past this
pub const MAX_VOICES: usize = 64;

/// A voice that is currently sounding
struct ActiveVoice {
    samples: Arc<[f32]>,
    channels: usize,
    gain: f32,
    position: usize, // in frames
}

impl ActiveVoice {
    fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    fn finished(&self) -> bool {
        self.position >= self.frames()
    }
}

pub struct Mixer {
    voices: Vec<ActiveVoice>,
    output_channels: usize,
}

impl Mixer {
    pub fn new(output_channels: u16) -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
            output_channels: output_channels.max(1) as usize,
        }
    }

    pub fn has_room(&self) -> bool {
        self.voices.len() < MAX_VOICES
    }

    /// Start mixing `voice`; refused (false) when the mixer is full
    pub fn add(&mut self, voice: Voice) -> bool {
        if !self.has_room() {
            return false;
        }
        let buffer = voice.buffer();
        self.voices.push(ActiveVoice {
            samples: buffer.shared_samples(),
            channels: buffer.channels() as usize,
            gain: voice.gain(),
            position: 0,
        });
        true
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Overwrite `out` (interleaved, output channel count) with the mix of all voices
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let out_channels = self.output_channels;

        for voice in &mut self.voices {
            for frame in out.chunks_exact_mut(out_channels) {
                if voice.finished() {
                    break;
                }
                let base = voice.position * voice.channels;
                for (ch, sample) in frame.iter_mut().enumerate() {
                    // Mono fans out to every channel; extra output channels wrap around
                    let src = ch % voice.channels;
                    *sample += voice.samples[base + src] * voice.gain;
                }
                voice.position += 1;
            }
        }

        self.voices.retain(|v| !v.finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBuffer, GainNode, SourceNode};

    fn voice(samples: Vec<f32>, channels: u16, gain: f32) -> Voice {
        SourceNode::new(AudioBuffer::new(samples, 44100, channels)).connect(GainNode::new(gain))
    }

    #[test]
    fn test_overlapping_voices_are_summed() {
        let mut mixer = Mixer::new(1);
        assert!(mixer.add(voice(vec![1.0, 1.0], 1, 0.5)));
        assert!(mixer.add(voice(vec![1.0, 1.0], 1, 0.25)));

        let mut out = [0.0f32; 2];
        mixer.render(&mut out);
        assert_eq!(out, [0.75, 0.75]);
    }

    #[test]
    fn test_finished_voices_are_dropped() {
        let mut mixer = Mixer::new(2);
        mixer.add(voice(vec![0.5, 0.5], 1, 1.0));

        let mut out = [0.0f32; 8];
        mixer.render(&mut out);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_voice_spans_multiple_callbacks() {
        let mut mixer = Mixer::new(1);
        mixer.add(voice(vec![0.1, 0.2, 0.3], 1, 1.0));

        let mut out = [0.0f32; 2];
        mixer.render(&mut out);
        assert_eq!(out, [0.1, 0.2]);
        assert_eq!(mixer.active_voices(), 1);

        mixer.render(&mut out);
        assert_eq!(out, [0.3, 0.0]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_voice_count_is_capped() {
        let mut mixer = Mixer::new(1);
        for _ in 0..MAX_VOICES {
            assert!(mixer.add(voice(vec![0.0; 4], 1, 1.0)));
        }
        assert!(!mixer.has_room());
        assert!(!mixer.add(voice(vec![0.0; 4], 1, 1.0)));
        assert_eq!(mixer.active_voices(), MAX_VOICES);

        let mut out = [0.0f32; 4];
        mixer.render(&mut out);
        assert!(mixer.has_room());
    }

    #[test]
    fn test_stereo_voice_on_stereo_output() {
        let mut mixer = Mixer::new(2);
        mixer.add(voice(vec![0.25, -0.25], 2, 1.0));

        let mut out = [0.0f32; 2];
        mixer.render(&mut out);
        assert_eq!(out, [0.25, -0.25]);
    }
}
