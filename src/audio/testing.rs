// Fake platform for player tests: records voices instead of making sound

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use super::{AudioBuffer, AudioContext, ContextFactory, ContextState, GainNode, Voice};
use crate::error::{AudioError, Result};
use crate::fetch::Fetch;

/// Payload the fake context refuses to decode
pub const UNDECODABLE: &[u8] = b"not audio";

#[derive(Debug, Clone, PartialEq)]
pub struct StartedVoice {
    pub frames: usize,
    pub gain: f32,
}

pub struct FakeContext {
    state: Mutex<ContextState>,
    started: Mutex<Vec<StartedVoice>>,
    resume_calls: AtomicUsize,
    pub fail_resume: AtomicBool,
    pub fail_gain: AtomicBool,
}

impl FakeContext {
    pub fn new(state: ContextState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            started: Mutex::new(Vec::new()),
            resume_calls: AtomicUsize::new(0),
            fail_resume: AtomicBool::new(false),
            fail_gain: AtomicBool::new(false),
        })
    }

    pub fn started(&self) -> Vec<StartedVoice> {
        self.started.lock().clone()
    }

    pub fn resume_calls(&self) -> usize {
        self.resume_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioContext for FakeContext {
    fn state(&self) -> ContextState {
        *self.state.lock()
    }

    fn sample_rate(&self) -> u32 {
        44100
    }

    async fn resume(&self) -> Result<()> {
        self.resume_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_resume.load(Ordering::SeqCst) {
            return Err(AudioError::ResumeFailure("blocked by autoplay policy".to_string()));
        }
        *self.state.lock() = ContextState::Running;
        Ok(())
    }

    async fn decode_audio_data(&self, data: Bytes) -> Result<AudioBuffer> {
        if &data[..] == UNDECODABLE {
            return Err(AudioError::DecodeFailure("unrecognised format".to_string()));
        }
        // One mono frame per input byte
        Ok(AudioBuffer::new(vec![0.5; data.len()], 44100, 1))
    }

    fn create_gain(&self, gain: f32) -> Result<GainNode> {
        if self.fail_gain.load(Ordering::SeqCst) {
            return Err(AudioError::PlaybackConstruction("gain node unavailable".to_string()));
        }
        Ok(GainNode::new(gain))
    }

    fn start(&self, voice: Voice) -> Result<()> {
        self.started.lock().push(StartedVoice {
            frames: voice.buffer().frames(),
            gain: voice.gain(),
        });
        Ok(())
    }
}

/// Hands out one shared fake context, or fails like an unsupported platform.
/// Clones share the attempt counter.
#[derive(Clone)]
pub struct FakeFactory {
    context: Option<Arc<FakeContext>>,
    created: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn new(context: Arc<FakeContext>) -> Self {
        Self {
            context: Some(context),
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            context: None,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ContextFactory for FakeFactory {
    fn create(&self) -> Result<Arc<dyn AudioContext>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        match &self.context {
            Some(context) => Ok(Arc::clone(context) as Arc<dyn AudioContext>),
            None => Err(AudioError::PlatformUnsupported("no audio in this test".to_string())),
        }
    }
}

/// Serves canned payloads by URL; anything else is a network error
#[derive(Default)]
pub struct FakeFetcher {
    files: HashMap<String, Bytes>,
}

impl FakeFetcher {
    pub fn with(mut self, url: &str, data: &'static [u8]) -> Self {
        self.files.insert(url.to_string(), Bytes::from_static(data));
        self
    }
}

#[async_trait]
impl Fetch for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| AudioError::fetch(url, "connection refused"))
    }
}

/// Collects formatted log lines emitted on the current thread while the guard lives
#[derive(Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    /// True when some line at `level` ("WARN", "ERROR", ...) contains `text`
    pub fn has(&self, level: &str, text: &str) -> bool {
        let output = String::from_utf8_lossy(&self.lines.lock()).into_owned();
        output
            .lines()
            .any(|line| line.contains(level) && line.contains(text))
    }
}

pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(Arc::clone(&self.lines))
    }
}
