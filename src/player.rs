// Clip player
// Preloads clips by name and fires one-shot voices; every failure is logged, never returned
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioBuffer, AudioContext, ContextFactory, ContextState, CpalContextFactory};
use crate::config::{PlayerConfig, DEFAULT_VOLUME};
use crate::error::{AudioError, Result};
use crate::fetch::{DefaultFetcher, Fetch};

/// Global enable toggle and volume read by every `play`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    pub enabled: bool,
    pub volume: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: DEFAULT_VOLUME,
        }
    }
}

/// Completion of a `load` call. Settles on success and failure alike.
#[must_use = "dropping a LoadHandle does not cancel the load"]
pub struct LoadHandle(Option<JoinHandle<()>>);

impl LoadHandle {
    /// Wait until the load has finished; the outcome is only visible in the logs
    pub async fn settled(self) {
        if let Some(task) = self.0 {
            if let Err(e) = task.await {
                warn!("Clip load task did not finish: {}", e);
            }
        }
    }
}

/// What a `play` call ended up doing when it didn't fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Played {
    Disabled,
    NoContext,
    Started,
}

struct Inner {
    factory: Box<dyn ContextFactory>,
    fetcher: Box<dyn Fetch>,
    context: Mutex<Option<Arc<dyn AudioContext>>>,
    buffers: Mutex<HashMap<String, AudioBuffer>>,
    settings: Mutex<PlaybackSettings>,
}

/// Cheap to clone; clones share the context, the loaded clips and the settings
#[derive(Clone)]
pub struct AudioPlayer {
    inner: Arc<Inner>,
}

impl AudioPlayer {
    pub fn new(factory: impl ContextFactory + 'static, fetcher: impl Fetch + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory: Box::new(factory),
                fetcher: Box::new(fetcher),
                context: Mutex::new(None),
                buffers: Mutex::new(HashMap::new()),
                settings: Mutex::new(PlaybackSettings::default()),
            }),
        }
    }

    /// Player on the native output device, with the config's initial settings applied
    pub fn from_config(config: &PlayerConfig) -> Result<Self> {
        let player = Self::new(
            CpalContextFactory::from_config(config),
            DefaultFetcher::from_config(config)?,
        );
        player.set_enabled(config.enabled);
        player.set_volume(config.volume);
        Ok(player)
    }

    /// Create the audio context if it doesn't exist yet
    pub fn initialize(&self) {
        let _ = self.context();
    }

    /// Existing context, or a freshly created one. None means the platform has no audio.
    fn context(&self) -> Option<Arc<dyn AudioContext>> {
        let mut slot = self.inner.context.lock();
        if let Some(context) = slot.as_ref() {
            return Some(Arc::clone(context));
        }

        match self.inner.factory.create() {
            Ok(context) => {
                info!(sample_rate = context.sample_rate(), state = ?context.state(), "Audio context created");
                *slot = Some(Arc::clone(&context));
                Some(context)
            }
            Err(e) => {
                warn!("Audio is not available, playback disabled: {}", e);
                None
            }
        }
    }

    /// Fetch and decode `url` in the background, registering it as `name` on success
    pub fn load(&self, name: impl Into<String>, url: impl Into<String>) -> LoadHandle {
        let Some(context) = self.context() else {
            return LoadHandle(None);
        };

        let name = name.into();
        let url = url.into();
        let inner = Arc::clone(&self.inner);

        LoadHandle(spawn_detached("clip load", async move {
            match fetch_and_decode(&inner, context.as_ref(), &url).await {
                Ok(buffer) => {
                    debug!(name = %name, frames = buffer.frames(), "Clip loaded");
                    inner.buffers.lock().insert(name, buffer);
                }
                Err(e) => warn!(name = %name, url = %url, "Clip not loaded: {}", e),
            }
        }))
    }

    /// Fire one voice of `name` at the current volume
    pub fn play(&self, name: &str) {
        match self.try_play(name) {
            Ok(_) => {}
            Err(e @ AudioError::MissingBuffer(_)) => warn!("{}", e),
            Err(e) => error!(name, "Error playing sound: {}", e),
        }
    }

    fn try_play(&self, name: &str) -> Result<Played> {
        let settings = self.settings();
        if !settings.enabled {
            return Ok(Played::Disabled);
        }

        let Some(context) = self.context() else {
            return Ok(Played::NoContext);
        };

        if context.state() == ContextState::Suspended {
            request_resume(&context);
        }

        let buffer = self
            .inner
            .buffers
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| AudioError::MissingBuffer(name.to_string()))?;

        let source = context.create_buffer_source(buffer)?;
        let gain = context.create_gain(settings.volume)?;
        context.start(source.connect(gain))?;

        Ok(Played::Started)
    }

    /// Ask a suspended context to start running. Never creates a context.
    pub fn resume(&self) {
        let context = self.inner.context.lock().clone();
        if let Some(context) = context {
            if context.state() == ContextState::Suspended {
                request_resume(&context);
            }
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.settings.lock().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.settings.lock().enabled
    }

    /// Clamped to 0.0 - 1.0; applies to voices started after this call
    pub fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            warn!("Ignoring NaN volume");
            return;
        }
        self.inner.settings.lock().volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.inner.settings.lock().volume
    }

    pub fn settings(&self) -> PlaybackSettings {
        *self.inner.settings.lock()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.buffers.lock().contains_key(name)
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.buffers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Duration of a loaded clip
    pub fn clip_duration(&self, name: &str) -> Option<std::time::Duration> {
        self.inner.buffers.lock().get(name).map(AudioBuffer::duration)
    }

    /// None until a context has been created
    pub fn context_state(&self) -> Option<ContextState> {
        self.inner.context.lock().as_ref().map(|c| c.state())
    }
}

async fn fetch_and_decode(inner: &Inner, context: &dyn AudioContext, url: &str) -> Result<AudioBuffer> {
    let data = inner.fetcher.fetch(url).await?;
    context.decode_audio_data(data).await
}

fn request_resume(context: &Arc<dyn AudioContext>) {
    let context = Arc::clone(context);
    // Fire and forget; the outcome is only logged
    let _ = spawn_detached("context resume", async move {
        match context.resume().await {
            Ok(()) => debug!("Audio context resumed"),
            Err(e) => warn!("AudioContext resume failed: {}", e),
        }
    });
}

/// Spawn on the ambient tokio runtime, or drop the work with a warning when there is none
fn spawn_detached<F>(what: &str, task: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn(task)),
        Err(_) => {
            warn!("No async runtime available, skipping {}", what);
            None
        }
    }
}
