// clipsloth - preload short sound clips by name, play them as one-shot sounds
// Module declarations
pub mod audio;
pub mod config;
pub mod error;
pub mod fetch;
pub mod player;

pub use audio::{AudioBuffer, AudioContext, ContextFactory, ContextState, CpalContext, CpalContextFactory};
pub use config::PlayerConfig;
pub use error::AudioError;
pub use fetch::{DefaultFetcher, Fetch};
pub use player::{AudioPlayer, LoadHandle, PlaybackSettings};
