//! Playback side of the pipeline: device clock and gapless scheduling.

#[cfg(feature = "cpal-audio")]
pub mod cpal_output;
pub mod device;
pub mod scheduler;

#[cfg(feature = "cpal-audio")]
pub use cpal_output::{CpalOutputDevice, list_output_devices};
pub use device::{MockOutputDevice, OutputDevice, ScheduledChunk};
pub use scheduler::PlaybackScheduler;
