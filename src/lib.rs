//! Thin client tooling around a locally hosted Stable Diffusion WebUI API.
//!
//! Two front-ends share this library:
//! - `timelapse`: txt2img once, then img2img each frame into the next,
//!   and finally encode the numbered frames into an MP4.
//! - `morph`: an iced window where a worker thread continuously morphs
//!   random noise seeds through img2img while the user edits the prompts.

pub mod api;
pub mod config;
pub mod error;
pub mod frames;
pub mod gui;
pub mod sequencer;
pub mod video;

pub use error::{Error, Result};
