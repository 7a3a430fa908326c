use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{Img2ImgRequest, Txt2ImgRequest};
use crate::error::Result;

/// User-tunable settings shared by both front-ends.
///
/// Persisted as JSON in the user's config directory:
/// - Linux: ~/.config/sd-morph/config.json
/// - macOS: ~/Library/Application Support/sd-morph/config.json
/// - Windows: %APPDATA%\sd-morph\config.json
///
/// Unknown or missing fields fall back to defaults, so a config written by
/// an older build keeps working.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the Stable Diffusion WebUI API
    pub api_base_url: String,
    /// Directory the numbered frames are written to
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Sampling steps for the batch pipeline
    pub steps: u32,
    /// Sampling steps for the interactive morph loop (kept low for latency)
    pub interactive_steps: u32,
    pub cfg_scale: f32,
    pub sampler: String,
    /// Checkpoint override sent with every request, when set
    pub model: Option<String>,
    /// Denoising strength for batch evolve steps (lower keeps more of the seed)
    pub denoising_strength: f32,
    /// Denoising strength when morphing from the previous generated frame
    pub morph_strength: f32,
    /// Denoising strength when the seed is raw noise (first interactive frame)
    pub first_frame_strength: f32,
    /// Frame rate of the finished video
    pub fps: u32,
    /// Subject prompt for the batch pipeline's initial frame
    pub prompt: String,
    /// Prompt base for batch evolve steps (the step number gets appended)
    pub evolve_prompt: String,
    pub negative_prompt: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            api_base_url: "http://127.0.0.1:7860".into(),
            output_dir: PathBuf::from("frames"),
            width: 512,
            height: 512,
            steps: 35,
            interactive_steps: 20,
            cfg_scale: 7.5,
            sampler: "Euler a".into(),
            model: None,
            denoising_strength: 0.5,
            morph_strength: 0.6,
            first_frame_strength: 0.75,
            fps: 12,
            prompt: "a mushroom cloud rising over the horizon, hyper realistic, \
                     cinematic lighting, detailed"
                .into(),
            evolve_prompt: "a mushroom cloud expanding, hyper realistic, cinematic lighting"
                .into(),
            negative_prompt: "cartoon, illustration, painting, drawing, CGI".into(),
        }
    }
}

impl AppConfig {
    /// Where the config file lives, if a config directory can be determined.
    pub fn config_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("sd-morph");
        path.push("config.json");
        Some(path)
    }

    /// Load the saved config, falling back to defaults when there is none
    /// or it cannot be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => {
                    info!("loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("ignoring malformed config {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Write the config back to its standard location.
    pub fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Build a txt2img payload from these settings.
    pub fn txt2img_request(&self, prompt: &str, negative_prompt: &str) -> Txt2ImgRequest {
        Txt2ImgRequest {
            prompt: prompt.to_string(),
            negative_prompt: negative_prompt.to_string(),
            steps: self.steps,
            cfg_scale: self.cfg_scale,
            width: self.width,
            height: self.height,
            sampler_index: self.sampler.clone(),
            model: self.model.clone(),
        }
    }

    /// Build an img2img payload seeded with one base64 PNG.
    pub fn img2img_request(
        &self,
        init_image: String,
        prompt: String,
        negative_prompt: String,
        denoising_strength: f32,
        steps: u32,
    ) -> Img2ImgRequest {
        Img2ImgRequest {
            init_images: vec![init_image],
            prompt,
            negative_prompt,
            steps,
            cfg_scale: self.cfg_scale,
            width: self.width,
            height: self.height,
            denoising_strength,
            sampler_index: self.sampler.clone(),
            model: self.model.clone(),
        }
    }

    /// Default output path for the finished video, timestamped so reruns
    /// never clobber an earlier result.
    pub fn timestamped_video_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.output_dir.join(format!("timelapse_{stamp}.mp4"))
    }
}
