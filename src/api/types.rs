use serde::{Deserialize, Serialize};

// ============================================================================
// Requests (sdapi/v1 wire format)
// ============================================================================

/// Payload for `/sdapi/v1/txt2img`.
#[derive(Debug, Clone, Serialize)]
pub struct Txt2ImgRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub width: u32,
    pub height: u32,
    pub sampler_index: String,
    /// Checkpoint override; omitted from the payload when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Payload for `/sdapi/v1/img2img`.
///
/// `init_images` carries exactly one base64-encoded PNG: the seed image the
/// generation starts from. `denoising_strength` controls how much of it
/// survives (lower keeps more of the seed).
#[derive(Debug, Clone, Serialize)]
pub struct Img2ImgRequest {
    pub init_images: Vec<String>,
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub width: u32,
    pub height: u32,
    pub denoising_strength: f32,
    pub sampler_index: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// ============================================================================
// Response
// ============================================================================

/// Successful response from either endpoint.
///
/// The service returns one base64-encoded image per requested batch entry;
/// we only ever request one.
#[derive(Debug, Deserialize)]
pub struct GenerationResponse {
    pub images: Vec<String>,
    #[serde(default)]
    pub info: Option<String>,
}
