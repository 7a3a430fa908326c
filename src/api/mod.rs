//! Request/response adapter for the local Stable Diffusion WebUI API.

pub mod client;
pub mod types;

pub use client::{encode_png_base64, ImageService, SdClient};
pub use types::{GenerationResponse, Img2ImgRequest, Txt2ImgRequest};
