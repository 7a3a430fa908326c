use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::DynamicImage;
use serde::Serialize;
use tracing::error;

use super::types::{GenerationResponse, Img2ImgRequest, Txt2ImgRequest};
use crate::error::{Error, Result};

const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";
const IMG2IMG_PATH: &str = "/sdapi/v1/img2img";

/// The seam between the pipelines and the HTTP service.
///
/// Both operations collapse every failure mode (transport error, non-2xx
/// status, empty image list, undecodable payload) to `None` after logging it.
/// A single failed generation is never fatal; callers skip the step.
pub trait ImageService: Send {
    fn txt2img(&self, request: &Txt2ImgRequest) -> Option<DynamicImage>;
    fn img2img(&self, request: &Img2ImgRequest) -> Option<DynamicImage>;
}

/// Blocking HTTP client bound to one WebUI base URL.
///
/// No request timeout is set on purpose: a generation call can legitimately
/// take minutes on modest hardware.
pub struct SdClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl SdClient {
    pub fn new(base_url: &str) -> Self {
        SdClient {
            http: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_generate<T: Serialize>(&self, path: &str, payload: &T) -> Result<DynamicImage> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(payload).send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        decode_first_image(&body)
    }
}

impl ImageService for SdClient {
    fn txt2img(&self, request: &Txt2ImgRequest) -> Option<DynamicImage> {
        match self.post_generate(TXT2IMG_PATH, request) {
            Ok(image) => Some(image),
            Err(e) => {
                error!("txt2img call failed: {e}");
                None
            }
        }
    }

    fn img2img(&self, request: &Img2ImgRequest) -> Option<DynamicImage> {
        match self.post_generate(IMG2IMG_PATH, request) {
            Ok(image) => Some(image),
            Err(e) => {
                error!("img2img call failed: {e}");
                None
            }
        }
    }
}

/// Parse a response body and decode the first returned image.
pub fn decode_first_image(body: &str) -> Result<DynamicImage> {
    let response: GenerationResponse = serde_json::from_str(body)?;
    let encoded = response.images.into_iter().next().ok_or(Error::NoImage)?;
    let bytes = BASE64.decode(encoded.as_bytes())?;
    Ok(image::load_from_memory(&bytes)?)
}

/// PNG-encode an image and wrap it in base64, the form `init_images` expects.
pub fn encode_png_base64(image: &DynamicImage) -> Result<String> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)?;
    Ok(BASE64.encode(&buffer))
}
