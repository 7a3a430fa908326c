use std::path::PathBuf;

/// All the ways talking to the service, touching disk, or encoding can fail.
///
/// Library code propagates these with `?`. The adapter's public surface
/// collapses them to an absent result (see `api::client`), so a single
/// failed generation never takes down a running session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure reaching the generation service
    #[error("request to the generation service failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered, but not with a 2xx
    #[error("generation service returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// A 2xx response whose `images` array was empty
    #[error("generation response contained no images")]
    NoImage,

    /// The returned image payload was not valid base64
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes were not a decodable image
    #[error("image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// ffmpeg could not be run at all
    #[error("failed to launch ffmpeg (is it installed and on PATH?): {0}")]
    EncoderLaunch(std::io::Error),

    /// ffmpeg ran but reported failure
    #[error("ffmpeg exited with {status} while writing {output}")]
    Encoder {
        status: std::process::ExitStatus,
        output: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
