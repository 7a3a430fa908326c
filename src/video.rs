use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::error::{Error, Result};

/// Encode a numbered frame pattern (`frame_%04d.png`) into an H.264 MP4 by
/// shelling out to ffmpeg. Each frame becomes one fixed-duration clip at
/// `fps` frames per second.
pub fn encode_video(frame_pattern: &Path, fps: u32, output: &Path) -> Result<()> {
    let args = ffmpeg_args(frame_pattern, fps, output);
    info!(
        "running ffmpeg {}",
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let status = Command::new("ffmpeg")
        .args(&args)
        .status()
        .map_err(Error::EncoderLaunch)?;

    if !status.success() {
        return Err(Error::Encoder {
            status,
            output: output.to_path_buf(),
        });
    }

    Ok(())
}

/// The full ffmpeg argument list, split out so it can be checked without
/// actually running the encoder.
fn ffmpeg_args(frame_pattern: &Path, fps: u32, output: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-y"),
        OsString::from("-framerate"),
        OsString::from(fps.to_string()),
        OsString::from("-i"),
        frame_pattern.as_os_str().to_owned(),
        OsString::from("-c:v"),
        OsString::from("libx264"),
        // yuv420p keeps the file playable in stock players
        OsString::from("-pix_fmt"),
        OsString::from("yuv420p"),
        output.as_os_str().to_owned(),
    ]
}
