use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::debug;

use crate::error::Result;

const FRAME_PREFIX: &str = "frame_";
const FRAME_EXT: &str = "png";

/// Numbered PNG frames in one output directory.
///
/// Indices are contiguous and never reused: `save` only advances the
/// counter once the file is actually on disk, and `open` resumes after the
/// highest index already present, so a restarted session appends instead of
/// clobbering earlier frames.
#[derive(Debug)]
pub struct FrameStore {
    dir: PathBuf,
    next_index: u32,
}

impl FrameStore {
    /// Open (creating if needed) the frame directory and pick up numbering
    /// after whatever frames already exist in it.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let mut next_index = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(index) = parse_frame_index(&entry.file_name().to_string_lossy()) {
                next_index = next_index.max(index + 1);
            }
        }

        debug!(
            "frame store at {} resuming at index {next_index}",
            dir.display()
        );

        Ok(FrameStore {
            dir: dir.to_path_buf(),
            next_index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index the next saved frame will receive.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Path a given frame index maps to, whether or not it exists yet.
    pub fn frame_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{FRAME_PREFIX}{index:04}.{FRAME_EXT}"))
    }

    /// printf-style pattern covering every frame, as ffmpeg consumes it.
    pub fn frame_pattern(&self) -> PathBuf {
        self.dir.join(format!("{FRAME_PREFIX}%04d.{FRAME_EXT}"))
    }

    /// Write the image as the next numbered frame and return its path.
    pub fn save(&mut self, image: &DynamicImage) -> Result<PathBuf> {
        let path = self.frame_path(self.next_index);
        image.save(&path)?;
        self.next_index += 1;
        Ok(path)
    }
}

/// Extract the index from a `frame_NNNN.png` file name.
fn parse_frame_index(name: &str) -> Option<u32> {
    let stem = name.strip_prefix(FRAME_PREFIX)?;
    let digits = stem.strip_suffix(FRAME_EXT)?.strip_suffix('.')?;
    digits.parse().ok()
}
