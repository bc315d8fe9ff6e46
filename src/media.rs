//! Finished captures handed to the caller.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::frame::Frame;
use crate::record::Codec;

/// A single JPEG-encoded photo.
#[derive(Clone, Debug)]
pub struct Photo {
    jpeg: Vec<u8>,
}

impl Photo {
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Ok(Self {
            jpeg: frame.encode_jpeg()?,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.jpeg
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.jpeg)
            .with_context(|| format!("write photo {}", path.display()))
    }
}

/// A finalized video file.
///
/// The file lives in the camera's temporary directory until the caller
/// persists it; whatever is not persisted is deleted with the camera.
#[derive(Debug)]
pub struct VideoFile {
    path: PathBuf,
    codec: Codec,
    frames: usize,
    fps: f64,
}

impl VideoFile {
    pub(crate) fn new(path: PathBuf, codec: Codec, frames: usize, fps: f64) -> Self {
        Self {
            path,
            codec,
            frames,
            fps,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Number of distinct frames encoded.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Frame rate the video was encoded at.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn open(&self) -> Result<File> {
        File::open(&self.path).with_context(|| format!("open video {}", self.path.display()))
    }

    /// Move the file to `dest`, taking it out of the camera's temporary directory.
    pub fn persist(self, dest: &Path) -> Result<PathBuf> {
        if std::fs::rename(&self.path, dest).is_err() {
            // Different filesystem: copy, then drop the original.
            std::fs::copy(&self.path, dest).with_context(|| {
                format!("copy {} to {}", self.path.display(), dest.display())
            })?;
            std::fs::remove_file(&self.path)
                .with_context(|| format!("remove {}", self.path.display()))?;
        }
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn photo_is_jpeg() -> Result<()> {
        let photo = Photo::from_frame(&Frame::filled(16, 16, [0, 0, 255]))?;
        assert_eq!(&photo.bytes()[..2], &[0xFF, 0xD8]);

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("shot.jpg");
        photo.write_to(&path)?;
        assert_eq!(std::fs::read(&path)?, photo.into_bytes());
        Ok(())
    }

    #[test]
    fn persist_moves_the_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("clip.mp4");
        std::fs::write(&src, b"video")?;
        let video = VideoFile::new(src.clone(), Codec::Mp4v, 3, 15.0);
        assert_eq!(video.fps(), 15.0);

        let mut contents = String::new();
        video.open()?.read_to_string(&mut contents)?;
        assert_eq!(contents, "video");

        let dest = dir.path().join("kept.mp4");
        assert_eq!(video.persist(&dest)?, dest);
        assert!(!src.exists());
        assert!(dest.exists());
        Ok(())
    }
}
