//! Filesystem helpers: cross-device moves and write-then-rename outputs.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a plain rename first. On EXDEV it copies into a sibling temp file
/// next to `dst`, renames that into place and then removes `src`.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, falling back to copy: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_then_remove(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is errno 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    let staging = dst.with_extension("copying");
    if let Err(e) = fs::copy(src, &staging).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }
    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!("Failed to remove {} after copy: {}", src.display(), e);
    }
    Ok(())
}

/// Sibling path used while an output is being written.
///
/// `clip_01.mp4` becomes `clip_01.part.mp4`, keeping the extension so
/// FFmpeg still picks the right muxer.
pub fn part_path(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let name = match dest.extension() {
        Some(ext) => format!("{}.part.{}", stem, ext.to_string_lossy()),
        None => format!("{}.part", stem),
    };
    dest.with_file_name(name)
}

/// An output being written to a temporary sibling path.
///
/// Call [`PartialOutput::commit`] once the file is complete. Dropping an
/// uncommitted output removes the temporary file, so cancelled or failed
/// writes never leave a file at the final path.
#[derive(Debug)]
pub struct PartialOutput {
    part: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl PartialOutput {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        let dest = dest.into();
        Self {
            part: part_path(&dest),
            dest,
            committed: false,
        }
    }

    /// Path to write to.
    pub fn path(&self) -> &Path {
        &self.part
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Move the finished file into place and return the final path.
    pub async fn commit(mut self) -> MediaResult<PathBuf> {
        let size = fs::metadata(&self.part).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(MediaError::internal(format!(
                "Output {} is missing or empty",
                self.part.display()
            )));
        }
        move_file(&self.part, &self.dest).await?;
        self.committed = true;
        Ok(self.dest.clone())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.part);
        }
    }
}
