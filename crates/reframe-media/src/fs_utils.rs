//! Filesystem utilities for materializing outputs.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a verified scratch file to its final output path.
///
/// Attempts a fast rename first. When the scratch dir and the output
/// live on different filesystems the rename fails with EXDEV; the
/// fallback copies to a temp file next to the destination and renames
/// that, so the destination only ever sees a complete file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            let staged = dst.with_extension("part");
            if let Err(e) = fs::copy(src, &staged).await {
                let _ = fs::remove_file(&staged).await;
                return Err(MediaError::from(e));
            }
            if let Err(e) = fs::rename(&staged, dst).await {
                let _ = fs::remove_file(&staged).await;
                return Err(MediaError::from(e));
            }
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!("Failed to remove scratch file {}: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV (cross-device link) is error code 18 on Linux/macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

/// Size of a file in bytes, or `None` if it does not exist.
pub async fn file_size(path: impl AsRef<Path>) -> Option<u64> {
    fs::metadata(path.as_ref()).await.ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("scratch.mp4");
        let dst = dir.path().join("final.mp4");

        fs::write(&src, b"encoded bytes").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"encoded bytes");
    }

    #[tokio::test]
    async fn test_move_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("scratch.mp4");
        let dst = dir.path().join("nested/output/final.mp4");

        fs::write(&src, b"x").await.unwrap();
        move_file(&src, &dst).await.unwrap();
        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_move_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("new.mp4");
        let dst = dir.path().join("old.mp4");

        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();
        move_file(&src, &dst).await.unwrap();
        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        assert_eq!(file_size(&path).await, None);
        fs::write(&path, b"12345").await.unwrap();
        assert_eq!(file_size(&path).await, Some(5));
    }

    #[test]
    fn test_exdev_detection() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
