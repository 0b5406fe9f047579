use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::error::{AppError, Result};
use crate::domain::worksheet::ImagePayload;

/// Formats the resize step knows how to handle. Anything else is moved
/// into place untouched.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Move a file, falling back to copy+remove when rename crosses a device.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst).map_err(|e| {
                AppError::Io(format!(
                    "Failed to move {} -> {}: {}",
                    src.display(),
                    dst.display(),
                    e
                ))
            })?;
            let _ = fs::remove_file(src);
            Ok(())
        }
    }
}

/// Best-effort delete for cleanup paths; failures are logged, not raised.
pub fn remove_file_quiet(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if path.exists() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

pub fn remove_dir_quiet(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_dir_all(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove directory");
        }
    }
}

/// Staged file name: `{unix_millis}-{random5}-{name}.{ext}`.
pub fn staged_file_name(name: &str, extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let key: u32 = rand::rng().random_range(0..100_000);
    format!("{}-{:05}-{}.{}", millis, key, sanitize(name), extension)
}

/// Collision-safe variant of a staged file name: the five characters after
/// the first dash (the random key) are replaced with a fresh one. Names
/// without that shape get a random prefix instead.
pub fn collision_safe_name(original: &str) -> String {
    let suffix: u32 = rand::rng().random_range(0..100_000);
    match original.find('-') {
        Some(dash) if original.len() > dash + 6 => {
            format!(
                "{}{:05}{}",
                &original[..dash + 1],
                suffix,
                &original[dash + 6..]
            )
        }
        _ => format!("{:05}-{}", suffix, original),
    }
}

/// Write a row's extracted image payloads into the job staging area and
/// return their handles, in payload order.
pub fn write_staged_images(staging_dir: &Path, payloads: &[ImagePayload]) -> Result<Vec<PathBuf>> {
    ensure_dir(staging_dir)?;
    let mut staged = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let file_name = staged_file_name(&payload.name, &payload.extension);
        let path = staging_dir.join(file_name);
        fs::write(&path, &payload.bytes).map_err(|e| {
            AppError::Io(format!("Failed to stage image {}: {}", path.display(), e))
        })?;
        staged.push(path);
    }
    Ok(staged)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("inventaris-test-{}", Uuid::new_v4()));
        ensure_dir(&dir).unwrap();
        dir
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b/photo.PNG")));
        assert!(is_image_file(Path::new("photo.jpeg")));
        assert!(!is_image_file(Path::new("sheet.xlsx")));
        assert!(!is_image_file(Path::new("noext")));
    }

    #[test]
    fn test_staged_file_name_shape() {
        let name = staged_file_name("my photo", "png");
        let parts: Vec<&str> = name.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].parse::<i64>().is_ok());
        assert_eq!(parts[1].len(), 5);
        assert_eq!(parts[2], "my_photo.png");
    }

    #[test]
    fn test_collision_safe_name_replaces_key() {
        let original = "1700000000000-12345-photo.png";
        let renamed = collision_safe_name(original);
        assert_ne!(renamed, original);
        assert!(renamed.starts_with("1700000000000-"));
        assert!(renamed.ends_with("-photo.png"));
        assert_eq!(renamed.len(), original.len());
    }

    #[test]
    fn test_collision_safe_name_without_dash() {
        let renamed = collision_safe_name("x.png");
        assert!(renamed.ends_with("-x.png"));
    }

    #[test]
    fn test_write_staged_images() {
        let dir = scratch_dir();
        let payloads = vec![
            ImagePayload {
                name: "first".to_string(),
                extension: "png".to_string(),
                bytes: vec![1, 2, 3],
            },
            ImagePayload {
                name: "second".to_string(),
                extension: "gif".to_string(),
                bytes: vec![4, 5],
            },
        ];
        let staged = write_staged_images(&dir, &payloads).unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(fs::read(&staged[0]).unwrap(), vec![1, 2, 3]);
        assert!(staged[1].file_name().unwrap().to_str().unwrap().ends_with(".gif"));
        remove_dir_quiet(&dir);
    }

    #[test]
    fn test_move_file() {
        let dir = scratch_dir();
        let src = dir.join("a.bin");
        let dst = dir.join("b.bin");
        fs::write(&src, b"data").unwrap();
        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"data");
        remove_dir_quiet(&dir);
    }
}
