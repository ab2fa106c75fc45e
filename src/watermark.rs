use log::{debug, info};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::WatermarkError;

/// Durable record of the highest UID the pipeline has fully considered.
///
/// Stored as a single decimal integer in a text file. A missing file, an
/// empty file and `0` all mean "never initialised".
#[derive(Debug, Clone)]
pub struct Watermark {
    path: PathBuf,
}

impl Watermark {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Option<u32>, WatermarkError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No watermark file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        match trimmed.parse::<u32>() {
            Ok(0) => Ok(None),
            Ok(uid) => Ok(Some(uid)),
            Err(_) => Err(WatermarkError::Corrupt {
                path: self.path.display().to_string(),
                content: trimmed.chars().take(64).collect(),
            }),
        }
    }

    /// Moves the watermark forward to `uid`. Never moves it backwards:
    /// returns the value now on disk.
    pub fn advance(&self, uid: u32) -> Result<u32, WatermarkError> {
        let current = self.read()?;
        if let Some(current) = current.filter(|current| *current >= uid) {
            debug!("Watermark already at {} (asked for {})", current, uid);
            return Ok(current);
        }

        self.write(uid)?;
        info!("📌 Watermark advanced: {:?} → {}", current, uid);
        Ok(uid)
    }

    /// Replaces the file atomically so a crash never leaves a half-written value.
    fn write(&self, uid: u32) -> Result<(), WatermarkError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        write!(tmp, "{}", uid)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| WatermarkError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_empty_and_zero_mean_uninitialised() {
        let dir = tempdir().unwrap();
        let watermark = Watermark::new(dir.path().join("last_uid.txt"));
        assert_eq!(watermark.read().unwrap(), None);

        fs::write(watermark.path(), "  \n").unwrap();
        assert_eq!(watermark.read().unwrap(), None);

        fs::write(watermark.path(), "0").unwrap();
        assert_eq!(watermark.read().unwrap(), None);
    }

    #[test]
    fn test_reads_trailing_newline() {
        let dir = tempdir().unwrap();
        let watermark = Watermark::new(dir.path().join("last_uid.txt"));
        fs::write(watermark.path(), "1234\n").unwrap();
        assert_eq!(watermark.read().unwrap(), Some(1234));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let watermark = Watermark::new(dir.path().join("last_uid.txt"));
        fs::write(watermark.path(), "not-a-number").unwrap();
        assert!(matches!(watermark.read(), Err(WatermarkError::Corrupt { .. })));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let dir = tempdir().unwrap();
        let watermark = Watermark::new(dir.path().join("nested").join("last_uid.txt"));

        assert_eq!(watermark.advance(10).unwrap(), 10);
        assert_eq!(watermark.advance(7).unwrap(), 10);
        assert_eq!(watermark.read().unwrap(), Some(10));
        assert_eq!(watermark.advance(15).unwrap(), 15);
        assert_eq!(fs::read_to_string(watermark.path()).unwrap(), "15");
    }
}
