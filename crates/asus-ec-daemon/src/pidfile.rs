//! PID file handling.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// PID file removed again when dropped.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current process ID to `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::write(&path, format!("{}\n", std::process::id()))
            .with_context(|| format!("Failed to write PID file {}", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove PID file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_and_removed() {
        let path = std::env::temp_dir().join(format!("asus-ec-sensorsd-{}.pid", std::process::id()));
        let pidfile = PidFile::create(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());

        drop(pidfile);
        assert!(!path.exists());
    }
}
