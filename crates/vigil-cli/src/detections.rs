//! Detection files — descriptors exported by an external extraction run.
//!
//! A file holds either a JSON array of detections or a single detection.
//! Each read of the file counts as one capture.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vigil_core::{Detection, DescriptorSource};

#[derive(Error, Debug)]
pub enum DetectionFileError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionFile {
    Many(Vec<Detection>),
    One(Detection),
}

/// Descriptor source backed by a JSON file on disk.
pub struct JsonDetectionSource {
    path: PathBuf,
}

impl JsonDetectionSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DescriptorSource for JsonDetectionSource {
    type Error = DetectionFileError;

    fn capture(&mut self) -> Result<Vec<Detection>, DetectionFileError> {
        let path = self.path.display().to_string();
        let raw = std::fs::read_to_string(&self.path).map_err(|source| DetectionFileError::Io {
            path: path.clone(),
            source,
        })?;
        let parsed: DetectionFile =
            serde_json::from_str(&raw).map_err(|source| DetectionFileError::Parse { path, source })?;

        let detections = match parsed {
            DetectionFile::Many(all) => all,
            DetectionFile::One(one) => vec![one],
        };
        tracing::debug!(file = %self.path.display(), count = detections.len(), "detections read");
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vigil-{name}-{}.json", std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_reads_array() {
        let path = write_temp(
            "array",
            r#"[{"descriptor":{"values":[0.1,0.2]},"confidence":0.9},
                {"descriptor":{"values":[0.3,0.4]}}]"#,
        );
        let detections = JsonDetectionSource::new(&path).capture().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].confidence, Some(0.9));
        assert_eq!(detections[1].confidence, None);
    }

    #[test]
    fn test_reads_single_detection() {
        let path = write_temp("single", r#"{"descriptor":{"values":[1.0]},"confidence":0.5}"#);
        let detections = JsonDetectionSource::new(&path).capture().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(detections.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = JsonDetectionSource::new("/nonexistent/vigil/frame.json")
            .capture()
            .unwrap_err();
        assert!(matches!(err, DetectionFileError::Io { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let path = write_temp("bad", "{\"descriptor\":");
        let err = JsonDetectionSource::new(&path).capture().unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, DetectionFileError::Parse { .. }));
    }
}
