//! Transcription job: one audio file relayed to one client.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// An end-to-end transcription request.
///
/// Immutable once constructed. Construction validates local inputs so that
/// nothing touches the network for a job that cannot run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    audio_path: PathBuf,
    endpoint: String,
    client_id: String,
}

impl Job {
    /// Validate inputs and build a job.
    ///
    /// Fails with [`Error::Validation`] when the audio file does not exist or
    /// the client identifier is blank.
    pub fn new(
        audio_path: impl Into<PathBuf>,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Result<Self> {
        let audio_path = audio_path.into();
        let client_id = client_id.into();

        if !audio_path.exists() {
            return Err(Error::Validation(format!(
                "audio file '{}' not found",
                audio_path.display()
            )));
        }
        if client_id.trim().is_empty() {
            return Err(Error::Validation("client id must not be empty".into()));
        }

        Ok(Self {
            audio_path,
            endpoint: endpoint.into(),
            client_id,
        })
    }

    pub fn audio_path(&self) -> &Path {
        &self.audio_path
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_existing_audio_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let audio = dir.path().join("a.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let job = Job::new(&audio, "ws://127.0.0.1:5000", "client-1").unwrap();
        assert_eq!(job.audio_path(), audio.as_path());
        assert_eq!(job.endpoint(), "ws://127.0.0.1:5000");
        assert_eq!(job.client_id(), "client-1");
    }

    #[test]
    fn rejects_missing_audio_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.wav");

        let err = Job::new(&missing, "ws://127.0.0.1:5000", "client-1").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("missing.wav"));
    }

    #[test]
    fn rejects_blank_client_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let audio = dir.path().join("a.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let err = Job::new(&audio, "ws://127.0.0.1:5000", "  ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
