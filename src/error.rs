//! Construction-time failures that callers must tell apart.
//!
//! Everything else in the crate propagates `anyhow::Error`. These variants are
//! carried inside it and recovered with `downcast_ref::<CameraError>()` at the
//! process boundary, where each kind maps to its own exit status.

use thiserror::Error;

/// Exit status for missing or invalid configuration.
pub const EXIT_CONFIG: u8 = 1;
/// Exit status when the capture device cannot be opened or queried.
pub const EXIT_CONNECTION: u8 = 2;
/// Exit status when no video codec could be opened.
pub const EXIT_CODEC: u8 = 3;

#[derive(Debug, Error)]
pub enum CameraError {
    /// The capture device could not be opened or did not deliver a first frame.
    #[error("cannot connect to camera device {device}: {reason}")]
    Connection { device: String, reason: String },

    /// None of the candidate codecs could open a writer.
    #[error("no suitable video codec available (tried {tried})")]
    CodecNotAvailable { tried: String },
}

impl CameraError {
    pub fn connection(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit status for this failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            CameraError::Connection { .. } => EXIT_CONNECTION,
            CameraError::CodecNotAvailable { .. } => EXIT_CODEC,
        }
    }
}

/// Map any error bubbling out of `main` to an exit status.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CameraError>()
        .map(CameraError::exit_code)
        .unwrap_or(EXIT_CONFIG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kinds_have_distinct_exit_codes() {
        let conn = anyhow::Error::new(CameraError::connection("/dev/video9", "no such device"));
        let codec = anyhow::Error::new(CameraError::CodecNotAvailable {
            tried: "avc1, mp4v".to_string(),
        });
        let other = anyhow::anyhow!("SURVEILLANCE_VIDEO_SECONDS must be an integer");

        assert_eq!(exit_code_for(&conn), EXIT_CONNECTION);
        assert_eq!(exit_code_for(&codec), EXIT_CODEC);
        assert_eq!(exit_code_for(&other), EXIT_CONFIG);
        assert_ne!(exit_code_for(&conn), exit_code_for(&codec));
    }

    #[test]
    fn context_does_not_hide_the_kind() {
        let err = anyhow::Error::new(CameraError::connection("stub://offline", "refused"))
            .context("open camera");
        assert_eq!(exit_code_for(&err), EXIT_CONNECTION);
    }
}
