use std::{path::PathBuf, time::Duration};

use crate::midi::{self, PortPair};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{}", .0)]
    Midi(#[from] midi::Error),

    #[error("No BCR2000 answered among {} candidate port pairs", .0)]
    DeviceNotFound(usize),

    #[error("Ports {} are not available", .0)]
    PortNotFound(PortPair),

    #[error("No answer from the device within {:?}", .0)]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid preset {}, expected 1 to 32 or 'edit'", .0)]
    InvalidPreset(String),

    #[error("Couldn't access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file type {}", .0.display())]
    UnsupportedFile(PathBuf),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the operation could help.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidPreset(_) | Error::UnsupportedFile(_))
    }
}
