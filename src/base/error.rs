use itertools::Itertools;
use thiserror::Error as ThisError;

use crate::base::path::FilePath;

/// All errors produced by this crate.
///
/// The path-carrying variants are the typed taxonomy that composite host
/// operations translate primitive failures into, and match on: `delete`
/// treats `NotFound` as success, `make_directory`/`make_file` swallow it
/// while probing and re-raise everything else.
#[derive(Debug, ThisError)]
pub enum Error {
    /// No file or directory exists at the path.
    #[error("no such file or directory: {0}")]
    NotFound(FilePath),

    /// The path exists but does not name a directory.
    #[error("not a directory: {0}")]
    NotADirectory(FilePath),

    /// The path exists but does not name a file.
    #[error("not a file: {0}")]
    NotAFile(FilePath),

    /// A non-forced move collided with an existing child.
    #[error("cannot move {path} to \"{name}\": already exists")]
    AlreadyExists { path: FilePath, name: String },

    /// A node may not be moved into itself or one of its descendants.
    #[error("cannot move {path} into {destination}: target is within the moved subtree")]
    Cycle {
        path: FilePath,
        destination: FilePath,
    },

    /// The backend answered outside its protocol: unexpected status code,
    /// malformed byte range, missing expected header.
    #[error("backend protocol error: {0}")]
    Protocol(String),

    /// Every upload attempt failed; each attempt's error is preserved.
    #[error("too many failed upload attempts:\n{}", attempts.iter().map(|err| err.to_string()).join("\n"))]
    UploadExhausted { attempts: Vec<Error> },

    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}
