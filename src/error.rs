// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::io;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by topology reads.
///
/// `NotFound` usually means the kernel does not expose the facet on this
/// platform rather than something going wrong; callers are expected to check
/// [`Error::is_not_found`] before treating a read as fatal.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{path:?} does not exist")]
    NotFound { path: PathBuf },

    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse content {value:?} from {path:?}")]
    Parse { path: PathBuf, value: String },

    #[error("no cpu<N> segment in {path:?}")]
    Format { path: PathBuf },

    #[error("{path:?} found to be empty")]
    EmptyFile { path: PathBuf },

    #[error("invalid range {token:?} in {path:?}")]
    InvalidRange { path: PathBuf, token: String },
}

impl Error {
    pub(crate) fn from_io(path: &Path, source: io::Error) -> Error {
        if source.kind() == io::ErrorKind::NotFound {
            Error::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// True when the underlying path was simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
