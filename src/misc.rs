// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use crate::Error;
use crate::Result;
use std::path::Path;
use std::str::FromStr;

/// Read a whole file and return its content with trailing NULs and
/// surrounding whitespace removed. Device-tree files pad their values with
/// NUL bytes.
pub(crate) fn read_trimmed(path: &Path) -> Result<String> {
    let val = match std::fs::read_to_string(path) {
        Ok(val) => val,
        Err(e) => return Err(Error::from_io(path, e)),
    };

    Ok(val.trim_end_matches('\0').trim().to_string())
}

/// Read a file and parse its content into the specified type.
pub(crate) fn read_from_file<T>(path: &Path) -> Result<T>
where
    T: FromStr,
{
    let val = read_trimmed(path)?;
    val.parse::<T>().map_err(|_| Error::Parse {
        path: path.to_path_buf(),
        value: val,
    })
}
