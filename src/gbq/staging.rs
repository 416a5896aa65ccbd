//! Scoped temporary CSV artifact for uploads
//!
//! Serializing a DataFrame produces text, while the load primitive reads a
//! binary file handle. `StagedCsv` does both in two phases: write and sync the
//! CSV into a uniquely named temporary file, then reopen the same file for
//! reading. The file is removed when the `StagedCsv` is dropped, so every exit
//! path (including `?` on a failed write or submission) cleans it up.

use super::error::Result;
use polars::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

pub const STAGING_PREFIX: &str = "df_to_table_";
pub const STAGING_SUFFIX: &str = ".csv";

pub struct StagedCsv {
    file: NamedTempFile,
    len: u64,
}

impl StagedCsv {
    /// Write `df` as UTF-8 CSV with a header row and no index column
    ///
    /// The file is created in `dir`, or the system temp dir when `None`.
    pub fn write(df: &DataFrame, dir: Option<&Path>) -> Result<Self> {
        let mut builder = Builder::new();
        builder.prefix(STAGING_PREFIX).suffix(STAGING_SUFFIX);

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        // CsvWriter::finish needs a mutable frame; cloning only bumps column refcounts
        let mut frame = df.clone();
        CsvWriter::new(file.as_file_mut())
            .include_header(true)
            .with_separator(b',')
            .finish(&mut frame)?;

        file.as_file_mut().flush()?;
        file.as_file().sync_all()?;

        let len = file.as_file().metadata()?.len();
        debug!(path = %file.path().display(), bytes = len, "staged CSV");

        Ok(Self { file, len })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open a fresh read handle positioned at the start of the staged file
    pub fn open_for_read(&self) -> Result<File> {
        Ok(self.file.reopen()?)
    }

    /// Delete the staged file now, reporting (but not failing on) removal errors
    pub fn close(self) {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            warn!(path = %path.display(), error = %e, "failed to remove staged CSV");
        }
    }
}
