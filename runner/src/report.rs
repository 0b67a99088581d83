
use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind},
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Cumulative result file of a sweep. Created empty by `reset`, only ever appended to afterwards.
#[derive(Debug)]
pub struct Report {
    path: PathBuf,
}

impl Report {
    /// truncate (or create) the report, dropping results of earlier sweeps
    pub fn reset(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        File::create(&path)?;
        debug!(report = ?path, "Reset report");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the full content of `source`. Returns `None` if `source` does not exist.
    /// Appending a file to itself would never terminate and is rejected.
    pub fn append_from(&self, source: &Path) -> io::Result<Option<u64>> {
        let mut input = match File::open(source) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error),
        };
        let mut output = OpenOptions::new().append(true).open(&self.path)?;
        let (input_meta, output_meta) = (input.metadata()?, output.metadata()?);

        if input_meta.dev() == output_meta.dev() && input_meta.ino() == output_meta.ino() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is the report itself", source.to_string_lossy()),
            ));
        }

        io::copy(&mut input, &mut output).map(Some)
    }
}

/// remove a stale file, a file that is already gone is fine
pub fn discard(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}
