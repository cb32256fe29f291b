use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

pub trait FsExt {
    // Converts the provided relative path to be based from the path of the currently working directory.
    // If the path is absolute, then it returns the absolute path.
    fn relative_to_cwd(&self) -> Result<PathBuf>
    where
        Self: AsRef<Path>,
    {
        let cwd_dir = std::env::current_dir()?;

        Ok(cwd_dir.join(self))
    }
}

impl FsExt for String {}

impl FsExt for &str {}

impl FsExt for PathBuf {}

/// Writes `value` as gzipped json. The file is staged next to `path` and renamed into place.
pub fn write_gz_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage a file in {:?}", dir))?;
    {
        let writer = BufWriter::new(staged.as_file());
        let mut compressor = GzEncoder::new(writer, Compression::default());
        serde_json::to_writer(&mut compressor, value)?;
        compressor.finish()?.flush()?;
    }

    staged
        .persist(path)
        .with_context(|| format!("Failed to move staged file to {:?}", path))?;

    Ok(())
}

pub fn read_gz_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let content = GzDecoder::new(BufReader::new(file));
    let value = serde_json::from_reader(content)
        .with_context(|| format!("Failed to decode {:?}", path))?;
    Ok(value)
}
