//! Zip bundling for batch outputs.
//!
//! Archive writing is synchronous `std::io` work, so it runs on a blocking
//! thread. Each member file is stored under its logical name.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use papermill_core::error::{AppError, ErrorKind};
use papermill_core::result::AppResult;

/// One archive member: source path plus the entry name inside the archive.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    /// File to read.
    pub path: PathBuf,
    /// Entry name inside the archive.
    pub entry_name: String,
}

/// Write a zip archive containing the given members.
///
/// Returns the archive size in bytes. The partially written archive is
/// removed on any failure so a broken file is never left behind.
pub async fn write_zip(destination: &Path, members: Vec<ArchiveMember>) -> AppResult<u64> {
    if members.is_empty() {
        return Err(AppError::bundle("Cannot bundle an empty artifact list"));
    }

    let destination = destination.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let written = write_zip_sync(&destination, &members);
        if written.is_err() {
            let _ = std::fs::remove_file(&destination);
        }
        written
    })
    .await
    .map_err(|e| AppError::with_source(ErrorKind::Internal, "Archive task panicked", e))?;

    result
}

fn write_zip_sync(destination: &Path, members: &[ArchiveMember]) -> AppResult<u64> {
    let file = File::create(destination).map_err(|e| {
        AppError::with_source(
            ErrorKind::Bundle,
            format!("Failed to create archive: {}", destination.display()),
            e,
        )
    })?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for member in members {
        writer.start_file(member.entry_name.as_str(), options).map_err(|e| {
            AppError::with_source(
                ErrorKind::Bundle,
                format!("Failed to start archive entry: {}", member.entry_name),
                e,
            )
        })?;

        let mut source = File::open(&member.path).map_err(|e| {
            AppError::with_source(
                ErrorKind::Bundle,
                format!("Failed to open archive member: {}", member.path.display()),
                e,
            )
        })?;
        io::copy(&mut source, &mut writer).map_err(|e| {
            AppError::with_source(
                ErrorKind::Bundle,
                format!("Failed to write archive entry: {}", member.entry_name),
                e,
            )
        })?;
    }

    let file = writer
        .finish()
        .map_err(|e| AppError::with_source(ErrorKind::Bundle, "Failed to finish archive", e))?;
    let size = file
        .metadata()
        .map_err(|e| AppError::with_source(ErrorKind::Bundle, "Failed to stat archive", e))?
        .len();
    Ok(size)
}
