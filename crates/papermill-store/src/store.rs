//! The artifact store.
//!
//! Owns the three storage areas and every file inside them. Handlers never
//! touch area paths directly: they allocate output slots, write, and seal;
//! sealing is the only way an [`Artifact`] comes into existence, so a file
//! that was never fully written is never referenced.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use tokio::fs;
use tracing::debug;

use papermill_core::config::storage::StorageConfig;
use papermill_core::error::{AppError, ErrorKind};
use papermill_core::result::AppResult;
use papermill_core::types::JobId;

use crate::archive::{self, ArchiveMember};
use crate::area::StorageArea;
use crate::artifact::Artifact;
use crate::naming;

/// A writable output path allocated for a handler to populate.
///
/// Holds no file handle; it is a reservation of a name. Sealing it turns it
/// into an [`Artifact`] once content exists on disk.
#[derive(Debug)]
pub struct OutputSlot {
    path: PathBuf,
    relative_path: String,
    name: String,
    area: StorageArea,
}

impl OutputSlot {
    /// Absolute path the handler should write to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the slot.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A dedicated subdirectory for one job's batch outputs.
#[derive(Debug, Clone)]
pub struct BatchDir {
    path: PathBuf,
    dir_name: String,
}

impl BatchDir {
    /// Absolute path of the batch directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name, which becomes the nested segment in download
    /// references of member artifacts.
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }
}

/// Creates and tracks files across the three storage areas.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at the configured data directory, creating
    /// every area directory that does not exist yet.
    pub async fn new(config: &StorageConfig) -> AppResult<Self> {
        let root = config.root();
        for area in StorageArea::ALL {
            let dir = root.join(area.dir_name());
            fs::create_dir_all(&dir).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::StorageWrite,
                    format!("Failed to create storage area: {}", dir.display()),
                    e,
                )
            })?;
        }
        debug!(root = %root.display(), "Storage areas ready");
        Ok(Self { root })
    }

    /// Root directory of one storage area.
    pub fn area_root(&self, area: StorageArea) -> PathBuf {
        self.root.join(area.dir_name())
    }

    /// Write an uploaded payload into Intake under a generated name.
    pub async fn stage_input(
        &self,
        job: &JobId,
        declared_name: &str,
        data: Bytes,
    ) -> AppResult<Artifact> {
        let ext = naming::sanitize_ext(declared_name);
        let name = naming::output_name(declared_name, "upload", job.as_str(), &ext);
        let path = self.area_root(StorageArea::Intake).join(&name);

        if let Err(e) = fs::write(&path, &data).await {
            let _ = fs::remove_file(&path).await;
            return Err(AppError::with_source(
                ErrorKind::StorageWrite,
                format!("Failed to stage upload: {name}"),
                e,
            ));
        }
        debug!(name, bytes = data.len(), "Staged input");

        Ok(Artifact {
            name: name.clone(),
            area: StorageArea::Intake,
            relative_path: name,
            path,
            size_bytes: data.len() as u64,
            created_at: Utc::now(),
        })
    }

    /// Allocate a flat output slot in Output.
    pub fn allocate_output(&self, job: &JobId, base: &str, tag: &str, ext: &str) -> OutputSlot {
        let name = naming::output_name(base, tag, job.as_str(), ext);
        OutputSlot {
            path: self.area_root(StorageArea::Output).join(&name),
            relative_path: name.clone(),
            name,
            area: StorageArea::Output,
        }
    }

    /// Create the dedicated subdirectory for a job's batch outputs.
    pub async fn create_batch(&self, job: &JobId, base: &str, tag: &str) -> AppResult<BatchDir> {
        let dir_name = naming::batch_dir_name(base, tag, job.as_str());
        let path = self.area_root(StorageArea::Output).join(&dir_name);
        fs::create_dir_all(&path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWrite,
                format!("Failed to create batch directory: {dir_name}"),
                e,
            )
        })?;
        Ok(BatchDir { path, dir_name })
    }

    /// Allocate an indexed member slot inside a batch directory.
    pub fn allocate_page(
        &self,
        batch: &BatchDir,
        base: &str,
        index: usize,
        ext: &str,
    ) -> OutputSlot {
        let name = naming::page_name(base, index, ext);
        OutputSlot {
            path: batch.path.join(&name),
            relative_path: format!("{}/{}", batch.dir_name, name),
            name,
            area: StorageArea::Output,
        }
    }

    /// Turn a populated slot into an artifact, recording its final size.
    ///
    /// Fails if the handler never wrote the file.
    pub async fn seal(&self, slot: OutputSlot) -> AppResult<Artifact> {
        let meta = fs::metadata(&slot.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::storage_write(format!("Output file was never written: {}", slot.name))
            } else {
                AppError::with_source(
                    ErrorKind::StorageRead,
                    format!("Failed to stat output: {}", slot.name),
                    e,
                )
            }
        })?;

        Ok(Artifact {
            name: slot.name,
            area: slot.area,
            relative_path: slot.relative_path,
            path: slot.path,
            size_bytes: meta.len(),
            created_at: Utc::now(),
        })
    }

    /// Write a complete payload into a slot and seal it.
    ///
    /// A partial file from a failed write is removed, never referenced.
    pub async fn write_output(&self, slot: OutputSlot, data: Bytes) -> AppResult<Artifact> {
        if let Err(e) = fs::write(&slot.path, &data).await {
            let _ = fs::remove_file(&slot.path).await;
            return Err(AppError::with_source(
                ErrorKind::StorageWrite,
                format!("Failed to write output: {}", slot.name),
                e,
            ));
        }
        debug!(name = %slot.name, bytes = data.len(), "Wrote output artifact");
        self.seal(slot).await
    }

    /// Adopt files an external tool wrote into a batch directory.
    ///
    /// The tool names its own outputs, so the files are sorted by their
    /// trailing page number (name order for ties), renamed onto the
    /// `_page_{n}` scheme in that order, and sealed.
    pub async fn adopt_batch(
        &self,
        batch: &BatchDir,
        base: &str,
        ext: &str,
    ) -> AppResult<Vec<Artifact>> {
        let mut produced = Vec::new();
        let mut dir = fs::read_dir(&batch.path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageRead,
                format!("Failed to list batch directory: {}", batch.dir_name),
                e,
            )
        })?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| {
            AppError::with_source(ErrorKind::StorageRead, "Failed to read batch entry", e)
        })? {
            let meta = entry.metadata().await.map_err(|e| {
                AppError::with_source(ErrorKind::StorageRead, "Failed to stat batch entry", e)
            })?;
            if meta.is_file() {
                produced.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        produced.sort_by_key(|name| numeric_sort_key(name));

        let mut artifacts = Vec::with_capacity(produced.len());
        for (index, original) in produced.iter().enumerate() {
            let slot = self.allocate_page(batch, base, index + 1, ext);
            let from = batch.path.join(original);
            if from != *slot.path() {
                fs::rename(&from, slot.path()).await.map_err(|e| {
                    AppError::with_source(
                        ErrorKind::StorageWrite,
                        format!("Failed to adopt batch output: {original}"),
                        e,
                    )
                })?;
            }
            artifacts.push(self.seal(slot).await?);
        }
        Ok(artifacts)
    }

    /// Bundle output artifacts into a single zip artifact.
    pub async fn bundle(
        &self,
        job: &JobId,
        base: &str,
        tag: &str,
        members: &[Artifact],
    ) -> AppResult<Artifact> {
        if members.is_empty() {
            return Err(AppError::bundle("Cannot bundle an empty artifact list"));
        }

        let name = naming::output_name(base, tag, job.as_str(), "zip");
        let path = self.area_root(StorageArea::Output).join(&name);
        let archive_members = members
            .iter()
            .map(|m| ArchiveMember {
                path: m.path.clone(),
                entry_name: m.name.clone(),
            })
            .collect();

        let size_bytes = archive::write_zip(&path, archive_members).await?;
        debug!(name, members = members.len(), size_bytes, "Bundled artifacts");

        Ok(Artifact {
            name: name.clone(),
            area: StorageArea::Output,
            relative_path: name,
            path,
            size_bytes,
            created_at: Utc::now(),
        })
    }

    /// Read an artifact back into memory.
    pub async fn read_bytes(&self, artifact: &Artifact) -> AppResult<Bytes> {
        let data = fs::read(&artifact.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Artifact not found: {}", artifact.name))
            } else {
                AppError::with_source(
                    ErrorKind::StorageRead,
                    format!("Failed to read artifact: {}", artifact.name),
                    e,
                )
            }
        })?;
        Ok(Bytes::from(data))
    }

    /// Create (if needed) and return a job-scoped Scratch workspace.
    pub async fn scratch_dir(&self, job: &JobId) -> AppResult<PathBuf> {
        let dir = self
            .area_root(StorageArea::Scratch)
            .join(format!("job_{}", job.as_str()));
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWrite,
                format!("Failed to create scratch directory: {}", dir.display()),
                e,
            )
        })?;
        Ok(dir)
    }

    /// Resolve a download reference to a file inside Output.
    ///
    /// Both segments must be plain path components; anything resembling
    /// traversal is rejected before touching the filesystem.
    pub async fn resolve_download(&self, dir: Option<&str>, name: &str) -> AppResult<PathBuf> {
        if !naming::is_safe_component(name)
            || dir.is_some_and(|d| !naming::is_safe_component(d))
        {
            return Err(AppError::not_found("No such download"));
        }

        let mut path = self.area_root(StorageArea::Output);
        if let Some(dir) = dir {
            path = path.join(dir);
        }
        path = path.join(name);

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(AppError::not_found("No such download")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found("No such download"))
            }
            Err(e) => Err(AppError::with_source(
                ErrorKind::StorageRead,
                format!("Failed to stat download: {name}"),
                e,
            )),
        }
    }
}

/// Sort key ordering batch outputs by the number their stem ends with.
/// Files without trailing digits sort last, by name.
fn numeric_sort_key(name: &str) -> (u64, String) {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let number = digits
        .chars()
        .rev()
        .collect::<String>()
        .parse()
        .unwrap_or(u64::MAX);
    (number, name.to_string())
}

/// Guess MIME type from a file name extension.
pub fn mime_from_name(name: &str) -> Option<String> {
    let ext = name.rsplit('.').next()?.to_lowercase();
    let mime = match ext.as_str() {
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => return None,
    };
    Some(mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_in(dir: &tempfile::TempDir) -> ArtifactStore {
        let config = StorageConfig {
            data_dir: dir.path().to_string_lossy().to_string(),
        };
        ArtifactStore::new(&config).await.unwrap()
    }

    fn job() -> JobId {
        "deadbeef".parse().expect("valid id")
    }

    #[tokio::test]
    async fn test_new_creates_all_areas() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        for area in StorageArea::ALL {
            assert!(store.area_root(area).is_dir(), "missing {area}");
        }
    }

    #[tokio::test]
    async fn test_stage_input_names_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let artifact = store
            .stage_input(&job(), "Annual Report.pdf", Bytes::from("pdf bytes"))
            .await
            .unwrap();

        assert_eq!(artifact.name, "Annual_Report_upload_deadbeef.pdf");
        assert_eq!(artifact.area, StorageArea::Intake);
        assert_eq!(artifact.size_bytes, 9);
        assert!(artifact.path.is_file());
        assert_eq!(
            std::fs::read(&artifact.path).unwrap(),
            b"pdf bytes".to_vec()
        );
    }

    #[tokio::test]
    async fn test_write_output_seals_with_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let slot = store.allocate_output(&job(), "report", "merged", "pdf");
        let artifact = store
            .write_output(slot, Bytes::from("merged content"))
            .await
            .unwrap();

        assert_eq!(artifact.name, "report_merged_deadbeef.pdf");
        assert_eq!(artifact.size_bytes, 14);
        assert_eq!(
            artifact.download_url(),
            "/download/report_merged_deadbeef.pdf"
        );
    }

    #[tokio::test]
    async fn test_seal_unwritten_slot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let slot = store.allocate_output(&job(), "report", "merged", "pdf");
        let err = store.seal(slot).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::StorageWrite);
    }

    #[tokio::test]
    async fn test_batch_members_nest_in_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let batch = store.create_batch(&job(), "report", "split").await.unwrap();
        assert_eq!(batch.dir_name(), "report_split_deadbeef");

        let slot = store.allocate_page(&batch, "report", 1, "pdf");
        let artifact = store.write_output(slot, Bytes::from("page")).await.unwrap();
        assert_eq!(
            artifact.relative_path,
            "report_split_deadbeef/report_page_1.pdf"
        );
        assert_eq!(
            artifact.download_url(),
            "/download/report_split_deadbeef/report_page_1.pdf"
        );
    }

    #[tokio::test]
    async fn test_adopt_batch_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let batch = store.create_batch(&job(), "report", "images").await.unwrap();
        for raw in ["out-10.jpg", "out-2.jpg", "out-1.jpg"] {
            std::fs::write(batch.path().join(raw), raw).unwrap();
        }

        let artifacts = store.adopt_batch(&batch, "report", "jpg").await.unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "report_page_1.jpg",
                "report_page_2.jpg",
                "report_page_3.jpg"
            ]
        );
        // Page 3 was the tool's out-10, the numerically largest.
        assert_eq!(
            std::fs::read_to_string(&artifacts[2].path).unwrap(),
            "out-10.jpg"
        );
    }

    #[tokio::test]
    async fn test_bundle_creates_zip_of_members() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let batch = store.create_batch(&job(), "report", "split").await.unwrap();
        let mut members = Vec::new();
        for i in 1..=2 {
            let slot = store.allocate_page(&batch, "report", i, "pdf");
            members.push(
                store
                    .write_output(slot, Bytes::from(format!("page {i}")))
                    .await
                    .unwrap(),
            );
        }

        let bundle = store.bundle(&job(), "report", "split", &members).await.unwrap();
        assert_eq!(bundle.name, "report_split_deadbeef.zip");
        assert!(bundle.size_bytes > 0);
        assert!(bundle.path.is_file());
    }

    #[tokio::test]
    async fn test_bundle_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let err = store.bundle(&job(), "report", "split", &[]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Bundle);
    }

    #[tokio::test]
    async fn test_resolve_download_guards_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let slot = store.allocate_output(&job(), "report", "merged", "pdf");
        let artifact = store.write_output(slot, Bytes::from("x")).await.unwrap();

        let ok = store.resolve_download(None, &artifact.name).await.unwrap();
        assert_eq!(ok, artifact.path);

        assert!(store.resolve_download(None, "missing.pdf").await.is_err());
        assert!(store.resolve_download(None, "../intake/x.pdf").await.is_err());
        assert!(store.resolve_download(Some(".."), "x.pdf").await.is_err());
        assert!(store
            .resolve_download(Some("a/b"), "x.pdf")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_resolve_download_nested() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let batch = store.create_batch(&job(), "report", "split").await.unwrap();
        let slot = store.allocate_page(&batch, "report", 1, "pdf");
        let artifact = store.write_output(slot, Bytes::from("page")).await.unwrap();

        let ok = store
            .resolve_download(Some("report_split_deadbeef"), "report_page_1.pdf")
            .await
            .unwrap();
        assert_eq!(ok, artifact.path);

        // A directory itself is not downloadable.
        assert!(store
            .resolve_download(None, "report_split_deadbeef")
            .await
            .is_err());
    }

    #[test]
    fn test_mime_detection() {
        assert_eq!(mime_from_name("file.pdf"), Some("application/pdf".into()));
        assert_eq!(mime_from_name("IMG.PNG"), Some("image/png".into()));
        assert_eq!(mime_from_name("noext"), None);
    }
}
