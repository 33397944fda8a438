//! File system operations confined to the workspace root

use super::workspace::WorkspaceRoot;
use crate::error::{Error, Result, SandboxError};
use crate::types::DirEntry;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info};

/// File system handler for agent capability requests
pub struct FileSystemHandler;

impl FileSystemHandler {
    /// Read a text file inside the workspace
    pub async fn read_text_file(workspace: &WorkspaceRoot, path: &str) -> Result<String> {
        let path = workspace.resolve(path)?;
        debug!("Reading file: {:?}", path);

        fs::read_to_string(&path).await.map_err(|e| not_found_or_io(e, &path, false))
    }

    /// Write a text file inside the workspace.
    ///
    /// Content goes to a temporary file in the target directory which is then
    /// renamed over the destination, so readers never see a partial file.
    pub async fn write_text_file(workspace: &WorkspaceRoot, path: &str, content: &str) -> Result<()> {
        let path = workspace.resolve(path)?;
        debug!("Writing file: {:?}", path);

        write_atomic(&path, content.as_bytes().to_vec()).await?;
        info!("Wrote {} bytes to {:?}", content.len(), path);
        Ok(())
    }

    /// List a directory inside the workspace, directories first then by name
    pub async fn list_directory(workspace: &WorkspaceRoot, path: &str) -> Result<Vec<DirEntry>> {
        let path = workspace.resolve(path)?;
        debug!("Listing directory: {:?}", path);

        let mut reader = fs::read_dir(&path)
            .await
            .map_err(|e| not_found_or_io(e, &path, true))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let is_directory = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_directory,
            });
        }

        entries.sort_by(|a, b| match (a.is_directory, b.is_directory) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });

        Ok(entries)
    }
}

/// Replace `path` with `bytes` through a temp file in the same directory.
///
/// Parent directories are created as needed.
pub(crate) async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Sandbox(SandboxError::InvalidPath(path.display().to_string())))?
        .to_path_buf();
    fs::create_dir_all(&parent).await?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| Error::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Internal(format!("write task failed: {}", e)))?
}

fn not_found_or_io(e: std::io::Error, path: &Path, dir: bool) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        let shown = path.to_string_lossy().to_string();
        if dir {
            Error::Sandbox(SandboxError::DirectoryNotFound(shown))
        } else {
            Error::Sandbox(SandboxError::FileNotFound(shown))
        }
    } else {
        Error::Io(e)
    }
}
