use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_recursion::async_recursion;
use chrono::{DateTime, Utc};
use fastrace_macro::trace;
use tokio::fs::{DirBuilder, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::consts::{COPY_BUFFER_SIZE, DIR_MODE, FILE_MODE};
use crate::path::{normalize, StorageKey};
use crate::storage::{ByteStream, ObjectInfo, Result, StorageBackend, StorageError, SweepReport};

fn io_error(context: &str, path: &Path, e: std::io::Error) -> StorageError {
    StorageError::IoError(format!("{} {}: {:?}", context, path.display(), e))
}

/// Local disk variant. Objects live at `<root>/<handle>/<path>`.
#[derive(Debug)]
pub struct FileSystem {
    base_path: PathBuf,
}

impl FileSystem {
    /// `base_path` must be absolute, as produced by [crate::path::PathResolver::root].
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        FileSystem { base_path: normalize(base_path.as_ref()) }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Creates the storage root if it is missing.
    pub async fn ensure_root(&self) -> Result<()> {
        create_dir_all(&self.base_path).await?;

        log::info!(
            "Storage root {} ensured with permissions {:o}",
            self.base_path.display(),
            DIR_MODE
        );

        Ok(())
    }

    fn relative_key(&self, path: &Path) -> String {
        path.strip_prefix(&self.base_path)
            .unwrap_or(path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    #[trace(name = "file_system::remove_expired")]
    async fn remove_expired(&self, path: &Path, cutoff: DateTime<Utc>) -> std::io::Result<bool> {
        let metadata = tokio::fs::symlink_metadata(path).await?;
        let newest = match newest_file_modification(path).await? {
            Some(newest) => newest,
            None => metadata.modified()?,
        };
        let newest = DateTime::<Utc>::from(newest);

        if newest > cutoff {
            log::trace!("Keeping {}, last modified {}", path.display(), newest);

            return Ok(false);
        }

        if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }

        Ok(true)
    }
}

async fn create_dir_all(path: &Path) -> Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);

    match builder.create(path).await {
        Ok(_) => Ok(()),
        Err(e) => match e.kind() {
            std::io::ErrorKind::AlreadyExists => Ok(()),
            _ => Err(io_error("unable to create directory", path, e)),
        },
    }
}

async fn copy_buffered<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0_u8; COPY_BUFFER_SIZE];
    let mut written = 0_u64;

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }

        writer.write_all(&buffer[..read]).await?;
        written += read as u64;
    }

    writer.flush().await?;

    Ok(written)
}

/// Newest modification time among the files below `path`, or of `path`
/// itself when it is a file. `None` for a directory tree without files.
#[async_recursion]
async fn newest_file_modification(path: &Path) -> std::io::Result<Option<SystemTime>> {
    let metadata = tokio::fs::symlink_metadata(path).await?;

    if !metadata.is_dir() {
        return Ok(Some(metadata.modified()?));
    }

    let mut newest = None;
    let mut entries = tokio::fs::read_dir(path).await?;

    while let Some(entry) = entries.next_entry().await? {
        let modified = newest_file_modification(&entry.path()).await?;
        newest = newest.max(modified);
    }

    Ok(newest)
}

#[async_recursion]
async fn collect_files(
    path: &Path,
    files: &mut Vec<(PathBuf, std::fs::Metadata)>,
) -> std::io::Result<()> {
    let metadata = tokio::fs::symlink_metadata(path).await?;

    if !metadata.is_dir() {
        files.push((path.to_path_buf(), metadata));
        return Ok(());
    }

    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        collect_files(&entry.path(), files).await?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl StorageBackend for FileSystem {
    fn storage_type(&self) -> &'static str {
        crate::consts::STORAGE_TYPE_FILE_SYSTEM
    }

    #[trace(name = "file_system::save")]
    async fn save(
        &self,
        key: &StorageKey,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        let path = key.path();

        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        let mut file = options
            .open(path)
            .await
            .map_err(|e| io_error("unable to open file for writing", path, e))?;

        match copy_buffered(body, &mut file).await {
            Ok(written) => Ok(written),
            Err(e) => {
                drop(file);

                if let Err(remove_error) = tokio::fs::remove_file(path).await {
                    log::warn!(
                        "Unable to remove partial upload {}: {:?}",
                        path.display(),
                        remove_error
                    );
                }

                Err(io_error("unable to write file", path, e))
            }
        }
    }

    #[trace(name = "file_system::open")]
    async fn open(&self, key: &StorageKey) -> Result<ByteStream> {
        let path = key.path();

        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => (),
            Ok(_) => return Err(StorageError::NotFound(key.object_key().to_owned())),
            Err(e) => {
                return match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        Err(StorageError::NotFound(key.object_key().to_owned()))
                    }
                    _ => Err(io_error("unable to inspect file", path, e)),
                }
            }
        }

        let file = File::open(path)
            .await
            .map_err(|e| io_error("unable to open file", path, e))?;

        Ok(Box::pin(file))
    }

    #[trace(name = "file_system::delete")]
    async fn delete(&self, key: &StorageKey) -> Result<()> {
        let path = key.path();

        tokio::fs::remove_file(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(key.object_key().to_owned()),
            _ => io_error("unable to delete file", path, e),
        })
    }

    #[trace(name = "file_system::delete_prefix")]
    async fn delete_prefix(&self, prefix: &StorageKey) -> Result<()> {
        let path = normalize(prefix.path());

        if prefix.is_root() || path == self.base_path {
            return Err(StorageError::ForbiddenRoot(path.display().to_string()));
        }

        let metadata = tokio::fs::symlink_metadata(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(prefix.object_key().to_owned()),
            _ => io_error("unable to inspect", &path, e),
        })?;

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        result.map_err(|e| io_error("unable to delete", &path, e))
    }

    #[trace(name = "file_system::list")]
    async fn list(&self, prefix: &StorageKey) -> Result<Vec<ObjectInfo>> {
        let mut files = Vec::new();

        match collect_files(prefix.path(), &mut files).await {
            Ok(()) => (),
            Err(e) => match e.kind() {
                std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                _ => return Err(io_error("unable to list", prefix.path(), e)),
            },
        }

        let mut objects = files
            .into_iter()
            .map(|(path, metadata)| {
                let last_modified = metadata
                    .modified()
                    .map_err(|e| io_error("unable to read modification time of", &path, e))?;

                Ok(ObjectInfo {
                    key: self.relative_key(&path),
                    size: metadata.len(),
                    last_modified: DateTime::<Utc>::from(last_modified),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        objects.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(objects)
    }

    /// Each child of the root is one handle and expires as a unit, judged
    /// by the newest file anywhere in its subtree.
    #[trace(name = "file_system::sweep_expired")]
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<SweepReport> {
        let mut entries = tokio::fs::read_dir(&self.base_path)
            .await
            .map_err(|e| io_error("unable to list storage root", &self.base_path, e))?;
        let mut report = SweepReport::default();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("unable to list storage root", &self.base_path, e))?
        {
            let path = entry.path();
            report.scanned += 1;

            match self.remove_expired(&path, cutoff).await {
                Ok(true) => {
                    log::info!("Removed expired path {}", path.display());
                    report.removed += 1;
                }
                Ok(false) => (),
                Err(e) => {
                    log::warn!("Unable to expire {}: {:?}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
