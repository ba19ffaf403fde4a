//! Storage path derivation.
//!
//! Every key handed to a storage backend is produced here. A key is the
//! storage root joined with a handle and a sanitized user path, and is
//! guaranteed to sit inside the root after lexical normalization.

use std::path::{Component, Path, PathBuf};

use quick_error::quick_error;

use crate::consts::MAX_PATH_LENGTH;

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum PathError {
        EmptyPath {
            display("path cannot be empty")
        }
        PathTooLong(length: usize) {
            display("path is {} characters long, limit is {}", length, MAX_PATH_LENGTH)
        }
        PathTraversal(path: String) {
            display("path {} escapes the storage root", path)
        }
        AbsolutePath(path: String) {
            display("path {} must be relative", path)
        }
    }
}

pub type Result<T> = std::result::Result<T, PathError>;

/// Canonical location of a stored object.
///
/// `path` is the absolute filesystem form used by the local backend, `key`
/// is the same location relative to the storage root with `/` separators,
/// used verbatim as an object key by the remote backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageKey {
    path: PathBuf,
    key: String,
}

impl StorageKey {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn object_key(&self) -> &str {
        &self.key
    }

    /// Object key prefix matching everything stored below this key.
    pub fn object_prefix(&self) -> String {
        format!("{}/", self.key)
    }

    /// True when the key denotes the storage root itself.
    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// Last segment of the key, used as the download file name.
    pub fn file_name(&self) -> Option<&str> {
        self.key.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

/// Cleans a caller supplied path into a relative, slash separated form.
///
/// Surrounding whitespace and trailing slashes are dropped. A path that
/// still starts with `/` is absolute and rejected, as is any path with a
/// `..` segment. Redundant separators and `.` segments are removed; a path
/// made only of `.` segments cleans to `"."`, which addresses a whole handle.
pub fn sanitize(user_path: &str) -> Result<String> {
    let trimmed = user_path.trim().trim_end_matches('/').trim_end();

    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let length = trimmed.chars().count();
    if length > MAX_PATH_LENGTH {
        return Err(PathError::PathTooLong(length));
    }

    if trimmed.split('/').any(|segment| segment == "..") {
        return Err(PathError::PathTraversal(trimmed.to_owned()));
    }

    if Path::new(trimmed).is_absolute() {
        return Err(PathError::AbsolutePath(trimmed.to_owned()));
    }

    let cleaned = trimmed
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");

    if cleaned.is_empty() {
        Ok(".".to_owned())
    } else {
        Ok(cleaned)
    }
}

/// Lexically normalizes a path: drops `.` components and folds `..` into
/// its parent without touching the filesystem. `..` never climbs above the
/// filesystem root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(name) => normalized.push(name),
        }
    }

    normalized
}

fn check_handle(handle: &str) -> Result<()> {
    if handle.trim().is_empty() {
        return Err(PathError::EmptyPath);
    }

    let mut components = Path::new(handle).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !handle.contains('/') => Ok(()),
        _ => Err(PathError::PathTraversal(handle.to_owned())),
    }
}

#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Builds a resolver for `root`, which is made absolute against the
    /// current working directory and normalized once here.
    pub fn new<P: AsRef<Path>>(root: P) -> std::io::Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };

        Ok(PathResolver { root: normalize(&root) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `user_path` under `handle` into a storage key. The handle
    /// must be a single plain path segment.
    pub fn resolve(&self, handle: &str, user_path: &str) -> Result<StorageKey> {
        check_handle(handle)?;
        let relative = sanitize(user_path)?;

        self.join(handle, &relative)
    }

    /// Resolves the directory (or object prefix) holding every file under
    /// `handle`. The result equals the storage root when the handle is
    /// empty or `.`, callers must check [StorageKey::is_root].
    pub fn resolve_handle(&self, handle: &str) -> Result<StorageKey> {
        self.join(handle, ".")
    }

    fn join(&self, handle: &str, relative: &str) -> Result<StorageKey> {
        let candidate = normalize(&self.root.join(handle).join(relative));

        // the handle is not sanitized, so the joined form is checked again
        let stripped = candidate
            .strip_prefix(&self.root)
            .map_err(|_| PathError::PathTraversal(candidate.display().to_string()))?;

        let key = stripped
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        Ok(StorageKey { path: candidate, key })
    }
}
