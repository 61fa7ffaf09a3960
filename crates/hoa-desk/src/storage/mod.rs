//! The public disk uploaded and generated files are written to.

use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage path '{0}'")]
    InvalidPath(String),
    #[error("file '{0}' not found on disk")]
    NotFound(String),
    #[error("file '{0}' already exists")]
    AlreadyExists(String),
    #[error("disk operation on '{path}' failed: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Storage abstraction so services can be exercised without a real disk layout.
pub trait FileStorage: Debug + Send + Sync {
    /// Create a new file; an existing file at `path` is never replaced.
    fn put(&self, path: &str, contents: &[u8]) -> Result<(), StorageError>;
    fn get(&self, path: &str) -> Result<Vec<u8>, StorageError>;
    fn delete(&self, path: &str) -> Result<(), StorageError>;
    fn exists(&self, path: &str) -> bool;
    /// Public URL for a stored path.
    fn url(&self, path: &str) -> String;
}

/// Files under a local root directory, served from `public_url`.
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
    public_url: String,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_relative(path)?;
        Ok(self.root.join(path))
    }
}

/// Relative, forward-slash paths without `..` segments.
fn validate_relative(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.contains('\\')
        || path.contains('\0')
        || Path::new(path)
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
    if invalid {
        Err(StorageError::InvalidPath(path.to_string()))
    } else {
        Ok(())
    }
}

impl FileStorage for LocalDisk {
    fn put(&self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        let io_error = |source| StorageError::Io {
            path: path.to_string(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(path.to_string()))
            }
            Err(source) => return Err(io_error(source)),
        };
        if let Err(source) = file.write_all(contents).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&target);
            return Err(io_error(source));
        }
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|source| match source.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Io {
                path: path.to_string(),
                source,
            },
        })
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.public_url.trim_end_matches('/'), path)
    }
}

/// File name reduced to `[a-z0-9._-]`, keeping the extension.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let mut cleaned = String::with_capacity(base.len());
    let mut last_dash = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            cleaned.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            cleaned.push('-');
            last_dash = true;
        }
    }
    let trimmed = cleaned.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Slug for generated file names (`Lease Agreement` → `lease-agreement`).
pub fn slugify(raw: &str) -> String {
    let slug = raw
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}
