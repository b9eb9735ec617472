//! File validation and loading for `ttd ingest`.
//!
//! Every path is checked before it is read: it must be a regular file
//! with a supported extension, non-empty, and no larger than
//! `ingest.max_file_size_mb`. Directories are walked recursively and
//! contribute their supported files in sorted order.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::extract::{self, DocumentKind};

/// Why a file was refused before extraction.
#[derive(Debug, PartialEq, Eq)]
pub enum FileValidationError {
    NotFound(PathBuf),
    UnsupportedType(String),
    Empty(PathBuf),
    TooLarge { path: PathBuf, size: u64, limit: u64 },
}

impl std::fmt::Display for FileValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileValidationError::NotFound(p) => write!(f, "file not found: {}", p.display()),
            FileValidationError::UnsupportedType(ext) => write!(
                f,
                "unsupported file type '{}'. Allowed: {}",
                ext,
                DocumentKind::EXTENSIONS.join(", ")
            ),
            FileValidationError::Empty(p) => write!(f, "file is empty: {}", p.display()),
            FileValidationError::TooLarge { path, size, limit } => write!(
                f,
                "file too large: {} is {} bytes (limit {} bytes)",
                path.display(),
                size,
                limit
            ),
        }
    }
}

impl std::error::Error for FileValidationError {}

/// A file's extracted text, ready for ingestion.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub source_name: String,
    pub text: String,
}

/// Check `path` against the upload rules and return its kind.
pub fn validate_file(path: &Path, max_bytes: u64) -> Result<DocumentKind, FileValidationError> {
    let metadata = std::fs::metadata(path).map_err(|_| FileValidationError::NotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(FileValidationError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = DocumentKind::from_extension(&ext).ok_or(FileValidationError::UnsupportedType(ext))?;

    let size = metadata.len();
    if size == 0 {
        return Err(FileValidationError::Empty(path.to_path_buf()));
    }
    if size > max_bytes {
        return Err(FileValidationError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: max_bytes,
        });
    }
    Ok(kind)
}

/// Validate, read and extract one file.
pub fn load_file(path: &Path, max_bytes: u64) -> anyhow::Result<LoadedFile> {
    let kind = validate_file(path, max_bytes)?;
    let bytes = std::fs::read(path)?;
    let text = extract::extract_text(&bytes, kind)?;
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(LoadedFile { source_name, text })
}

/// Expand directories into their supported files; plain paths pass
/// through unchanged so validation can report on them.
pub fn collect_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if !path.is_dir() {
            out.push(path.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .and_then(DocumentKind::from_extension)
                    .is_some()
            })
            .collect();
        found.sort();
        out.extend(found);
    }
    out
}
