//! Input directory scanning and document loading.
//!
//! Walks the ingest directory with `walkdir`, filters paths through the
//! configured include/exclude globs, and turns each matching file into a
//! [`Document`] via [`crate::extract`]. Files are returned in a stable,
//! path-sorted order so repeated runs process documents identically.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::extract::{content_type_for, extract_pages, ExtractError};
use crate::models::Document;

/// A candidate input file discovered by [`scan_directory`].
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the scanned root, with `/` separators.
    pub relative: String,
    pub content_type: &'static str,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

pub fn scan_directory(root: &Path, config: &IngestConfig) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(Error::config(format!(
            "input directory does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec!["**/.*/**".to_string(), "**/~$*".to_string()];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if exclude_set.is_match(&relative) || !include_set.is_match(&relative) {
            continue;
        }
        let Some(content_type) = content_type_for(path) else {
            tracing::debug!(path = %relative, "no extractor for file type, skipping");
            continue;
        };

        let metadata = entry.metadata().map_err(|e| Error::Io(e.into()))?;
        let modified_secs = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative,
            content_type,
            size: metadata.len(),
            modified: Utc
                .timestamp_opt(modified_secs, 0)
                .single()
                .unwrap_or_default(),
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Read and extract one file. Oversized, unreadable and unparseable files
/// come back as [`Error::Extract`] so the caller can skip them.
pub fn load_document(file: &SourceFile, max_file_bytes: u64) -> Result<Document> {
    if file.size > max_file_bytes {
        return Err(Error::Extract {
            path: file.relative.clone(),
            source: ExtractError::TooLarge {
                size: file.size,
                limit: max_file_bytes,
            },
        });
    }

    let extract_err = |source: ExtractError| Error::Extract {
        path: file.relative.clone(),
        source,
    };
    let bytes = std::fs::read(&file.path).map_err(|e| extract_err(ExtractError::Io(e)))?;
    let pages = extract_pages(&bytes, file.content_type).map_err(extract_err)?;

    Ok(Document {
        file_name: file.relative.clone(),
        content_type: file.content_type.to_string(),
        modified: file.modified,
        pages,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("invalid glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> IngestConfig {
        IngestConfig::default()
    }

    #[test]
    fn missing_root_is_config_error() {
        let err = scan_directory(Path::new("/definitely/not/here"), &config()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn scan_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("a.md"), "a").unwrap();
        fs::write(root.join("sub/c.txt"), "c").unwrap();
        fs::write(root.join("image.png"), [0u8; 4]).unwrap();
        fs::write(root.join(".hidden/secret.txt"), "x").unwrap();

        let files = scan_directory(root, &config()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.txt", "sub/c.txt"]);
        assert_eq!(files[1].content_type, crate::extract::MIME_TEXT);
    }

    #[test]
    fn nested_document_keeps_relative_name() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("retail")).unwrap();
        fs::write(tmp.path().join("retail/fees.txt"), "Fees apply.").unwrap();
        let files = scan_directory(tmp.path(), &config()).unwrap();
        let doc = load_document(&files[0], 1024).unwrap();
        assert_eq!(doc.file_name, "retail/fees.txt");
    }

    #[test]
    fn vanished_file_is_extract_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("gone.txt"), "Soon deleted.").unwrap();
        let files = scan_directory(tmp.path(), &config()).unwrap();
        fs::remove_file(tmp.path().join("gone.txt")).unwrap();
        let err = load_document(&files[0], 1024).unwrap_err();
        assert!(matches!(
            err,
            Error::Extract {
                source: ExtractError::Io(_),
                ..
            }
        ));
        assert!(err.to_string().contains("gone.txt"));
    }

    #[test]
    fn exclude_globs_apply() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("drafts")).unwrap();
        fs::write(tmp.path().join("keep.txt"), "k").unwrap();
        fs::write(tmp.path().join("drafts/skip.txt"), "s").unwrap();

        let mut cfg = config();
        cfg.exclude_globs = vec!["drafts/**".to_string()];
        let files = scan_directory(tmp.path(), &cfg).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "keep.txt");
    }

    #[test]
    fn invalid_glob_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config();
        cfg.include_globs = vec!["[".to_string()];
        assert!(matches!(
            scan_directory(tmp.path(), &cfg).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn load_text_document() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), "Wire cutoff is 5pm.").unwrap();
        let files = scan_directory(tmp.path(), &config()).unwrap();
        let doc = load_document(&files[0], 1024).unwrap();
        assert_eq!(doc.file_name, "notes.txt");
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].text, "Wire cutoff is 5pm.");
    }

    #[test]
    fn oversized_file_is_extract_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("big.txt"), "x".repeat(100)).unwrap();
        let files = scan_directory(tmp.path(), &config()).unwrap();
        let err = load_document(&files[0], 10).unwrap_err();
        assert!(matches!(err, Error::Extract { .. }));
    }

    #[test]
    fn corrupt_pdf_is_extract_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.pdf"), b"not a pdf").unwrap();
        let files = scan_directory(tmp.path(), &config()).unwrap();
        let err = load_document(&files[0], 1024).unwrap_err();
        assert!(err.to_string().contains("broken.pdf"));
    }
}
