//! Job-exclusive working directory and input materialization.

use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::application::error::JobError;

pub const MODEL_FILE_STEM: &str = "model";
pub const OUTPUT_FILE_STEM: &str = "output";

/// Rejected caller-supplied relative path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("absolute paths are not allowed")]
    Absolute,
    #[error("path escapes the job directory")]
    Traversal,
}

/// Canonical file names inside a job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    pub model_file: String,
    pub output_file: String,
}

impl JobLayout {
    pub fn new(source_extension: &str, output_extension: &str) -> Self {
        Self {
            model_file: format!("{MODEL_FILE_STEM}.{source_extension}"),
            output_file: format!("{OUTPUT_FILE_STEM}.{output_extension}"),
        }
    }
}

impl Default for JobLayout {
    fn default() -> Self {
        Self::new("scad", "stl")
    }
}

/// Directory owned by exactly one job. It is never removed by this crate.
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
    model_path: PathBuf,
    output_path: PathBuf,
}

impl JobWorkspace {
    /// Create `<temp_root>/<job_id>`. The directory must not exist yet.
    pub async fn create(
        temp_root: &Path,
        job_id: &str,
        layout: &JobLayout,
    ) -> Result<Self, JobError> {
        let root = temp_root.join(job_id);
        if !is_single_segment(job_id) {
            return Err(JobError::DirectoryCreation {
                path: root,
                source: io::Error::new(
                    ErrorKind::InvalidInput,
                    "job id must be a single path segment",
                ),
            });
        }

        if let Err(source) = fs::create_dir(&root).await {
            return Err(JobError::DirectoryCreation { path: root, source });
        }

        info!(
            target = "application::workspace",
            job_dir = %root.display(),
            "Created job directory"
        );

        Ok(Self {
            model_path: root.join(&layout.model_file),
            output_path: root.join(&layout.output_file),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Whether `path` is, or lies beneath, one of the canonical model/output files.
    pub fn is_reserved(&self, path: &Path) -> bool {
        path.starts_with(&self.model_path) || path.starts_with(&self.output_path)
    }

    /// Map a caller-supplied relative path into the job directory.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathError> {
        let mut resolved = self.root.clone();
        let mut segments = 0usize;

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    segments += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => return Err(PathError::Traversal),
                Component::RootDir | Component::Prefix(_) => return Err(PathError::Absolute),
            }
        }

        if segments == 0 {
            return Err(PathError::Empty);
        }

        Ok(resolved)
    }

    /// Write `bytes` at an already resolved path, creating parent directories.
    pub async fn write(&self, resource: &str, target: &Path, bytes: &[u8]) -> Result<(), JobError> {
        if let Some(parent) = target.parent().filter(|parent| *parent != self.root) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| JobError::extraction(resource, err))?;
        }

        fs::write(target, bytes)
            .await
            .map_err(|err| JobError::extraction(resource, err))?;

        info!(
            target = "application::workspace",
            resource,
            path = %target.display(),
            bytes = bytes.len(),
            "Extracted resource"
        );
        Ok(())
    }
}

/// Decode transport-encoded content. ASCII whitespace (line wrapping) is ignored.
pub fn decode_content(resource: &str, content_base64: &str) -> Result<Vec<u8>, JobError> {
    let decoded = if content_base64.bytes().any(|byte| byte.is_ascii_whitespace()) {
        let compact: String = content_base64
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(content_base64)
    };

    decoded.map_err(|err| JobError::extraction(resource, err))
}

fn is_single_segment(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::error::ExtractionFailure;
    use tempfile::TempDir;

    async fn workspace(dir: &TempDir, job_id: &str) -> JobWorkspace {
        JobWorkspace::create(dir.path(), job_id, &JobLayout::default())
            .await
            .expect("workspace")
    }

    #[tokio::test]
    async fn creates_directory_named_after_job() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(&dir, "abc-123").await;

        assert_eq!(ws.root(), dir.path().join("abc-123"));
        assert!(ws.root().is_dir());
        assert_eq!(ws.model_path(), dir.path().join("abc-123/model.scad"));
        assert_eq!(ws.output_path(), dir.path().join("abc-123/output.stl"));
    }

    #[tokio::test]
    async fn existing_directory_is_a_collision() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir(dir.path().join("taken")).expect("pre-create");

        let err = JobWorkspace::create(dir.path(), "taken", &JobLayout::default())
            .await
            .expect_err("collision");
        match err {
            JobError::DirectoryCreation { path, source } => {
                assert_eq!(path, dir.path().join("taken"));
                assert_eq!(source.kind(), ErrorKind::AlreadyExists);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn job_ids_must_be_single_segments() {
        let dir = TempDir::new().expect("temp dir");
        for job_id in ["", ".", "..", "a/b", "../escape"] {
            let err = JobWorkspace::create(dir.path(), job_id, &JobLayout::default())
                .await
                .expect_err("invalid job id");
            assert!(
                matches!(err, JobError::DirectoryCreation { .. }),
                "unexpected error for `{job_id}`: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn resolve_rejects_escaping_paths() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(&dir, "job").await;

        assert_eq!(ws.resolve("../x"), Err(PathError::Traversal));
        assert_eq!(ws.resolve("a/../../x"), Err(PathError::Traversal));
        assert_eq!(ws.resolve("/etc/passwd"), Err(PathError::Absolute));
        assert_eq!(ws.resolve(""), Err(PathError::Empty));
        assert_eq!(ws.resolve("./."), Err(PathError::Empty));
        assert_eq!(
            ws.resolve("./parts/bracket.stl"),
            Ok(ws.root().join("parts/bracket.stl"))
        );
    }

    #[tokio::test]
    async fn write_creates_nested_directories() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(&dir, "job").await;
        let target = ws.resolve("parts/deep/bracket.stl").expect("resolve");

        ws.write("parts/deep/bracket.stl", &target, b"solid\0")
            .await
            .expect("write");

        assert!(ws.root().join("parts/deep").is_dir());
        assert_eq!(std::fs::read(target).expect("read"), b"solid\0");
    }

    #[tokio::test]
    async fn reserved_paths_are_detected() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(&dir, "job").await;

        assert!(ws.is_reserved(&ws.resolve("./output.stl").expect("resolve")));
        assert!(ws.is_reserved(&ws.resolve("model.scad").expect("resolve")));
        assert!(ws.is_reserved(&ws.resolve("output.stl/x").expect("resolve")));
        assert!(ws.is_reserved(&ws.resolve("model.scad/a/b").expect("resolve")));
        assert!(!ws.is_reserved(&ws.resolve("lib/model.scad").expect("resolve")));
        assert!(!ws.is_reserved(&ws.resolve("output.stl.bak").expect("resolve")));
    }

    #[test]
    fn decode_ignores_line_wrapping() {
        assert_eq!(
            decode_content("a", "Y3ViZS\ng1KTs=\r\n").expect("decode"),
            b"cube(5);"
        );
        assert_eq!(decode_content("a", "").expect("decode"), b"");
    }

    #[test]
    fn decode_failure_names_the_resource() {
        let err = decode_content("parts/a.scad", "not base64!").expect_err("invalid");
        match err {
            JobError::Extraction { resource, source } => {
                assert_eq!(resource, "parts/a.scad");
                assert!(matches!(source, ExtractionFailure::Decode(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
