//! Filesystem content staging.
//!
//! A source document is a `*.md` file somewhere under the staging root. Its destination parent is
//! named by the first non-empty line of `parenturl.txt` in the same directory and its page title is
//! the file stem. Source locations are relative to the root and always use `/` separators.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use futures::future::BoxFuture;
use thiserror::Error;

pub const DOCUMENT_EXTENSION: &str = "md";
pub const PARENT_REFERENCE_FILE: &str = "parenturl.txt";

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("source location `{0}` is not a relative path inside the staging root")]
    InvalidLocation(String),
    #[error("source document `{0}` not found")]
    NotFound(String),
    #[error("no parent reference for `{0}`: {PARENT_REFERENCE_FILE} is missing or empty")]
    MissingParent(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Destination metadata for one staged document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub title: String,
    pub parent_reference: String,
}

/// One document found by a staging scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagedDocument {
    pub source_location: String,
    pub modified_ms: i64,
}

/// Title and parent lookup used by the uploader when it has to create a page.
pub trait SourceCatalog: Send + Sync {
    fn describe<'a>(
        &'a self,
        source_location: &'a str,
    ) -> BoxFuture<'a, Result<SourceDescriptor, StagingError>>;
}

/// Raw document reads used by ingestion.
pub trait DocumentSource: Send + Sync {
    fn read_document<'a>(
        &'a self,
        source_location: &'a str,
    ) -> BoxFuture<'a, Result<String, StagingError>>;
}

impl<T> SourceCatalog for Arc<T>
where
    T: SourceCatalog + ?Sized,
{
    fn describe<'a>(
        &'a self,
        source_location: &'a str,
    ) -> BoxFuture<'a, Result<SourceDescriptor, StagingError>> {
        (**self).describe(source_location)
    }
}

impl<T> DocumentSource for Arc<T>
where
    T: DocumentSource + ?Sized,
{
    fn read_document<'a>(
        &'a self,
        source_location: &'a str,
    ) -> BoxFuture<'a, Result<String, StagingError>> {
        (**self).read_document(source_location)
    }
}

#[derive(Debug, Clone)]
pub struct FsStaging {
    root: PathBuf,
}

impl FsStaging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists every staged document, sorted by source location.
    pub fn scan(&self) -> Result<Vec<StagedDocument>, StagingError> {
        let mut documents = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir).map_err(|source| io_error(&dir, source))?;
            for entry in entries {
                let entry = entry.map_err(|source| io_error(&dir, source))?;
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .map_err(|source| io_error(&path, source))?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file()
                    || path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION)
                {
                    continue;
                }

                let modified_ms = entry
                    .metadata()
                    .and_then(|meta| meta.modified())
                    .map_err(|source| io_error(&path, source))?
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_millis() as i64)
                    .unwrap_or(0);

                if let Some(source_location) = self.location_of(&path) {
                    documents.push(StagedDocument {
                        source_location,
                        modified_ms,
                    });
                }
            }
        }

        documents.sort_by(|a, b| a.source_location.cmp(&b.source_location));
        Ok(documents)
    }

    fn location_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    fn resolve(&self, source_location: &str) -> Result<PathBuf, StagingError> {
        let relative = Path::new(source_location);
        let is_contained = !source_location.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_contained {
            return Err(StagingError::InvalidLocation(source_location.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn read_parent_reference(&self, source_location: &str) -> Result<String, StagingError> {
        let document = self.resolve(source_location)?;
        let parent_file = document
            .parent()
            .unwrap_or(&self.root)
            .join(PARENT_REFERENCE_FILE);

        let contents = match std::fs::read_to_string(&parent_file) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StagingError::MissingParent(source_location.to_string()))
            }
            Err(source) => return Err(io_error(&parent_file, source)),
        };

        contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StagingError::MissingParent(source_location.to_string()))
    }
}

impl SourceCatalog for FsStaging {
    fn describe<'a>(
        &'a self,
        source_location: &'a str,
    ) -> BoxFuture<'a, Result<SourceDescriptor, StagingError>> {
        Box::pin(async move {
            let document = self.resolve(source_location)?;
            let title = document
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
                .ok_or_else(|| StagingError::InvalidLocation(source_location.to_string()))?;
            let parent_reference = self.read_parent_reference(source_location)?;
            Ok(SourceDescriptor {
                title,
                parent_reference,
            })
        })
    }
}

impl DocumentSource for FsStaging {
    fn read_document<'a>(
        &'a self,
        source_location: &'a str,
    ) -> BoxFuture<'a, Result<String, StagingError>> {
        Box::pin(async move {
            let path = self.resolve(source_location)?;
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(contents),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    Err(StagingError::NotFound(source_location.to_string()))
                }
                Err(source) => Err(io_error(&path, source)),
            }
        })
    }
}

/// Tracks which (location, modification time) pairs have already been turned into arrivals.
#[derive(Debug, Default)]
pub struct ArrivalTracker {
    seen: HashMap<String, i64>,
}

impl ArrivalTracker {
    /// Marks everything currently staged as seen without producing arrivals.
    pub fn baseline(documents: &[StagedDocument]) -> Self {
        let mut tracker = Self::default();
        tracker.take_new(documents);
        tracker
    }

    /// Returns documents that are new or were rewritten since the last call.
    pub fn take_new(&mut self, documents: &[StagedDocument]) -> Vec<StagedDocument> {
        documents
            .iter()
            .filter(|doc| {
                let previous = self
                    .seen
                    .insert(doc.source_location.clone(), doc.modified_ms);
                previous != Some(doc.modified_ms)
            })
            .cloned()
            .collect()
    }
}

fn io_error(path: &Path, source: io::Error) -> StagingError {
    StagingError::Io {
        path: path.display().to_string(),
        source,
    }
}
