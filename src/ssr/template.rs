//! Document template store — reads each document template once and keeps it.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

/// Reads a document template's content from storage.
pub type DocumentLoader = Box<dyn Fn(&Path) -> io::Result<String> + Send + Sync + 'static>;

/// Errors raised by [`TemplateStore::get_document`].
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read document template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("template store is poisoned by a panicked reader")]
    Poisoned,
}

/// Process-scoped memo of document templates keyed by file path.
///
/// Documents are assumed immutable for the life of the store: once a path
/// has been read it is never read again. Failed reads are not remembered, so
/// a later call for the same path reads storage again.
///
/// The store lock is held while a document loads, so concurrent first
/// requests for one path still produce a single read.
pub struct TemplateStore {
    documents: Mutex<HashMap<PathBuf, Arc<str>>>,
    loader: DocumentLoader,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore {
    /// Creates an empty store reading from the filesystem.
    pub fn new() -> Self {
        Self::with_loader(|path| std::fs::read_to_string(path))
    }

    /// Creates an empty store reading through `loader`.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn(&Path) -> io::Result<String> + Send + Sync + 'static,
    {
        Self {
            documents: Mutex::new(HashMap::new()),
            loader: Box::new(loader),
        }
    }

    /// Returns the document at `path`, reading it on first use.
    ///
    /// The first load of a path is a synchronous read performed under the
    /// store lock, so it blocks the calling worker thread until the loader
    /// returns. Later calls only clone the stored `Arc`.
    ///
    /// # Errors
    ///
    /// - [`TemplateError::Read`] — the loader failed; nothing is cached.
    /// - [`TemplateError::Poisoned`] — a previous load panicked.
    pub fn get_document(&self, path: impl AsRef<Path>) -> Result<Arc<str>, TemplateError> {
        let path = path.as_ref();
        let mut documents = self.documents.lock().map_err(|_| TemplateError::Poisoned)?;

        if let Some(document) = documents.get(path) {
            return Ok(Arc::clone(document));
        }

        let content = (self.loader)(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = content.len(), "loaded document template");

        let document: Arc<str> = Arc::from(content);
        documents.insert(path.to_path_buf(), Arc::clone(&document));
        Ok(document)
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.documents.lock().map(|documents| documents.len()).unwrap_or(0)
    }

    /// `true` when no document has been loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
