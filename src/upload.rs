//! Reassembly of files the client sends slice by slice.
//!
//! The client drives the transfer: each accepted slice is answered with
//! `upload-request-slice` until `slices * chunk_size >= declared size`, at
//! which point the slices are concatenated in arrival order and written under
//! the site's files directory.
//!
//! Slices carry no index. A client that misreports the size or sends slices
//! out of order produces a corrupted file, and nothing here can tell.

use crate::tenant::is_valid_site;
use crate::ws::protocol::UploadSlice;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Error from upload handling.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid file name: {0:?}")]
    InvalidFilename(String),
    #[error("invalid site: {0:?}")]
    InvalidSite(String),
    #[error("invalid slice payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to write file: {0}")]
    Io(#[from] std::io::Error),
}

/// Reassembly state for one file on one connection.
#[derive(Debug)]
pub struct UploadState {
    pub name: String,
    pub mime_type: Option<String>,
    /// Declared total size
    pub size: u64,
    pub is_private: bool,
    /// Site the file is written for
    pub site: String,
    chunks: Vec<Vec<u8>>,
    slice: u64,
}

impl UploadState {
    fn new(first: &UploadSlice, site: &str) -> Self {
        Self {
            name: first.name.clone(),
            mime_type: first.mime_type.clone(),
            size: first.size,
            is_private: first.is_private,
            site: site.to_string(),
            chunks: Vec::new(),
            slice: 0,
        }
    }

    fn push(&mut self, bytes: Vec<u8>) {
        self.chunks.push(bytes);
        self.slice += 1;
    }

    /// Slices accepted so far.
    pub fn slice(&self) -> u64 {
        self.slice
    }

    pub fn is_complete(&self, chunk_size: usize) -> bool {
        self.slice.saturating_mul(chunk_size as u64) >= self.size
    }

    fn finish(self) -> CompletedUpload {
        CompletedUpload {
            bytes: self.chunks.concat(),
            name: self.name,
            is_private: self.is_private,
            site: self.site,
        }
    }
}

/// What the gateway should do after a slice was accepted.
#[derive(Debug)]
pub enum SliceOutcome {
    /// Ask the client for the next slice; carries the slice counter.
    NeedMore(u64),
    /// All slices are in; the state has already been removed.
    Complete(CompletedUpload),
}

/// A fully reassembled file waiting to be written.
#[derive(Debug)]
pub struct CompletedUpload {
    pub name: String,
    pub is_private: bool,
    pub site: String,
    pub bytes: Vec<u8>,
}

impl CompletedUpload {
    fn visibility(&self) -> &'static str {
        if self.is_private {
            "private"
        } else {
            "public"
        }
    }

    /// URL path reported back to the client.
    pub fn file_url(&self) -> String {
        format!("/{}/files/{}", self.visibility(), self.name)
    }

    /// Location of the file under a site root.
    pub fn path(&self, site_root: &Path) -> PathBuf {
        site_root
            .join(self.visibility())
            .join("files")
            .join(&self.name)
    }

    /// Write the file under `site_root`, creating the files directory if
    /// needed. Returns the file URL.
    pub async fn write(&self, site_root: &Path) -> Result<String, UploadError> {
        let path = self.path(site_root);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!(
            "Wrote upload {} ({} bytes) to {:?}",
            self.name,
            self.bytes.len(),
            path
        );
        Ok(self.file_url())
    }
}

/// In-flight uploads of one connection, keyed by filename.
#[derive(Debug, Default)]
pub struct UploadTable {
    uploads: HashMap<String, UploadState>,
}

impl UploadTable {
    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&UploadState> {
        self.uploads.get(name)
    }

    pub fn clear(&mut self) {
        self.uploads.clear();
    }

    /// Accept one slice. The first slice for a filename fixes the upload's
    /// metadata; later slices only contribute bytes.
    ///
    /// Any error leaves no state behind for that filename.
    pub fn accept(
        &mut self,
        slice: &UploadSlice,
        site: &str,
        chunk_size: usize,
    ) -> Result<SliceOutcome, UploadError> {
        if !is_valid_site(site) {
            return Err(UploadError::InvalidSite(site.to_string()));
        }
        validate_filename(&slice.name)?;

        let bytes = match crate::b64::decode(&slice.data) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.uploads.remove(&slice.name);
                return Err(e.into());
            }
        };

        let state = self
            .uploads
            .entry(slice.name.clone())
            .or_insert_with(|| UploadState::new(slice, site));
        state.push(bytes);

        if !state.is_complete(chunk_size) {
            return Ok(SliceOutcome::NeedMore(state.slice()));
        }

        match self.uploads.remove(&slice.name) {
            Some(state) => Ok(SliceOutcome::Complete(state.finish())),
            // Just inserted above.
            None => Ok(SliceOutcome::NeedMore(0)),
        }
    }
}

fn validate_filename(name: &str) -> Result<(), UploadError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(&['/', '\\', '\0'][..])
    {
        return Err(UploadError::InvalidFilename(name.to_string()));
    }
    Ok(())
}
