//! Input items: the raw bytes handed to a batch run.
//!
//! The library itself has no notion of where bytes come from; hosts build
//! [`InputItem`]s from uploads, clipboard data or files. [`load_inputs`] is
//! the file-system helper used by the CLI and [`crate::convert::convert_files`].

use crate::error::ImgBatchError;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One image to convert. Immutable once captured; `size == bytes.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputItem {
    name: String,
    bytes: Bytes,
}

impl InputItem {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Original file name, used to derive the output name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Original size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Read each path into an [`InputItem`], keeping the given order.
///
/// The item name is the file name component of the path.
pub async fn load_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<InputItem>, ImgBatchError> {
    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        items.push(load_input(path.as_ref()).await?);
    }
    Ok(items)
}

/// Read a single file into an [`InputItem`].
pub async fn load_input(path: &Path) -> Result<InputItem, ImgBatchError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ImgBatchError::InputNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ImgBatchError::InputReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let name = file_name(path);
    debug!("Loaded {} ({} bytes)", name, bytes.len());
    Ok(InputItem::new(name, bytes))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).to_string_lossy().into_owned())
}
