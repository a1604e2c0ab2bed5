//! Archive packaging: bundle converted items into one zip.
//!
//! Entries are written in result order, keyed by each item's output name.
//! Every entry carries the same fixed timestamp, so packaging identical
//! results twice yields byte-identical archives.
//!
//! Two inputs can map to the same output name (`b.png` and `b.jpg` both
//! become `b.webp`). [`CollisionPolicy`] decides what happens then.

use crate::config::{ArchiveCompression, ArchiveOptions, CollisionPolicy};
use crate::error::ArchiveError;
use crate::output::ConvertedItem;
use crate::pipeline::naming::{is_plain_file_name, with_counter};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Serialise `items` into a zip archive held in memory.
///
/// An empty slice produces a valid, empty archive.
pub fn package_archive(
    items: &[ConvertedItem],
    options: &ArchiveOptions,
) -> Result<Vec<u8>, ArchiveError> {
    let entries = resolve_entries(items, options.collision)?;

    let method = match options.compression {
        ArchiveCompression::Stored => CompressionMethod::Stored,
        ArchiveCompression::Deflated => CompressionMethod::Deflated,
    };
    let file_options = SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, item) in &entries {
        writer.start_file(name.as_str(), file_options)?;
        writer.write_all(&item.bytes)?;
    }
    let archive = writer.finish()?.into_inner();

    debug!(
        "Packaged {} entries into {} bytes",
        entries.len(),
        archive.len()
    );
    Ok(archive)
}

/// Apply the collision policy, returning `(entry name, item)` pairs in
/// archive order. Also decides the file names used by
/// [`crate::convert::write_items`].
///
/// Every name must be a plain file name; anything carrying a path
/// (`../x.webp`, `/x.webp`) fails with [`ArchiveError::UnsafeEntryName`].
pub(crate) fn resolve_entries(
    items: &[ConvertedItem],
    policy: CollisionPolicy,
) -> Result<Vec<(String, &ConvertedItem)>, ArchiveError> {
    if let Some(item) = items.iter().find(|i| !is_plain_file_name(&i.output_name)) {
        return Err(ArchiveError::UnsafeEntryName {
            name: item.output_name.clone(),
        });
    }

    let mut entries: Vec<(String, &ConvertedItem)> = Vec::with_capacity(items.len());

    match policy {
        CollisionPolicy::Reject => {
            let mut seen = HashSet::new();
            for item in items {
                if !seen.insert(item.output_name.as_str()) {
                    return Err(ArchiveError::DuplicateEntry {
                        name: item.output_name.clone(),
                    });
                }
                entries.push((item.output_name.clone(), item));
            }
        }
        CollisionPolicy::LastWriteWins => {
            let mut slots: HashMap<&str, usize> = HashMap::new();
            for item in items {
                match slots.get(item.output_name.as_str()) {
                    Some(&slot) => {
                        warn!("Archive entry '{}' overwritten by a later item", item.output_name);
                        entries[slot].1 = item;
                    }
                    None => {
                        slots.insert(item.output_name.as_str(), entries.len());
                        entries.push((item.output_name.clone(), item));
                    }
                }
            }
        }
        CollisionPolicy::AutoSuffix => {
            let taken: HashSet<&str> = items.iter().map(|i| i.output_name.as_str()).collect();
            let mut used: HashSet<String> = HashSet::new();
            for item in items {
                let mut name = item.output_name.clone();
                let mut n = 0;
                // A generated name must not steal one another item owns outright.
                while used.contains(&name) || (n > 0 && taken.contains(name.as_str())) {
                    n += 1;
                    name = with_counter(&item.output_name, n);
                }
                if n > 0 {
                    debug!("Archive entry '{}' renamed to '{}'", item.output_name, name);
                }
                used.insert(name.clone());
                entries.push((name, item));
            }
        }
    }

    Ok(entries)
}
