// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Zip export of a folder subtree.
//!
//! The archive is written into an anonymous temp file by a blocking task. The
//! async side streams each object from the store in chunks and hands them over
//! a bounded channel, so no object is ever held in memory whole.

use crate::observability::metrics;
use crate::storage::StorageBackend;
use crate::vfs::path::base_name;
use crate::vfs::{BatchReport, ItemFailure, VfsError};
use bytes::{Bytes, BytesMut};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CHUNK_SIZE: usize = 64 * 1024;
const WRITER_QUEUE_DEPTH: usize = 16;

/// A finished archive, rewound to the start. The backing temp file has no
/// name on disk and goes away when this is dropped.
#[derive(Debug)]
pub struct Archive {
    pub file: tokio::fs::File,
    pub size: u64,
    pub file_name: String,
    pub report: BatchReport,
}

#[derive(Debug)]
enum ArchiveOp {
    Directory(String),
    StartFile(String),
    Chunk(Bytes),
    AbortFile,
}

fn internal(context: &str, e: impl std::fmt::Display) -> VfsError {
    VfsError::Internal(format!("{context}: {e}"))
}

fn write_archive(mut rx: mpsc::Receiver<ArchiveOp>) -> Result<std::fs::File, VfsError> {
    let sink = tempfile::tempfile().map_err(|e| internal("create temp file", e))?;
    let mut zip = ZipWriter::new(sink);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writing: Option<String> = None;

    while let Some(op) = rx.blocking_recv() {
        match op {
            ArchiveOp::Directory(name) => {
                if let Err(e) = zip.add_directory(name.as_str(), options) {
                    tracing::warn!(entry = %name, error = %e, "failed to add directory entry");
                }
            }
            ArchiveOp::StartFile(name) => match zip.start_file(name.as_str(), options) {
                Ok(()) => writing = Some(name),
                Err(e) => {
                    tracing::warn!(entry = %name, error = %e, "failed to start archive entry");
                    writing = None;
                }
            },
            ArchiveOp::Chunk(bytes) => {
                if let Some(name) = &writing {
                    if let Err(e) = zip.write_all(&bytes) {
                        tracing::warn!(entry = %name, error = %e, "failed to write archive entry");
                        writing = None;
                        if let Err(e) = zip.abort_file() {
                            tracing::warn!(error = %e, "failed to abort archive entry");
                        }
                    }
                }
            }
            ArchiveOp::AbortFile => {
                if writing.take().is_some() {
                    if let Err(e) = zip.abort_file() {
                        tracing::warn!(error = %e, "failed to abort archive entry");
                    }
                }
            }
        }
    }

    let mut sink = zip.finish().map_err(|e| internal("finish archive", e))?;
    sink.seek(SeekFrom::Start(0))
        .map_err(|e| internal("rewind archive", e))?;
    Ok(sink)
}

#[derive(Clone)]
pub struct ArchiveExporter {
    storage: Arc<dyn StorageBackend>,
    max_subtree_bytes: u64,
}

impl ArchiveExporter {
    /// `max_subtree_bytes == 0` disables the size bound.
    pub fn new(storage: Arc<dyn StorageBackend>, max_subtree_bytes: u64) -> Self {
        Self {
            storage,
            max_subtree_bytes,
        }
    }

    /// Archive everything under `prefix` (`""` or `a/b/`). Entries are named
    /// by their full key. Unreadable objects are logged and left out. A prefix
    /// with nothing under it yields an archive with no entries.
    #[tracing::instrument(skip(self))]
    pub async fn export(&self, bucket: &str, prefix: &str) -> Result<Archive, VfsError> {
        let objects = self
            .storage
            .list_objects(bucket, prefix)
            .await?
            .collect_ok(bucket)
            .await;

        if self.max_subtree_bytes > 0 {
            let size = objects
                .iter()
                .fold(0u64, |acc, o| acc.saturating_add(o.size));
            if size > self.max_subtree_bytes {
                return Err(VfsError::ArchiveTooLarge {
                    size,
                    limit: self.max_subtree_bytes,
                });
            }
        }

        let (tx, rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
        let writer = tokio::task::spawn_blocking(move || write_archive(rx));

        let mut report = BatchReport::default();
        let mut copied: u64 = 0;
        'objects: for object in objects {
            if object.is_folder_marker() {
                if tx.send(ArchiveOp::Directory(object.key)).await.is_err() {
                    break;
                }
                continue;
            }

            let mut reader = match self.storage.get_object(bucket, &object.key).await {
                Ok((reader, _)) => reader,
                Err(e) => {
                    tracing::warn!(bucket, key = %object.key, error = %e, "skipping unreadable object");
                    report.failed.push(ItemFailure::new(object.key, e));
                    continue;
                }
            };
            if tx.send(ArchiveOp::StartFile(object.key.clone())).await.is_err() {
                break;
            }
            loop {
                let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
                match reader.read_buf(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        copied += n as u64;
                        if tx.send(ArchiveOp::Chunk(buf.freeze())).await.is_err() {
                            break 'objects;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(bucket, key = %object.key, error = %e, "read failed mid-object");
                        if tx.send(ArchiveOp::AbortFile).await.is_err() {
                            break 'objects;
                        }
                        report.failed.push(ItemFailure::new(object.key, e));
                        continue 'objects;
                    }
                }
            }
            report.succeeded.push(object.key);
        }
        drop(tx);

        let sink = writer
            .await
            .map_err(|e| internal("archive writer", e))??;
        let size = sink
            .metadata()
            .map_err(|e| internal("stat archive", e))?
            .len();

        metrics::increment_archive_bytes(copied);
        metrics::increment_batch_failures("export", report.failed.len());
        tracing::info!(bucket, prefix, entries = report.succeeded.len(), size, "archive ready");

        let folder = base_name(prefix);
        let file_name = if folder.is_empty() {
            "archive.zip".to_string()
        } else {
            format!("{folder}.zip")
        };
        Ok(Archive {
            file: tokio::fs::File::from_std(sink),
            size,
            file_name,
            report,
        })
    }
}
