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

//! One directory level out of a flat prefix listing.

use crate::storage::{ObjectEntry, StorageBackend};
use crate::vfs::entry::{timestamp, DirEntry, FileEntry, FolderEntry, FOLDER_CONTENT_TYPE};
use crate::vfs::{content_type, VfsError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Where a listed key sits relative to the listing prefix.
#[derive(Debug, PartialEq, Eq)]
enum Child<'a> {
    /// The key is the prefix itself (the folder's own marker).
    SelfMarker,
    /// A leaf directly inside the prefix.
    File(&'a str),
    /// Something at least one `/` deeper; carries the next segment.
    Folder(&'a str),
}

fn classify<'a>(prefix: &str, key: &'a str) -> Option<Child<'a>> {
    let rest = key.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some(Child::SelfMarker);
    }
    match rest.find('/') {
        Some(0) => None,
        Some(idx) => Some(Child::Folder(&rest[..idx])),
        None => Some(Child::File(rest)),
    }
}

#[derive(Clone)]
pub struct NamespaceLister {
    storage: Arc<dyn StorageBackend>,
    link_ttl: Duration,
}

impl NamespaceLister {
    pub fn new(storage: Arc<dyn StorageBackend>, link_ttl: Duration) -> Self {
        Self { storage, link_ttl }
    }

    /// List the immediate children of `prefix` (`""` or `a/b/`) in `bucket`.
    ///
    /// Deeper keys collapse into one folder entry per next segment; the first
    /// descendant seen supplies the folder's timestamp.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<DirEntry>, VfsError> {
        if !self.storage.bucket_exists(bucket).await? {
            return Err(VfsError::BucketNotFound(bucket.to_string()));
        }

        let mut listing = self.storage.list_objects(bucket, prefix).await?;
        let mut seen_folders: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();

        while let Some(item) = listing.next().await {
            let object = match item {
                Ok(object) => object,
                Err(e) => {
                    tracing::warn!(bucket, prefix, error = %e, "skipping listing entry");
                    continue;
                }
            };
            match classify(prefix, &object.key) {
                Some(Child::Folder(name)) => {
                    if seen_folders.insert(name.to_string()) {
                        entries.push(DirEntry::Folder(FolderEntry {
                            name: name.to_string(),
                            path: format!("{prefix}{name}"),
                            size: 0,
                            last_modified: timestamp(object.last_modified_unix_secs),
                            content_type: FOLDER_CONTENT_TYPE.to_string(),
                        }));
                    }
                }
                Some(Child::File(name)) => {
                    let name = name.to_string();
                    entries.push(DirEntry::File(self.file_entry(bucket, name, &object).await));
                }
                Some(Child::SelfMarker) | None => {}
            }
        }

        Ok(entries)
    }

    async fn file_entry(&self, bucket: &str, name: String, object: &ObjectEntry) -> FileEntry {
        let stored = match self.storage.head_object(bucket, &object.key).await {
            Ok(meta) => Some(meta.content_type),
            Err(e) => {
                tracing::debug!(bucket, key = %object.key, error = %e, "stat failed, guessing content type");
                None
            }
        };
        let content_type = content_type::resolve(&name, stored.as_deref());

        let url = match self
            .storage
            .presigned_get(bucket, &object.key, self.link_ttl)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(bucket, key = %object.key, error = %e, "could not presign link");
                String::new()
            }
        };

        FileEntry {
            name,
            path: object.key.clone(),
            size: object.size,
            last_modified: timestamp(object.last_modified_unix_secs),
            content_type,
            url,
        }
    }
}
