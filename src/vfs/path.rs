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

//! Client paths to store keys.
//!
//! Two normal forms are used throughout the crate:
//! - a *directory prefix* is `""` (root) or `seg/.../seg/` with exactly one
//!   trailing slash;
//! - an *object key* is `seg/.../seg`, never empty, no leading or trailing slash.

use crate::vfs::VfsError;

fn segments(raw: &str) -> Result<Vec<String>, VfsError> {
    let unified = raw.trim().replace('\\', "/");
    let trimmed = unified.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segs = Vec::new();
    for seg in trimmed.split('/') {
        check_segment(raw, seg)?;
        segs.push(seg.to_string());
    }
    Ok(segs)
}

fn check_segment(raw: &str, seg: &str) -> Result<(), VfsError> {
    if seg.is_empty() {
        return Err(VfsError::InvalidPath(format!("{raw:?}: empty segment")));
    }
    if seg == "." || seg == ".." {
        return Err(VfsError::InvalidPath(format!("{raw:?}: relative segment")));
    }
    if seg.contains('\0') {
        return Err(VfsError::InvalidPath(format!("{raw:?}: NUL byte")));
    }
    Ok(())
}

/// Normalize a folder path to a listing prefix (`""` or `a/b/`).
pub fn dir_prefix(raw: &str) -> Result<String, VfsError> {
    let segs = segments(raw)?;
    if segs.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("{}/", segs.join("/")))
}

/// Normalize a path naming an object or folder (`a/b`). Root is rejected.
pub fn object_key(raw: &str) -> Result<String, VfsError> {
    let segs = segments(raw)?;
    if segs.is_empty() {
        return Err(VfsError::InvalidPath("path must not be empty".into()));
    }
    Ok(segs.join("/"))
}

/// Validate a single name (file or folder) to be placed inside a folder.
pub fn name(raw: &str) -> Result<&str, VfsError> {
    if raw.contains('/') || raw.contains('\\') {
        return Err(VfsError::InvalidPath(format!("{raw:?}: name contains a separator")));
    }
    check_segment(raw, raw)?;
    Ok(raw)
}

/// Last segment of a key, ignoring a trailing slash.
pub fn base_name(key: &str) -> &str {
    let key = key.trim_end_matches('/');
    key.rsplit('/').next().unwrap_or(key)
}

/// Key of the marker object that makes `folder_key` visible when empty.
pub fn folder_marker(folder_key: &str) -> String {
    format!("{}/", folder_key.trim_end_matches('/'))
}
