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

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub const FOLDER_MARKER_CONTENT_TYPE: &str = "application/x-directory";

fn from_table(ext: &str) -> Option<&'static str> {
    let ct = match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "doc" | "docx" => "application/msword",
        "xls" | "xlsx" => "application/vnd.ms-excel",
        "txt" => "text/plain",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(ct)
}

/// Best-effort content type of a file named `name`.
///
/// Order: the fixed extension table, then the system mime database, then
/// `application/octet-stream`. A non-empty `stored` value wins over all of them.
pub fn resolve(name: &str, stored: Option<&str>) -> String {
    if let Some(stored) = stored.filter(|s| !s.is_empty()) {
        return stored.to_string();
    }
    guess(name)
}

/// Content type from the name alone.
pub fn guess(name: &str) -> String {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => return DEFAULT_CONTENT_TYPE.to_string(),
    };
    if let Some(ct) = from_table(&ext) {
        return ct.to_string();
    }
    mime_guess::from_ext(&ext)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}
