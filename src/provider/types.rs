//! Provider API response types
//!
//! Data structures for deserializing the provider's v3-style REST responses.
//! Field names follow the provider's camelCase wire format.

use serde::{Deserialize, Serialize};

/// A remote file descriptor as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Provider-assigned file id
    pub id: String,

    /// File name
    pub name: String,

    /// MIME type
    pub mime_type: String,

    /// File size in bytes, serialized as a decimal string (omitted for folders)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Creation time (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,

    /// Modification time (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,

    /// Content hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,

    /// Parent folder ids
    #[serde(default)]
    pub parents: Vec<String>,

    /// Whether the file sits in the provider's trash
    #[serde(default)]
    pub trashed: bool,
}

impl FileDescriptor {
    /// Size parsed out of the provider's decimal-string representation.
    pub fn size_bytes(&self) -> Option<i64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }
}

/// One page of a descriptor listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPage {
    /// Descriptors on this page
    #[serde(default)]
    pub files: Vec<FileDescriptor>,

    /// Cursor for the next page; absent on the final page
    pub next_page_token: Option<String>,
}

/// One page of a change listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePage {
    /// Change records on this page
    #[serde(default)]
    pub changes: Vec<Change>,

    /// Cursor for the next page of this walk; absent on the final page
    pub next_page_token: Option<String>,

    /// Cursor for the next incremental sync, present on the final page
    pub new_start_page_token: Option<String>,
}

/// A single change record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Whether the file was removed from the remote catalogue
    #[serde(default)]
    pub removed: bool,

    /// The descriptor after the change (absent when removed)
    pub file: Option<FileDescriptor>,

    /// File id (present for removed entries)
    pub file_id: Option<String>,
}

/// Response of the initial change-cursor request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPageTokenResponse {
    /// Cursor positioned at the current head of the change log
    pub start_page_token: String,
}
