//! # contract: the seam between the service and the event platform
//!
//! This module defines the data exchanged with the event-management platform
//! and the two traits every workflow is written against:
//!
//! - [`RemoteApi`]: one authenticated session against the platform. The real
//!   implementation is [`crate::session::RemoteSession`]; tests use the
//!   generated `MockRemoteApi`.
//! - [`SessionFactory`]: opens a [`RemoteApi`] for an event's bearer token, so
//!   the HTTP layer never builds clients itself.
//!
//! ## Decoding
//! Remote descriptors are decoded into the typed structs below. Unknown fields
//! are ignored; missing usage flags decode as `false`.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall` and exported behind the default
//! `test-export-mocks` feature so integration tests can script remote state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::RemoteError;

/// Revision state sent when a submission has been processed.
pub const READY_FOR_REVIEW: &str = "ready_for_review";

/// Category of an editable; decides which file types apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditableKind {
    Paper,
    Poster,
}

impl EditableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditableKind::Paper => "paper",
            EditableKind::Poster => "poster",
        }
    }
}

impl fmt::Display for EditableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paper" => Ok(EditableKind::Paper),
            "poster" => Ok(EditableKind::Poster),
            other => Err(format!("unknown editable type '{other}'")),
        }
    }
}

/// A tag as sent on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDescriptor {
    /// Stable key, unique within an event.
    pub code: String,
    pub title: String,
    pub color: String,
    /// Marks the tag as part of the service baseline.
    pub system: bool,
}

/// A tag as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTag {
    pub code: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_used_in_revision: bool,
    /// Delete URL for this tag.
    #[serde(default)]
    pub url: Option<String>,
}

/// A file type as sent on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeDescriptor {
    /// Unique within an editable kind.
    pub name: String,
    pub extensions: Vec<String>,
    pub allow_multiple_files: bool,
    pub required: bool,
    pub publishable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_template: Option<String>,
}

/// A file type as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFileType {
    pub name: String,
    #[serde(default)]
    pub is_used_in_condition: bool,
    #[serde(default)]
    pub is_used: bool,
    /// Delete URL for this file type.
    #[serde(default)]
    pub url: Option<String>,
}

impl RemoteFileType {
    /// A file type may only be removed when nothing references it.
    pub fn is_unused(&self) -> bool {
        !self.is_used_in_condition && !self.is_used
    }
}

/// `create` / `list` URL pair for a remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEndpoints {
    pub create: String,
    pub list: String,
}

/// Configuration endpoints supplied by the platform when an event registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEndpoints {
    pub tags: ListEndpoints,
    /// Bulk declaration of the supported editable kinds.
    pub editable_types: String,
    /// Keyed by editable kind name.
    pub file_types: BTreeMap<String, ListEndpoints>,
}

impl EventEndpoints {
    pub fn file_types_for(&self, kind: EditableKind) -> Option<&ListEndpoints> {
        self.file_types.get(kind.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEndpoints {
    #[serde(default)]
    pub details: Option<String>,
    pub replace: String,
}

/// Per-editable endpoints supplied with each file submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableEndpoints {
    pub revisions: RevisionEndpoints,
    pub file_upload: String,
}

/// A file attached to a submitted revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableFile {
    /// Remote storage handle.
    pub uuid: String,
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub signed_download_url: Option<String>,
    #[serde(default)]
    pub external_download_url: Option<String>,
    /// Key into the editable's file-type list.
    pub file_type: i64,
}

/// Response of the file-upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    pub uuid: String,
}

/// File type key → ordered storage handles.
pub type FileManifest = BTreeMap<i64, Vec<String>>;

/// Body of the revisions-replace call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionReplace {
    pub files: FileManifest,
    pub state: String,
}

impl RevisionReplace {
    pub fn ready_for_review(files: FileManifest) -> Self {
        Self {
            files,
            state: READY_FOR_REVIEW.to_string(),
        }
    }
}

/// One authenticated session against the event platform.
///
/// Every method issues exactly one HTTP call. A non-success status is
/// reported as [`RemoteError::Status`] and must be treated as fatal by the
/// caller.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// GET the event's current tags.
    async fn list_tags(&self, url: &str) -> Result<Vec<RemoteTag>, RemoteError>;

    /// POST one tag.
    async fn create_tag(&self, url: &str, tag: &TagDescriptor) -> Result<(), RemoteError>;

    /// GET the current file types of one editable kind.
    async fn list_file_types(&self, url: &str) -> Result<Vec<RemoteFileType>, RemoteError>;

    /// POST one file type.
    async fn create_file_type(
        &self,
        url: &str,
        file_type: &FileTypeDescriptor,
    ) -> Result<(), RemoteError>;

    /// DELETE the resource behind a per-item URL.
    async fn delete(&self, url: &str) -> Result<(), RemoteError>;

    /// POST the set of editable kinds this service handles.
    async fn declare_editable_types(
        &self,
        url: &str,
        kinds: &[EditableKind],
    ) -> Result<(), RemoteError>;

    /// GET raw file content.
    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError>;

    /// POST a file as multipart form field `file`.
    async fn upload_file(
        &self,
        url: &str,
        filename: &str,
        content_type: Option<String>,
        content: Vec<u8>,
    ) -> Result<UploadedFile, RemoteError>;

    /// POST the final file manifest and revision state.
    async fn replace_revision(
        &self,
        url: &str,
        revision: &RevisionReplace,
    ) -> Result<(), RemoteError>;
}

/// Opens a [`RemoteApi`] authenticated with the given bearer token.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait SessionFactory: Send + Sync {
    fn open(&self, token: &str) -> Result<Box<dyn RemoteApi>, RemoteError>;
}
