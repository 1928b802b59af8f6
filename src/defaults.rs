//! Baseline taxonomy every integrated event is expected to carry.
//!
//! The baseline is plain data built once at startup and handed to the
//! reconciler explicitly. Iteration order is the declaration order below.

use serde::Serialize;

use crate::contract::{EditableKind, FileTypeDescriptor, TagDescriptor};

pub const SERVICE_NAME: &str = "OpenReferee Reference Implementation";

/// Identity reported by `/info` and the event info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
}

impl ServiceInfo {
    pub fn current() -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Tags, editable kinds and file types this service creates on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub tags: Vec<TagDescriptor>,
    pub editable_kinds: Vec<EditableKind>,
    pub file_types: Vec<(EditableKind, Vec<FileTypeDescriptor>)>,
}

impl Baseline {
    pub fn standard() -> Self {
        Self {
            tags: vec![
                system_tag("ERR_WRONG_TITLE", "Wrong Title", "red"),
                system_tag("ERR_SILLY_TITLE", "Silly Title", "orange"),
                system_tag("OK_TITLE", "Title OK", "green"),
            ],
            editable_kinds: vec![EditableKind::Paper, EditableKind::Poster],
            file_types: vec![
                (
                    EditableKind::Paper,
                    vec![
                        pdf_type("{code}_paper"),
                        source_files(&["tex", "doc"], true),
                    ],
                ),
                (
                    EditableKind::Poster,
                    vec![
                        pdf_type("{code}_poster"),
                        source_files(&["ai", "svg"], false),
                    ],
                ),
            ],
        }
    }

    /// Declared file types for one kind, empty if the kind is not part of the baseline.
    pub fn file_types_for(&self, kind: EditableKind) -> &[FileTypeDescriptor] {
        self.file_types
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, types)| types.as_slice())
            .unwrap_or(&[])
    }
}

fn system_tag(code: &str, title: &str, color: &str) -> TagDescriptor {
    TagDescriptor {
        code: code.to_string(),
        title: title.to_string(),
        color: color.to_string(),
        system: true,
    }
}

fn pdf_type(filename_template: &str) -> FileTypeDescriptor {
    FileTypeDescriptor {
        name: "PDF".to_string(),
        extensions: vec!["pdf".to_string()],
        allow_multiple_files: false,
        required: true,
        publishable: true,
        filename_template: Some(filename_template.to_string()),
    }
}

fn source_files(extensions: &[&str], allow_multiple_files: bool) -> FileTypeDescriptor {
    FileTypeDescriptor {
        name: "Source Files".to_string(),
        extensions: extensions.iter().map(|e| e.to_string()).collect(),
        allow_multiple_files,
        required: true,
        publishable: false,
        filename_template: None,
    }
}
