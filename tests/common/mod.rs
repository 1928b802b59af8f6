#![allow(dead_code)]

use std::collections::BTreeMap;

use openreferee_server::contract::{
    EditableEndpoints, EditableFile, EventEndpoints, ListEndpoints, RemoteFileType, RemoteTag,
    RevisionEndpoints,
};
use openreferee_server::store::EventRecord;
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};

pub const PLATFORM: &str = "https://events.test/api";
pub const TOKEN: &str = "event-token";

pub fn url(path: &str) -> String {
    format!("{PLATFORM}/{path}")
}

pub fn event_endpoints() -> EventEndpoints {
    let mut file_types = BTreeMap::new();
    for kind in ["paper", "poster"] {
        file_types.insert(
            kind.to_string(),
            ListEndpoints {
                create: url(&format!("file-types/{kind}/create")),
                list: url(&format!("file-types/{kind}")),
            },
        );
    }
    EventEndpoints {
        tags: ListEndpoints {
            create: url("tags/create"),
            list: url("tags"),
        },
        editable_types: url("editable-types"),
        file_types,
    }
}

pub fn event_record(identifier: &str) -> EventRecord {
    EventRecord {
        identifier: identifier.to_string(),
        title: "Test Conference".to_string(),
        url: "https://events.test/event/1".to_string(),
        token: TOKEN.to_string(),
        endpoints: event_endpoints(),
    }
}

pub fn editable_endpoints() -> EditableEndpoints {
    EditableEndpoints {
        revisions: RevisionEndpoints {
            details: Some(url("revisions/1")),
            replace: url("revisions/1/replace"),
        },
        file_upload: url("files/upload"),
    }
}

pub fn remote_tag(code: &str, used: bool) -> RemoteTag {
    RemoteTag {
        code: code.to_string(),
        title: code.to_lowercase(),
        is_used_in_revision: used,
        url: Some(url(&format!("tags/{code}"))),
    }
}

pub fn remote_file_type(kind: &str, name: &str, used: bool) -> RemoteFileType {
    RemoteFileType {
        name: name.to_string(),
        is_used_in_condition: false,
        is_used: used,
        url: Some(url(&format!("file-types/{kind}/{}", name.replace(' ', "-")))),
    }
}

pub fn submitted_file(uuid: &str, filename: &str, file_type: i64) -> EditableFile {
    EditableFile {
        uuid: uuid.to_string(),
        filename: filename.to_string(),
        content_type: None,
        signed_download_url: None,
        external_download_url: Some(url(&format!("files/{uuid}/download"))),
        file_type,
    }
}

/// A PDF with `pages` pages whose widths grow by 10mm per page, so page
/// order can be checked through the media boxes.
pub fn multi_page_pdf(pages: usize) -> Vec<u8> {
    let mut doc = PdfDocument::new("Fixture");
    let pages = (0..pages)
        .map(|i| {
            let ops = vec![
                Op::StartTextSection,
                Op::SetTextCursor {
                    pos: Point {
                        x: Pt(20.0),
                        y: Pt(20.0),
                    },
                },
                Op::SetFontSizeBuiltinFont {
                    size: Pt(12.0),
                    font: BuiltinFont::Helvetica,
                },
                Op::WriteTextBuiltinFont {
                    items: vec![TextItem::Text(format!("Page {}", i + 1))],
                    font: BuiltinFont::Helvetica,
                },
                Op::EndTextSection,
            ];
            PdfPage::new(Mm(100.0 + 10.0 * i as f32), Mm(150.0), ops)
        })
        .collect();
    doc.with_pages(pages);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    doc.save(&PdfSaveOptions::default(), &mut warnings)
}
