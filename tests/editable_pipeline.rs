mod common;

use std::collections::BTreeMap;

use common::{editable_endpoints, multi_page_pdf, submitted_file, url};
use openreferee_server::contract::{RevisionReplace, UploadedFile, READY_FOR_REVIEW};
use openreferee_server::editable::process_editable_files;
use openreferee_server::error::{RemoteError, ServiceError};
use openreferee_server::watermark::{render_template, Watermark};
use openreferee_server::MockRemoteApi;

fn watermark() -> Watermark {
    Watermark::from_bytes(&render_template("TEST")).unwrap()
}

#[tokio::test]
async fn manifest_maps_pdf_to_new_upload_and_keeps_other_files() {
    let files = vec![
        submitted_file("uuid-a", "A.pdf", 1),
        submitted_file("uuid-b", "B.docx", 2),
    ];
    let source = multi_page_pdf(2);

    let mut api = MockRemoteApi::new();
    api.expect_download()
        .withf(|u: &str| u == url("files/uuid-a/download"))
        .times(1)
        .returning(move |_| Ok(source.clone()));
    api.expect_upload_file()
        .withf(|u: &str, filename: &str, _: &Option<String>, content: &Vec<u8>| {
            u == url("files/upload") && filename == "A.pdf" && content.starts_with(b"%PDF")
        })
        .times(1)
        .returning(|_, _, _, _| {
            Ok(UploadedFile {
                uuid: "uuid-a-stamped".to_string(),
            })
        });
    api.expect_replace_revision()
        .withf(|u: &str, revision: &RevisionReplace| {
            let mut expected = BTreeMap::new();
            expected.insert(1, vec!["uuid-a-stamped".to_string()]);
            expected.insert(2, vec!["uuid-b".to_string()]);
            u == url("revisions/1/replace")
                && revision.files == expected
                && revision.state == READY_FOR_REVIEW
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let manifest = process_editable_files(&api, &files, &editable_endpoints(), &watermark())
        .await
        .unwrap();

    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest[&1], vec!["uuid-a-stamped"]);
    assert_eq!(manifest[&2], vec!["uuid-b"]);
}

#[tokio::test]
async fn handles_of_one_file_type_keep_submission_order() {
    let files = vec![
        submitted_file("first", "notes.txt", 7),
        submitted_file("second", "figure.png", 7),
        submitted_file("third", "data.csv", 7),
    ];

    let mut api = MockRemoteApi::new();
    api.expect_download().never();
    api.expect_upload_file().never();
    api.expect_replace_revision()
        .withf(|_: &str, revision: &RevisionReplace| {
            revision.files.get(&7)
                == Some(&vec!["first".to_string(), "second".to_string(), "third".to_string()])
        })
        .times(1)
        .returning(|_, _| Ok(()));

    process_editable_files(&api, &files, &editable_endpoints(), &watermark())
        .await
        .unwrap();
}

#[tokio::test]
async fn signed_url_is_used_when_no_external_url_is_given() {
    let mut file = submitted_file("uuid-a", "paper.pdf", 1);
    file.external_download_url = None;
    file.signed_download_url = Some(url("signed/uuid-a"));
    file.content_type = Some("application/pdf".to_string());
    let source = multi_page_pdf(1);

    let mut api = MockRemoteApi::new();
    api.expect_download()
        .withf(|u: &str| u == url("signed/uuid-a"))
        .times(1)
        .returning(move |_| Ok(source.clone()));
    api.expect_upload_file()
        .withf(|_: &str, _: &str, content_type: &Option<String>, _: &Vec<u8>| {
            content_type.as_deref() == Some("application/pdf")
        })
        .times(1)
        .returning(|_, _, _, _| Ok(UploadedFile { uuid: "new".to_string() }));
    api.expect_replace_revision().times(1).returning(|_, _| Ok(()));

    let manifest = process_editable_files(&api, &[file], &editable_endpoints(), &watermark())
        .await
        .unwrap();
    assert_eq!(manifest[&1], vec!["new"]);
}

#[tokio::test]
async fn unreadable_pdf_aborts_before_upload_and_replace() {
    let files = vec![submitted_file("uuid-a", "broken.pdf", 1)];

    let mut api = MockRemoteApi::new();
    api.expect_download()
        .times(1)
        .returning(|_| Ok(b"this is not a pdf".to_vec()));
    api.expect_upload_file().never();
    api.expect_replace_revision().never();

    let err = process_editable_files(&api, &files, &editable_endpoints(), &watermark())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Transform { filename, .. } if filename == "broken.pdf"));
}

#[tokio::test]
async fn failed_upload_is_not_followed_by_replace() {
    let files = vec![submitted_file("uuid-a", "A.pdf", 1)];
    let source = multi_page_pdf(1);

    let mut api = MockRemoteApi::new();
    api.expect_download().returning(move |_| Ok(source.clone()));
    api.expect_upload_file().times(1).returning(|u, _, _, _| {
        Err(RemoteError::Status {
            url: u.to_string(),
            status: 413,
            body: "too large".to_string(),
        })
    });
    api.expect_replace_revision().never();

    let err = process_editable_files(&api, &files, &editable_endpoints(), &watermark())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Remote(RemoteError::Status { status: 413, .. })));
}

#[tokio::test]
async fn pdf_without_any_download_url_is_an_error() {
    let mut file = submitted_file("uuid-a", "A.pdf", 1);
    file.external_download_url = None;

    let mut api = MockRemoteApi::new();
    api.expect_download().never();
    api.expect_replace_revision().never();

    let err = process_editable_files(&api, &[file], &editable_endpoints(), &watermark())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingDownloadUrl { uuid } if uuid == "uuid-a"));
}

#[tokio::test]
async fn uppercase_pdf_extension_is_passed_through() {
    let files = vec![submitted_file("uuid-a", "A.PDF", 1)];

    let mut api = MockRemoteApi::new();
    api.expect_download().never();
    api.expect_upload_file().never();
    api.expect_replace_revision()
        .withf(|_: &str, revision: &RevisionReplace| {
            revision.files.get(&1) == Some(&vec!["uuid-a".to_string()])
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let manifest = process_editable_files(&api, &files, &editable_endpoints(), &watermark())
        .await
        .unwrap();
    assert_eq!(manifest[&1], vec!["uuid-a"]);
}

#[tokio::test]
async fn failed_download_is_not_followed_by_upload_or_replace() {
    let files = vec![
        submitted_file("uuid-a", "A.pdf", 1),
        submitted_file("uuid-b", "B.pdf", 1),
    ];

    let mut api = MockRemoteApi::new();
    api.expect_download().times(1).returning(|u| {
        Err(RemoteError::Status {
            url: u.to_string(),
            status: 404,
            body: "gone".to_string(),
        })
    });
    api.expect_upload_file().never();
    api.expect_replace_revision().never();

    let err = process_editable_files(&api, &files, &editable_endpoints(), &watermark())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Remote(RemoteError::Status { status: 404, .. })));
}

#[tokio::test]
async fn failed_replace_is_reported() {
    let files = vec![submitted_file("uuid-b", "B.docx", 2)];

    let mut api = MockRemoteApi::new();
    api.expect_replace_revision().times(1).returning(|u, _| {
        Err(RemoteError::Transport {
            url: u.to_string(),
            message: "timed out".to_string(),
        })
    });

    let err = process_editable_files(&api, &files, &editable_endpoints(), &watermark())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Remote(RemoteError::Transport { url: failed, .. })
            if failed == url("revisions/1/replace")
    ));
}
