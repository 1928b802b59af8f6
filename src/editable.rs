//! Editable file ingestion: watermark submitted PDFs, re-upload them and mark
//! the revision ready for review.
//!
//! # Pipeline
//! For each submitted file, in submission order:
//!   - non-PDF files keep their existing storage handle
//!   - PDF files are downloaded, stamped with the [`Watermark`] and uploaded
//!     under their original filename; the new handle replaces the old one
//!
//! Handles are grouped by file type into a [`FileManifest`], which is sent
//! together with the `ready_for_review` state in a single replace call.
//!
//! # Error Handling
//! The first failing download, transform or upload aborts the pipeline before
//! the replace call, so a partial manifest is never submitted.

use std::path::Path;

use tracing::{error, info};

use crate::contract::{
    EditableEndpoints, EditableFile, FileManifest, RemoteApi, RevisionReplace,
};
use crate::error::{ServiceError, WatermarkError};
use crate::watermark::Watermark;

/// Whether a filename is routed through the watermark pipeline.
/// The extension match is case-sensitive: `A.PDF` passes through untouched.
pub fn is_pdf(filename: &str) -> bool {
    Path::new(filename).extension().and_then(|ext| ext.to_str()) == Some("pdf")
}

/// Run the pipeline and submit the manifest. Returns the submitted manifest.
pub async fn process_editable_files<A>(
    api: &A,
    files: &[EditableFile],
    endpoints: &EditableEndpoints,
    watermark: &Watermark,
) -> Result<FileManifest, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    info!(files = files.len(), "[EDITABLE] Processing submitted files");
    let mut manifest = FileManifest::new();

    for file in files {
        let handle = if is_pdf(&file.filename) {
            stamp_and_upload(api, file, &endpoints.file_upload, watermark).await?
        } else {
            info!(file = %file.filename, uuid = %file.uuid, "[EDITABLE] Keeping file as submitted");
            file.uuid.clone()
        };
        manifest.entry(file.file_type).or_default().push(handle);
    }

    let revision = RevisionReplace::ready_for_review(manifest);
    api.replace_revision(&endpoints.revisions.replace, &revision)
        .await
        .map_err(|e| {
            error!(error = %e, "[EDITABLE][ERROR] Replacing revision failed");
            e
        })?;
    info!(file_types = revision.files.len(), "[EDITABLE] Revision marked ready for review");

    Ok(revision.files)
}

/// Download, watermark and re-upload one PDF. Returns the new storage handle.
async fn stamp_and_upload<A>(
    api: &A,
    file: &EditableFile,
    upload_url: &str,
    watermark: &Watermark,
) -> Result<String, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let source_url = file
        .external_download_url
        .as_deref()
        .or(file.signed_download_url.as_deref())
        .ok_or_else(|| ServiceError::MissingDownloadUrl {
            uuid: file.uuid.clone(),
        })?;

    info!(file = %file.filename, "[EDITABLE] Downloading PDF for watermarking");
    let original = api.download(source_url).await.map_err(|e| {
        error!(file = %file.filename, error = %e, "[EDITABLE][ERROR] Download failed");
        e
    })?;

    // lopdf parsing and serialisation are CPU-bound.
    let stamper = watermark.clone();
    let stamped = tokio::task::spawn_blocking(move || stamper.apply(&original))
        .await
        .unwrap_or_else(|e| Err(WatermarkError::Task(e.to_string())))
        .map_err(|e| {
            error!(file = %file.filename, error = %e, "[EDITABLE][ERROR] Watermarking failed");
            ServiceError::Transform {
                filename: file.filename.clone(),
                source: e,
            }
        })?;

    let uploaded = api
        .upload_file(upload_url, &file.filename, file.content_type.clone(), stamped)
        .await
        .map_err(|e| {
            error!(file = %file.filename, error = %e, "[EDITABLE][ERROR] Upload failed");
            e
        })?;
    info!(
        file = %file.filename,
        old_uuid = %file.uuid,
        new_uuid = %uploaded.uuid,
        "[EDITABLE] Uploaded watermarked PDF"
    );

    Ok(uploaded.uuid)
}
