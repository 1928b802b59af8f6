//! Taxonomy reconciliation: bring an event's tags and file types in line with
//! the [`Baseline`].
//!
//! Setup only ever creates what is missing; it never patches an existing
//! remote descriptor. Cleanup only ever deletes baseline entries the platform
//! reports as unused, based on a listing fetched at cleanup time. Entries the
//! baseline does not declare are never touched by either direction.
//!
//! Calls are issued one at a time in baseline order, and the first failing
//! call aborts the operation. Remote changes already made are not undone.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::contract::{
    EditableKind, EventEndpoints, RemoteApi, RemoteFileType, RemoteTag, TagDescriptor,
};
use crate::defaults::Baseline;
use crate::error::ServiceError;

/// Keys touched (or deliberately left alone) by one reconciliation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    /// Baseline entries kept because the platform reports them as used.
    pub in_use: Vec<String>,
}

impl ReconcileReport {
    fn merge(&mut self, other: ReconcileReport) {
        self.created.extend(other.created);
        self.deleted.extend(other.deleted);
        self.in_use.extend(other.in_use);
    }
}

/// Current tags of the event, keyed by code.
pub async fn fetch_tags<A>(
    api: &A,
    endpoints: &EventEndpoints,
) -> Result<HashMap<String, RemoteTag>, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    info!(url = %endpoints.tags.list, "Fetching available tags");
    let tags = api.list_tags(&endpoints.tags.list).await?;
    debug!(count = tags.len(), "Fetched tags");
    Ok(tags.into_iter().map(|t| (t.code.clone(), t)).collect())
}

/// Create every baseline tag the event does not have yet.
pub async fn setup_tags<A>(
    api: &A,
    endpoints: &EventEndpoints,
    baseline: &[TagDescriptor],
) -> Result<ReconcileReport, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let available = fetch_tags(api, endpoints).await?;
    let mut report = ReconcileReport::default();

    info!("[SETUP] Adding missing tags");
    for tag in baseline {
        if available.contains_key(&tag.code) {
            debug!(code = %tag.code, "[SETUP] Tag already present");
            continue;
        }
        api.create_tag(&endpoints.tags.create, tag).await.map_err(|e| {
            error!(code = %tag.code, error = %e, "[SETUP][ERROR] Creating tag failed");
            e
        })?;
        info!(code = %tag.code, "[SETUP] Added tag");
        report.created.push(tag.code.clone());
    }
    Ok(report)
}

/// Delete every baseline tag that is present and unused.
pub async fn cleanup_tags<A>(
    api: &A,
    endpoints: &EventEndpoints,
    baseline: &[TagDescriptor],
) -> Result<ReconcileReport, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let available = fetch_tags(api, endpoints).await?;
    let mut report = ReconcileReport::default();

    for tag in baseline {
        let Some(remote) = available.get(&tag.code) else {
            continue;
        };
        if remote.is_used_in_revision {
            debug!(code = %tag.code, "[CLEANUP] Tag in use, keeping it");
            report.in_use.push(tag.code.clone());
            continue;
        }
        let Some(url) = remote.url.as_deref() else {
            warn!(code = %tag.code, "[CLEANUP] Tag has no delete url, skipping");
            continue;
        };
        api.delete(url).await.map_err(|e| {
            error!(code = %tag.code, error = %e, "[CLEANUP][ERROR] Deleting tag failed");
            e
        })?;
        info!(code = %tag.code, title = %remote.title, "[CLEANUP] Deleted tag");
        report.deleted.push(tag.code.clone());
    }
    Ok(report)
}

/// Current file types of one editable kind, keyed by name.
pub async fn fetch_file_types<A>(
    api: &A,
    endpoints: &EventEndpoints,
    kind: EditableKind,
) -> Result<HashMap<String, RemoteFileType>, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let list_url = &endpoints
        .file_types_for(kind)
        .ok_or_else(|| ServiceError::MissingEndpoint(kind.to_string()))?
        .list;
    info!(editable = %kind, url = %list_url, "Fetching available file types");
    let types = api.list_file_types(list_url).await?;
    debug!(editable = %kind, count = types.len(), "Fetched file types");
    Ok(types.into_iter().map(|t| (t.name.clone(), t)).collect())
}

/// Create every baseline file type missing from its editable kind.
pub async fn setup_file_types<A>(
    api: &A,
    endpoints: &EventEndpoints,
    baseline: &Baseline,
) -> Result<ReconcileReport, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let mut report = ReconcileReport::default();
    for kind in &baseline.editable_kinds {
        report.merge(setup_kind_file_types(api, endpoints, baseline, *kind).await?);
    }
    Ok(report)
}

async fn setup_kind_file_types<A>(
    api: &A,
    endpoints: &EventEndpoints,
    baseline: &Baseline,
    kind: EditableKind,
) -> Result<ReconcileReport, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let available = fetch_file_types(api, endpoints, kind).await?;
    let create_url = &endpoints
        .file_types_for(kind)
        .ok_or_else(|| ServiceError::MissingEndpoint(kind.to_string()))?
        .create;
    let mut report = ReconcileReport::default();

    for file_type in baseline.file_types_for(kind) {
        let key = format!("{kind}/{}", file_type.name);
        if available.contains_key(&file_type.name) {
            debug!(file_type = %key, "[SETUP] File type already present");
            continue;
        }
        api.create_file_type(create_url, file_type).await.map_err(|e| {
            error!(file_type = %key, error = %e, "[SETUP][ERROR] Creating file type failed");
            e
        })?;
        info!(file_type = %key, "[SETUP] Added file type");
        report.created.push(key);
    }
    Ok(report)
}

/// Delete every baseline file type that is present and referenced by nothing.
pub async fn cleanup_file_types<A>(
    api: &A,
    endpoints: &EventEndpoints,
    baseline: &Baseline,
) -> Result<ReconcileReport, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let mut report = ReconcileReport::default();
    for kind in &baseline.editable_kinds {
        let available = fetch_file_types(api, endpoints, *kind).await?;
        for file_type in baseline.file_types_for(*kind) {
            let key = format!("{kind}/{}", file_type.name);
            let Some(remote) = available.get(&file_type.name) else {
                continue;
            };
            if !remote.is_unused() {
                debug!(file_type = %key, "[CLEANUP] File type in use, keeping it");
                report.in_use.push(key);
                continue;
            }
            let Some(url) = remote.url.as_deref() else {
                warn!(file_type = %key, "[CLEANUP] File type has no delete url, skipping");
                continue;
            };
            api.delete(url).await.map_err(|e| {
                error!(file_type = %key, error = %e, "[CLEANUP][ERROR] Deleting file type failed");
                e
            })?;
            info!(file_type = %key, "[CLEANUP] Deleted file type");
            report.deleted.push(key);
        }
    }
    Ok(report)
}
