//! Event lifecycle: registration, removal, and the bearer-token gate.
//!
//! Registration persists the event first so that a concurrent duplicate is
//! rejected by the store before any remote call, then reconciles the
//! platform. If any remote step fails the record is deleted again, so a failed
//! registration leaves nothing behind locally. Remote objects created before
//! the failure stay in place; a later registration will find and keep them.

use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use crate::contract::{RemoteApi, SessionFactory};
use crate::defaults::{Baseline, ServiceInfo};
use crate::error::{FieldErrors, ServiceError};
use crate::reconcile::{self, ReconcileReport};
use crate::store::{EventRecord, EventStore};

const MISSING_FIELD: &str = "Missing data for required field.";

/// Response body of the event info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventInfo {
    pub service: ServiceInfo,
    pub title: String,
    pub url: String,
    pub can_disconnect: bool,
}

impl EventInfo {
    pub fn for_event(record: &EventRecord) -> Self {
        Self {
            service: ServiceInfo::current(),
            title: record.title.clone(),
            url: record.url.clone(),
            can_disconnect: true,
        }
    }
}

/// Field-level checks the store and reconciler rely on.
pub fn validate_registration(
    record: &EventRecord,
    baseline: &Baseline,
) -> Result<(), ServiceError> {
    let mut errors = FieldErrors::new();
    let mut require = |field: &str, value: &str| {
        if value.trim().is_empty() {
            errors
                .entry(field.to_string())
                .or_default()
                .push(MISSING_FIELD.to_string());
        }
    };

    require("title", &record.title);
    require("token", &record.token);
    require("config_endpoints.tags.create", &record.endpoints.tags.create);
    require("config_endpoints.tags.list", &record.endpoints.tags.list);
    require("config_endpoints.editable_types", &record.endpoints.editable_types);

    match reqwest::Url::parse(&record.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors
            .entry("url".to_string())
            .or_default()
            .push("Not a valid URL.".to_string()),
    }

    for kind in &baseline.editable_kinds {
        if record.endpoints.file_types_for(*kind).is_none() {
            errors
                .entry(format!("config_endpoints.file_types.{kind}"))
                .or_default()
                .push(MISSING_FIELD.to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(errors))
    }
}

/// Register an event and bring the platform in line with the baseline.
///
/// The remote session is opened only after the record is stored, so a
/// duplicate registration never reaches the platform.
pub async fn register_event(
    store: &EventStore,
    sessions: &dyn SessionFactory,
    baseline: &Baseline,
    record: &EventRecord,
) -> Result<ReconcileReport, ServiceError> {
    validate_registration(record, baseline)?;
    store.insert(record)?;
    info!(identifier = %record.identifier, "Registered event");

    match open_and_setup(sessions, baseline, record).await {
        Ok(report) => {
            info!(
                identifier = %record.identifier,
                created = report.created.len(),
                "Event setup complete"
            );
            Ok(report)
        }
        Err(e) => {
            error!(
                identifier = %record.identifier,
                error = %e,
                "Event setup failed, rolling back registration"
            );
            if let Err(rollback) = store.delete(&record.identifier) {
                error!(
                    identifier = %record.identifier,
                    error = %rollback,
                    "Rolling back registration failed"
                );
            }
            Err(e)
        }
    }
}

async fn open_and_setup(
    sessions: &dyn SessionFactory,
    baseline: &Baseline,
    record: &EventRecord,
) -> Result<ReconcileReport, ServiceError> {
    let api = sessions.open(&record.token)?;
    setup_event(api.as_ref(), baseline, record).await
}

/// Create missing tags, declare editable kinds, create missing file types.
pub async fn setup_event<A>(
    api: &A,
    baseline: &Baseline,
    record: &EventRecord,
) -> Result<ReconcileReport, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let endpoints = &record.endpoints;
    let mut report = reconcile::setup_tags(api, endpoints, &baseline.tags).await?;

    info!(kinds = ?baseline.editable_kinds, "Declaring editable types");
    api.declare_editable_types(&endpoints.editable_types, &baseline.editable_kinds)
        .await?;

    let file_types = reconcile::setup_file_types(api, endpoints, baseline).await?;
    report.created.extend(file_types.created);
    Ok(report)
}

/// Remove baseline resources the event no longer uses, then forget the event.
///
/// The record is only deleted once cleanup succeeded, so a failed removal
/// can be retried.
pub async fn remove_event<A>(
    store: &EventStore,
    api: &A,
    baseline: &Baseline,
    record: &EventRecord,
) -> Result<ReconcileReport, ServiceError>
where
    A: RemoteApi + ?Sized,
{
    let mut report = reconcile::cleanup_tags(api, &record.endpoints, &baseline.tags).await?;
    let file_types = reconcile::cleanup_file_types(api, &record.endpoints, baseline).await?;
    report.deleted.extend(file_types.deleted);
    report.in_use.extend(file_types.in_use);

    if !store.delete(&record.identifier)? {
        warn!(identifier = %record.identifier, "Event record was already gone");
    }
    info!(
        identifier = %record.identifier,
        deleted = report.deleted.len(),
        kept = report.in_use.len(),
        "Unregistered event"
    );
    Ok(report)
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// Look up an event and check the caller's bearer token against it.
pub fn authenticate(
    store: &EventStore,
    identifier: &str,
    token: Option<&str>,
) -> Result<EventRecord, ServiceError> {
    let record = store
        .get(identifier)?
        .ok_or_else(|| ServiceError::NotFound("Unknown event".to_string()))?;

    let Some(token) = token else {
        return Err(ServiceError::Unauthorized("Token missing".to_string()));
    };
    if !bool::from(token.as_bytes().ct_eq(record.token.as_bytes())) {
        warn!(identifier, "Rejected request with invalid token");
        return Err(ServiceError::Unauthorized("Invalid token".to_string()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }
}
