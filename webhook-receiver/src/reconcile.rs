//! Merges a freshly fetched record with the previously stored snapshot.
//!
//! Upstream records carry no notion of when an app first ran or who ran it.
//! Those annotations live only in the stored snapshot and must survive every
//! later delivery for the same record:
//! - carry-forward copies annotations from the previous snapshot onto the
//!   fresh one, joined on app name. The fresh snapshot decides which apps exist.
//! - injection sets an annotation for the app named in the delivery, but only
//!   if that app has none yet (first write wins).
//!
//! Carry-forward always runs before injection.

use crate::event::Event;
use record_fetcher::{AppEntry, Record, UserType};
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ReconcileError {
    #[error("no app found with name {requested}; found apps were {}", .available.join(","))]
    AppNotFound {
        requested: String,
        available: Vec<String>,
    },
}

/// Copies every non-null `createdDate` in `previous` onto the app with the
/// same name in `fresh`. Apps only present in `previous` are dropped.
pub fn carry_forward_dates(previous: &Record, mut fresh: Record) -> Record {
    let dates: HashMap<&str, &str> = previous
        .apps
        .iter()
        .filter_map(|app| Some((app.name.as_str(), app.created_date.as_deref()?)))
        .collect();

    for app in &mut fresh.apps {
        if let Some(date) = dates.get(app.name.as_str()) {
            app.created_date = Some((*date).to_string());
        }
    }

    fresh
}

/// Same as [`carry_forward_dates`], for `userType`.
pub fn carry_forward_user_types(previous: &Record, mut fresh: Record) -> Record {
    let user_types: HashMap<&str, UserType> = previous
        .apps
        .iter()
        .filter_map(|app| Some((app.name.as_str(), app.user_type?)))
        .collect();

    for app in &mut fresh.apps {
        if let Some(user_type) = user_types.get(app.name.as_str()) {
            app.user_type = Some(*user_type);
        }
    }

    fresh
}

/// Applies `update` to the first app named `app_name`.
fn with_app<F>(mut document: Record, app_name: &str, update: F) -> Result<Record, ReconcileError>
where
    F: FnOnce(&mut AppEntry),
{
    match document.app_mut(app_name) {
        Some(app) => {
            update(app);
            Ok(document)
        }
        None => Err(ReconcileError::AppNotFound {
            requested: app_name.to_string(),
            available: document.app_names(),
        }),
    }
}

/// Sets `createdDate` on `app_name` unless it already has one.
pub fn inject_created_date(
    document: Record,
    app_name: &str,
    created_date: &str,
) -> Result<Record, ReconcileError> {
    with_app(document, app_name, |app| {
        if app.created_date.is_none() {
            app.created_date = Some(created_date.to_string());
        } else {
            tracing::debug!(app = %app.name, "createdDate already set, keeping it");
        }
    })
}

/// Sets `userType` on `app_name` unless it already has one.
pub fn inject_user_type(
    document: Record,
    app_name: &str,
    user_type: UserType,
) -> Result<Record, ReconcileError> {
    with_app(document, app_name, |app| {
        if app.user_type.is_none() {
            app.user_type = Some(user_type);
        } else {
            tracing::debug!(app = %app.name, "userType already set, keeping it");
        }
    })
}

/// Produces the snapshot to persist for `event`.
pub fn reconcile(
    fresh: Record,
    previous: Option<&Record>,
    event: &Event,
) -> Result<Record, ReconcileError> {
    let merged = match previous {
        Some(previous) => carry_forward_user_types(previous, carry_forward_dates(previous, fresh)),
        None => fresh,
    };

    let merged = inject_created_date(merged, &event.app, &event.received_at)?;
    inject_user_type(merged, &event.app, event.user_type)
}
