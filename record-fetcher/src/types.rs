use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// The kind of user that ran an app.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Regular,
    External,
    Api,
}

impl UserType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UserType::Regular => "regular",
            UserType::External => "external",
            UserType::Api => "api",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One app run recorded against a record.
///
/// `created_date` and `user_type` are maintained locally and never come from
/// upstream. Every other upstream field is kept in `extra` untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppEntry {
    pub name: String,
    #[serde(
        rename = "createdDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_date: Option<String>,
    #[serde(rename = "userType", default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppEntry {
    pub fn new<N: Into<String>>(name: N) -> Self {
        AppEntry {
            name: name.into(),
            created_date: None,
            user_type: None,
            extra: Map::new(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("record {record_id} has more than one app named {app}")]
    DuplicateApp { record_id: String, app: String },
}

/// A snapshot of an upstream catalog item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub catalog: String,
    pub apps: Vec<AppEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new<I, C>(id: I, catalog: C, apps: Vec<AppEntry>) -> Self
    where
        I: Into<String>,
        C: Into<String>,
    {
        Record {
            id: id.into(),
            catalog: catalog.into(),
            apps,
            extra: Map::new(),
        }
    }

    /// App names are the join key during reconciliation, so they must be unique.
    pub fn validate(&self) -> Result<(), RecordError> {
        let mut seen = HashSet::with_capacity(self.apps.len());
        for app in &self.apps {
            if !seen.insert(app.name.as_str()) {
                return Err(RecordError::DuplicateApp {
                    record_id: self.id.clone(),
                    app: app.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn app(&self, name: &str) -> Option<&AppEntry> {
        self.apps.iter().find(|app| app.name == name)
    }

    pub fn app_mut(&mut self, name: &str) -> Option<&mut AppEntry> {
        self.apps.iter_mut().find(|app| app.name == name)
    }

    pub fn app_names(&self) -> Vec<String> {
        self.apps.iter().map(|app| app.name.clone()).collect()
    }
}
