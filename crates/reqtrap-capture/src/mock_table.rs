//! In-memory mock table
//!
//! Maps `(method, path)` to the configured canned response. The table is a
//! cache of the `mock_responses` rows: `reload` builds a complete new map from
//! the store and swaps it in, so readers always see either the old or the new
//! table, never a half-built one.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use reqtrap_db::{entities::mock_response, MockResponseInput, RecordStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Reasons a mock definition is rejected
#[derive(Debug, Error, PartialEq)]
pub enum MockDefinitionError {
    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("Invalid path '{0}': must be non-empty and must not contain a query string")]
    InvalidPath(String),

    #[error("Invalid status code: {0}")]
    InvalidStatus(i64),

    #[error("Invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("Invalid value for header '{0}'")]
    InvalidHeaderValue(String),

    #[error("Invalid delay: {0}")]
    InvalidDelay(i64),

    #[error("Malformed stored headers: {0}")]
    MalformedHeaders(String),
}

/// Lookup key: uppercase method plus path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MockKey {
    pub method: String,
    pub path: String,
}

impl MockKey {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
        }
    }
}

/// A canned response for one `(method, path)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockDefinition {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Delay before answering, in whole seconds
    pub delay: u64,
}

impl MockDefinition {
    /// Build and validate a definition from operator input
    ///
    /// The method is uppercased and a missing leading slash is added to the path.
    pub fn new(
        method: &str,
        path: &str,
        status: i64,
        headers: BTreeMap<String, String>,
        body: Option<String>,
        delay: i64,
    ) -> Result<Self, MockDefinitionError> {
        let method = method.trim().to_ascii_uppercase();
        if method.is_empty() || Method::from_bytes(method.as_bytes()).is_err() {
            return Err(MockDefinitionError::InvalidMethod(method));
        }

        let path = normalize_path(path)?;

        let status = u16::try_from(status)
            .ok()
            .filter(|s| StatusCode::from_u16(*s).is_ok() && (100..=599).contains(s))
            .ok_or(MockDefinitionError::InvalidStatus(status))?;

        let delay = u64::try_from(delay).map_err(|_| MockDefinitionError::InvalidDelay(delay))?;

        for (name, value) in &headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| MockDefinitionError::InvalidHeaderName(name.clone()))?;
            HeaderValue::from_str(value)
                .map_err(|_| MockDefinitionError::InvalidHeaderValue(name.clone()))?;
        }

        Ok(Self {
            method,
            path,
            status,
            headers,
            body: body.unwrap_or_default(),
            delay,
        })
    }

    pub fn key(&self) -> MockKey {
        MockKey::new(&self.method, &self.path)
    }

    pub fn delay_duration(&self) -> Duration {
        Duration::from_secs(self.delay)
    }

    /// Convert into the storage representation
    pub fn to_store_input(&self) -> MockResponseInput {
        MockResponseInput {
            method: self.method.clone(),
            path: self.path.clone(),
            status: self.status,
            headers: serde_json::to_string(&self.headers).unwrap_or_else(|_| "{}".to_string()),
            body: self.body.clone(),
            delay_secs: self.delay,
        }
    }
}

impl TryFrom<&mock_response::Model> for MockDefinition {
    type Error = MockDefinitionError;

    fn try_from(row: &mock_response::Model) -> Result<Self, Self::Error> {
        let headers: BTreeMap<String, String> = serde_json::from_str(&row.headers)
            .map_err(|e| MockDefinitionError::MalformedHeaders(e.to_string()))?;

        Self::new(
            &row.method,
            &row.path,
            row.status as i64,
            headers,
            row.body.clone(),
            row.delay,
        )
    }
}

/// Normalize an operator-supplied path to the form the dispatcher sees
fn normalize_path(path: &str) -> Result<String, MockDefinitionError> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.contains('?') || trimmed.contains('#') {
        return Err(MockDefinitionError::InvalidPath(path.to_string()));
    }

    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}

type Entries = Arc<HashMap<MockKey, Arc<MockDefinition>>>;

/// Shared, read-mostly table of mock definitions
pub struct MockTable {
    /// Current snapshot; the write lock is held only for the pointer swap
    entries: RwLock<Entries>,
    /// Serializes reloads so an older fetch never replaces a newer snapshot
    reload_lock: Mutex<()>,
}

impl MockTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(HashMap::new())),
            reload_lock: Mutex::new(()),
        }
    }

    /// Rebuild the table from the store and swap it in
    ///
    /// Returns the number of definitions now active. On a storage error the
    /// previous table stays in place.
    pub async fn reload(&self, store: &dyn RecordStore) -> Result<usize, StoreError> {
        let _guard = self.reload_lock.lock().await;

        let rows = store.mock_responses().await?;
        let mut fresh = HashMap::with_capacity(rows.len());

        for row in &rows {
            match MockDefinition::try_from(row) {
                Ok(definition) => {
                    fresh.insert(definition.key(), Arc::new(definition));
                }
                Err(e) => {
                    warn!(
                        id = row.id,
                        method = %row.method,
                        path = %row.path,
                        "Skipping invalid mock response: {}",
                        e
                    );
                }
            }
        }

        let count = fresh.len();
        self.replace(fresh);
        info!(count, "Mock table reloaded");

        Ok(count)
    }

    /// Exact-match lookup; never touches storage
    pub fn lookup(&self, method: &str, path: &str) -> Option<Arc<MockDefinition>> {
        let key = MockKey::new(method, path);
        let found = self.snapshot().get(&key).cloned();

        if found.is_some() {
            debug!(method = %key.method, path = %key.path, "Mock hit");
        }

        found
    }

    /// Current table contents
    pub fn snapshot(&self) -> Entries {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn replace(&self, fresh: HashMap<MockKey, Arc<MockDefinition>>) {
        let fresh = Arc::new(fresh);
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }
}

impl Default for MockTable {
    fn default() -> Self {
        Self::new()
    }
}
