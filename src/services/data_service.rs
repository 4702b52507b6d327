use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::policy;
use crate::state::{MetricsSnapshot, Store};

/// Body of `POST /data` and `POST /admin/data`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataItem {
    pub key: String,
    pub value: String,
}

/// Body of `GET /admin/status`.
#[derive(Debug, Clone, Serialize)]
pub struct AdminStatus {
    pub status: &'static str,
    pub metrics: MetricsSnapshot,
    pub data_items: u64,
}

/// All public keys. Counts as a request.
pub async fn public_data(store: &Store) -> BTreeMap<String, String> {
    policy::filter_public(store.get_all().await)
}

/// Store a key on behalf of an untrusted caller.
///
/// Private keys are refused before the store is touched.
pub async fn public_set(store: &Store, item: &DataItem) -> Result<String, ApiError> {
    validate_key(&item.key)?;

    if policy::is_private(&item.key) {
        tracing::warn!(key = %item.key, "rejected private key on public API");
        return Err(ApiError::Forbidden(
            "Cannot set private keys via public API".to_string(),
        ));
    }

    store.set(&item.key, &item.value).await?;
    Ok(format!("Set {} = {}", item.key, item.value))
}

/// Store any key, private ones included.
pub async fn admin_set(store: &Store, item: &DataItem) -> Result<String, ApiError> {
    validate_key(&item.key)?;

    store.set(&item.key, &item.value).await?;
    Ok(format!("Admin set {} = {}", item.key, item.value))
}

/// Metrics plus the number of stored records.
///
/// Uses a plain count so that checking status does not bump the request
/// counter.
pub async fn admin_status(store: &Store) -> Result<AdminStatus, ApiError> {
    let metrics = store.get_metrics().await;
    let data_items = store
        .count()
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to read store: {err}")))?;

    Ok(AdminStatus {
        status: "admin_healthy",
        metrics,
        data_items,
    })
}

fn validate_key(key: &str) -> Result<(), ApiError> {
    if key.is_empty() {
        return Err(ApiError::Validation("key must not be empty".to_string()));
    }
    Ok(())
}
