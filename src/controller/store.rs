//! # Secret Store
//!
//! Read-through cache of watched secrets, addressed by `namespace/name` keys.
//! In production this is the kube reflector [`Store`] fed by the secret
//! watch; tests substitute an in-memory map.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube_runtime::reflector::{ObjectRef, Store};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid secret key {0:?}: expected namespace/name")]
    InvalidKey(String),
    #[error("secret cache unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of the current cached state of a secret.
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` means the secret does not exist (deleted or never created).
    fn get(&self, key: &str) -> Result<Option<Arc<Secret>>, StoreError>;
}

/// `namespace/name` key for a secret, as enqueued by the watch.
pub fn secret_key(secret: &Secret) -> String {
    let name = secret.name_any();
    match secret.namespace() {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name,
    }
}

/// Split a `namespace/name` key.
pub fn split_key(key: &str) -> Result<(&str, &str), StoreError> {
    match key.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace, name))
        }
        _ => Err(StoreError::InvalidKey(key.to_string())),
    }
}

impl SecretStore for Store<Secret> {
    fn get(&self, key: &str) -> Result<Option<Arc<Secret>>, StoreError> {
        let (namespace, name) = split_key(key)?;
        let object_ref = ObjectRef::new(name).within(namespace);
        Ok(Store::get(self, &object_ref))
    }
}
