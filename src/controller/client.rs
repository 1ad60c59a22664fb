//! # Remote Client Construction
//!
//! Turns the raw credential bytes stored in a secret entry into a live
//! connection. The reconciler only sees the [`ClientBuilder`] trait, so tests
//! inject a fake and production injects [`KubeconfigClientBuilder`].

use std::fmt;

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Client, Config};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("kubeconfig is empty")]
    EmptyKubeconfig,
    #[error("kubeconfig is not valid UTF-8")]
    NotUtf8(#[source] std::str::Utf8Error),
    #[error("kubeconfig cannot be loaded: {0}")]
    Load(#[source] KubeconfigError),
    #[error("kubeconfig is not valid: {0}")]
    Invalid(String),
    #[error("failed to create kube client: {0}")]
    Client(#[source] kube::Error),
}

/// Builds a connection handle from raw credential bytes.
#[async_trait]
pub trait ClientBuilder<C>: Send + Sync {
    async fn build(&self, credential: &[u8]) -> Result<C, BuildError>;
}

/// Builds `kube::Client`s from kubeconfig bytes.
#[derive(Clone, Default)]
pub struct KubeconfigClientBuilder {
    options: KubeConfigOptions,
}

impl fmt::Debug for KubeconfigClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeconfigClientBuilder")
            .field("context", &self.options.context)
            .field("cluster", &self.options.cluster)
            .finish_non_exhaustive()
    }
}

impl KubeconfigClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override context/cluster/user selection for every built client.
    pub fn with_options(options: KubeConfigOptions) -> Self {
        Self { options }
    }
}

/// Parse kubeconfig bytes and check they describe a usable context.
pub fn load_kubeconfig(credential: &[u8]) -> Result<Kubeconfig, BuildError> {
    if credential.is_empty() {
        return Err(BuildError::EmptyKubeconfig);
    }
    let text = std::str::from_utf8(credential).map_err(BuildError::NotUtf8)?;
    let kubeconfig = Kubeconfig::from_yaml(text).map_err(BuildError::Load)?;
    validate_kubeconfig(&kubeconfig)?;
    Ok(kubeconfig)
}

/// The current context must be set, exist, and point at a known cluster.
pub fn validate_kubeconfig(kubeconfig: &Kubeconfig) -> Result<(), BuildError> {
    let current = kubeconfig
        .current_context
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| BuildError::Invalid("current-context is not set".to_string()))?;

    let context = kubeconfig
        .contexts
        .iter()
        .find(|named| named.name == current)
        .ok_or_else(|| {
            BuildError::Invalid(format!("context was not found for specified context: {current}"))
        })?;

    let cluster_name = context
        .context
        .as_ref()
        .map(|ctx| ctx.cluster.as_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| BuildError::Invalid(format!("context {current} has no cluster")))?;

    if !kubeconfig
        .clusters
        .iter()
        .any(|named| named.name == cluster_name)
    {
        return Err(BuildError::Invalid(format!(
            "cluster {cluster_name} was not found for context {current}"
        )));
    }
    Ok(())
}

#[async_trait]
impl ClientBuilder<Client> for KubeconfigClientBuilder {
    async fn build(&self, credential: &[u8]) -> Result<Client, BuildError> {
        let kubeconfig = load_kubeconfig(credential)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &self.options)
            .await
            .map_err(BuildError::Load)?;
        Client::try_from(config).map_err(BuildError::Client)
    }
}
