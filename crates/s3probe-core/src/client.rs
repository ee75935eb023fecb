//! Connected S3 client handles, cached per credential set.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig as SdkRetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::Region;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::errors::{EngineError, EngineResult, OperationFault};
use crate::model::plan::validate_endpoint;
use crate::model::{CredentialSet, GlobalConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    #[serde(with = "crate::model::duration_ms")]
    pub connect_timeout: Duration,
    #[serde(with = "crate::model::duration_ms")]
    pub operation_timeout: Duration,
    /// Upper bound on concurrent in-flight calls per handle.
    pub max_connections: usize,
    /// Attempts made by the SDK itself. Kept at 1 so the engine's retry policy
    /// is the only retry layer.
    pub sdk_max_attempts: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(300),
            max_connections: 50,
            sdk_max_attempts: 1,
        }
    }
}

/// A connected client bound to one credential set.
pub struct ClientHandle {
    client: aws_sdk_s3::Client,
    credential: String,
    path_style: bool,
    permits: Arc<Semaphore>,
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("credential", &self.credential)
            .field("path_style", &self.path_style)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl ClientHandle {
    pub fn s3(&self) -> &aws_sdk_s3::Client {
        &self.client
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn path_style(&self) -> bool {
        self.path_style
    }

    /// Waits for a connection slot; held for the duration of one call.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, OperationFault> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OperationFault::local("client connection pool closed"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    name: String,
    fingerprint: String,
    endpoint: String,
    region: String,
}

/// Builds and caches one [`ClientHandle`] per credential. Safe to share across groups.
#[derive(Debug, Default)]
pub struct ClientProvider {
    settings: ClientSettings,
    cache: Mutex<HashMap<ClientKey, Arc<ClientHandle>>>,
}

impl ClientProvider {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Returns the cached handle for this credential, building it on first use.
    pub fn get(
        &self,
        credential: &CredentialSet,
        global: &GlobalConfig,
    ) -> EngineResult<Arc<ClientHandle>> {
        let key = ClientKey {
            name: credential.name.clone(),
            fingerprint: credential.fingerprint(),
            endpoint: global.endpoint_url.clone(),
            region: global.region.clone(),
        };

        let mut cache = self.cache.lock().map_err(|_| EngineError::Connection {
            credential: credential.name.clone(),
            message: "client cache lock poisoned".to_string(),
        })?;

        if let Some(handle) = cache.get(&key) {
            debug!(credential = %credential.name, "client cache hit");
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(self.build(credential, global)?);
        info!(
            credential = %credential.name,
            endpoint = %global.endpoint_url,
            path_style = global.path_style,
            "created client"
        );
        cache.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Drops every cached handle; the next `get` reconnects.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        debug!("client cache invalidated");
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn build(&self, credential: &CredentialSet, global: &GlobalConfig) -> EngineResult<ClientHandle> {
        let connection_error = |message: String| EngineError::Connection {
            credential: credential.name.clone(),
            message,
        };

        validate_endpoint(&global.endpoint_url).map_err(|e| connection_error(e.to_string()))?;
        if credential.access_key.is_empty() || credential.secret_key.is_empty() {
            return Err(connection_error("access key and secret key are required".into()));
        }

        let credentials = Credentials::new(
            credential.access_key.clone(),
            credential.secret_key.clone(),
            credential.session_token.clone(),
            None,
            "s3probe",
        );

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(self.settings.connect_timeout)
            .read_timeout(self.settings.operation_timeout)
            .build();

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(global.region.clone()))
            .endpoint_url(global.endpoint_url.clone())
            .credentials_provider(credentials)
            .force_path_style(global.path_style)
            .timeout_config(timeouts)
            .retry_config(SdkRetryConfig::standard().with_max_attempts(self.settings.sdk_max_attempts.max(1)))
            .build();

        Ok(ClientHandle {
            client: aws_sdk_s3::Client::from_conf(config),
            credential: credential.name.clone(),
            path_style: global.path_style,
            permits: Arc::new(Semaphore::new(self.settings.max_connections.max(1))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> GlobalConfig {
        GlobalConfig::new(
            "http://localhost:9000",
            vec![
                CredentialSet::new("admin", "AKIAADMIN0001", "secret"),
                CredentialSet::new("reader", "AKIAREAD00001", "secret"),
            ],
        )
        .with_path_style(true)
    }

    #[test]
    fn same_credential_returns_cached_handle() {
        let provider = ClientProvider::default();
        let global = global();
        let admin = global.credential("admin").unwrap();

        let first = provider.get(admin, &global).unwrap();
        let second = provider.get(admin, &global).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.path_style());

        let reader = provider.get(global.credential("reader").unwrap(), &global).unwrap();
        assert!(!Arc::ptr_eq(&first, &reader));
        assert_eq!(provider.cached_count(), 2);
    }

    #[test]
    fn invalidate_forces_new_handle() {
        let provider = ClientProvider::default();
        let global = global();
        let admin = global.credential("admin").unwrap();

        let first = provider.get(admin, &global).unwrap();
        provider.invalidate();
        assert_eq!(provider.cached_count(), 0);
        let second = provider.get(admin, &global).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn rotated_key_gets_new_handle() {
        let provider = ClientProvider::default();
        let global = global();
        let old = CredentialSet::new("admin", "AKIAOLD00001", "s");
        let rotated = CredentialSet::new("admin", "AKIANEW00001", "s");
        let a = provider.get(&old, &global).unwrap();
        let b = provider.get(&rotated, &global).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn bad_endpoint_is_connection_error() {
        let provider = ClientProvider::default();
        let global = GlobalConfig::new("localhost:9000", vec![]);
        let cred = CredentialSet::new("admin", "AK", "SK");
        let err = provider.get(&cred, &global).unwrap_err();
        assert!(matches!(err, EngineError::Connection { ref credential, .. } if credential == "admin"));
    }

    #[tokio::test]
    async fn permits_bound_concurrency() {
        let provider = ClientProvider::new(ClientSettings {
            max_connections: 1,
            ..ClientSettings::default()
        });
        let global = global();
        let handle = provider.get(global.credential("admin").unwrap(), &global).unwrap();
        let permit = handle.acquire().await.unwrap();
        assert!(handle.permits.clone().try_acquire_owned().is_err());
        drop(permit);
        assert!(handle.acquire().await.is_ok());
    }
}
