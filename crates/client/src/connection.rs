//! Connection bootstrap
//!
//! A [`Connection`] binds credentials and configuration to a transport and
//! hands out collection handles that share its channel.

use std::sync::Arc;
use tessera_core::{Error, Keyspace, Result};
use tracing::info;

use crate::collection::{AsyncCollection, Collection};
use crate::config::ClientConfig;
use crate::transport::{Channel, Transport};

/// Username/password pair presented to the server
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Open connection to a cluster
#[derive(Debug, Clone)]
pub struct Connection {
    channel: Channel,
    config: ClientConfig,
    credentials: Credentials,
}

impl Connection {
    /// Connect over `transport` with the default configuration
    pub fn connect(transport: Arc<dyn Transport>, credentials: Credentials) -> Result<Self> {
        Self::connect_with_config(transport, credentials, ClientConfig::default())
    }

    /// Connect over `transport` with an explicit configuration
    pub fn connect_with_config(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self> {
        config.validate()?;
        if credentials.username.is_empty() {
            return Err(Error::invalid_argument("username must not be empty"));
        }
        let channel = Channel::new(transport, config.operation_timeout())?;
        info!(target: "tessera::transport", username = %credentials.username, "connected");
        Ok(Connection {
            channel,
            config,
            credentials,
        })
    }

    /// Channel shared by every handle from this connection
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// User this connection authenticated as
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Open a blocking collection handle
    pub fn open_collection(&self, bucket: &str, scope: &str, name: &str) -> Result<Collection> {
        self.open_async_collection(bucket, scope, name)
            .map(Collection::new)
    }

    /// Open an asynchronous collection handle
    pub fn open_async_collection(
        &self,
        bucket: &str,
        scope: &str,
        name: &str,
    ) -> Result<AsyncCollection> {
        for (what, value) in [("bucket", bucket), ("scope", scope), ("collection", name)] {
            if value.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "{} name must not be empty",
                    what
                )));
            }
        }
        Ok(AsyncCollection::new(
            Keyspace::new(bucket, scope, name),
            self.channel.clone(),
            self.config.limits(),
            self.config.durability_level()?,
        ))
    }
}
