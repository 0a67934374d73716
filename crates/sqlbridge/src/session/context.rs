//! Shared collaborators of every session.

use std::fmt;
use std::sync::Arc;

use crate::cache::{FieldMetadataCache, InMemoryFieldCache};
use crate::config::ConnectionConfig;
use crate::core::catalog::DriverCatalog;
use crate::core::credentials::{CredentialDecoder, ObfuscatedPasswords};
use crate::core::variables::{VariableSpace, Variables};
use crate::error::Result;
use crate::native::ConnectionPools;
use crate::registry::ConnectionRegistry;

use super::Session;

/// Everything sessions share: the catalog, the registry of grouped
/// connections, the pools, and the variable, credential and metadata
/// collaborators.
///
/// # Example
///
/// ```rust,ignore
/// let ctx = SessionContext::builder(DriverCatalog::with_builtins())
///     .variables(Variables::from_environment())
///     .build();
/// let mut session = ctx.session(config)?;
/// session.connect(Some("G"), None).await?;
/// ```
pub struct SessionContext {
    catalog: DriverCatalog,
    registry: ConnectionRegistry,
    pools: ConnectionPools,
    variables: Arc<dyn VariableSpace>,
    credentials: Arc<dyn CredentialDecoder>,
    field_cache: Arc<dyn FieldMetadataCache>,
}

impl SessionContext {
    /// Context with environment variables, obfuscated passwords and an
    /// in-memory field cache.
    pub fn new(catalog: DriverCatalog) -> Arc<Self> {
        Self::builder(catalog).build()
    }

    pub fn builder(catalog: DriverCatalog) -> SessionContextBuilder {
        SessionContextBuilder {
            catalog,
            variables: Arc::new(Variables::from_environment()),
            credentials: Arc::new(ObfuscatedPasswords),
            field_cache: Arc::new(InMemoryFieldCache::new()),
        }
    }

    /// New closed session for `config`. Fails if its dialect is unknown.
    pub fn session(self: &Arc<Self>, config: ConnectionConfig) -> Result<Session> {
        Session::new(self.clone(), config)
    }

    pub fn catalog(&self) -> &DriverCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn pools(&self) -> &ConnectionPools {
        &self.pools
    }

    pub fn variables(&self) -> &dyn VariableSpace {
        self.variables.as_ref()
    }

    pub fn credentials(&self) -> &dyn CredentialDecoder {
        self.credentials.as_ref()
    }

    pub fn field_cache(&self) -> &dyn FieldMetadataCache {
        self.field_cache.as_ref()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SessionContext`].
pub struct SessionContextBuilder {
    catalog: DriverCatalog,
    variables: Arc<dyn VariableSpace>,
    credentials: Arc<dyn CredentialDecoder>,
    field_cache: Arc<dyn FieldMetadataCache>,
}

impl SessionContextBuilder {
    pub fn variables(mut self, variables: impl VariableSpace + 'static) -> Self {
        self.variables = Arc::new(variables);
        self
    }

    pub fn credentials(mut self, credentials: impl CredentialDecoder + 'static) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    pub fn field_cache(mut self, cache: Arc<dyn FieldMetadataCache>) -> Self {
        self.field_cache = cache;
        self
    }

    pub fn build(self) -> Arc<SessionContext> {
        Arc::new(SessionContext {
            catalog: self.catalog,
            registry: ConnectionRegistry::new(),
            pools: ConnectionPools::new(),
            variables: self.variables,
            credentials: self.credentials,
            field_cache: self.field_cache,
        })
    }
}
