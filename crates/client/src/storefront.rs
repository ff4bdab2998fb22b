//! Wiring of the client components for one session.

use std::sync::Arc;

use tracing::debug;

use crate::account::Account;
use crate::addresses::Addresses;
use crate::cart::{ApiCartBackend, CartBackend, CartCountBroadcaster, CartSyncEngine};
use crate::catalog::{Catalog, CatalogAdmin};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::notify::{Confirmer, Notifier};
use crate::orders::Orders;
use crate::session::{CredentialStore, FileCredentialStore, MemoryCredentialStore, SessionStore};
use crate::transport::AuthenticatedTransport;

/// Every client component, sharing one session and one transport.
#[derive(Debug, Clone)]
pub struct Storefront {
    config: ClientConfig,
    transport: AuthenticatedTransport,
    account: Account,
    orders: Orders,
    catalog: Catalog,
    catalog_admin: CatalogAdmin,
    addresses: Addresses,
    cart_backend: ApiCartBackend,
    counts: CartCountBroadcaster,
}

impl Storefront {
    /// Open the persisted session (if configured) and build the components.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Session` if the credential file cannot be read and
    /// `ApiError::NetworkUnavailable` if the HTTP client cannot be built.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match &config.credentials_path {
            Some(path) => {
                debug!(path = %path.display(), "Using file credential store");
                Arc::new(FileCredentialStore::new(path))
            }
            None => Arc::new(MemoryCredentialStore::new()),
        };
        let session = Arc::new(SessionStore::open(store)?);
        Self::with_session(config, session)
    }

    /// Build the components around an existing session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NetworkUnavailable` if the HTTP client cannot be built.
    pub fn with_session(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
        let transport = AuthenticatedTransport::new(config, session)?;
        let cart_backend = ApiCartBackend::new(transport.clone());
        let counts = CartCountBroadcaster::new(Arc::new(cart_backend.clone()));

        Ok(Self {
            config: config.clone(),
            account: Account::new(transport.clone()),
            orders: Orders::new(transport.clone()),
            catalog: Catalog::new(transport.clone()),
            catalog_admin: CatalogAdmin::new(transport.clone()),
            addresses: Addresses::new(transport.clone()),
            cart_backend,
            counts,
            transport,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn transport(&self) -> &AuthenticatedTransport {
        &self.transport
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        self.transport.session()
    }

    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    #[must_use]
    pub const fn orders(&self) -> &Orders {
        &self.orders
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub const fn catalog_admin(&self) -> &CatalogAdmin {
        &self.catalog_admin
    }

    #[must_use]
    pub const fn addresses(&self) -> &Addresses {
        &self.addresses
    }

    #[must_use]
    pub const fn cart_backend(&self) -> &ApiCartBackend {
        &self.cart_backend
    }

    /// Broadcaster shared by every cart engine of this storefront.
    #[must_use]
    pub const fn counts(&self) -> &CartCountBroadcaster {
        &self.counts
    }

    /// Create a sync engine for the session's cart. Call `load` on it next.
    #[must_use]
    pub fn cart_engine(
        &self,
        notifier: Arc<dyn Notifier>,
        confirmer: Arc<dyn Confirmer>,
    ) -> CartSyncEngine {
        let backend: Arc<dyn CartBackend> = Arc::new(self.cart_backend.clone());
        CartSyncEngine::new(
            backend,
            self.counts.clone(),
            notifier,
            confirmer,
            self.config.cart_debounce,
        )
    }
}
