//! Service wiring shared by every host process.
//!
//! [`Services`] builds the ledger, the room manager, the webhook reconciler
//! and (when a provider token is configured) the deposit service over one
//! store backend.

use std::sync::Arc;
use thiserror::Error;

use crate::{
    db::{
        Database, DatabaseConfig, LedgerStore, MemoryStore, PaymentStore, RoomStore, StoreError,
    },
    env::env_or,
    game::{ShuffleSource, ThreadRngShuffle},
    payment::{
        DepositService, HttpPaymentProvider, PaymentConfig, PaymentError, PaymentProvider,
        WebhookReconciler,
    },
    room::{RoomConfig, RoomError, RoomManager},
    wallet::{WalletConfig, WalletError, WalletManager},
};

/// Where state is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// In-process maps; state is lost on exit
    Memory,
    Postgres(DatabaseConfig),
}

/// Configuration for every service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicesConfig {
    pub backend: Backend,

    /// Apply schema migrations on startup (Postgres only)
    pub migrate: bool,

    pub wallet: WalletConfig,
    pub rooms: RoomConfig,
    pub payment: PaymentConfig,
}

impl ServicesConfig {
    /// Create configuration from environment variables
    ///
    /// The backend is Postgres with [`DatabaseConfig::from_env`]; `DB_MIGRATE`
    /// (default: false) controls migrations. Every other section reads its
    /// own variables.
    pub fn from_env() -> Self {
        Self {
            backend: Backend::Postgres(DatabaseConfig::from_env()),
            migrate: env_or("DB_MIGRATE", false),
            wallet: WalletConfig::from_env(),
            rooms: RoomConfig::from_env(),
            payment: PaymentConfig::from_env(),
        }
    }

    /// In-memory backend with default settings
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            migrate: false,
            wallet: WalletConfig::default(),
            rooms: RoomConfig::default(),
            payment: PaymentConfig::default(),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if let Backend::Postgres(db) = &self.backend {
            db.validate().map_err(BootstrapError::Config)?;
        }
        self.wallet.validate().map_err(BootstrapError::Config)?;
        self.rooms.validate().map_err(BootstrapError::Config)?;
        self.payment.validate().map_err(BootstrapError::Config)?;
        Ok(())
    }
}

/// Startup failures
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to apply migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// What one maintenance pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub settlements_applied: usize,

    /// Settlements left for the next pass after a transient failure
    pub settlements_queued: usize,

    /// Settlements parked for an operator
    pub settlements_rejected: usize,
    pub rooms_collected: usize,
    pub intents_expired: u64,
}

/// Running services
pub struct Services {
    pub wallet: WalletManager,
    pub rooms: Arc<RoomManager>,
    pub reconciler: Arc<WebhookReconciler>,

    /// `None` when no provider access token is configured
    pub deposits: Option<Arc<DepositService>>,

    database: Option<Database>,
}

impl Services {
    /// Build every service from configuration
    ///
    /// # Errors
    ///
    /// * `BootstrapError::Config` - A section failed validation
    /// * `BootstrapError::Database` - Postgres unreachable
    /// * `BootstrapError::Migration` - Migrations failed
    pub async fn init(config: ServicesConfig) -> Result<Self, BootstrapError> {
        config.validate()?;

        let provider: Option<Arc<dyn PaymentProvider>> = if config.payment.provider_enabled() {
            Some(Arc::new(HttpPaymentProvider::new(config.payment.clone())?))
        } else {
            log::warn!("PAYMENT_ACCESS_TOKEN not set, deposits are disabled");
            None
        };
        let shuffle: Arc<dyn ShuffleSource> = Arc::new(ThreadRngShuffle);

        match config.backend.clone() {
            Backend::Memory => {
                log::info!("Using in-memory store");
                Self::in_memory(config, Arc::new(MemoryStore::new()), shuffle, provider)
            }
            Backend::Postgres(db_config) => {
                let database = Database::connect(&db_config).await?;
                log::info!("Database connected");
                if config.migrate {
                    database.migrate().await?;
                    log::info!("Migrations applied");
                }
                let store = Arc::new(database.store());
                Self::assemble(
                    store.clone(),
                    store.clone(),
                    store,
                    shuffle,
                    provider,
                    config,
                    Some(database),
                )
            }
        }
    }

    /// Build every service over an existing in-memory store
    ///
    /// Tests use this to inject a deterministic shuffle and a fake provider.
    pub fn in_memory(
        config: ServicesConfig,
        store: Arc<MemoryStore>,
        shuffle: Arc<dyn ShuffleSource>,
        provider: Option<Arc<dyn PaymentProvider>>,
    ) -> Result<Self, BootstrapError> {
        Self::assemble(
            store.clone(),
            store.clone(),
            store,
            shuffle,
            provider,
            config,
            None,
        )
    }

    fn assemble(
        ledger: Arc<dyn LedgerStore>,
        rooms: Arc<dyn RoomStore>,
        payments: Arc<dyn PaymentStore>,
        shuffle: Arc<dyn ShuffleSource>,
        provider: Option<Arc<dyn PaymentProvider>>,
        config: ServicesConfig,
        database: Option<Database>,
    ) -> Result<Self, BootstrapError> {
        let wallet = WalletManager::new(ledger, config.wallet)?;
        let room_manager = RoomManager::new(wallet.clone(), rooms, shuffle, config.rooms)?;
        let reconciler =
            WebhookReconciler::new(wallet.clone(), payments.clone(), config.payment.retry);
        let deposits = provider
            .map(|provider| DepositService::new(wallet.clone(), payments, provider, config.payment))
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            wallet,
            rooms: Arc::new(room_manager),
            reconciler: Arc::new(reconciler),
            deposits,
            database,
        })
    }

    /// Run one maintenance pass
    ///
    /// Replays queued settlements, closes idle rooms and expires stale
    /// deposit intents. Failures are logged and retried on the next pass.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let settlements_applied = self.rooms.retry_pending_settlements().await;
        let settlements = self.rooms.settlements();
        let mut report = MaintenanceReport {
            settlements_applied,
            settlements_queued: settlements.len(),
            settlements_rejected: settlements.rejected().len(),
            rooms_collected: self.rooms.collect_idle_rooms().await,
            intents_expired: 0,
        };
        if let Some(deposits) = &self.deposits {
            match deposits.expire_stale().await {
                Ok(expired) => report.intents_expired = expired,
                Err(e) => log::warn!("Failed to expire deposit intents: {}", e),
            }
        }
        report
    }

    /// Check the backing store
    pub async fn health_check(&self) -> Result<(), BootstrapError> {
        if let Some(database) = &self.database {
            database.health_check().await?;
        }
        Ok(())
    }

    /// Stop every room actor and close the pool
    pub async fn shutdown(self) {
        self.rooms.shutdown().await;
        let pending = self.rooms.settlements().len();
        if pending > 0 {
            log::warn!("Shutting down with {} settlements still queued", pending);
        }
        if let Some(database) = self.database {
            database.close().await;
        }
    }
}
