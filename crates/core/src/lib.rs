pub mod auth;
pub mod cleanup;
pub mod config;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod scope;
pub mod store;

pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use cleanup::{run_cleanup, CleanupPlan, CleanupReport, CleanupTarget, ScopeCleanup};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, SanitizedConfig, StoreBackend,
};
pub use notify::{Envelope, QueueEvent, QueueNotifier};
pub use queue::{
    ActiveSession, CloseReason, JoinOutcome, PausedJoinPolicy, QueueError, QueueManager,
    QueueSettings, QueueStatus, TicketRecord, TicketStatus,
};
pub use scope::{ScopeId, ScopeIdError};
pub use store::{MemoryQueueStore, QueueStore, SqliteQueueStore, StoreError};
