//! Store cleanup sweeps.
//!
//! A sweep enumerates scopes and purges every key they hold. It exists
//! for the failure mode where a close hook never ran (process crash,
//! lost lifecycle event) and a scope's keys linger. Dry runs count
//! keys without deleting anything; per-scope failures are recorded and
//! the sweep continues. When the sweep runs inside the serving process
//! it also tears down the swept scopes' broadcast channels.

use serde::Serialize;
use tracing::{error, info};

use crate::metrics::{KEYS_PURGED, SCOPES_PURGED};
use crate::notify::QueueNotifier;
use crate::scope::ScopeId;
use crate::store::QueueStore;

/// What a sweep should cover.
#[derive(Debug, Clone)]
pub enum CleanupTarget {
    /// Every scope found in the store.
    All,
    /// A single scope.
    Scope(ScopeId),
}

#[derive(Debug, Clone)]
pub struct CleanupPlan {
    pub target: CleanupTarget,
    /// Count keys without deleting.
    pub dry_run: bool,
}

/// Outcome for one scope in a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeCleanup {
    pub scope: ScopeId,
    /// Keys counted (dry run) or deleted.
    pub keys: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate sweep outcome.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub scopes: Vec<ScopeCleanup>,
    pub total_keys: u64,
    pub failures: u64,
}

impl CleanupReport {
    pub fn has_failures(&self) -> bool {
        self.failures > 0
    }
}

/// Run a cleanup sweep against the store.
///
/// With a notifier (in-process sweep), each purged scope also has its
/// public and private channels dropped, disconnecting any subscribers
/// still attached. The out-of-process sweep binary passes `None`; it
/// has no channels to clear.
pub fn run_cleanup(
    store: &dyn QueueStore,
    notifier: Option<&QueueNotifier>,
    plan: &CleanupPlan,
) -> CleanupReport {
    let scopes = match &plan.target {
        CleanupTarget::Scope(scope) => vec![scope.clone()],
        CleanupTarget::All => match store.scope_ids() {
            Ok(scopes) => scopes,
            Err(e) => {
                error!(error = %e, "failed to enumerate scopes");
                return CleanupReport {
                    dry_run: plan.dry_run,
                    scopes: Vec::new(),
                    total_keys: 0,
                    failures: 1,
                };
            }
        },
    };

    let mut report = CleanupReport {
        dry_run: plan.dry_run,
        ..Default::default()
    };

    for scope in scopes {
        let result = if plan.dry_run {
            store.count_scope_keys(&scope)
        } else {
            store.purge_scope(&scope)
        };
        match result {
            Ok(keys) => {
                if !plan.dry_run {
                    if keys > 0 {
                        SCOPES_PURGED.inc();
                        KEYS_PURGED.inc_by(keys);
                    }
                    if let Some(notifier) = notifier {
                        let dropped = notifier.drop_scope(&scope);
                        info!(%scope, dropped, "dropped scope channels in sweep");
                    }
                }
                info!(%scope, keys, dry_run = plan.dry_run, "swept scope");
                report.total_keys += keys;
                report.scopes.push(ScopeCleanup {
                    scope,
                    keys,
                    error: None,
                });
            }
            Err(e) => {
                error!(%scope, error = %e, "scope sweep failed");
                report.failures += 1;
                report.scopes.push(ScopeCleanup {
                    scope,
                    keys: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    report
}
