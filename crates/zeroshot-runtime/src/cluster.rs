//! Shared per-cluster runtime state.
//!
//! [`ClusterCore`] is the piece of a running cluster that agents hold a
//! shared reference to: the ledger, the bus, lifecycle state, and the two
//! cancellation tokens. The graceful `stop_token` signals intent: in-flight
//! runs finish; the `kill_token` aborts runners and skips pending hook
//! publications.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use zeroshot_core::ids::ClusterId;
use zeroshot_core::state::ClusterState;
use zeroshot_events::bus::MessageBus;
use zeroshot_events::ledger::Ledger;

/// Shared runtime state of one cluster.
pub struct ClusterCore {
    /// Cluster id.
    pub id: ClusterId,
    /// Creation time, epoch millis; the `cluster_start` anchor.
    pub created_at: i64,
    /// The cluster's ledger.
    pub ledger: Arc<Ledger>,
    /// The cluster's bus.
    pub bus: Arc<MessageBus>,
    /// Agent id → role, for predicate role counts.
    pub roles: HashMap<String, String>,
    state: Mutex<ClusterState>,
    stop_token: CancellationToken,
    kill_token: CancellationToken,
}

impl ClusterCore {
    /// Create a core in `initializing` state.
    #[must_use]
    pub fn new(
        id: ClusterId,
        created_at: i64,
        ledger: Arc<Ledger>,
        bus: Arc<MessageBus>,
        roles: HashMap<String, String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            created_at,
            ledger,
            bus,
            roles,
            state: Mutex::new(ClusterState::Initializing),
            stop_token: CancellationToken::new(),
            kill_token: CancellationToken::new(),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClusterState {
        *self.state.lock()
    }

    /// Set the state directly (orchestrator transitions only).
    pub fn set_state(&self, state: ClusterState) {
        *self.state.lock() = state;
    }

    /// Request a graceful stop. In-flight runs are allowed to finish.
    ///
    /// Returns `true` exactly once, for the call that performs the transition.
    /// Further calls (or calls on an already-terminal cluster) are no-ops.
    pub fn request_stop(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = ClusterState::Stopped;
        }
        info!(cluster = %self.id, "cluster stop requested");
        self.stop_token.cancel();
        true
    }

    /// Force-stop: abort runners and skip pending hook publications.
    ///
    /// Same exactly-once contract as [`request_stop`].
    ///
    /// [`request_stop`]: ClusterCore::request_stop
    pub fn kill(&self) -> bool {
        let transitioned = self.request_stop();
        self.kill_token.cancel();
        if transitioned {
            info!(cluster = %self.id, "cluster killed");
        }
        transitioned
    }

    /// Token cancelled on graceful stop and on kill.
    #[must_use]
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop_token
    }

    /// Token cancelled only on kill.
    #[must_use]
    pub fn kill_token(&self) -> &CancellationToken {
        &self.kill_token
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stop_token.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
