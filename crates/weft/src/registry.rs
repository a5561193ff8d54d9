use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::extension::Extension;
use crate::group::Group;
use crate::mailbox::Mailbox;
use crate::pool::Pool;
use crate::supervisor::Supervisor;

/// Process-wide tables backing the toolkit: the interned group tree,
/// extension bindings, the subscription table, the ambient pool stack, the
/// bus supervisor, and the metrics counters. Each table has its own lock.
pub(crate) struct Registry {
    pub(crate) groups: Mutex<HashMap<String, Group>>,
    pub(crate) extensions: Mutex<HashMap<Group, Arc<dyn Extension>>>,
    pub(crate) subscriptions: Mutex<HashMap<Group, HashSet<Mailbox>>>,
    pool_stack: Mutex<Vec<Pool>>,
    bus_supervisor: OnceLock<Supervisor>,
    pub(crate) queued_tasks: AtomicU64,
    pub(crate) alive_tasks: AtomicU64,
    pub(crate) pool_workers: AtomicU64,
}

impl Registry {
    fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            extensions: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            pool_stack: Mutex::new(Vec::new()),
            bus_supervisor: OnceLock::new(),
            queued_tasks: AtomicU64::new(0),
            alive_tasks: AtomicU64::new(0),
            pool_workers: AtomicU64::new(0),
        }
    }

    /// Innermost scoped pool, if any.
    pub(crate) fn innermost_pool(&self) -> Option<Pool> {
        self.pool_stack.lock().last().cloned()
    }

    pub(crate) fn push_pool(&self, pool: Pool) {
        self.pool_stack.lock().push(pool);
    }

    pub(crate) fn pop_pool(&self) {
        self.pool_stack.lock().pop();
    }

    /// Supervisor owning extension background workers.
    pub(crate) fn bus_supervisor(&self) -> &Supervisor {
        self.bus_supervisor.get_or_init(Supervisor::new)
    }
}

/// The process-wide registry handle.
pub(crate) fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}
