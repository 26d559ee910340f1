//! Process-wide liveness flags.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// A service that contributes to overall liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Datastore,
    Rest,
}

/// Point-in-time copy of the flags, as served on `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusSnapshot {
    pub datastore: bool,
    pub rest: bool,
    pub alive: bool,
}

#[derive(Debug, Default)]
struct Flags {
    datastore: bool,
    rest: bool,
}

/// Cloneable handle on the shared flags.
///
/// Written by the orchestrator and by every container's exit watcher.
#[derive(Debug, Clone, Default)]
pub struct StatusFlags {
    inner: Arc<Mutex<Flags>>,
}

impl StatusFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, component: Component, alive: bool) {
        let mut flags = self.inner.lock();
        match component {
            Component::Datastore => flags.datastore = alive,
            Component::Rest => flags.rest = alive,
        }
    }

    pub fn is_alive(&self, component: Component) -> bool {
        let flags = self.inner.lock();
        match component {
            Component::Datastore => flags.datastore,
            Component::Rest => flags.rest,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let flags = self.inner.lock();
        StatusSnapshot {
            datastore: flags.datastore,
            rest: flags.rest,
            alive: flags.datastore && flags.rest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alive_needs_both() {
        let status = StatusFlags::new();
        assert!(!status.snapshot().alive);

        status.set(Component::Datastore, true);
        assert!(!status.snapshot().alive);

        let shared = status.clone();
        shared.set(Component::Rest, true);
        assert!(status.snapshot().alive);

        status.set(Component::Datastore, false);
        assert_eq!(
            status.snapshot(),
            StatusSnapshot {
                datastore: false,
                rest: true,
                alive: false
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let status = StatusFlags::new();
        let mut tasks = Vec::new();
        for i in 0..32 {
            let s = status.clone();
            tasks.push(tokio::spawn(async move {
                let component = if i % 2 == 0 {
                    Component::Datastore
                } else {
                    Component::Rest
                };
                s.set(component, true);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert!(status.snapshot().alive);
    }
}
