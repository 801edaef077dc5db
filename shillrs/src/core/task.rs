//! Owner-scoped task spawning.
//!
//! Handlers issue remote calls from `spawn_local` tasks. Tying those tasks to
//! a [`TaskScope`] guarantees a continuation never runs once its handler has
//! been dropped.

use std::future::Future;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancels every task spawned through it when dropped.
#[derive(Debug, Default)]
pub(crate) struct TaskScope {
    token: CancellationToken,
}

impl TaskScope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` on the current `LocalSet`, cancelled with the scope.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        spawn_until_cancelled(self.token.clone(), task);
    }

    /// Spawns `task` under a child token. Dropping the returned guard
    /// cancels the task without affecting the rest of the scope.
    pub(crate) fn spawn_guarded<F>(&self, task: F) -> DropGuard
    where
        F: Future<Output = ()> + 'static,
    {
        let child = self.token.child_token();
        spawn_until_cancelled(child.clone(), task);
        child.drop_guard()
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn spawn_until_cancelled<F>(token: CancellationToken, task: F)
where
    F: Future<Output = ()> + 'static,
{
    tokio::task::spawn_local(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            _ = task => {}
        }
    });
}
