//! Event dispatcher
//!
//! Resolves an event to its handler through a [`ScopedRegistry`] and runs the
//! handler on a bounded set of worker tasks. When every worker slot is busy,
//! `dispatch` waits for one to free up instead of queueing without limit.

use super::EventKind;
use crate::logging::log_event_dropped;
use crate::registry::{Scope, ScopedRegistry};
use crate::{BotResult, EVENT_TARGET};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Handles one kind of event
#[async_trait]
pub trait EventHandler<P: Send + 'static>: Send + Sync {
    async fn handle(&self, payload: P);
}

/// What happened to a dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler was started
    Spawned,
    /// No handler is registered for the kind and scope
    Dropped,
    ShuttingDown,
}

/// Routes events to handlers on a bounded worker pool
pub struct Dispatcher<P: Send + 'static> {
    handlers: ScopedRegistry<Arc<dyn EventHandler<P>>>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl<P: Send + 'static> Dispatcher<P> {
    /// Create a dispatcher running at most `max_in_flight` handlers at once
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            handlers: ScopedRegistry::new(),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register the handler for `kind` in `scope`
    ///
    /// # Errors
    ///
    /// Returns `BotError::Conflict` if `kind` already has a handler in `scope`.
    pub fn register(
        &self,
        kind: EventKind,
        scope: Scope,
        handler: Arc<dyn EventHandler<P>>,
    ) -> BotResult<()> {
        self.handlers.register(kind.as_str(), scope, handler)
    }

    /// Remove the handler for `kind` in exactly `scope`
    ///
    /// # Errors
    ///
    /// Returns `BotError::NotFound` if there is none.
    pub fn remove(&self, kind: EventKind, scope: Scope) -> BotResult<()> {
        self.handlers.remove(kind.as_str(), scope).map(drop)
    }

    /// Run the handler for `kind` in `scope` on `payload`
    pub async fn dispatch(&self, kind: EventKind, scope: Scope, payload: P) -> DispatchOutcome {
        if self.shutdown.is_cancelled() {
            return DispatchOutcome::ShuttingDown;
        }
        let Ok(handler) = self.handlers.resolve(kind.as_str(), scope) else {
            log_event_dropped(kind, scope);
            return DispatchOutcome::Dropped;
        };

        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return DispatchOutcome::ShuttingDown,
            },
            () = self.shutdown.cancelled() => return DispatchOutcome::ShuttingDown,
        };

        self.tasks.spawn(async move {
            handler.handle(payload).await;
            drop(permit);
        });
        DispatchOutcome::Spawned
    }

    /// Number of handlers currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting events and wait up to `grace` for running handlers
    ///
    /// Returns whether every handler finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.tasks.close();
        info!(target: EVENT_TARGET, in_flight = self.tasks.len(), "Draining event handlers");

        let drained = tokio::time::timeout(grace, self.tasks.wait()).await.is_ok();
        if !drained {
            warn!(
                target: EVENT_TARGET,
                in_flight = self.tasks.len(),
                "Event handlers still running after the grace period"
            );
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::GuildId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct Recorder {
        name: &'static str,
        sender: mpsc::UnboundedSender<(&'static str, u32)>,
    }

    #[async_trait]
    impl EventHandler<u32> for Recorder {
        async fn handle(&self, payload: u32) {
            let _ = self.sender.send((self.name, payload));
        }
    }

    struct Sleeper {
        duration: Duration,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler<u32> for Sleeper {
        async fn handle(&self, _payload: u32) {
            tokio::time::sleep(self.duration).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn guild() -> GuildId {
        GuildId::new(1_111_111_111_111_111_111)
    }

    fn sleeper(secs: u64) -> (Arc<Sleeper>, Arc<AtomicUsize>) {
        let finished = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Sleeper {
            duration: Duration::from_secs(secs),
            finished: Arc::clone(&finished),
        });
        (handler, finished)
    }

    #[tokio::test]
    async fn test_guild_handler_shadows_global() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let dispatcher: Dispatcher<u32> = Dispatcher::new(4);
        dispatcher
            .register(
                EventKind::ReactionAdd,
                Scope::Global,
                Arc::new(Recorder { name: "global", sender: sender.clone() }),
            )
            .unwrap();
        dispatcher
            .register(
                EventKind::ReactionAdd,
                Scope::Guild(guild()),
                Arc::new(Recorder { name: "guild", sender }),
            )
            .unwrap();

        let outcome = dispatcher
            .dispatch(EventKind::ReactionAdd, Scope::Guild(guild()), 1)
            .await;
        assert_eq!(outcome, DispatchOutcome::Spawned);
        assert_eq!(receiver.recv().await, Some(("guild", 1)));

        dispatcher
            .dispatch(EventKind::ReactionAdd, Scope::Guild(GuildId::new(5)), 2)
            .await;
        assert_eq!(receiver.recv().await, Some(("global", 2)));
    }

    #[tokio::test]
    async fn test_unregistered_event_is_dropped() {
        let (sender, _receiver) = mpsc::unbounded_channel();
        let dispatcher: Dispatcher<u32> = Dispatcher::new(4);
        dispatcher
            .register(
                EventKind::ReactionAdd,
                Scope::Guild(guild()),
                Arc::new(Recorder { name: "guild", sender }),
            )
            .unwrap();

        let outcome = dispatcher
            .dispatch(EventKind::ReactionAdd, Scope::Guild(GuildId::new(5)), 1)
            .await;
        assert_eq!(outcome, DispatchOutcome::Dropped);

        let outcome = dispatcher
            .dispatch(EventKind::SlashCommand, Scope::Guild(guild()), 1)
            .await;
        assert_eq!(outcome, DispatchOutcome::Dropped);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_remove_handler() {
        let (sender, _receiver) = mpsc::unbounded_channel();
        let dispatcher: Dispatcher<u32> = Dispatcher::new(1);
        dispatcher
            .register(
                EventKind::GuildCreate,
                Scope::Global,
                Arc::new(Recorder { name: "global", sender }),
            )
            .unwrap();

        dispatcher.remove(EventKind::GuildCreate, Scope::Global).unwrap();
        assert!(dispatcher.remove(EventKind::GuildCreate, Scope::Global).is_err());
        assert_eq!(
            dispatcher
                .dispatch(EventKind::GuildCreate, Scope::Global, 1)
                .await,
            DispatchOutcome::Dropped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pool_applies_backpressure() {
        let (handler, finished) = sleeper(10);
        let dispatcher: Dispatcher<u32> = Dispatcher::new(1);
        dispatcher
            .register(EventKind::ReactionAdd, Scope::Global, handler)
            .unwrap();

        assert_eq!(
            dispatcher.dispatch(EventKind::ReactionAdd, Scope::Global, 1).await,
            DispatchOutcome::Spawned
        );

        let blocked = tokio::time::timeout(
            Duration::from_secs(1),
            dispatcher.dispatch(EventKind::ReactionAdd, Scope::Global, 2),
        )
        .await;
        assert!(blocked.is_err());

        assert_eq!(
            dispatcher.dispatch(EventKind::ReactionAdd, Scope::Global, 3).await,
            DispatchOutcome::Spawned
        );
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_and_refuses() {
        let (handler, finished) = sleeper(5);
        let dispatcher: Dispatcher<u32> = Dispatcher::new(4);
        dispatcher
            .register(EventKind::ReactionAdd, Scope::Global, handler)
            .unwrap();

        dispatcher.dispatch(EventKind::ReactionAdd, Scope::Global, 1).await;
        dispatcher.dispatch(EventKind::ReactionAdd, Scope::Global, 2).await;

        assert!(dispatcher.shutdown(Duration::from_secs(10)).await);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert!(dispatcher.is_shutting_down());
        assert_eq!(
            dispatcher.dispatch(EventKind::ReactionAdd, Scope::Global, 3).await,
            DispatchOutcome::ShuttingDown
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_grace_expires() {
        let (handler, finished) = sleeper(60);
        let dispatcher: Dispatcher<u32> = Dispatcher::new(4);
        dispatcher
            .register(EventKind::ReactionAdd, Scope::Global, handler)
            .unwrap();

        dispatcher.dispatch(EventKind::ReactionAdd, Scope::Global, 1).await;

        assert!(!dispatcher.shutdown(Duration::from_secs(1)).await);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
