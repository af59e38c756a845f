use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::gateway::MessageRef;

#[derive(Debug, Clone, Copy)]
struct Route {
    sender_id: u64,
    inserted_at: Instant,
}

#[derive(Default)]
struct Inner {
    routes: HashMap<MessageRef, Route>,
    /// Insertion order; may hold stale keys that were overwritten later.
    order: VecDeque<(MessageRef, Instant)>,
}

impl Inner {
    fn pop_oldest(&mut self) {
        while let Some((key, inserted_at)) = self.order.pop_front() {
            if self
                .routes
                .get(&key)
                .is_some_and(|r| r.inserted_at == inserted_at)
            {
                self.routes.remove(&key);
                return;
            }
        }
    }
}

/// Maps messages in an admin's chat (forwarded copies and routing cards) to
/// the user they came from. Entries expire after `ttl` and the oldest entry
/// is dropped once `capacity` is reached. Lost on restart; the card text is
/// the fallback.
pub struct RouteCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    capacity: usize,
}

impl RouteCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub async fn insert(&self, message: MessageRef, sender_id: u64) {
        self.insert_at(message, sender_id, Instant::now()).await;
    }

    pub async fn lookup(&self, message: MessageRef) -> Option<u64> {
        self.lookup_at(message, Instant::now()).await
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now()).await
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.routes.len()
    }

    async fn insert_at(&self, message: MessageRef, sender_id: u64, now: Instant) {
        let mut inner = self.inner.lock().await;
        if !inner.routes.contains_key(&message) {
            while inner.routes.len() >= self.capacity {
                inner.pop_oldest();
            }
        }
        inner.routes.insert(
            message,
            Route {
                sender_id,
                inserted_at: now,
            },
        );
        inner.order.push_back((message, now));
    }

    async fn lookup_at(&self, message: MessageRef, now: Instant) -> Option<u64> {
        let mut inner = self.inner.lock().await;
        let route = *inner.routes.get(&message)?;
        if now.saturating_duration_since(route.inserted_at) > self.ttl {
            inner.routes.remove(&message);
            return None;
        }
        Some(route.sender_id)
    }

    async fn evict_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.routes.len();
        let ttl = self.ttl;
        inner
            .routes
            .retain(|_, r| now.saturating_duration_since(r.inserted_at) <= ttl);
        let Inner { routes, order } = &mut *inner;
        order.retain(|(key, inserted_at)| {
            routes
                .get(key)
                .is_some_and(|r| r.inserted_at == *inserted_at)
        });
        let removed = before - inner.routes.len();
        if removed > 0 {
            debug!("Evicted {} expired route(s)", removed);
        }
        removed
    }
}
