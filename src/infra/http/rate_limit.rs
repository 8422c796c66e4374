//! Fixed-window request guard keyed by client and route class.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use dashmap::DashMap;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::RateLimitSettings;

pub(crate) const METRIC_RATE_LIMIT_DENIED_TOTAL: &str = "storefront_rate_limit_denied_total";

/// Buckets with separate budgets; auth is the strictest, catalog browsing the loosest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Auth,
    Catalog,
    Mutation,
    Cart,
}

impl RouteClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Catalog => "catalog",
            Self::Mutation => "mutation",
            Self::Cart => "cart",
        }
    }

    pub fn classify(method: &Method, path: &str) -> Self {
        if path
            .strip_prefix("/api/v1/auth")
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        {
            Self::Auth
        } else if path.starts_with("/api/v1/cart") {
            Self::Cart
        } else if method != Method::GET && method != Method::HEAD {
            Self::Mutation
        } else {
            Self::Catalog
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Denied { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub window: Duration,
    pub auth: u32,
    pub catalog: u32,
    pub mutation: u32,
    pub cart: u32,
}

impl RateLimits {
    fn limit_for(&self, class: RouteClass) -> u32 {
        match class {
            RouteClass::Auth => self.auth,
            RouteClass::Catalog => self.catalog,
            RouteClass::Mutation => self.mutation,
            RouteClass::Cart => self.cart,
        }
    }
}

impl From<&RateLimitSettings> for RateLimits {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            window: Duration::from_secs(u64::from(settings.window_seconds.get())),
            auth: settings.auth_max_requests.get(),
            catalog: settings.catalog_max_requests.get(),
            mutation: settings.mutation_max_requests.get(),
            cart: settings.cart_max_requests.get(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone)]
pub struct RateGuard {
    limits: RateLimits,
    windows: Arc<DashMap<(String, RouteClass), Window>>,
}

impl RateGuard {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: Arc::new(DashMap::new()),
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    pub fn allow(&self, client_key: &str, class: RouteClass) -> RateDecision {
        let now = Instant::now();
        let window = self.limits.window;
        let limit = self.limits.limit_for(class);

        let decision = {
            let mut entry = self
                .windows
                .entry((client_key.to_string(), class))
                .or_insert(Window {
                    started: now,
                    count: 0,
                });
            if now.duration_since(entry.started) >= window {
                *entry = Window {
                    started: now,
                    count: 0,
                };
            }

            if entry.count >= limit {
                let left = window.saturating_sub(now.duration_since(entry.started));
                RateDecision::Denied {
                    retry_after_secs: ceil_secs(left).max(1),
                }
            } else {
                entry.count += 1;
                RateDecision::Allowed {
                    remaining: limit - entry.count,
                }
            }
        };

        if let RateDecision::Denied { retry_after_secs } = decision {
            counter!(METRIC_RATE_LIMIT_DENIED_TOTAL, "class" => class.as_str()).increment(1);
            debug!(
                client = client_key,
                class = class.as_str(),
                retry_after_secs,
                "Request denied by rate guard"
            );
        }
        decision
    }

    /// Drops counters whose window has elapsed; returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.limits.window;
        let before = self.windows.len();
        self.windows
            .retain(|_, entry| now.duration_since(entry.started) < window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Prunes expired counters once per window until the task is aborted.
    pub fn spawn_pruner(&self) -> JoinHandle<()> {
        let guard = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(guard.limits.window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let pruned = guard.prune_expired();
                if pruned > 0 {
                    debug!(pruned, "Pruned expired rate windows");
                }
            }
        })
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
