//! Session statistics: token, query and cost counters with a per-user breakdown.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Local};
use tokio::sync::Mutex;

use crate::{
    domain::UserId,
    model::TokenUsage,
    pricing::PricingTable,
    Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UserStats {
    pub tokens: u64,
    pub cost: f64,
    pub queries: u64,
}

/// Raw counters of a session.
///
/// Each `record_*` call is a single step; one completed request is the
/// composition `record_tokens + record_query + record_cost + record_user`,
/// which `SessionStats` applies under one lock.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatsCounters {
    pub total_tokens: u64,
    pub total_queries: u64,
    pub total_cost: f64,
    /// Largest single recorded cost. Never decreases.
    pub max_cost: f64,
    pub per_user: BTreeMap<UserId, UserStats>,
}

impl StatsCounters {
    pub fn record_tokens(&mut self, count: u64) {
        self.total_tokens += count;
    }

    pub fn record_query(&mut self) {
        self.total_queries += 1;
    }

    pub fn record_cost(&mut self, cost: f64) {
        self.total_cost += cost;
        self.max_cost = self.max_cost.max(cost);
    }

    pub fn record_user(&mut self, identity: &UserId, tokens: u64, cost: f64) {
        let entry = self.user_entry(identity);
        entry.tokens += tokens;
        entry.cost += cost;
        entry.queries += 1;
    }

    /// Get-or-insert the identity's entry with zero defaults.
    pub fn user_entry(&mut self, identity: &UserId) -> &mut UserStats {
        self.per_user.entry(identity.clone()).or_default()
    }

    /// Read-only lookup; never inserts.
    pub fn user(&self, identity: &UserId) -> Option<&UserStats> {
        self.per_user.get(identity)
    }
}

/// Point-in-time copy of the session stats, used for reports.
#[derive(Clone, Debug)]
pub struct StatsSnapshot {
    pub session_id: String,
    pub model: String,
    pub started_at: DateTime<Local>,
    pub counters: StatsCounters,
}

/// Statistics for one bot session.
///
/// Created at session start; every completed model call is recorded through
/// [`SessionStats::record_completion`]. Nothing is persisted.
#[derive(Debug)]
pub struct SessionStats {
    session_id: String,
    model: String,
    started_at: DateTime<Local>,
    pricing: Arc<PricingTable>,
    counters: Mutex<StatsCounters>,
}

impl SessionStats {
    pub fn new(
        session_id: impl Into<String>,
        model: impl Into<String>,
        pricing: Arc<PricingTable>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            model: model.into(),
            started_at: Local::now(),
            pricing,
            counters: Mutex::new(StatsCounters::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Cost in USD of a call to `model`. Pure; fails for unpriced models.
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Result<f64> {
        let price = self.pricing.price_for(model)?;
        Ok(price.cost(input_tokens, output_tokens))
    }

    /// Record one completed request for `identity`. Returns the request cost.
    pub async fn record_completion(
        &self,
        identity: &UserId,
        model: &str,
        usage: TokenUsage,
    ) -> Result<f64> {
        let cost = self.compute_cost(model, usage.input_tokens, usage.output_tokens)?;
        let tokens = usage.total();

        self.update(|c| {
            c.record_tokens(tokens);
            c.record_query();
            c.record_cost(cost);
            c.record_user(identity, tokens, cost);
        })
        .await;

        Ok(cost)
    }

    /// Apply a caller-composed sequence of updates atomically.
    pub async fn update<R>(&self, f: impl FnOnce(&mut StatsCounters) -> R) -> R {
        let mut c = self.counters.lock().await;
        f(&mut c)
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let counters = self.counters.lock().await.clone();
        StatsSnapshot {
            session_id: self.session_id.clone(),
            model: self.model.clone(),
            started_at: self.started_at,
            counters,
        }
    }
}
