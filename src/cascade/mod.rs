//! Reasoning Cascade
//!
//! Tries providers in strict configured order until one returns a valid
//! result. Providers are never raced: at most one call is in flight and at
//! most one succeeds per `resolve`.
//!
//! ## Budgets
//!
//! ```text
//! effective timeout = min(provider_timeout, deadline - now)
//! start the call only if deadline - now ≥ min_attempt_budget
//! ```
//!
//! When nothing succeeds the result is the baseline passed through with
//! provenance `baseline-only` and the baseline's own confidence.

use crate::config::{ConfigurationError, OrchestratorConfig};
use crate::observability::ObservabilityHook;
use crate::types::{
    AttemptOutcome, AttemptRecord, DegradeReason, Provenance, ReasoningRequest, ReasoningResult,
    SkipReason,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// Provider Contract
// ============================================================================

/// One source of reasoned recommendations.
///
/// Implementations must stop work and release resources (kill the child
/// process, drop the HTTP request) when the returned future is dropped; the
/// cascade enforces `timeout` by dropping it.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Stable identifier used in provenance and attempt records.
    fn name(&self) -> &str;

    /// Cheap local check (binary on PATH, API key present).
    ///
    /// Unavailable providers are skipped without spending budget.
    fn is_available(&self) -> bool {
        true
    }

    /// Produce a recommendation within `timeout`.
    async fn invoke(
        &self,
        request: &ReasoningRequest,
        timeout: Duration,
    ) -> Result<ReasoningResult, ProviderError>;
}

/// Why a single provider attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    fn outcome(&self) -> AttemptOutcome {
        match self {
            ProviderError::Timeout(_) => AttemptOutcome::Timeout,
            ProviderError::Transport(msg) => AttemptOutcome::Transport(msg.clone()),
            ProviderError::InvalidResponse(msg) => AttemptOutcome::InvalidResponse(msg.clone()),
            ProviderError::Unavailable(_) => AttemptOutcome::Skipped(SkipReason::Unavailable),
        }
    }
}

// ============================================================================
// Settings / Resolution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeSettings {
    pub provider_timeout: Duration,
    /// Cap on one `resolve`, applied on top of the caller's deadline.
    pub cascade_deadline: Option<Duration>,
    pub min_attempt_budget: Duration,
}

impl From<&OrchestratorConfig> for CascadeSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            provider_timeout: config.provider_timeout,
            cascade_deadline: config.cascade_deadline,
            min_attempt_budget: config.min_attempt_budget,
        }
    }
}

/// Result of one `resolve`, with the attempt trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub result: ReasoningResult,
    pub attempts: Vec<AttemptRecord>,
}

impl Resolution {
    /// `None` when a provider succeeded.
    ///
    /// Exhaustion caused by running out of time is reported as
    /// `BudgetExhausted`, any other as `CascadeExhausted`.
    pub fn degrade_reason(&self) -> Option<DegradeReason> {
        if !self.result.is_baseline_only() {
            return None;
        }
        let out_of_time = self
            .attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::Skipped(SkipReason::DeadlineExhausted));
        Some(if out_of_time {
            DegradeReason::BudgetExhausted
        } else {
            DegradeReason::CascadeExhausted
        })
    }

    /// Providers actually called, as opposed to skipped.
    pub fn calls(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| !matches!(a.outcome, AttemptOutcome::Skipped(_)))
            .count()
    }
}

// ============================================================================
// Cascade
// ============================================================================

pub struct ReasoningCascade {
    providers: Vec<Arc<dyn ReasoningProvider>>,
    settings: CascadeSettings,
    hook: Arc<dyn ObservabilityHook>,
}

impl ReasoningCascade {
    /// Build a cascade that tries `providers` in the given order.
    pub fn new(
        providers: Vec<Arc<dyn ReasoningProvider>>,
        settings: CascadeSettings,
    ) -> Result<Self, ConfigurationError> {
        if providers.is_empty() {
            return Err(ConfigurationError::NoProviders);
        }
        if settings.provider_timeout.is_zero() {
            return Err(ConfigurationError::NonPositiveDuration("provider_timeout"));
        }
        if settings.cascade_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ConfigurationError::NonPositiveDuration("cascade_deadline"));
        }
        let mut seen = HashSet::new();
        for p in &providers {
            if !seen.insert(p.name().to_string()) {
                return Err(ConfigurationError::DuplicateProvider(p.name().to_string()));
            }
        }
        Ok(Self {
            providers,
            settings,
            hook: Arc::new(()),
        })
    }

    /// Build from a pool of providers, picking and ordering them by name.
    pub fn ordered(
        pool: Vec<Arc<dyn ReasoningProvider>>,
        order: &[String],
        settings: CascadeSettings,
    ) -> Result<Self, ConfigurationError> {
        let mut providers = Vec::with_capacity(order.len());
        for name in order {
            let provider = pool
                .iter()
                .find(|p| p.name() == name)
                .ok_or_else(|| ConfigurationError::UnknownProvider(name.clone()))?;
            providers.push(Arc::clone(provider));
        }
        Self::new(providers, settings)
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ObservabilityHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn settings(&self) -> &CascadeSettings {
        &self.settings
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Resolve with no deadline other than the cascade's own.
    ///
    /// Without a configured cascade deadline each provider gets its full
    /// timeout.
    pub async fn resolve(&self, request: &ReasoningRequest) -> Resolution {
        self.run(request, None).await
    }

    /// Resolve, never starting an attempt that cannot finish by `deadline`.
    pub async fn resolve_by(&self, request: &ReasoningRequest, deadline: Instant) -> Resolution {
        self.run(request, Some(deadline)).await
    }

    async fn run(&self, request: &ReasoningRequest, deadline: Option<Instant>) -> Resolution {
        let cap = self.settings.cascade_deadline.map(|d| Instant::now() + d);
        let deadline = match (deadline, cap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let sequence = request.observation.sequence();
        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let attempt_start = Instant::now();

            if !provider.is_available() {
                debug!(sequence, provider = provider.name(), "Provider unavailable, skipping");
                self.record(
                    &mut attempts,
                    sequence,
                    provider.name(),
                    AttemptOutcome::Skipped(SkipReason::Unavailable),
                    Duration::ZERO,
                );
                continue;
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(attempt_start));
            if let Some(remaining) =
                remaining.filter(|r| r.is_zero() || *r < self.settings.min_attempt_budget)
            {
                debug!(
                    sequence,
                    provider = provider.name(),
                    remaining_ms = remaining.as_millis() as u64,
                    "Not enough budget left, skipping provider"
                );
                self.record(
                    &mut attempts,
                    sequence,
                    provider.name(),
                    AttemptOutcome::Skipped(SkipReason::DeadlineExhausted),
                    Duration::ZERO,
                );
                continue;
            }

            let budget = remaining.map_or(self.settings.provider_timeout, |r| {
                self.settings.provider_timeout.min(r)
            });
            let outcome = match tokio::time::timeout(budget, provider.invoke(request, budget)).await
            {
                Ok(Ok(result)) => check_result(result, provider.name()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProviderError::Timeout(budget)),
            };
            let elapsed = attempt_start.elapsed();

            match outcome {
                Ok(result) => {
                    info!(
                        sequence,
                        provider = provider.name(),
                        action = %result.action,
                        confidence = result.confidence,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Cascade resolved"
                    );
                    self.record(&mut attempts, sequence, provider.name(), AttemptOutcome::Success, elapsed);
                    return Resolution { result, attempts };
                }
                Err(e) => {
                    warn!(sequence, provider = provider.name(), error = %e, "Provider attempt failed, trying next");
                    self.record(&mut attempts, sequence, provider.name(), e.outcome(), elapsed);
                }
            }
        }

        warn!(
            sequence,
            attempts = attempts.len(),
            "All providers failed or skipped, passing baseline through"
        );
        Resolution {
            result: ReasoningResult::baseline_only(&request.baseline),
            attempts,
        }
    }

    fn record(
        &self,
        attempts: &mut Vec<AttemptRecord>,
        sequence: u64,
        provider: &str,
        outcome: AttemptOutcome,
        elapsed: Duration,
    ) {
        let record = AttemptRecord {
            sequence,
            provider: provider.to_string(),
            outcome,
            elapsed,
        };
        self.hook.on_attempt(&record);
        attempts.push(record);
    }
}

/// Reject structurally valid but unusable output and stamp provenance.
fn check_result(
    mut result: ReasoningResult,
    provider: &str,
) -> Result<ReasoningResult, ProviderError> {
    if result.action.trim().is_empty() {
        return Err(ProviderError::InvalidResponse("empty action".to_string()));
    }
    if !result.confidence.is_finite() || !(0.0..=1.0).contains(&result.confidence) {
        return Err(ProviderError::InvalidResponse(format!(
            "confidence {} outside [0, 1]",
            result.confidence
        )));
    }
    if !result.amount.is_finite() || result.amount < 0.0 {
        return Err(ProviderError::InvalidResponse(format!(
            "amount {} is not a non-negative number",
            result.amount
        )));
    }
    result.provenance = Provenance::Provider(provider.to_string());
    Ok(result)
}
