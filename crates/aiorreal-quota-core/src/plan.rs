//! Plan catalog: resolves product and plan identifiers into quota plans.
//!
//! The catalog is a process-wide immutable table loaded once at startup.
//! Providers report non-canonical product identifiers (store prefixes,
//! regional suffixes), so resolution falls back to substring matching.

use serde::{Deserialize, Serialize};

/// The canonical identifier of the free plan.
pub const FREE_PLAN_ID: &str = "free";

/// Free plan monthly quota.
pub const FREE_PLAN_QUOTA: u32 = 2;

/// Premium monthly plan quota.
pub const PREMIUM_MONTHLY_QUOTA: u32 = 100;

/// Premium yearly plan quota.
pub const PREMIUM_YEARLY_QUOTA: u32 = 1000;

/// Billing period granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    /// Resets on the first day of each UTC month.
    Monthly,
    /// Resets one UTC year after the period start.
    Yearly,
}

impl BillingCycle {
    /// Get the cycle name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

/// A catalog entry defining quota amount and cycle for a product class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Canonical plan identifier (e.g. `premium_monthly`).
    pub plan_id: String,

    /// Product-family key shared across cycles (e.g. `premium`).
    pub plan_key: String,

    /// Billing cycle for the plan.
    pub cycle: BillingCycle,

    /// Quota granted per billing period.
    pub quota: u32,

    /// Provider product identifiers that map to this plan.
    #[serde(default)]
    pub product_ids: Vec<String>,
}

impl PlanConfig {
    /// Whether this is the free plan.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.plan_id == FREE_PLAN_ID
    }
}

/// Catalog override file shape: either a bare array of plans or an object
/// with a `plans` array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogOverride {
    Plans(Vec<PlanConfig>),
    Wrapped { plans: Vec<PlanConfig> },
}

/// The immutable plan catalog.
///
/// Constructed once at startup and shared by reference; never mutated.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<PlanConfig>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            plans: vec![
                PlanConfig {
                    plan_id: FREE_PLAN_ID.to_owned(),
                    plan_key: "free".to_owned(),
                    cycle: BillingCycle::Monthly,
                    quota: FREE_PLAN_QUOTA,
                    product_ids: Vec::new(),
                },
                PlanConfig {
                    plan_id: "premium_monthly".to_owned(),
                    plan_key: "premium".to_owned(),
                    cycle: BillingCycle::Monthly,
                    quota: PREMIUM_MONTHLY_QUOTA,
                    product_ids: vec!["aiorreal-monthly".to_owned()],
                },
                PlanConfig {
                    plan_id: "premium_yearly".to_owned(),
                    plan_key: "premium".to_owned(),
                    cycle: BillingCycle::Yearly,
                    quota: PREMIUM_YEARLY_QUOTA,
                    product_ids: vec!["aiorreal-yearly".to_owned(), "aiorreal-annual".to_owned()],
                },
            ],
        }
    }
}

impl PlanCatalog {
    /// Build a catalog from an optional configuration string.
    ///
    /// The string is either a JSON array of plan entries or an object with a
    /// `plans` array. A malformed override logs a warning and falls back to
    /// the embedded defaults; startup never fails on catalog parsing.
    #[must_use]
    pub fn from_config(config: Option<&str>) -> Self {
        let Some(raw) = config else {
            return Self::default();
        };

        match serde_json::from_str::<CatalogOverride>(raw) {
            Ok(CatalogOverride::Plans(plans) | CatalogOverride::Wrapped { plans })
                if !plans.is_empty() =>
            {
                tracing::info!(plan_count = plans.len(), "Loaded plan catalog override");
                Self { plans }
            }
            Ok(_) => {
                tracing::warn!("Plan catalog override is empty, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed plan catalog override, using defaults");
                Self::default()
            }
        }
    }

    /// All plans in the catalog.
    #[must_use]
    pub fn plans(&self) -> &[PlanConfig] {
        &self.plans
    }

    /// Exact plan lookup by id, case-insensitive.
    #[must_use]
    pub fn get(&self, plan_id: &str) -> Option<&PlanConfig> {
        self.plans
            .iter()
            .find(|p| p.plan_id.eq_ignore_ascii_case(plan_id))
    }

    /// Resolve an opaque candidate (product id, plan id, or store-prefixed
    /// variant) into a plan.
    ///
    /// Matching rules, tried in order:
    ///
    /// 1. The candidate contains `aiorreal-monthly` / `aiorreal-yearly` /
    ///    `aiorreal-annual` as a substring, mapping to the premium plan of
    ///    that cycle.
    /// 2. Exact `plan_id` match.
    /// 3. Any registered product id is a substring of the candidate.
    ///
    /// Returns `None` when no rule matches.
    #[must_use]
    pub fn resolve(&self, candidate: &str) -> Option<&PlanConfig> {
        let needle = candidate.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        if needle.contains("aiorreal-monthly") {
            if let Some(plan) = self.premium_for_cycle(BillingCycle::Monthly) {
                return Some(plan);
            }
        }
        if needle.contains("aiorreal-yearly") || needle.contains("aiorreal-annual") {
            if let Some(plan) = self.premium_for_cycle(BillingCycle::Yearly) {
                return Some(plan);
            }
        }

        if let Some(plan) = self.get(&needle) {
            return Some(plan);
        }

        self.plans.iter().find(|p| {
            p.product_ids
                .iter()
                .any(|pid| needle.contains(&pid.to_lowercase()))
        })
    }

    /// The non-free plan for a given cycle, if the catalog carries one.
    fn premium_for_cycle(&self, cycle: BillingCycle) -> Option<&PlanConfig> {
        self.plans
            .iter()
            .find(|p| !p.is_free() && p.cycle == cycle)
    }
}
