//! Organization Directory
//!
//! Abstraction over the platform's organization CRUD service. The
//! settlement engine only needs three lookups from it: who is the
//! payer's agency parent, where does that agency's money land, and
//! what does a billing plan say.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Result, SettlementError};
use crate::plan::{BillingPlan, PlanId};

/// Organization identifier as assigned by the platform's org service
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganizationId(String);

impl OrganizationId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Organization tier within the resale chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgType {
    Platform,
    Agency,
    EndCustomer,
}

/// An organization as the directory sees it
///
/// Invariant: only agencies may appear as a parent, and an end
/// customer's beneficiary chain has at most one agency hop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub org_type: OrgType,

    /// Reselling agency above this organization, if any
    pub parent_org: Option<OrganizationId>,

    /// External account reference transfers land on. Present only
    /// once the agency completes onboarding.
    pub settlement_account_ref: Option<String>,
}

/// Directory lookups consumed by the settlement engine (external
/// collaborator, injected at the composition root)
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    /// Resolve the payer's agency parent, if it has one
    async fn resolve_parent_agency(&self, org: &OrganizationId) -> Result<Option<OrganizationId>>;

    /// Where the organization's transfers land, once onboarded
    async fn settlement_account_ref(&self, org: &OrganizationId) -> Result<Option<String>>;

    /// Look up a billing plan
    async fn plan(&self, plan_id: &PlanId) -> Result<BillingPlan>;
}

/// In-memory directory (for development and tests)
pub struct MemoryDirectory {
    orgs: RwLock<HashMap<OrganizationId, Organization>>,
    plans: RwLock<HashMap<PlanId, BillingPlan>>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            orgs: RwLock::new(HashMap::new()),
            plans: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_org(&self, org: Organization) {
        self.orgs.write().unwrap().insert(org.id.clone(), org);
    }

    pub fn add_plan(&self, plan: BillingPlan) {
        self.plans.write().unwrap().insert(plan.id.clone(), plan);
    }

    /// Set or clear an agency's settlement account (onboarding completion)
    pub fn set_settlement_account(&self, org: &OrganizationId, account_ref: Option<String>) {
        if let Some(o) = self.orgs.write().unwrap().get_mut(org) {
            o.settlement_account_ref = account_ref;
        }
    }
}

#[async_trait]
impl OrganizationDirectory for MemoryDirectory {
    async fn resolve_parent_agency(&self, org: &OrganizationId) -> Result<Option<OrganizationId>> {
        let orgs = self.orgs.read().unwrap();
        let organization = orgs
            .get(org)
            .ok_or_else(|| SettlementError::NotFound(format!("organization {org}")))?;

        // A parent only counts if it actually is an agency
        let parent = organization
            .parent_org
            .as_ref()
            .and_then(|p| orgs.get(p))
            .filter(|p| p.org_type == OrgType::Agency)
            .map(|p| p.id.clone());

        Ok(parent)
    }

    async fn settlement_account_ref(&self, org: &OrganizationId) -> Result<Option<String>> {
        let orgs = self.orgs.read().unwrap();
        let organization = orgs
            .get(org)
            .ok_or_else(|| SettlementError::NotFound(format!("organization {org}")))?;
        Ok(organization.settlement_account_ref.clone())
    }

    async fn plan(&self, plan_id: &PlanId) -> Result<BillingPlan> {
        let plans = self.plans.read().unwrap();
        plans
            .get(plan_id)
            .cloned()
            .ok_or_else(|| SettlementError::NotFound(format!("plan {plan_id}")))
    }
}
