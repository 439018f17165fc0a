//! # settlement-core
//!
//! Domain types and pure calculation logic for the payment settlement
//! and revenue-split engine.
//!
//! ## Money flow
//!
//! ```text
//! ┌──────────┐  charge   ┌──────────────┐  webhook  ┌──────────────┐
//! │ Customer │──────────▶│   Gateway    │──────────▶│ Reconciler   │
//! └──────────┘           └──────────────┘           └──────┬───────┘
//!                                                          │
//!                          platform_fee (operator balance) │
//!                        ┌─────────────────────────────────┤
//!                        ▼                                 ▼
//!                ┌──────────────┐  transfer  ┌─────────────────────┐
//!                │   Platform   │───────────▶│ Agency sub-account  │
//!                └──────────────┘            │  (agency_revenue)   │
//!                                            └─────────────────────┘
//! ```
//!
//! The critical correctness rule lives in [`split::compute_split`]:
//! the platform share is rounded half-up to the currency minor unit
//! and the agency share is the exact remainder, so the two always sum
//! to the gross amount.

pub mod directory;
pub mod error;
pub mod money;
pub mod payment;
pub mod plan;
pub mod split;

pub use directory::{MemoryDirectory, Organization, OrganizationDirectory, OrganizationId, OrgType};
pub use error::{Result, SettlementError};
pub use money::Money;
pub use payment::{
    Beneficiary, Commission, CommissionStatus, OperatorAlert, Payment, PaymentSplit,
    PaymentStatus, SplitType, Subscription, SubscriptionStatus, TransferStatus,
};
pub use plan::{BillingPlan, PlanId};
pub use split::{compute_split, SplitAmounts};
