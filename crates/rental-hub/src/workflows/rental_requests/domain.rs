use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for rental requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for houses owned by the House Registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HouseId(pub String);

/// Identifier wrapper for marketplace accounts (tenants, landlords, admins).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier issued by the payment gateway for a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

macro_rules! display_id {
    ($($name:ident),*) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

display_id!(RequestId, HouseId, UserId, OrderId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Landlord,
    Tenant,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Landlord => "landlord",
            Role::Tenant => "tenant",
        }
    }
}

/// Authenticated actor as resolved by the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub is_blocked: bool,
    pub is_active: bool,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id.into()),
            email: email.into(),
            role,
            is_blocked: false,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Approved and rejected requests never change status again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }

    /// Statuses that count against the one-active-request-per-house rule.
    pub const fn is_active(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Approved)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
        }
    }
}

/// Decision a landlord may record against a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub const fn status(self) -> RequestStatus {
        match self {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }
}

/// Attempted transition that the current standing does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} a request that is {current}")]
pub struct TransitionError {
    pub current: RequestStatus,
    pub action: &'static str,
}

/// Status pair of a request. Fields stay private so only legal edges can build one:
/// a payment is completed only on an approved request, and decisions are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Standing {
    status: RequestStatus,
    payment_status: PaymentStatus,
}

impl Standing {
    pub const fn pending() -> Self {
        Self {
            status: RequestStatus::Pending,
            payment_status: PaymentStatus::Pending,
        }
    }

    pub const fn status(&self) -> RequestStatus {
        self.status
    }

    pub const fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn decide(self, decision: Decision) -> Result<Self, TransitionError> {
        match decision {
            Decision::Approved => self.approve(),
            Decision::Rejected => self.reject(),
        }
    }

    pub fn approve(self) -> Result<Self, TransitionError> {
        self.require_pending("approve")?;
        Ok(Self {
            status: RequestStatus::Approved,
            payment_status: PaymentStatus::Pending,
        })
    }

    pub fn reject(self) -> Result<Self, TransitionError> {
        self.require_pending("reject")?;
        Ok(Self {
            status: RequestStatus::Rejected,
            payment_status: PaymentStatus::Pending,
        })
    }

    pub fn settle(self) -> Result<Self, TransitionError> {
        if self.status != RequestStatus::Approved {
            return Err(TransitionError {
                current: self.status,
                action: "settle payment for",
            });
        }
        Ok(Self {
            status: self.status,
            payment_status: PaymentStatus::Completed,
        })
    }

    fn require_pending(&self, action: &'static str) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                current: self.status,
                action,
            });
        }
        Ok(())
    }
}

impl Default for Standing {
    fn default() -> Self {
        Self::pending()
    }
}

/// Soft deletion keeps the last standing around for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "standing", rename_all = "snake_case")]
pub enum Lifecycle {
    Active(Standing),
    Deleted(Standing),
}

impl Lifecycle {
    pub const fn standing(&self) -> Standing {
        match self {
            Lifecycle::Active(standing) | Lifecycle::Deleted(standing) => *standing,
        }
    }

    pub const fn active(&self) -> Option<Standing> {
        match self {
            Lifecycle::Active(standing) => Some(*standing),
            Lifecycle::Deleted(_) => None,
        }
    }

    pub const fn is_deleted(&self) -> bool {
        matches!(self, Lifecycle::Deleted(_))
    }
}

/// House details as reported by the House Registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseListing {
    pub id: HouseId,
    pub landlord_id: UserId,
    pub location: String,
    pub bedrooms: u8,
    pub rent_amount: u32,
    pub available: bool,
}

/// Central entity tracked by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalRequest {
    pub id: RequestId,
    pub house_id: HouseId,
    pub tenant_id: UserId,
    /// Owner of the house when the request was created. Display only.
    pub landlord_id: UserId,
    pub message: String,
    pub location: String,
    pub bedrooms: u8,
    pub rent_amount: u32,
    pub landlord_phone: Option<String>,
    pub lifecycle: Lifecycle,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalRequest {
    /// Builds a pending request, snapshotting display fields from the house.
    pub fn pending(
        id: RequestId,
        house: &HouseListing,
        tenant_id: UserId,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            house_id: house.id.clone(),
            tenant_id,
            landlord_id: house.landlord_id.clone(),
            message,
            location: house.location.clone(),
            bedrooms: house.bedrooms,
            rent_amount: house.rent_amount,
            landlord_phone: None,
            lifecycle: Lifecycle::Active(Standing::pending()),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn standing(&self) -> Standing {
        self.lifecycle.standing()
    }

    pub fn status(&self) -> RequestStatus {
        self.standing().status()
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.standing().payment_status()
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    /// True while the request blocks another request for the same house and tenant.
    pub fn holds_slot(&self) -> bool {
        self.lifecycle
            .active()
            .map(|standing| standing.status().is_active())
            .unwrap_or(false)
    }

    /// Copy of the record with a new lifecycle, bumped revision, and fresh `updated_at`.
    pub(crate) fn advanced(&self, lifecycle: Lifecycle, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.lifecycle = lifecycle;
        next.revision = self.revision + 1;
        next.updated_at = now;
        next
    }

    pub fn view(&self) -> RentalRequestView {
        RentalRequestView {
            id: self.id.clone(),
            house_id: self.house_id.clone(),
            tenant_id: self.tenant_id.clone(),
            landlord_id: self.landlord_id.clone(),
            message: self.message.clone(),
            location: self.location.clone(),
            bedrooms: self.bedrooms,
            rent_amount: self.rent_amount,
            landlord_phone: self.landlord_phone.clone(),
            status: self.status(),
            payment_status: self.payment_status(),
            is_deleted: self.is_deleted(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Flat representation used for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalRequestView {
    pub id: RequestId,
    pub house_id: HouseId,
    pub tenant_id: UserId,
    pub landlord_id: UserId,
    pub message: String,
    pub location: String,
    pub bedrooms: u8,
    pub rent_amount: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landlord_phone: Option<String>,
    pub status: RequestStatus,
    pub payment_status: PaymentStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ledger state of a gateway order. `Duplicate` marks funds captured after the request
/// was already settled by another order; they are owed back to the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Initiated,
    Settled,
    Duplicate,
}

impl OrderStatus {
    pub const fn is_open(self) -> bool {
        matches!(self, OrderStatus::Initiated)
    }
}

/// Ledger entry correlating a gateway order with the request it pays for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub order_id: OrderId,
    pub request_id: RequestId,
    pub house_id: HouseId,
    pub tenant_id: UserId,
    pub landlord_id: UserId,
    pub amount: u32,
    pub status: OrderStatus,
    pub checkout_url: String,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_resets_payment_to_pending() {
        let standing = Standing::pending().approve().expect("pending can approve");
        assert_eq!(standing.status(), RequestStatus::Approved);
        assert_eq!(standing.payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn decisions_are_final() {
        let approved = Standing::pending().approve().expect("approve");
        let rejected = Standing::pending().reject().expect("reject");

        for standing in [approved, rejected] {
            for decision in [Decision::Approved, Decision::Rejected] {
                let err = standing.decide(decision).expect_err("terminal");
                assert_eq!(err.current, standing.status());
            }
        }
    }

    #[test]
    fn settlement_requires_approval() {
        assert!(Standing::pending().settle().is_err());
        assert!(Standing::pending()
            .reject()
            .and_then(Standing::settle)
            .is_err());

        let settled = Standing::pending()
            .approve()
            .and_then(Standing::settle)
            .expect("approved requests settle");
        assert_eq!(settled.payment_status(), PaymentStatus::Completed);
        assert_eq!(settled.status(), RequestStatus::Approved);
    }

    #[test]
    fn lifecycle_serializes_with_state_tag() {
        let settled = Standing::pending()
            .approve()
            .and_then(Standing::settle)
            .expect("settles");
        let value = serde_json::to_value(Lifecycle::Deleted(settled)).expect("serializes");
        assert_eq!(value["state"], "deleted");
        assert_eq!(value["standing"]["status"], "approved");
        assert_eq!(value["standing"]["payment_status"], "completed");
    }

    #[test]
    fn deleted_lifecycle_keeps_standing_but_releases_slot() {
        let house = HouseListing {
            id: HouseId("h1".to_string()),
            landlord_id: UserId("l1".to_string()),
            location: "Dhanmondi".to_string(),
            bedrooms: 3,
            rent_amount: 25_000,
            available: true,
        };
        let request = RentalRequest::pending(
            RequestId("req-1".to_string()),
            &house,
            UserId("t1".to_string()),
            "Interested".to_string(),
            Utc::now(),
        );
        assert!(request.holds_slot());

        let deleted = request.advanced(Lifecycle::Deleted(request.standing()), Utc::now());
        assert!(deleted.is_deleted());
        assert!(!deleted.holds_slot());
        assert_eq!(deleted.status(), RequestStatus::Pending);
        assert_eq!(deleted.revision, 1);
        assert!(deleted.view().is_deleted);
    }
}
