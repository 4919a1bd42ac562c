use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::access::{authorize, AccessDenied, Operation};
use super::collaborators::{GatewayError, HouseRegistry, PaymentGateway, RegistryError};
use super::domain::{
    Decision, HouseId, Lifecycle, OrderId, OrderStatus, PaymentOrder, PaymentStatus, Principal,
    RentalRequest, RequestId, RequestStatus, Role, TransitionError, UserId,
};
use super::repository::{
    OrderFilter, PageRequest, PaymentLedger, RepositoryError, RequestFilter, RequestPage,
    RequestRepository,
};
use crate::config::PaginationConfig;

/// Lifecycle engine: validates, authorizes, and applies every rental request transition.
pub struct RentalRequestService<R, H, G> {
    repository: Arc<R>,
    houses: Arc<H>,
    gateway: Arc<G>,
    pagination: PaginationConfig,
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

/// Admin listing query: optional status filter plus a page window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub status: Option<RequestStatus>,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Settled,
    AlreadySettled,
    Unpaid,
    /// Funds were captured on an order after another order had already settled the request.
    DuplicateCapture,
}

/// Result of a gateway verification callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub request: RentalRequest,
    pub outcome: ConfirmationOutcome,
}

impl<R, H, G> RentalRequestService<R, H, G>
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(
        repository: Arc<R>,
        houses: Arc<H>,
        gateway: Arc<G>,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            repository,
            houses,
            gateway,
            pagination,
        }
    }

    pub fn pagination(&self) -> PaginationConfig {
        self.pagination
    }

    /// Submit a new request for an available house on behalf of a tenant.
    pub fn create(
        &self,
        tenant: &Principal,
        house_id: HouseId,
        message: &str,
    ) -> Result<RentalRequest, RentalRequestError> {
        gate(tenant, Operation::CreateRequest)?;

        if house_id.0.trim().is_empty() {
            return Err(RentalRequestError::BadRequest(
                "house id is required".to_string(),
            ));
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(RentalRequestError::BadRequest(
                "request message is required".to_string(),
            ));
        }

        let house = self.houses.listing(&house_id).map_err(|err| match err {
            RegistryError::NotFound => RentalRequestError::NotFound("house"),
            other => registry_failure(other),
        })?;
        if !house.available {
            return Err(RentalRequestError::Conflict(
                "house is not available for rent".to_string(),
            ));
        }

        if self
            .repository
            .find_active(&house.id, &tenant.id)
            .map_err(storage_failure)?
            .is_some()
        {
            return Err(duplicate_request());
        }

        let record = RentalRequest::pending(
            next_request_id(),
            &house,
            tenant.id.clone(),
            message.to_string(),
            Utc::now(),
        );
        let stored = self.repository.insert(record).map_err(|err| match err {
            RepositoryError::Conflict => duplicate_request(),
            other => storage_failure(other),
        })?;

        info!(
            request_id = %stored.id,
            house_id = %stored.house_id,
            tenant_id = %stored.tenant_id,
            "rental request created"
        );
        Ok(stored)
    }

    /// Approve or reject a pending request for a house the landlord owns.
    pub fn set_status(
        &self,
        landlord: &Principal,
        request_id: &RequestId,
        decision: Decision,
        landlord_phone: Option<String>,
    ) -> Result<RentalRequest, RentalRequestError> {
        gate(landlord, Operation::SetStatus)?;

        let landlord_phone = match landlord_phone {
            Some(phone) if phone.trim().is_empty() => {
                return Err(RentalRequestError::BadRequest(
                    "landlord phone must not be blank".to_string(),
                ))
            }
            other => other.map(|phone| phone.trim().to_string()),
        };

        let record = self.load_live(request_id)?;
        // Decided requests are final for every caller, so the transition is checked first.
        let standing = record.standing().decide(decision)?;
        if !self.owns_house(&landlord.id, &record.house_id)? {
            warn!(request_id = %record.id, landlord_id = %landlord.id, "status change refused");
            return Err(RentalRequestError::Forbidden(
                "you do not own the house for this request".to_string(),
            ));
        }

        let mut next = record.advanced(Lifecycle::Active(standing), Utc::now());
        if landlord_phone.is_some() {
            next.landlord_phone = landlord_phone;
        }
        match self.repository.update(next.clone()) {
            Ok(()) => {}
            Err(RepositoryError::Stale) => {
                // A concurrent decision may have landed first.
                self.load_live(request_id)?.standing().decide(decision)?;
                return Err(storage_failure(RepositoryError::Stale));
            }
            Err(other) => return Err(storage_failure(other)),
        }

        info!(
            request_id = %next.id,
            landlord_id = %landlord.id,
            status = next.status().label(),
            "rental request decided"
        );
        Ok(next)
    }

    /// Open a checkout for an approved, unpaid request. Payment status is left untouched
    /// until the gateway confirms funds.
    pub fn initiate_payment(
        &self,
        tenant: &Principal,
        request_id: &RequestId,
    ) -> Result<PaymentOrder, RentalRequestError> {
        gate(tenant, Operation::InitiatePayment)?;

        let record = self.load_live(request_id)?;
        if record.tenant_id != tenant.id {
            return Err(RentalRequestError::Forbidden(
                "you may only pay for your own requests".to_string(),
            ));
        }
        if record.status() != RequestStatus::Approved {
            return Err(RentalRequestError::InvalidTransition(
                "payment is only available for approved requests".to_string(),
            ));
        }
        if record.payment_status() == PaymentStatus::Completed {
            return Err(RentalRequestError::InvalidTransition(
                "payment for this request is already completed".to_string(),
            ));
        }

        if let Some(open) = self.open_order(&record.id)? {
            info!(request_id = %record.id, order_id = %open.order_id, "reusing open checkout");
            return Ok(open);
        }

        let checkout = self
            .gateway
            .initiate_checkout(&record)
            .map_err(gateway_failure)?;

        let order = PaymentOrder {
            order_id: checkout.order_id,
            request_id: record.id.clone(),
            house_id: record.house_id.clone(),
            tenant_id: record.tenant_id.clone(),
            landlord_id: record.landlord_id.clone(),
            amount: record.rent_amount,
            status: OrderStatus::Initiated,
            checkout_url: checkout.checkout_url,
            created_at: Utc::now(),
            settled_at: None,
        };
        let order = match self.repository.insert_order(order) {
            Ok(order) => order,
            Err(RepositoryError::Conflict) => {
                // Another initiation opened an order between the lookup and the insert.
                return self
                    .open_order(&record.id)?
                    .ok_or_else(|| storage_failure(RepositoryError::Conflict));
            }
            Err(other) => return Err(storage_failure(other)),
        };

        info!(
            request_id = %order.request_id,
            order_id = %order.order_id,
            amount = order.amount,
            "checkout initiated"
        );
        Ok(order)
    }

    /// Reconcile a gateway verification callback. Safe to call repeatedly for the same order:
    /// only an order that is still open is verified with the gateway.
    pub fn confirm_payment(
        &self,
        order_id: &OrderId,
    ) -> Result<PaymentConfirmation, RentalRequestError> {
        if order_id.0.trim().is_empty() {
            return Err(RentalRequestError::BadRequest(
                "order id is required".to_string(),
            ));
        }

        let order = self.load_order(order_id)?;
        let record = self.load_live(&order.request_id)?;
        if let Some(outcome) = closed_outcome(order.status) {
            return Ok(PaymentConfirmation {
                request: record,
                outcome,
            });
        }

        let paid = self
            .gateway
            .verify_status(order_id)
            .map_err(gateway_failure)?;
        if !paid {
            info!(order_id = %order_id, "gateway reports order unpaid");
            return Ok(PaymentConfirmation {
                request: record,
                outcome: ConfirmationOutcome::Unpaid,
            });
        }

        if record.payment_status() == PaymentStatus::Completed {
            return self.record_duplicate_capture(record, order_id);
        }

        let standing = record.standing().settle()?;
        let now = Utc::now();
        let next = record.advanced(Lifecycle::Active(standing), now);

        match self.repository.settle(next.clone(), order_id, now) {
            Ok(()) => {
                info!(request_id = %next.id, order_id = %order_id, "payment settled");
                Ok(PaymentConfirmation {
                    request: next,
                    outcome: ConfirmationOutcome::Settled,
                })
            }
            Err(RepositoryError::Stale) => {
                // Either this order was settled by a concurrent delivery or another order won.
                let current = self.load_live(&order.request_id)?;
                if let Some(outcome) = closed_outcome(self.load_order(order_id)?.status) {
                    return Ok(PaymentConfirmation {
                        request: current,
                        outcome,
                    });
                }
                if current.payment_status() == PaymentStatus::Completed {
                    return self.record_duplicate_capture(current, order_id);
                }
                Err(storage_failure(RepositoryError::Stale))
            }
            Err(other) => Err(storage_failure(other)),
        }
    }

    /// Fetch a live request if the principal's role and relationship allow it.
    pub fn get_visible(
        &self,
        principal: &Principal,
        request_id: &RequestId,
    ) -> Result<RentalRequest, RentalRequestError> {
        gate(principal, Operation::ViewRequest)?;

        let record = self.load_live(request_id)?;
        let visible = match principal.role {
            Role::Admin => true,
            Role::Tenant => record.tenant_id == principal.id,
            Role::Landlord => self.owns_house(&principal.id, &record.house_id)?,
        };

        if visible {
            Ok(record)
        } else {
            warn!(request_id = %record.id, principal_id = %principal.id, "view refused");
            Err(RentalRequestError::Forbidden(
                "you do not have permission to view this request".to_string(),
            ))
        }
    }

    pub fn list_for_tenant(
        &self,
        tenant: &Principal,
    ) -> Result<Vec<RentalRequest>, RentalRequestError> {
        gate(tenant, Operation::ListTenantRequests)?;
        self.repository
            .list(&RequestFilter::for_tenant(tenant.id.clone()))
            .map_err(storage_failure)
    }

    /// Requests for houses currently owned by the landlord. Landlords list their own houses;
    /// admins name the landlord explicitly.
    pub fn list_for_landlord(
        &self,
        principal: &Principal,
        landlord_id: Option<&UserId>,
    ) -> Result<Vec<RentalRequest>, RentalRequestError> {
        gate(principal, Operation::ListLandlordRequests)?;

        let target = match (principal.role, landlord_id) {
            (Role::Landlord, Some(requested)) if requested != &principal.id => {
                return Err(RentalRequestError::Forbidden(
                    "landlords may only list their own requests".to_string(),
                ))
            }
            (Role::Landlord, _) => principal.id.clone(),
            (_, Some(requested)) => requested.clone(),
            (_, None) => {
                return Err(RentalRequestError::BadRequest(
                    "landlord id is required".to_string(),
                ))
            }
        };

        let house_ids = self
            .houses
            .owned_by(&target)
            .map_err(registry_failure)?;
        if house_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.repository
            .list(&RequestFilter::for_houses(house_ids))
            .map_err(storage_failure)
    }

    pub fn list_all(
        &self,
        admin: &Principal,
        query: ListQuery,
    ) -> Result<RequestPage, RentalRequestError> {
        gate(admin, Operation::ListAllRequests)?;

        let ListQuery { status, page } = query;
        if page.page == 0 {
            return Err(RentalRequestError::BadRequest(
                "page starts at 1".to_string(),
            ));
        }
        if page.limit == 0 || page.limit > self.pagination.max_limit {
            return Err(RentalRequestError::BadRequest(format!(
                "limit must be between 1 and {}",
                self.pagination.max_limit
            )));
        }

        let filter = RequestFilter {
            status,
            ..RequestFilter::default()
        };
        self.repository
            .page(&filter, &page)
            .map_err(storage_failure)
    }

    /// Soft delete. Admins may delete any live request; tenants only their own pending ones.
    pub fn delete(
        &self,
        principal: &Principal,
        request_id: &RequestId,
    ) -> Result<RentalRequest, RentalRequestError> {
        gate(principal, Operation::DeleteRequest)?;

        let record = self.load_live(request_id)?;
        match principal.role {
            Role::Admin => {}
            Role::Tenant if record.tenant_id == principal.id => {
                if record.status() != RequestStatus::Pending {
                    return Err(RentalRequestError::InvalidTransition(format!(
                        "cannot delete a request that is {}",
                        record.status()
                    )));
                }
            }
            _ => {
                return Err(RentalRequestError::Forbidden(
                    "you do not have permission to delete this request".to_string(),
                ))
            }
        }

        let next = record.advanced(Lifecycle::Deleted(record.standing()), Utc::now());
        self.repository
            .update(next.clone())
            .map_err(storage_failure)?;

        info!(request_id = %next.id, principal_id = %principal.id, "rental request deleted");
        Ok(next)
    }

    /// Payment orders scoped by role: tenants see their own, landlords those for houses they
    /// own, admins everything.
    pub fn list_payments(
        &self,
        principal: &Principal,
    ) -> Result<Vec<PaymentOrder>, RentalRequestError> {
        gate(principal, Operation::ListPayments)?;

        let filter = match principal.role {
            Role::Admin => OrderFilter::default(),
            Role::Tenant => OrderFilter {
                tenant_id: Some(principal.id.clone()),
                ..OrderFilter::default()
            },
            Role::Landlord => {
                let house_ids = self
                    .houses
                    .owned_by(&principal.id)
                    .map_err(registry_failure)?;
                if house_ids.is_empty() {
                    return Ok(Vec::new());
                }
                OrderFilter {
                    house_ids: Some(house_ids),
                    ..OrderFilter::default()
                }
            }
        };

        self.repository.orders(&filter).map_err(storage_failure)
    }

    /// Total of settled payment orders.
    pub fn revenue(&self, admin: &Principal) -> Result<u64, RentalRequestError> {
        gate(admin, Operation::ViewRevenue)?;

        let settled = self
            .repository
            .orders(&OrderFilter {
                status: Some(OrderStatus::Settled),
                ..OrderFilter::default()
            })
            .map_err(storage_failure)?;
        Ok(settled.iter().map(|order| u64::from(order.amount)).sum())
    }

    fn load_live(&self, request_id: &RequestId) -> Result<RentalRequest, RentalRequestError> {
        self.repository
            .fetch(request_id)
            .map_err(storage_failure)?
            .filter(|record| !record.is_deleted())
            .ok_or(RentalRequestError::NotFound("rental request"))
    }

    fn load_order(&self, order_id: &OrderId) -> Result<PaymentOrder, RentalRequestError> {
        self.repository
            .fetch_order(order_id)
            .map_err(storage_failure)?
            .ok_or(RentalRequestError::NotFound("payment order"))
    }

    fn open_order(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<PaymentOrder>, RentalRequestError> {
        let open = self
            .repository
            .orders(&OrderFilter::open_for(request_id.clone()))
            .map_err(storage_failure)?;
        Ok(open.into_iter().next())
    }

    /// Closes a paid order whose request another order already settled. The request is left
    /// as it is; the captured amount stays on the ledger for a refund.
    fn record_duplicate_capture(
        &self,
        record: RentalRequest,
        order_id: &OrderId,
    ) -> Result<PaymentConfirmation, RentalRequestError> {
        match self.repository.mark_duplicate(order_id, Utc::now()) {
            Ok(()) => {
                warn!(
                    request_id = %record.id,
                    order_id = %order_id,
                    "payment captured for an already settled request"
                );
                Ok(PaymentConfirmation {
                    request: record,
                    outcome: ConfirmationOutcome::DuplicateCapture,
                })
            }
            Err(RepositoryError::Stale) => closed_outcome(self.load_order(order_id)?.status)
                .map(|outcome| PaymentConfirmation {
                    request: record,
                    outcome,
                })
                .ok_or_else(|| storage_failure(RepositoryError::Stale)),
            Err(RepositoryError::NotFound) => Err(RentalRequestError::NotFound("payment order")),
            Err(other) => Err(storage_failure(other)),
        }
    }

    /// Ownership is resolved against the registry at check time; a house the registry no
    /// longer knows is owned by nobody.
    fn owns_house(
        &self,
        landlord_id: &UserId,
        house_id: &HouseId,
    ) -> Result<bool, RentalRequestError> {
        match self.houses.listing(house_id) {
            Ok(house) => Ok(&house.landlord_id == landlord_id),
            Err(RegistryError::NotFound) => Ok(false),
            Err(other) => Err(registry_failure(other)),
        }
    }
}

fn gate(principal: &Principal, operation: Operation) -> Result<(), RentalRequestError> {
    authorize(principal, operation).map_err(|denied| {
        warn!(principal_id = %principal.id, ?operation, %denied, "operation refused");
        RentalRequestError::from(denied)
    })
}

/// Outcome reported for an order that has already left the open state.
fn closed_outcome(status: OrderStatus) -> Option<ConfirmationOutcome> {
    match status {
        OrderStatus::Initiated => None,
        OrderStatus::Settled => Some(ConfirmationOutcome::AlreadySettled),
        OrderStatus::Duplicate => Some(ConfirmationOutcome::DuplicateCapture),
    }
}

fn duplicate_request() -> RentalRequestError {
    RentalRequestError::Conflict(
        "you already have a pending or approved request for this house".to_string(),
    )
}

fn storage_failure(err: RepositoryError) -> RentalRequestError {
    match err {
        RepositoryError::Conflict | RepositoryError::Stale => RentalRequestError::Conflict(
            "the request was modified concurrently, retry".to_string(),
        ),
        RepositoryError::NotFound => RentalRequestError::NotFound("rental request"),
        RepositoryError::Unavailable(detail) => {
            warn!(%detail, "request store failure");
            RentalRequestError::Internal
        }
    }
}

fn registry_failure(err: RegistryError) -> RentalRequestError {
    warn!(%err, "house registry failure");
    RentalRequestError::Upstream {
        collaborator: "house registry",
        retryable: !matches!(err, RegistryError::NotFound),
        reason: err.to_string(),
    }
}

fn gateway_failure(err: GatewayError) -> RentalRequestError {
    warn!(%err, "payment gateway failure");
    RentalRequestError::Upstream {
        collaborator: "payment gateway",
        retryable: err.is_retryable(),
        reason: err.to_string(),
    }
}

/// Error raised by the lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum RentalRequestError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{collaborator} failed: {reason}")]
    Upstream {
        collaborator: &'static str,
        retryable: bool,
        reason: String,
    },
    #[error("internal error")]
    Internal,
}

impl RentalRequestError {
    pub const fn kind(&self) -> &'static str {
        match self {
            RentalRequestError::NotFound(_) => "not_found",
            RentalRequestError::Forbidden(_) => "forbidden",
            RentalRequestError::Conflict(_) => "conflict",
            RentalRequestError::InvalidTransition(_) => "invalid_transition",
            RentalRequestError::BadRequest(_) => "bad_request",
            RentalRequestError::Upstream { .. } => "upstream",
            RentalRequestError::Internal => "internal",
        }
    }

    pub const fn is_retryable(&self) -> bool {
        matches!(self, RentalRequestError::Upstream { retryable: true, .. })
    }
}

impl From<AccessDenied> for RentalRequestError {
    fn from(value: AccessDenied) -> Self {
        Self::Forbidden(value.to_string())
    }
}

impl From<TransitionError> for RentalRequestError {
    fn from(value: TransitionError) -> Self {
        Self::InvalidTransition(value.to_string())
    }
}
