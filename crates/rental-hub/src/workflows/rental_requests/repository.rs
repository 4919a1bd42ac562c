use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    HouseId, OrderId, OrderStatus, PaymentOrder, RentalRequest, RequestId, RequestStatus, UserId,
};

/// Storage abstraction for rental requests.
///
/// `insert` must reject a record whose `(house_id, tenant_id)` already has a live pending or
/// approved request, atomically with the write. `update` must reject a record whose revision is
/// not exactly one past the stored revision.
pub trait RequestRepository: Send + Sync {
    fn insert(&self, record: RentalRequest) -> Result<RentalRequest, RepositoryError>;
    fn update(&self, record: RentalRequest) -> Result<(), RepositoryError>;
    /// Returns soft-deleted records as well; callers decide visibility.
    fn fetch(&self, id: &RequestId) -> Result<Option<RentalRequest>, RepositoryError>;
    fn find_active(
        &self,
        house_id: &HouseId,
        tenant_id: &UserId,
    ) -> Result<Option<RentalRequest>, RepositoryError>;
    fn list(&self, filter: &RequestFilter) -> Result<Vec<RentalRequest>, RepositoryError>;
    fn page(
        &self,
        filter: &RequestFilter,
        page: &PageRequest,
    ) -> Result<RequestPage, RepositoryError>;
}

/// Ledger of gateway orders. Settlement writes the request and the order together.
///
/// A request has at most one open (`Initiated`) order: `insert_order` rejects a second one
/// with `Conflict`. `settle` and `mark_duplicate` only move an open order and report `Stale`
/// when the order has already left that state.
pub trait PaymentLedger: Send + Sync {
    fn insert_order(&self, order: PaymentOrder) -> Result<PaymentOrder, RepositoryError>;
    fn fetch_order(&self, order_id: &OrderId) -> Result<Option<PaymentOrder>, RepositoryError>;
    fn settle(
        &self,
        record: RentalRequest,
        order_id: &OrderId,
        settled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// Records a capture on an order whose request was settled by a different order.
    fn mark_duplicate(
        &self,
        order_id: &OrderId,
        captured_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    fn orders(&self, filter: &OrderFilter) -> Result<Vec<PaymentOrder>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    Stale,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Selection over live requests. Soft-deleted requests never match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub tenant_id: Option<UserId>,
    pub house_ids: Option<Vec<HouseId>>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn for_tenant(tenant_id: UserId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::default()
        }
    }

    pub fn for_houses(house_ids: Vec<HouseId>) -> Self {
        Self {
            house_ids: Some(house_ids),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &RentalRequest) -> bool {
        if record.is_deleted() {
            return false;
        }
        if let Some(tenant_id) = &self.tenant_id {
            if &record.tenant_id != tenant_id {
                return false;
            }
        }
        if let Some(house_ids) = &self.house_ids {
            if !house_ids.contains(&record.house_id) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status() != status {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    RentAmount,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 30;

/// Offset pagination window with sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl PageRequest {
    pub fn skip(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }

    pub fn compare(&self, left: &RentalRequest, right: &RentalRequest) -> Ordering {
        let ordering = match self.sort_by {
            SortField::CreatedAt => left.created_at.cmp(&right.created_at),
            SortField::UpdatedAt => left.updated_at.cmp(&right.updated_at),
            SortField::RentAmount => left.rent_amount.cmp(&right.rent_amount),
            SortField::Status => left.status().label().cmp(right.status().label()),
        }
        .then_with(|| left.id.cmp(&right.id));

        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

/// One page of requests plus the total matching the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPage {
    pub items: Vec<RentalRequest>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

impl RequestPage {
    pub fn total_pages(&self) -> usize {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(self.limit as usize)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub request_id: Option<RequestId>,
    pub tenant_id: Option<UserId>,
    pub house_ids: Option<Vec<HouseId>>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    /// Open orders for one request.
    pub fn open_for(request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            status: Some(OrderStatus::Initiated),
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &PaymentOrder) -> bool {
        if let Some(request_id) = &self.request_id {
            if &order.request_id != request_id {
                return false;
            }
        }
        if let Some(tenant_id) = &self.tenant_id {
            if &order.tenant_id != tenant_id {
                return false;
            }
        }
        if let Some(house_ids) = &self.house_ids {
            if !house_ids.contains(&order.house_id) {
                return false;
            }
        }
        self.status.map_or(true, |status| order.status == status)
    }
}
