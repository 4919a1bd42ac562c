use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{HouseId, OrderId, OrderStatus, PaymentOrder, RentalRequest, RequestId, UserId};
use super::repository::{
    OrderFilter, PageRequest, PaymentLedger, RepositoryError, RequestFilter, RequestPage,
    RequestRepository,
};

#[derive(Debug, Default)]
struct StoreState {
    requests: HashMap<RequestId, RentalRequest>,
    orders: HashMap<OrderId, PaymentOrder>,
}

impl StoreState {
    fn active_for(&self, house_id: &HouseId, tenant_id: &UserId) -> Option<&RentalRequest> {
        self.requests.values().find(|record| {
            record.holds_slot() && &record.house_id == house_id && &record.tenant_id == tenant_id
        })
    }

    fn check_open(&self, order_id: &OrderId) -> Result<(), RepositoryError> {
        match self.orders.get(order_id) {
            None => Err(RepositoryError::NotFound),
            Some(order) if !order.status.is_open() => Err(RepositoryError::Stale),
            Some(_) => Ok(()),
        }
    }

    fn check_revision(&self, record: &RentalRequest) -> Result<(), RepositoryError> {
        let stored = self
            .requests
            .get(&record.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision + 1 != record.revision {
            return Err(RepositoryError::Stale);
        }
        Ok(())
    }
}

/// Process-local store for requests and payment orders.
///
/// All reads and writes go through one lock, so the duplicate check in `insert` and the
/// revision check in `update` are atomic with their writes.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRequestStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("request store lock poisoned".to_string()))
    }
}

impl RequestRepository for InMemoryRequestStore {
    fn insert(&self, record: RentalRequest) -> Result<RentalRequest, RepositoryError> {
        let mut state = self.lock()?;
        if state.requests.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        if record.holds_slot()
            && state
                .active_for(&record.house_id, &record.tenant_id)
                .is_some()
        {
            return Err(RepositoryError::Conflict);
        }
        state.requests.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: RentalRequest) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        state.check_revision(&record)?;
        state.requests.insert(record.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<RentalRequest>, RepositoryError> {
        Ok(self.lock()?.requests.get(id).cloned())
    }

    fn find_active(
        &self,
        house_id: &HouseId,
        tenant_id: &UserId,
    ) -> Result<Option<RentalRequest>, RepositoryError> {
        Ok(self.lock()?.active_for(house_id, tenant_id).cloned())
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<RentalRequest>, RepositoryError> {
        let state = self.lock()?;
        let mut records: Vec<RentalRequest> = state
            .requests
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(records)
    }

    fn page(
        &self,
        filter: &RequestFilter,
        page: &PageRequest,
    ) -> Result<RequestPage, RepositoryError> {
        let state = self.lock()?;
        let mut matching: Vec<&RentalRequest> = state
            .requests
            .values()
            .filter(|record| filter.matches(record))
            .collect();
        matching.sort_by(|left, right| page.compare(left, right));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.skip())
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok(RequestPage {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }
}

impl PaymentLedger for InMemoryRequestStore {
    fn insert_order(&self, order: PaymentOrder) -> Result<PaymentOrder, RepositoryError> {
        let mut state = self.lock()?;
        let already_open = state.orders.values().any(|existing| {
            existing.request_id == order.request_id && existing.status.is_open()
        });
        if already_open || state.orders.contains_key(&order.order_id) {
            return Err(RepositoryError::Conflict);
        }
        state.orders.insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    fn fetch_order(&self, order_id: &OrderId) -> Result<Option<PaymentOrder>, RepositoryError> {
        Ok(self.lock()?.orders.get(order_id).cloned())
    }

    fn settle(
        &self,
        record: RentalRequest,
        order_id: &OrderId,
        settled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        state.check_open(order_id)?;
        state.check_revision(&record)?;

        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = OrderStatus::Settled;
            order.settled_at = Some(settled_at);
        }
        state.requests.insert(record.id.clone(), record);
        Ok(())
    }

    fn mark_duplicate(
        &self,
        order_id: &OrderId,
        captured_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        state.check_open(order_id)?;
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = OrderStatus::Duplicate;
            order.settled_at = Some(captured_at);
        }
        Ok(())
    }

    fn orders(&self, filter: &OrderFilter) -> Result<Vec<PaymentOrder>, RepositoryError> {
        let state = self.lock()?;
        let mut orders: Vec<PaymentOrder> = state
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.order_id.cmp(&right.order_id))
        });
        Ok(orders)
    }
}
