use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::PaginationConfig;
use crate::workflows::rental_requests::collaborators::{
    AuthError, Checkout, GatewayError, HouseRegistry, IdentityDirectory, PaymentGateway,
    RegistryError,
};
use crate::workflows::rental_requests::domain::{
    HouseId, HouseListing, Lifecycle, OrderId, OrderStatus, PaymentOrder, Principal,
    RentalRequest, RequestId, Role, UserId,
};
use crate::workflows::rental_requests::repository::{
    OrderFilter, PageRequest, PaymentLedger, RepositoryError, RequestFilter, RequestPage,
    RequestRepository,
};
use crate::workflows::rental_requests::{
    rental_request_router, InMemoryRequestStore, RentalRequestService,
};

pub(super) type TestService = RentalRequestService<InMemoryRequestStore, MemoryHouses, MemoryGateway>;

pub(super) fn tenant(id: &str) -> Principal {
    Principal::new(id, format!("{id}@tenants.example"), Role::Tenant)
}

pub(super) fn landlord(id: &str) -> Principal {
    Principal::new(id, format!("{id}@landlords.example"), Role::Landlord)
}

pub(super) fn admin() -> Principal {
    Principal::new("admin", "admin@example.com", Role::Admin)
}

pub(super) fn house(id: &str, landlord_id: &str, available: bool) -> HouseListing {
    HouseListing {
        id: HouseId(id.to_string()),
        landlord_id: UserId(landlord_id.to_string()),
        location: format!("{id} Road 7, Banani"),
        bedrooms: 3,
        rent_amount: 32_000,
        available,
    }
}

pub(super) fn h(id: &str) -> HouseId {
    HouseId(id.to_string())
}

pub(super) struct Fixture {
    pub(super) service: TestService,
    pub(super) store: Arc<InMemoryRequestStore>,
    pub(super) houses: Arc<MemoryHouses>,
    pub(super) gateway: Arc<MemoryGateway>,
}

/// h1 and h3 belong to l1 (h3 is let already), h2 belongs to l2.
pub(super) fn fixture() -> Fixture {
    let store = Arc::new(InMemoryRequestStore::new());
    let houses = Arc::new(MemoryHouses::default());
    houses.add(house("h1", "l1", true));
    houses.add(house("h2", "l2", true));
    houses.add(house("h3", "l1", false));
    let gateway = Arc::new(MemoryGateway::default());
    let service = RentalRequestService::new(
        store.clone(),
        houses.clone(),
        gateway.clone(),
        PaginationConfig::default(),
    );
    Fixture {
        service,
        store,
        houses,
        gateway,
    }
}

impl Fixture {
    pub(super) fn pending(&self, tenant_id: &str, house_id: &str) -> RentalRequest {
        self.service
            .create(&tenant(tenant_id), h(house_id), "We would like to view the flat")
            .expect("request created")
    }

    pub(super) fn approved(&self, tenant_id: &str, house_id: &str) -> RentalRequest {
        let record = self.pending(tenant_id, house_id);
        let owner = self
            .houses
            .listing(&record.house_id)
            .expect("house registered")
            .landlord_id;
        self.service
            .set_status(
                &landlord(&owner.0),
                &record.id,
                crate::workflows::rental_requests::Decision::Approved,
                None,
            )
            .expect("request approved")
    }

    /// Records a second gateway order on a request directly, the way a checkout opened from
    /// another session would reach the ledger.
    pub(super) fn stray_order(&self, request: &RentalRequest) -> PaymentOrder {
        let checkout = self.gateway.initiate_checkout(request).expect("checkout");
        self.store
            .insert_order(PaymentOrder {
                order_id: checkout.order_id,
                request_id: request.id.clone(),
                house_id: request.house_id.clone(),
                tenant_id: request.tenant_id.clone(),
                landlord_id: request.landlord_id.clone(),
                amount: request.rent_amount,
                status: OrderStatus::Initiated,
                checkout_url: checkout.checkout_url,
                created_at: Utc::now(),
                settled_at: None,
            })
            .expect("order recorded")
    }
}

#[derive(Default)]
pub(super) struct MemoryHouses {
    houses: Mutex<HashMap<HouseId, HouseListing>>,
    removed: Mutex<HashSet<HouseId>>,
}

impl MemoryHouses {
    pub(super) fn add(&self, listing: HouseListing) {
        self.houses
            .lock()
            .expect("houses mutex poisoned")
            .insert(listing.id.clone(), listing);
    }

    pub(super) fn transfer(&self, house_id: &str, new_owner: &str) {
        let mut guard = self.houses.lock().expect("houses mutex poisoned");
        if let Some(listing) = guard.get_mut(&h(house_id)) {
            listing.landlord_id = UserId(new_owner.to_string());
        }
    }

    pub(super) fn remove(&self, house_id: &str) {
        self.removed
            .lock()
            .expect("houses mutex poisoned")
            .insert(h(house_id));
    }
}

impl HouseRegistry for MemoryHouses {
    fn listing(&self, house_id: &HouseId) -> Result<HouseListing, RegistryError> {
        if self
            .removed
            .lock()
            .expect("houses mutex poisoned")
            .contains(house_id)
        {
            return Err(RegistryError::NotFound);
        }
        self.houses
            .lock()
            .expect("houses mutex poisoned")
            .get(house_id)
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    fn owned_by(&self, landlord_id: &UserId) -> Result<Vec<HouseId>, RegistryError> {
        let removed = self.removed.lock().expect("houses mutex poisoned");
        let mut ids: Vec<HouseId> = self
            .houses
            .lock()
            .expect("houses mutex poisoned")
            .values()
            .filter(|listing| &listing.landlord_id == landlord_id)
            .filter(|listing| !removed.contains(&listing.id))
            .map(|listing| listing.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

pub(super) struct TimeoutHouses;

impl HouseRegistry for TimeoutHouses {
    fn listing(&self, _house_id: &HouseId) -> Result<HouseListing, RegistryError> {
        Err(RegistryError::Timeout)
    }

    fn owned_by(&self, _landlord_id: &UserId) -> Result<Vec<HouseId>, RegistryError> {
        Err(RegistryError::Unavailable("registry offline".to_string()))
    }
}

/// Gateway double: orders are paid only once `capture` is called.
#[derive(Default)]
pub(super) struct MemoryGateway {
    issued: Mutex<HashSet<OrderId>>,
    captured: Mutex<HashSet<OrderId>>,
    sequence: AtomicUsize,
    verifications: AtomicUsize,
}

impl MemoryGateway {
    pub(super) fn capture(&self, order_id: &OrderId) {
        self.captured
            .lock()
            .expect("gateway mutex poisoned")
            .insert(order_id.clone());
    }

    pub(super) fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for MemoryGateway {
    fn initiate_checkout(&self, request: &RentalRequest) -> Result<Checkout, GatewayError> {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = OrderId(format!("ORD-{n}"));
        self.issued
            .lock()
            .expect("gateway mutex poisoned")
            .insert(order_id.clone());
        Ok(Checkout {
            checkout_url: format!("https://pay.test/checkout/{}?ref={}", order_id, request.id),
            order_id,
        })
    }

    fn verify_status(&self, order_id: &OrderId) -> Result<bool, GatewayError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        if !self
            .issued
            .lock()
            .expect("gateway mutex poisoned")
            .contains(order_id)
        {
            return Err(GatewayError::UnknownOrder(order_id.clone()));
        }
        Ok(self
            .captured
            .lock()
            .expect("gateway mutex poisoned")
            .contains(order_id))
    }
}

pub(super) struct TimeoutGateway;

impl PaymentGateway for TimeoutGateway {
    fn initiate_checkout(&self, _request: &RentalRequest) -> Result<Checkout, GatewayError> {
        Err(GatewayError::Timeout)
    }

    fn verify_status(&self, _order_id: &OrderId) -> Result<bool, GatewayError> {
        Err(GatewayError::Timeout)
    }
}

pub(super) struct UnavailableStore;

impl RequestRepository for UnavailableStore {
    fn insert(&self, _record: RentalRequest) -> Result<RentalRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn update(&self, _record: RentalRequest) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn fetch(&self, _id: &RequestId) -> Result<Option<RentalRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn find_active(
        &self,
        _house_id: &HouseId,
        _tenant_id: &UserId,
    ) -> Result<Option<RentalRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn list(&self, _filter: &RequestFilter) -> Result<Vec<RentalRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn page(
        &self,
        _filter: &RequestFilter,
        _page: &PageRequest,
    ) -> Result<RequestPage, RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }
}

impl PaymentLedger for UnavailableStore {
    fn insert_order(&self, _order: PaymentOrder) -> Result<PaymentOrder, RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn fetch_order(&self, _order_id: &OrderId) -> Result<Option<PaymentOrder>, RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn settle(
        &self,
        _record: RentalRequest,
        _order_id: &OrderId,
        _settled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn mark_duplicate(
        &self,
        _order_id: &OrderId,
        _captured_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }

    fn orders(&self, _filter: &OrderFilter) -> Result<Vec<PaymentOrder>, RepositoryError> {
        Err(RepositoryError::Unavailable("mongo shard 3 offline".to_string()))
    }
}

/// Store wrapper that lets a competing landlord reject the request just before the first
/// update lands, so that update loses the revision check.
#[derive(Default)]
pub(super) struct RejectedFirstStore {
    pub(super) inner: InMemoryRequestStore,
    raced: AtomicBool,
}

impl RequestRepository for RejectedFirstStore {
    fn insert(&self, record: RentalRequest) -> Result<RentalRequest, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, record: RentalRequest) -> Result<(), RepositoryError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let stored = self.inner.fetch(&record.id)?.expect("record stored");
            let rejected = stored.standing().reject().expect("pending request rejects");
            self.inner
                .update(stored.advanced(Lifecycle::Active(rejected), Utc::now()))?;
        }
        self.inner.update(record)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<RentalRequest>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn find_active(
        &self,
        house_id: &HouseId,
        tenant_id: &UserId,
    ) -> Result<Option<RentalRequest>, RepositoryError> {
        self.inner.find_active(house_id, tenant_id)
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<RentalRequest>, RepositoryError> {
        self.inner.list(filter)
    }

    fn page(
        &self,
        filter: &RequestFilter,
        page: &PageRequest,
    ) -> Result<RequestPage, RepositoryError> {
        self.inner.page(filter, page)
    }
}

impl PaymentLedger for RejectedFirstStore {
    fn insert_order(&self, order: PaymentOrder) -> Result<PaymentOrder, RepositoryError> {
        self.inner.insert_order(order)
    }

    fn fetch_order(&self, order_id: &OrderId) -> Result<Option<PaymentOrder>, RepositoryError> {
        self.inner.fetch_order(order_id)
    }

    fn settle(
        &self,
        record: RentalRequest,
        order_id: &OrderId,
        settled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.inner.settle(record, order_id, settled_at)
    }

    fn mark_duplicate(
        &self,
        order_id: &OrderId,
        captured_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.inner.mark_duplicate(order_id, captured_at)
    }

    fn orders(&self, filter: &OrderFilter) -> Result<Vec<PaymentOrder>, RepositoryError> {
        self.inner.orders(filter)
    }
}

/// Bearer tokens are the principal ids themselves.
#[derive(Default)]
pub(super) struct StaticIdentity {
    principals: HashMap<String, Principal>,
}

impl StaticIdentity {
    pub(super) fn with(principals: Vec<Principal>) -> Self {
        Self {
            principals: principals
                .into_iter()
                .map(|principal| (principal.id.0.clone(), principal))
                .collect(),
        }
    }
}

impl IdentityDirectory for StaticIdentity {
    fn resolve(&self, credential: &str) -> Result<Principal, AuthError> {
        self.principals
            .get(credential)
            .cloned()
            .ok_or(AuthError::UnknownCredential)
    }
}

pub(super) fn router_for(fixture: Fixture) -> (axum::Router, Fixture) {
    let identity = Arc::new(StaticIdentity::with(vec![
        tenant("t1"),
        tenant("t2"),
        landlord("l1"),
        landlord("l2"),
        admin(),
    ]));
    let service = Arc::new(RentalRequestService::new(
        fixture.store.clone(),
        fixture.houses.clone(),
        fixture.gateway.clone(),
        PaginationConfig::default(),
    ));
    (rental_request_router(service, identity), fixture)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
