use metrics_exporter_prometheus::PrometheusHandle;
use rental_hub::workflows::rental_requests::{
    AuthError, Checkout, GatewayError, HouseId, HouseListing, HouseRegistry, IdentityDirectory,
    OrderId, PaymentGateway, Principal, RegistryError, RentalRequest, Role, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// House inventory kept in process memory; stands in for the listings service.
#[derive(Default, Clone)]
pub(crate) struct InMemoryHouseRegistry {
    houses: Arc<Mutex<HashMap<HouseId, HouseListing>>>,
}

impl InMemoryHouseRegistry {
    pub(crate) fn with_listings(listings: impl IntoIterator<Item = HouseListing>) -> Self {
        let houses = listings
            .into_iter()
            .map(|listing| (listing.id.clone(), listing))
            .collect();
        Self {
            houses: Arc::new(Mutex::new(houses)),
        }
    }
}

impl HouseRegistry for InMemoryHouseRegistry {
    fn listing(&self, house_id: &HouseId) -> Result<HouseListing, RegistryError> {
        let guard = self
            .houses
            .lock()
            .map_err(|_| RegistryError::Unavailable("house registry lock poisoned".to_string()))?;
        guard.get(house_id).cloned().ok_or(RegistryError::NotFound)
    }

    fn owned_by(&self, landlord_id: &UserId) -> Result<Vec<HouseId>, RegistryError> {
        let guard = self
            .houses
            .lock()
            .map_err(|_| RegistryError::Unavailable("house registry lock poisoned".to_string()))?;
        let mut owned: Vec<HouseId> = guard
            .values()
            .filter(|listing| &listing.landlord_id == landlord_id)
            .map(|listing| listing.id.clone())
            .collect();
        owned.sort();
        Ok(owned)
    }
}

/// Token table mapping bearer credentials to principals.
#[derive(Default, Clone)]
pub(crate) struct InMemoryIdentityDirectory {
    tokens: Arc<HashMap<String, Principal>>,
}

impl InMemoryIdentityDirectory {
    pub(crate) fn with_tokens(tokens: impl IntoIterator<Item = (String, Principal)>) -> Self {
        Self {
            tokens: Arc::new(tokens.into_iter().collect()),
        }
    }
}

impl IdentityDirectory for InMemoryIdentityDirectory {
    fn resolve(&self, credential: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(AuthError::UnknownCredential)
    }
}

/// Sandbox processor: every order it issues is reported as captured.
#[derive(Clone)]
pub(crate) struct SandboxPaymentGateway {
    checkout_base_url: String,
    issued: Arc<Mutex<HashSet<OrderId>>>,
    sequence: Arc<AtomicU64>,
}

impl SandboxPaymentGateway {
    pub(crate) fn new(checkout_base_url: impl Into<String>) -> Self {
        Self {
            checkout_base_url: checkout_base_url.into().trim_end_matches('/').to_string(),
            issued: Arc::new(Mutex::new(HashSet::new())),
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl PaymentGateway for SandboxPaymentGateway {
    fn initiate_checkout(&self, request: &RentalRequest) -> Result<Checkout, GatewayError> {
        let order_id = OrderId(format!(
            "ORD-{:06}",
            self.sequence.fetch_add(1, Ordering::Relaxed)
        ));
        self.issued
            .lock()
            .map_err(|_| GatewayError::Unavailable("sandbox ledger lock poisoned".to_string()))?
            .insert(order_id.clone());
        Ok(Checkout {
            checkout_url: format!(
                "{}/checkout/{}?amount={}&request={}",
                self.checkout_base_url, order_id, request.rent_amount, request.id
            ),
            order_id,
        })
    }

    fn verify_status(&self, order_id: &OrderId) -> Result<bool, GatewayError> {
        let issued = self
            .issued
            .lock()
            .map_err(|_| GatewayError::Unavailable("sandbox ledger lock poisoned".to_string()))?;
        if issued.contains(order_id) {
            Ok(true)
        } else {
            Err(GatewayError::UnknownOrder(order_id.clone()))
        }
    }
}

pub(crate) fn listing(
    id: &str,
    landlord_id: &str,
    location: &str,
    bedrooms: u8,
    rent_amount: u32,
    available: bool,
) -> HouseListing {
    HouseListing {
        id: HouseId(id.to_string()),
        landlord_id: UserId(landlord_id.to_string()),
        location: location.to_string(),
        bedrooms,
        rent_amount,
        available,
    }
}

pub(crate) fn seed_houses() -> InMemoryHouseRegistry {
    InMemoryHouseRegistry::with_listings([
        listing("house-gulshan-2", "landlord-rahim", "Road 41, Gulshan 2", 3, 45_000, true),
        listing("house-banani-11", "landlord-rahim", "Road 11, Banani", 2, 28_000, true),
        listing("house-dhanmondi-27", "landlord-nasrin", "Road 27, Dhanmondi", 4, 52_000, true),
        listing("house-uttara-7", "landlord-nasrin", "Sector 7, Uttara", 2, 18_500, false),
    ])
}

/// Demo tokens are `<id>-token`; the seeded principals cover every role.
pub(crate) fn seed_principals() -> Vec<Principal> {
    vec![
        Principal::new("admin-ops", "ops@rentalhub.local", Role::Admin),
        Principal::new("landlord-rahim", "rahim@rentalhub.local", Role::Landlord),
        Principal::new("landlord-nasrin", "nasrin@rentalhub.local", Role::Landlord),
        Principal::new("tenant-ayesha", "ayesha@rentalhub.local", Role::Tenant),
        Principal::new("tenant-karim", "karim@rentalhub.local", Role::Tenant),
    ]
}

pub(crate) fn seed_identity() -> InMemoryIdentityDirectory {
    InMemoryIdentityDirectory::with_tokens(
        seed_principals()
            .into_iter()
            .map(|principal| (format!("{}-token", principal.id), principal)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rental_hub::workflows::rental_requests::RequestId;

    #[test]
    fn registry_reports_owned_houses_in_order() {
        let registry = seed_houses();
        let owned = registry
            .owned_by(&UserId("landlord-rahim".to_string()))
            .expect("registry reachable");
        assert_eq!(
            owned,
            vec![
                HouseId("house-banani-11".to_string()),
                HouseId("house-gulshan-2".to_string())
            ]
        );
        assert_eq!(
            registry.listing(&HouseId("house-missing".to_string())),
            Err(RegistryError::NotFound)
        );
    }

    #[test]
    fn identity_resolves_seeded_tokens_only() {
        let identity = seed_identity();
        let principal = identity.resolve("tenant-ayesha-token").expect("seeded");
        assert_eq!(principal.role, Role::Tenant);
        assert_eq!(
            identity.resolve("tenant-ayesha"),
            Err(AuthError::UnknownCredential)
        );
    }

    #[test]
    fn sandbox_gateway_captures_only_issued_orders() {
        let gateway = SandboxPaymentGateway::new("https://sandbox.payments.local/");
        let house = listing("house-x", "landlord-x", "Road 1", 1, 10_000, true);
        let request = RentalRequest::pending(
            RequestId("req-000042".to_string()),
            &house,
            UserId("tenant-x".to_string()),
            "hello".to_string(),
            Utc::now(),
        );

        let checkout = gateway.initiate_checkout(&request).expect("checkout");
        assert_eq!(checkout.order_id.0, "ORD-000001");
        assert!(checkout
            .checkout_url
            .starts_with("https://sandbox.payments.local/checkout/ORD-000001"));
        assert_eq!(gateway.verify_status(&checkout.order_id), Ok(true));
        assert!(matches!(
            gateway.verify_status(&OrderId("ORD-999999".to_string())),
            Err(GatewayError::UnknownOrder(_))
        ));
    }
}
