//! Rental request lifecycle: creation, landlord decisions, payment settlement, role-scoped
//! reads, and soft deletion, each gated by the capability table in [`access`].

pub mod access;
pub mod collaborators;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use access::{authorize, AccessDenied, Operation};
pub use collaborators::{
    AuthError, Checkout, GatewayError, HouseRegistry, IdentityDirectory, PaymentGateway,
    RegistryError,
};
pub use domain::{
    Decision, HouseId, HouseListing, Lifecycle, OrderId, OrderStatus, PaymentOrder,
    PaymentStatus, Principal, RentalRequest, RentalRequestView, RequestId, RequestStatus, Role,
    Standing, TransitionError, UserId,
};
pub use repository::{
    OrderFilter, PageRequest, PaymentLedger, RepositoryError, RequestFilter, RequestPage,
    RequestRepository, SortField, SortOrder,
};
pub use router::rental_request_router;
pub use service::{
    ConfirmationOutcome, ListQuery, PaymentConfirmation, RentalRequestError,
    RentalRequestService,
};
pub use store::InMemoryRequestStore;
