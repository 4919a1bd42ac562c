use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::access::{authorize, Operation};
use super::collaborators::{AuthError, HouseRegistry, IdentityDirectory, PaymentGateway};
use super::domain::{
    Decision, HouseId, OrderId, PaymentOrder, Principal, RentalRequest, RentalRequestView,
    RequestId, RequestStatus, UserId,
};
use super::repository::{PageRequest, PaymentLedger, RequestRepository, SortField, SortOrder};
use super::service::{ConfirmationOutcome, ListQuery, RentalRequestError, RentalRequestService};

/// Shared state behind the rental request routes.
pub struct RequestApi<R, H, G, D> {
    pub service: Arc<RentalRequestService<R, H, G>>,
    pub identity: Arc<D>,
}

/// Router builder exposing the lifecycle engine over HTTP.
pub fn rental_request_router<R, H, G, D>(
    service: Arc<RentalRequestService<R, H, G>>,
    identity: Arc<D>,
) -> Router
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let api = Arc::new(RequestApi { service, identity });

    Router::new()
        .route(
            "/api/v1/rental-requests",
            post(create_handler::<R, H, G, D>).get(list_all_handler::<R, H, G, D>),
        )
        .route(
            "/api/v1/rental-requests/:request_id",
            get(get_handler::<R, H, G, D>).delete(delete_handler::<R, H, G, D>),
        )
        .route(
            "/api/v1/rental-requests/:request_id/status",
            patch(status_handler::<R, H, G, D>),
        )
        .route(
            "/api/v1/rental-requests/:request_id/payment",
            post(payment_handler::<R, H, G, D>),
        )
        .route(
            "/api/v1/tenant/rental-requests",
            get(tenant_list_handler::<R, H, G, D>),
        )
        .route(
            "/api/v1/landlord/rental-requests",
            get(landlord_list_handler::<R, H, G, D>),
        )
        .route("/api/v1/payments", get(payments_handler::<R, H, G, D>))
        .route(
            "/api/v1/payments/verify",
            get(verify_handler::<R, H, G, D>),
        )
        .route(
            "/api/v1/payments/revenue",
            get(revenue_handler::<R, H, G, D>),
        )
        .with_state(api)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateRequestBody {
    pub house_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusBody {
    pub status: Decision,
    #[serde(default)]
    pub landlord_phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAllParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LandlordParams {
    pub landlord_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckoutView {
    order_id: OrderId,
    checkout_url: String,
}

#[derive(Debug, Serialize)]
struct PageMeta {
    page: u32,
    limit: u32,
    total: usize,
    total_pages: usize,
}

fn views(records: Vec<RentalRequest>) -> Vec<RentalRequestView> {
    records.iter().map(RentalRequest::view).collect()
}

fn envelope<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    let payload = json!({
        "success": true,
        "message": message,
        "data": data,
    });
    (status, Json(payload)).into_response()
}

fn authenticate<D: IdentityDirectory>(
    identity: &D,
    headers: &HeaderMap,
) -> Result<Principal, Response> {
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| auth_rejection(AuthError::MissingCredential))?;

    identity.resolve(credential).map_err(auth_rejection)
}

fn auth_rejection(error: AuthError) -> Response {
    let status = match error {
        AuthError::MissingCredential | AuthError::UnknownCredential => StatusCode::UNAUTHORIZED,
        AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let payload = json!({
        "success": false,
        "error": "unauthorized",
        "message": error.to_string(),
    });
    (status, Json(payload)).into_response()
}

impl IntoResponse for RentalRequestError {
    fn into_response(self) -> Response {
        let status = match &self {
            RentalRequestError::NotFound(_) => StatusCode::NOT_FOUND,
            RentalRequestError::Forbidden(_) => StatusCode::FORBIDDEN,
            RentalRequestError::Conflict(_) => StatusCode::CONFLICT,
            RentalRequestError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RentalRequestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RentalRequestError::Upstream {
                retryable: true, ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            RentalRequestError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            RentalRequestError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut payload = json!({
            "success": false,
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let (RentalRequestError::Upstream { retryable, .. }, Value::Object(map)) =
            (&self, &mut payload)
        {
            map.insert("retryable".to_string(), Value::Bool(*retryable));
        }
        (status, Json(payload)).into_response()
    }
}

pub(crate) async fn create_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
    Json(body): Json<CreateRequestBody>,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    match api
        .service
        .create(&principal, HouseId(body.house_id), &body.message)
    {
        Ok(record) => envelope(
            StatusCode::CREATED,
            "Rental request submitted successfully",
            record.view(),
        ),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn tenant_list_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    match api.service.list_for_tenant(&principal) {
        Ok(records) => envelope(
            StatusCode::OK,
            "Tenant rental requests retrieved successfully",
            views(records),
        ),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn landlord_list_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
    Query(params): Query<LandlordParams>,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    let landlord_id = params.landlord_id.map(UserId);
    match api
        .service
        .list_for_landlord(&principal, landlord_id.as_ref())
    {
        Ok(records) => envelope(
            StatusCode::OK,
            "Landlord rental requests retrieved successfully",
            views(records),
        ),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn list_all_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
    Query(params): Query<ListAllParams>,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    let query = ListQuery {
        status: params.status,
        page: PageRequest {
            page: params.page.unwrap_or(1),
            limit: params
                .limit
                .unwrap_or(api.service.pagination().default_limit),
            sort_by: params.sort_by.unwrap_or_default(),
            sort_order: params.sort_order.unwrap_or_default(),
        },
    };

    match api.service.list_all(&principal, query) {
        Ok(page) => {
            let meta = PageMeta {
                page: page.page,
                limit: page.limit,
                total: page.total,
                total_pages: page.total_pages(),
            };
            let payload = json!({
                "success": true,
                "message": "All rental requests retrieved successfully",
                "meta": meta,
                "data": views(page.items),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn get_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    match api.service.get_visible(&principal, &RequestId(request_id)) {
        Ok(record) => envelope(
            StatusCode::OK,
            "Rental request retrieved successfully",
            record.view(),
        ),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn status_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    match api.service.set_status(
        &principal,
        &RequestId(request_id),
        body.status,
        body.landlord_phone,
    ) {
        Ok(record) => {
            let message = format!("Rental request {} successfully", record.status());
            envelope(StatusCode::OK, &message, record.view())
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn payment_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    match api
        .service
        .initiate_payment(&principal, &RequestId(request_id))
    {
        Ok(order) => envelope(
            StatusCode::CREATED,
            "Payment initiated successfully",
            CheckoutView {
                order_id: order.order_id,
                checkout_url: order.checkout_url,
            },
        ),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn verify_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
    Query(params): Query<VerifyParams>,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };
    if let Err(denied) = authorize(&principal, Operation::ConfirmPayment) {
        return RentalRequestError::from(denied).into_response();
    }

    let Some(order_id) = params.order_id else {
        return RentalRequestError::BadRequest("order id is required".to_string())
            .into_response();
    };

    match api.service.confirm_payment(&OrderId(order_id)) {
        Ok(confirmation) => {
            let data = json!({
                "outcome": confirmation.outcome,
                "request": confirmation.request.view(),
            });
            if confirmation.outcome == ConfirmationOutcome::DuplicateCapture {
                let payload = json!({
                    "success": false,
                    "message": "Payment captured for a request that was already settled; refund required",
                    "data": data,
                });
                return (StatusCode::CONFLICT, Json(payload)).into_response();
            }
            envelope(StatusCode::OK, "Payment verified successfully", data)
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn delete_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    match api.service.delete(&principal, &RequestId(request_id)) {
        Ok(record) => envelope(
            StatusCode::OK,
            "Rental request deleted successfully",
            record.view(),
        ),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn payments_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    match api.service.list_payments(&principal) {
        Ok(orders) => envelope::<Vec<PaymentOrder>>(
            StatusCode::OK,
            "Payments retrieved successfully",
            orders,
        ),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn revenue_handler<R, H, G, D>(
    State(api): State<Arc<RequestApi<R, H, G, D>>>,
    headers: HeaderMap,
) -> Response
where
    R: RequestRepository + PaymentLedger + 'static,
    H: HouseRegistry + 'static,
    G: PaymentGateway + 'static,
    D: IdentityDirectory + 'static,
{
    let principal = match authenticate(api.identity.as_ref(), &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };

    match api.service.revenue(&principal) {
        Ok(total_revenue) => envelope(
            StatusCode::OK,
            "Revenue calculated successfully",
            json!({ "total_revenue": total_revenue }),
        ),
        Err(error) => error.into_response(),
    }
}
