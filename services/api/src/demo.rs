use crate::infra::{seed_houses, seed_principals, InMemoryHouseRegistry, SandboxPaymentGateway};
use clap::Args;
use rental_hub::config::{PaginationConfig, PaymentConfig};
use rental_hub::error::AppError;
use rental_hub::workflows::rental_requests::{
    Decision, HouseId, InMemoryRequestStore, Principal, RentalRequest, RentalRequestError,
    RentalRequestService, Role,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the public JSON view of each request after every step.
    #[arg(long)]
    pub(crate) json: bool,
    /// Stop after the landlord decision and skip the checkout walkthrough.
    #[arg(long)]
    pub(crate) skip_payment: bool,
}

type DemoService =
    RentalRequestService<InMemoryRequestStore, InMemoryHouseRegistry, SandboxPaymentGateway>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { json, skip_payment } = args;

    let service: DemoService = RentalRequestService::new(
        Arc::new(InMemoryRequestStore::new()),
        Arc::new(seed_houses()),
        Arc::new(SandboxPaymentGateway::new(
            PaymentConfig::default().checkout_base_url,
        )),
        PaginationConfig::default(),
    );
    let cast = DemoCast::from_seed();
    let house = HouseId("house-gulshan-2".to_string());

    println!("Rental request lifecycle demo");

    println!("\n1. {} asks to rent {}", cast.tenant.id, house);
    let request = service.create(
        &cast.tenant,
        house.clone(),
        "We are a family of three and would like to move in next month.",
    )?;
    render_request(&request, json);

    println!("\n2. {} approves the request", cast.owner.id);
    let request = service.set_status(
        &cast.owner,
        &request.id,
        Decision::Approved,
        Some("+880 1711 000000".to_string()),
    )?;
    render_request(&request, json);

    if !skip_payment {
        println!("\n3. {} pays through the sandbox checkout", cast.tenant.id);
        let order = service.initiate_payment(&cast.tenant, &request.id)?;
        println!("  Checkout {} -> {}", order.order_id, order.checkout_url);
        let first = service.confirm_payment(&order.order_id)?;
        println!(
            "  Confirmation: {:?} (payment {})",
            first.outcome,
            first.request.payment_status().label()
        );
        let again = service.confirm_payment(&order.order_id)?;
        println!(
            "  Redelivered confirmation: {:?} (updated_at unchanged: {})",
            again.outcome,
            again.request.updated_at == first.request.updated_at
        );
        render_request(&again.request, json);
    }

    println!(
        "\n4. {} asks for the same house while the first request is approved",
        cast.second_tenant.id
    );
    let second = service.create(
        &cast.second_tenant,
        house.clone(),
        "Is the flat still available for viewing?",
    )?;
    render_request(&second, json);

    println!(
        "\n5. {} asks again while their own request is still pending",
        cast.second_tenant.id
    );
    report_refusal(service.create(&cast.second_tenant, house, "Following up on my request"));

    println!(
        "\n6. {} tries to decide a request on a house they do not own",
        cast.stranger.id
    );
    report_refusal(service.set_status(&cast.stranger, &second.id, Decision::Approved, None));

    let payments = service.list_payments(&cast.admin)?;
    let revenue = service.revenue(&cast.admin)?;
    println!(
        "\nLedger: {} payment order(s), {} settled revenue",
        payments.len(),
        revenue
    );

    Ok(())
}

struct DemoCast {
    admin: Principal,
    owner: Principal,
    stranger: Principal,
    tenant: Principal,
    second_tenant: Principal,
}

impl DemoCast {
    fn from_seed() -> Self {
        let principals = seed_principals();
        let pick = |id: &str, role: Role| {
            principals
                .iter()
                .find(|principal| principal.id.0 == id)
                .cloned()
                .unwrap_or_else(|| Principal::new(id, format!("{id}@rentalhub.local"), role))
        };
        Self {
            admin: pick("admin-ops", Role::Admin),
            owner: pick("landlord-rahim", Role::Landlord),
            stranger: pick("landlord-nasrin", Role::Landlord),
            tenant: pick("tenant-ayesha", Role::Tenant),
            second_tenant: pick("tenant-karim", Role::Tenant),
        }
    }
}

fn render_request(request: &RentalRequest, json: bool) {
    println!(
        "  {} on {} -> status {} | payment {} | revision {}",
        request.id,
        request.house_id,
        request.status(),
        request.payment_status().label(),
        request.revision
    );
    if json {
        match serde_json::to_string_pretty(&request.view()) {
            Ok(payload) => println!("{payload}"),
            Err(err) => println!("  Public view unavailable: {err}"),
        }
    }
}

fn report_refusal<T>(result: Result<T, RentalRequestError>) {
    match result {
        Ok(_) => println!("  Unexpectedly accepted"),
        Err(err) => println!("  Refused ({}): {}", err.kind(), err),
    }
}
