use serde::Serialize;

use super::domain::{Principal, Role};

/// Operations exposed by the lifecycle engine, used as keys of the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateRequest,
    SetStatus,
    InitiatePayment,
    ConfirmPayment,
    ViewRequest,
    ListTenantRequests,
    ListLandlordRequests,
    ListAllRequests,
    DeleteRequest,
    ListPayments,
    ViewRevenue,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::CreateRequest,
        Operation::SetStatus,
        Operation::InitiatePayment,
        Operation::ConfirmPayment,
        Operation::ViewRequest,
        Operation::ListTenantRequests,
        Operation::ListLandlordRequests,
        Operation::ListAllRequests,
        Operation::DeleteRequest,
        Operation::ListPayments,
        Operation::ViewRevenue,
    ];

    pub const fn permitted_roles(self) -> &'static [Role] {
        match self {
            Operation::CreateRequest
            | Operation::InitiatePayment
            | Operation::ListTenantRequests => &[Role::Tenant],
            Operation::SetStatus => &[Role::Landlord],
            Operation::ListLandlordRequests => &[Role::Landlord, Role::Admin],
            Operation::ListAllRequests | Operation::ViewRevenue => &[Role::Admin],
            Operation::DeleteRequest => &[Role::Admin, Role::Tenant],
            Operation::ConfirmPayment | Operation::ViewRequest | Operation::ListPayments => {
                &[Role::Admin, Role::Landlord, Role::Tenant]
            }
        }
    }

    pub fn permits(self, role: Role) -> bool {
        self.permitted_roles().contains(&role)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Operation::CreateRequest => "create rental requests",
            Operation::SetStatus => "decide rental requests",
            Operation::InitiatePayment => "initiate payments",
            Operation::ConfirmPayment => "verify payments",
            Operation::ViewRequest => "view rental requests",
            Operation::ListTenantRequests => "list tenant rental requests",
            Operation::ListLandlordRequests => "list landlord rental requests",
            Operation::ListAllRequests => "list all rental requests",
            Operation::DeleteRequest => "delete rental requests",
            Operation::ListPayments => "list payments",
            Operation::ViewRevenue => "view revenue",
        }
    }
}

/// Reason a principal was turned away at the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("account is blocked")]
    Blocked,
    #[error("account is not active")]
    Inactive,
    #[error("{role} accounts may not {operation}", role = .role.label(), operation = .operation.label())]
    Role { role: Role, operation: Operation },
}

/// Account-status and capability check applied once per operation.
pub fn authorize(principal: &Principal, operation: Operation) -> Result<(), AccessDenied> {
    if principal.is_blocked {
        return Err(AccessDenied::Blocked);
    }
    if !principal.is_active {
        return Err(AccessDenied::Inactive);
    }
    if !operation.permits(principal.role) {
        return Err(AccessDenied::Role {
            role: principal.role,
            operation,
        });
    }
    Ok(())
}
