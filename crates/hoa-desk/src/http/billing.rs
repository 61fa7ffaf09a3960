use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use super::response::{created, deleted, ok, ok_with, page, ApiResult};
use super::{ApiJson, ApiQuery, ApiState, Authenticated, RecordId};
use crate::auth::{Action, Resource};
use crate::export::{invoices_csv, InvoiceExportFilter};
use crate::services::{
    FeeFilter, FeeInput, InvoiceChanges, InvoiceFilter, NewInvoice, NewPayment, NewPenalty,
    RunDate,
};

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/fees", get(list_fees).post(create_fee))
        .route("/fees/:id", get(show_fee).put(update_fee).delete(delete_fee))
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route(
            "/invoices/:id",
            get(show_invoice).put(update_invoice).delete(delete_invoice),
        )
        .route("/invoices/:id/cancel", post(cancel_invoice))
        .route(
            "/invoices/:id/payments",
            get(list_payments).post(record_payment),
        )
        .route("/payments/:id", get(show_payment).delete(delete_payment))
        .route(
            "/invoices/:id/penalties",
            get(list_penalties).post(add_penalty),
        )
        .route("/penalties/:id", get(show_penalty).delete(delete_penalty))
        .route("/operations/process-recurring-fees", post(process_recurring_fees))
        .route("/operations/apply-late-penalties", post(apply_late_penalties))
        .route("/operations/expire-leases", post(expire_leases))
        .route("/exports/invoices", get(export_invoices))
}

async fn list_fees(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<FeeFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Fees, Action::View)?;
    page(state.services.fees.list(&filter)?)
}

async fn show_fee(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Fees, Action::View)?;
    ok(state.services.fees.get(id)?)
}

async fn create_fee(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(input): ApiJson<FeeInput>,
) -> ApiResult {
    auth.user.authorize(Resource::Fees, Action::Create)?;
    created("Fee created successfully.", state.services.fees.create(input)?)
}

async fn update_fee(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(input): ApiJson<FeeInput>,
) -> ApiResult {
    auth.user.authorize(Resource::Fees, Action::Update)?;
    ok_with("Fee updated successfully.", state.services.fees.update(id, input)?)
}

async fn delete_fee(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Fees, Action::Delete)?;
    state.services.fees.delete(id)?;
    deleted("Fee deleted successfully.")
}

async fn list_invoices(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<InvoiceFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Invoices, Action::View)?;
    page(state.services.invoices.list(&filter, auth.user.resident_scope())?)
}

async fn show_invoice(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Invoices, Action::View)?;
    let invoice = state.services.invoices.get(id)?;
    auth.user.ensure_visible(Resource::Invoices, &[invoice.billed_to])?;
    ok(invoice)
}

async fn create_invoice(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(input): ApiJson<NewInvoice>,
) -> ApiResult {
    auth.user.authorize(Resource::Invoices, Action::Create)?;
    created("Invoice created successfully.", state.services.invoices.create(input)?)
}

async fn update_invoice(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(changes): ApiJson<InvoiceChanges>,
) -> ApiResult {
    auth.user.authorize(Resource::Invoices, Action::Update)?;
    ok_with("Invoice updated successfully.", state.services.invoices.update(id, changes)?)
}

async fn cancel_invoice(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Invoices, Action::Update)?;
    ok_with("Invoice cancelled successfully.", state.services.invoices.cancel(id)?)
}

async fn delete_invoice(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Invoices, Action::Delete)?;
    state.services.invoices.delete(id)?;
    deleted("Invoice deleted successfully.")
}

async fn list_payments(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Payments, Action::View)?;
    let invoice = state.services.invoices.get(id)?;
    auth.user.ensure_visible(Resource::Payments, &[invoice.billed_to])?;
    ok(state.services.invoices.payments(id)?)
}

async fn show_payment(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Payments, Action::View)?;
    let payment = state.services.invoices.payment(id)?;
    if auth.user.resident_scope().is_some() {
        let invoice = state.services.invoices.get(payment.invoice_id)?;
        auth.user.ensure_visible(Resource::Payments, &[invoice.billed_to])?;
    }
    ok(payment)
}

async fn record_payment(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(input): ApiJson<NewPayment>,
) -> ApiResult {
    auth.user.authorize(Resource::Payments, Action::Create)?;
    let payment = state
        .services
        .invoices
        .record_payment(id, input, Some(auth.user.id))?;
    created("Payment recorded successfully.", payment)
}

async fn delete_payment(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Payments, Action::Delete)?;
    state.services.invoices.delete_payment(id)?;
    deleted("Payment deleted successfully.")
}

async fn list_penalties(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Penalties, Action::View)?;
    ok(state.services.invoices.penalties(id)?)
}

async fn show_penalty(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Penalties, Action::View)?;
    ok(state.services.invoices.penalty(id)?)
}

async fn add_penalty(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(input): ApiJson<NewPenalty>,
) -> ApiResult {
    auth.user.authorize(Resource::Penalties, Action::Create)?;
    created("Penalty added successfully.", state.services.invoices.add_penalty(id, input)?)
}

async fn delete_penalty(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Penalties, Action::Delete)?;
    state.services.invoices.delete_penalty(id)?;
    deleted("Penalty deleted successfully.")
}

async fn process_recurring_fees(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(run): ApiJson<RunDate>,
) -> ApiResult {
    auth.user.authorize(Resource::Operations, Action::Run)?;
    let today = run.today.unwrap_or_else(|| state.services.context().today());
    let fees = state.services.fees.process_recurring(today)?;
    let invoices_created: usize = fees.iter().map(|fee| fee.invoices_created).sum();
    ok_with(
        "Recurring fees processed.",
        json!({ "today": today, "invoices_created": invoices_created, "fees": fees }),
    )
}

async fn apply_late_penalties(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(run): ApiJson<RunDate>,
) -> ApiResult {
    auth.user.authorize(Resource::Operations, Action::Run)?;
    let today = run.today.unwrap_or_else(|| state.services.context().today());
    let penalties = state.services.invoices.apply_late_penalties(today)?;
    ok_with(
        "Late penalties applied.",
        json!({ "today": today, "penalties_applied": penalties.len(), "penalties": penalties }),
    )
}

async fn expire_leases(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(run): ApiJson<RunDate>,
) -> ApiResult {
    auth.user.authorize(Resource::Operations, Action::Run)?;
    let today = run.today.unwrap_or_else(|| state.services.context().today());
    let leases = state.services.leases.expire_due(today)?;
    ok_with(
        "Due leases expired.",
        json!({ "today": today, "leases_expired": leases.len(), "leases": leases }),
    )
}

async fn export_invoices(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<InvoiceExportFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Exports, Action::Run)?;
    let context = state.services.context();
    let today = context.today();
    let csv = invoices_csv(context.store(), today, &filter, auth.user.resident_scope())?;
    let disposition = format!("attachment; filename=\"invoices-{}.csv\"", today.format("%Y%m%d"));
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}
