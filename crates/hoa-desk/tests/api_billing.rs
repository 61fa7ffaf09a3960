mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use common::{id_of, TestApp};
use hoa_desk::domain::Role;
use serde_json::json;

struct Billing {
    app: TestApp,
    admin: String,
    tenant: String,
    tenant_id: u64,
    building_id: u64,
    unit_id: u64,
}

/// One rented unit in Cedar Court with a monthly service charge.
async fn rented_unit_with_fee() -> Billing {
    let app = TestApp::new();
    let (_, admin) = app.session(Role::Admin).await;
    let (tenant_id, tenant) = app.session(Role::Tenant).await;
    let (building_id, unit_id) = app.building_with_unit(&admin, "Cedar Court", "A1").await;

    let (status, body) = app
        .post(
            "/v1/leases",
            &admin,
            json!({
                "unit_id": unit_id,
                "tenant_id": tenant_id,
                "start_date": "2026-01-01",
                "end_date": "2026-12-31",
                "monthly_rent": 1000
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = app
        .post(
            "/v1/fees",
            &admin,
            json!({
                "name": "Service charge",
                "building_id": building_id,
                "amount": "150.00",
                "frequency": "monthly",
                "start_date": "2026-01-01"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["applies_to"], "occupied_units");

    Billing {
        app,
        admin,
        tenant,
        tenant_id,
        building_id,
        unit_id,
    }
}

#[tokio::test]
async fn recurring_fees_invoice_occupied_units_once_per_period() {
    let Billing {
        app,
        admin,
        tenant_id,
        building_id,
        ..
    } = rented_unit_with_fee().await;
    let (status, body) = app
        .post("/v1/units", &admin, json!({ "building_id": building_id, "unit_number": "A2" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = app
        .post("/v1/operations/process-recurring-fees", &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["today"], "2026-03-10");
    assert_eq!(body["data"]["invoices_created"], 1);

    let (_, body) = app
        .post("/v1/operations/process-recurring-fees", &admin, json!({}))
        .await;
    assert_eq!(body["data"]["invoices_created"], 0);

    let (status, body) = app.get("/v1/invoices", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    let invoice = &body["data"][0];
    assert_eq!(invoice["invoice_number"], "INV-202603-000001");
    assert_eq!(invoice["billed_to"], tenant_id);
    assert_eq!(invoice["billing_period"], "2026-03");
    assert_eq!(invoice["amount"], "150.00");
    assert_eq!(invoice["due_date"], "2026-03-25");
    assert_eq!(invoice["status"], "unpaid");
}

#[tokio::test]
async fn payments_and_penalties_update_the_balance() {
    let Billing {
        app,
        admin,
        tenant,
        ..
    } = rented_unit_with_fee().await;
    app.post("/v1/operations/process-recurring-fees", &admin, json!({}))
        .await;
    let (_, body) = app.get("/v1/invoices", &admin).await;
    let invoice_id = body["data"][0]["id"].as_u64().expect("invoice id");

    let (status, body) = app
        .post(
            &format!("/v1/invoices/{invoice_id}/payments"),
            &admin,
            json!({ "amount": 50, "method": "mobile_money", "reference": "QX12" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["paid_on"], "2026-03-10");
    let payment_id = id_of(&body);

    let (status, body) = app
        .post(
            &format!("/v1/invoices/{invoice_id}/payments"),
            &admin,
            json!({ "amount": 200, "method": "cash" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["amount"].is_array());

    let (status, body) = app
        .post(
            "/v1/operations/apply-late-penalties",
            &admin,
            json!({ "today": "2026-04-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["penalties_applied"], 1);
    assert_eq!(body["data"]["penalties"][0]["amount"], "7.50");

    let (_, body) = app
        .post(
            "/v1/operations/apply-late-penalties",
            &admin,
            json!({ "today": "2026-04-02" }),
        )
        .await;
    assert_eq!(body["data"]["penalties_applied"], 0);

    let (status, body) = app.get(&format!("/v1/invoices/{invoice_id}"), &tenant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount_paid"], "50.00");
    assert_eq!(body["data"]["penalty_total"], "7.50");
    assert_eq!(body["data"]["status"], "partially_paid");

    let (status, body) = app
        .get(&format!("/v1/invoices/{invoice_id}/penalties"), &admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = app.delete(&format!("/v1/payments/{payment_id}"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get(&format!("/v1/invoices/{invoice_id}"), &admin).await;
    assert_eq!(body["data"]["amount_paid"], "0.00");
    assert_eq!(body["data"]["status"], "unpaid");
}

#[tokio::test]
async fn residents_see_only_their_invoices_and_cannot_run_jobs() {
    let Billing {
        app,
        admin,
        tenant,
        unit_id,
        ..
    } = rented_unit_with_fee().await;
    let (status, body) = app
        .post(
            "/v1/invoices",
            &admin,
            json!({ "unit_id": unit_id, "billed_to": null, "description": "Key replacement", "amount": 25 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    app.post("/v1/operations/process-recurring-fees", &admin, json!({}))
        .await;

    let (_, body) = app.get("/v1/invoices", &admin).await;
    assert_eq!(body["meta"]["total"], 2);
    let (status, body) = app.get("/v1/invoices", &tenant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 2);

    let (status, _) = app
        .post("/v1/operations/process-recurring-fees", &tenant, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/v1/exports/invoices", &tenant).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .post(
            "/v1/fees",
            &tenant,
            json!({ "name": "Gym", "amount": 10, "frequency": "monthly", "start_date": "2026-03-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn accountants_export_invoices_as_csv() {
    let Billing { app, admin, .. } = rented_unit_with_fee().await;
    let (_, accountant) = app.session(Role::Accountant).await;

    let (status, body) = app
        .post("/v1/operations/process-recurring-fees", &accountant, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (_, body) = app.get("/v1/invoices", &admin).await;
    let invoice_id = body["data"][0]["id"].as_u64().expect("invoice id");
    let (status, _) = app
        .post(
            &format!("/v1/invoices/{invoice_id}/payments"),
            &accountant,
            json!({ "amount": "150.00", "method": "bank_transfer" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/exports/invoices?status=paid")
        .header(header::AUTHORIZATION, format!("Bearer {accountant}"))
        .body(Body::empty())
        .expect("request");
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"invoices-20260310.csv\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let csv = String::from_utf8(bytes.to_vec()).expect("utf-8");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            "invoice_number,unit,building,billed_to,issue_date,due_date,amount,penalties,paid,balance,status",
            "INV-202603-000001,A1,Cedar Court,Test tenant,2026-03-10,2026-03-25,150.00,0.00,150.00,0.00,paid",
        ]
    );
}

#[tokio::test]
async fn cancelled_invoices_refuse_payments() {
    let Billing { app, admin, .. } = rented_unit_with_fee().await;
    app.post("/v1/operations/process-recurring-fees", &admin, json!({}))
        .await;
    let (_, body) = app.get("/v1/invoices", &admin).await;
    let invoice_id = body["data"][0]["id"].as_u64().expect("invoice id");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/v1/invoices/{invoice_id}/cancel"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, _) = app
        .post(
            &format!("/v1/invoices/{invoice_id}/payments"),
            &admin,
            json!({ "amount": 10, "method": "cash" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
