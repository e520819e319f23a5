//! Financial category and transaction integration tests.

mod common;

use common::{create_hierarchy, create_owner, TestApp, TestUser, PASSWORD};
use serde_json::{json, Value};
use serial_test::serial;

async fn category(app: &TestApp, user: &TestUser, name: &str, kind: &str) -> i64 {
    let response = app
        .post(
            "/finances/categories",
            &user.access_token,
            json!({ "name": name, "category_type": kind }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

#[tokio::test]
#[serial]
async fn record_transaction_against_unit() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, _, unit_id) = create_hierarchy(&app, &owner).await;
    let rent = category(&app, &owner, "Rent", "income").await;

    // Act
    let response = app
        .post(
            "/finances/transactions",
            &owner.access_token,
            json!({
                "category_id": rent,
                "transaction_type": "income",
                "target_kind": "unit",
                "target_id": unit_id,
                "amount_cents": 125000,
                "transaction_date": "2024-03-01",
                "is_paid": true
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["amount_cents"], 125000);
    assert_eq!(body["target_kind"], "unit");
    assert_eq!(body["created_by"].as_str().unwrap(), owner.id.to_string());
}

#[tokio::test]
#[serial]
async fn category_type_must_match_transaction_type() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, building_id, _) = create_hierarchy(&app, &owner).await;
    let repairs = category(&app, &owner, "Repairs", "expense").await;

    // Act
    let response = app
        .post(
            "/finances/transactions",
            &owner.access_token,
            json!({
                "category_id": repairs,
                "transaction_type": "income",
                "target_kind": "building",
                "target_id": building_id,
                "amount_cents": 5000,
                "transaction_date": "2024-03-02"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "category_id");
}

#[tokio::test]
#[serial]
async fn sub_units_cannot_carry_transactions() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, _, unit_id) = create_hierarchy(&app, &owner).await;
    let room: Value = app
        .post(
            "/subunits",
            &owner.access_token,
            json!({ "unit_id": unit_id, "name": "Shop front", "sub_unit_type": "store" }),
        )
        .await
        .json()
        .await
        .unwrap();
    let rent = category(&app, &owner, "Rent", "income").await;

    // Act
    let response = app
        .post(
            "/finances/transactions",
            &owner.access_token,
            json!({
                "category_id": rent,
                "transaction_type": "income",
                "target_kind": "subunit",
                "target_id": room["id"],
                "amount_cents": 100,
                "transaction_date": "2024-03-03"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "target_kind");
}

#[tokio::test]
#[serial]
async fn negative_amount_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (estate_id, _, _) = create_hierarchy(&app, &owner).await;
    let fees = category(&app, &owner, "Fees", "expense").await;

    // Act
    let response = app
        .post(
            "/finances/transactions",
            &owner.access_token,
            json!({
                "category_id": fees,
                "transaction_type": "expense",
                "target_kind": "estate",
                "target_id": estate_id,
                "amount_cents": -1,
                "transaction_date": "2024-03-04"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "amount_cents");
}

#[tokio::test]
#[serial]
async fn categories_of_other_companies_are_invisible() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let other = create_owner(&app).await;
    let (_, _, unit_id) = create_hierarchy(&app, &owner).await;
    let foreign = category(&app, &other, "Rent", "income").await;
    category(&app, &owner, "Insurance", "expense").await;

    // Act
    let listed: Vec<Value> = app
        .get("/finances/categories?type=expense", &owner.access_token)
        .await
        .json()
        .await
        .unwrap();
    let response = app
        .post(
            "/finances/transactions",
            &owner.access_token,
            json!({
                "category_id": foreign,
                "transaction_type": "income",
                "target_kind": "unit",
                "target_id": unit_id,
                "amount_cents": 100,
                "transaction_date": "2024-03-05"
            }),
        )
        .await;

    // Assert
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "Insurance");
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "category_id");
}

#[tokio::test]
#[serial]
async fn list_transactions_filters_by_target() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (estate_id, _, unit_id) = create_hierarchy(&app, &owner).await;
    let rent = category(&app, &owner, "Rent", "income").await;
    for (kind, id) in [("unit", unit_id), ("unit", unit_id), ("estate", estate_id)] {
        let response = app
            .post(
                "/finances/transactions",
                &owner.access_token,
                json!({
                    "category_id": rent,
                    "transaction_type": "income",
                    "target_kind": kind,
                    "target_id": id,
                    "amount_cents": 1000,
                    "transaction_date": "2024-04-01"
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
    }

    // Act
    let all: Value = app
        .get("/finances/transactions", &owner.access_token)
        .await
        .json()
        .await
        .unwrap();
    let unit_only: Value = app
        .get(
            &format!("/finances/transactions?target_kind=unit&target_id={}", unit_id),
            &owner.access_token,
        )
        .await
        .json()
        .await
        .unwrap();
    let partial = app
        .get("/finances/transactions?target_kind=unit", &owner.access_token)
        .await;

    // Assert
    assert_eq!(all["pagination"]["total_count"], 3);
    assert_eq!(unit_only["pagination"]["total_count"], 2);
    assert_eq!(partial.status().as_u16(), 400);
}

#[tokio::test]
#[serial]
async fn tenant_cannot_record_transactions() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, _, unit_id) = create_hierarchy(&app, &owner).await;
    let rent = category(&app, &owner, "Rent", "income").await;
    let tenant = app.verified_user(None).await;
    app.invite(&owner, &tenant.email, "tenant").await;
    let tenant = app.login_user(&tenant.email, PASSWORD).await.unwrap();

    // Act
    let response = app
        .post(
            "/finances/transactions",
            &tenant.access_token,
            json!({
                "category_id": rent,
                "transaction_type": "income",
                "target_kind": "unit",
                "target_id": unit_id,
                "amount_cents": 1000,
                "transaction_date": "2024-04-02"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn record_bonded_purchase_with_totals() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, _, unit_id) = create_hierarchy(&app, &owner).await;

    // Act
    let response = app
        .post(
            "/finances/purchases",
            &owner.access_token,
            json!({
                "target_kind": "unit",
                "target_id": unit_id,
                "purchase_date": "2023-11-15",
                "purchase_type": "individual",
                "purchase_price_cents": 150_000_000,
                "transfer_duty_cents": 4_500_000,
                "conveyancing_fees_cents": 2_000_000,
                "down_payment_cents": 30_000_000,
                "financing_cents": 120_000_000,
                "bond_registration_cents": 1_500_000,
                "bond_initiation_cents": 600_000
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["purchase_type"], "individual");
    assert_eq!(body["totals"]["transfer_cents"], 6_500_000);
    assert_eq!(body["totals"]["bond_cents"], 2_100_000);
    assert_eq!(body["totals"]["acquisition_cents"], 158_600_000);

    let listed: Vec<Value> = app
        .get(
            &format!("/finances/purchases?target_kind=unit&target_id={}", unit_id),
            &owner.access_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
#[serial]
async fn purchase_cannot_carry_both_transfer_duty_and_vat() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, building_id, _) = create_hierarchy(&app, &owner).await;

    // Act
    let response = app
        .post(
            "/finances/purchases",
            &owner.access_token,
            json!({
                "target_kind": "building",
                "target_id": building_id,
                "purchase_date": "2023-06-01",
                "purchase_price_cents": 900_000_000,
                "transfer_duty_cents": 10_000,
                "is_vat_applicable": true,
                "vat_cents": 135_000_000
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "transfer_duty_cents");
}

#[tokio::test]
#[serial]
async fn purchase_funding_must_match_price() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (estate_id, _, _) = create_hierarchy(&app, &owner).await;

    // Act
    let response = app
        .post(
            "/finances/purchases",
            &owner.access_token,
            json!({
                "target_kind": "estate",
                "target_id": estate_id,
                "purchase_date": "2022-01-10",
                "purchase_price_cents": 500_000_000,
                "down_payment_cents": 50_000_000,
                "financing_cents": 400_000_000
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "financing_cents");
}

#[tokio::test]
#[serial]
async fn recurring_template_requires_matching_category() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, _, unit_id) = create_hierarchy(&app, &owner).await;
    let levies = category(&app, &owner, "Levies", "expense").await;

    // Act
    let response = app
        .post(
            "/finances/recurring",
            &owner.access_token,
            json!({
                "category_id": levies,
                "transaction_type": "income",
                "target_kind": "unit",
                "target_id": unit_id,
                "amount_cents": 250_000,
                "frequency": "monthly",
                "start_date": "2024-01-01"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "category_id");
}

#[tokio::test]
#[serial]
async fn generating_recurring_books_occurrences_until_end_date() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, _, unit_id) = create_hierarchy(&app, &owner).await;
    let rent = category(&app, &owner, "Rent", "income").await;
    let template: Value = app
        .post(
            "/finances/recurring",
            &owner.access_token,
            json!({
                "category_id": rent,
                "transaction_type": "income",
                "target_kind": "unit",
                "target_id": unit_id,
                "amount_cents": 950_000,
                "frequency": "monthly",
                "start_date": "2024-01-31",
                "end_date": "2024-02-29"
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    let generate = format!("/finances/recurring/{}/generate", template["id"]);

    // Act
    let first = app.post(&generate, &owner.access_token, json!({})).await;
    let first_status = first.status().as_u16();
    let first: Value = first.json().await.unwrap();
    let second: Value = app
        .post(&generate, &owner.access_token, json!({}))
        .await
        .json()
        .await
        .unwrap();
    let exhausted = app.post(&generate, &owner.access_token, json!({})).await;

    // Assert
    assert_eq!(first_status, 201);
    assert_eq!(first["transaction"]["transaction_date"], "2024-01-31");
    assert_eq!(first["transaction"]["amount_cents"], 950_000);
    assert_eq!(first["recurring"]["next_due_date"], "2024-02-29");
    assert_eq!(first["recurring"]["is_active"], true);
    assert_eq!(second["transaction"]["transaction_date"], "2024-02-29");
    assert_eq!(second["recurring"]["is_active"], false);
    assert_eq!(exhausted.status().as_u16(), 409);

    let booked: Value = app
        .get(
            &format!("/finances/transactions?target_kind=unit&target_id={}", unit_id),
            &owner.access_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(booked["pagination"]["total_count"], 2);
}
