//! Company member management integration tests.

mod common;

use common::{create_owner, TestApp, PASSWORD};
use serde_json::{json, Value};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn invite_new_address_creates_pending_user_and_outbox_mail() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let email = TestApp::unique_email();
    let before = app.count_outbox_events("access.invited");

    // Act
    let response = app
        .post(
            "/members/invite",
            &owner.access_token,
            json!({ "email": email, "role": "cu", "full_name": "New Person" }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "created");
    assert_eq!(body["user_created"], true);
    assert_eq!(body["member"]["status"], "pending");
    assert_eq!(body["member"]["role_code"], "cu");

    assert_eq!(app.count_outbox_events("access.invited"), before + 1);
    let event = app.get_latest_outbox_event("access.invited").unwrap();
    assert_eq!(event.payload["data"]["new_user"], true);
    assert!(event.payload["data"]["verification_token"].is_string());
}

#[tokio::test]
#[serial]
async fn invite_verified_user_is_active_immediately() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let member = app.verified_user(None).await;

    // Act
    let body = app.invite(&owner, &member.email, "buyer").await;

    // Assert
    assert_eq!(body["user_created"], false);
    assert_eq!(body["member"]["status"], "active");
    assert_eq!(body["member"]["role"], "Buyer");
}

#[tokio::test]
#[serial]
async fn invite_existing_member_conflicts_unless_updating() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let member = app.verified_user(None).await;
    app.invite(&owner, &member.email, "tenant").await;

    // Act
    let conflict = app
        .post(
            "/members/invite",
            &owner.access_token,
            json!({ "email": member.email, "role": "company_user" }),
        )
        .await;
    let updated = app
        .post(
            "/members/invite",
            &owner.access_token,
            json!({ "email": member.email, "role": "company_user", "update_existing": true }),
        )
        .await;

    // Assert
    assert_eq!(conflict.status().as_u16(), 409);
    assert_eq!(updated.status().as_u16(), 200);
    let body: Value = updated.json().await.unwrap();
    assert_eq!(body["outcome"], "role_updated");
    assert_eq!(body["member"]["role_code"], "cu");
}

#[tokio::test]
#[serial]
async fn invite_rejects_global_and_unknown_roles() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;

    // Act
    let global = app
        .post(
            "/members/invite",
            &owner.access_token,
            json!({ "email": TestApp::unique_email(), "role": "superadmin" }),
        )
        .await;
    let unknown = app
        .post(
            "/members/invite",
            &owner.access_token,
            json!({ "email": TestApp::unique_email(), "role": "landlord" }),
        )
        .await;

    // Assert
    assert_eq!(global.status().as_u16(), 422);
    let body: Value = global.json().await.unwrap();
    assert_eq!(body["field"], "role");
    assert_eq!(unknown.status().as_u16(), 422);
}

#[tokio::test]
#[serial]
async fn company_user_cannot_invite() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let member = app.verified_user(None).await;
    app.invite(&owner, &member.email, "company_user").await;
    let member = app.login_user(&member.email, PASSWORD).await.unwrap();

    // Act
    let response = app
        .post(
            "/members/invite",
            &member.access_token,
            json!({ "email": TestApp::unique_email(), "role": "tenant" }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn list_members_is_paginated_and_company_scoped() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let other = create_owner(&app).await;
    app.invite(&owner, &TestApp::unique_email(), "tenant").await;

    // Act
    let response = app
        .get("/members?page=1&per_page=10", &owner.access_token)
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["pagination"]["total_count"], 2);
    let emails: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["email"].as_str().unwrap())
        .collect();
    assert!(emails.contains(&owner.email.as_str()));
    assert!(!emails.contains(&other.email.as_str()));
}

#[tokio::test]
#[serial]
async fn change_role_updates_member() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let member = app.verified_user(None).await;
    let invite = app.invite(&owner, &member.email, "tenant").await;
    let access_id = invite["member"]["access_id"].as_i64().unwrap();

    // Act
    let response = app
        .put(
            &format!("/members/{}/role", access_id),
            &owner.access_token,
            json!({ "role": "company_owner" }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["role"], "Company Owner");
    assert_eq!(body["email"].as_str().unwrap(), member.email);
}

#[tokio::test]
#[serial]
async fn remove_member_of_other_company_returns_404() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let other = create_owner(&app).await;
    let invite = app
        .invite(&other, &TestApp::unique_email(), "tenant")
        .await;
    let foreign_access = invite["member"]["access_id"].as_i64().unwrap();

    // Act
    let response = app
        .delete(
            &format!("/members/{}", foreign_access),
            &owner.access_token,
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn second_invite_before_registration_still_allows_setting_password() {
    // Arrange
    let app = TestApp::spawn().await;
    let first_company = create_owner(&app).await;
    let second_company = create_owner(&app).await;
    let email = TestApp::unique_email();
    app.invite(&first_company, &email, "tenant").await;
    let invitee = app.user_id_by_email(&email);
    let first_token = app.verification_token(invitee);

    // Act
    let second = app.invite(&second_company, &email, "buyer").await;
    let event = app.get_latest_outbox_event("access.invited").unwrap();
    let second_token = app.verification_token(invitee);
    let stale = app
        .post_public(
            "/auth/complete-registration",
            json!({ "token": first_token, "password": PASSWORD }),
        )
        .await;
    let verify_only = app
        .post_public("/auth/verify-email", json!({ "token": second_token }))
        .await;
    let completed = app
        .post_public(
            "/auth/complete-registration",
            json!({ "token": second_token, "password": PASSWORD }),
        )
        .await;

    // Assert
    assert_eq!(second["user_created"], false);
    assert_eq!(event.payload["data"]["new_user"], false);
    assert_eq!(event.payload["data"]["needs_password"], true);
    assert_eq!(
        event.payload["data"]["verification_token"].as_str().unwrap(),
        second_token.to_string()
    );
    assert_eq!(stale.status().as_u16(), 400);
    assert_eq!(verify_only.status().as_u16(), 400);
    assert_eq!(completed.status().as_u16(), 200);

    assert!(app.login_user(&email, PASSWORD).await.is_ok());
    assert_eq!(
        app.access_status(invitee, first_company.company()).as_deref(),
        Some("active")
    );
    assert_eq!(
        app.access_status(invitee, second_company.company()).as_deref(),
        Some("active")
    );
}
