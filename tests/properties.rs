//! Property hierarchy integration tests.

mod common;

use common::{create_hierarchy, create_owner, TestApp, PASSWORD};
use serde_json::{json, Value};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn create_and_fetch_estate() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;

    // Act
    let response = app
        .post(
            "/estates",
            &owner.access_token,
            json!({ "name": "Harbour View", "estate_type": "mixed", "address": "1 Quay St" }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 201);
    let estate: Value = response.json().await.unwrap();
    assert_eq!(estate["estate_type"], "mixed");
    assert_eq!(estate["company_id"].as_i64().unwrap() as i32, owner.company());

    let id = estate["id"].as_i64().unwrap();
    let fetched = app.get(&format!("/estates/{}", id), &owner.access_token).await;
    assert_eq!(fetched.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn unknown_estate_type_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;

    // Act
    let response = app
        .post(
            "/estates",
            &owner.access_token,
            json!({ "name": "Odd", "estate_type": "industrial" }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
#[serial]
async fn single_unit_building_gets_its_house() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;

    // Act
    let response = app
        .post(
            "/buildings",
            &owner.access_token,
            json!({ "name": "Cottage", "building_type": "single_unit" }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["unit"]["unit_type"], "house");
    let building_id = body["building"]["id"].as_i64().unwrap();

    let second = app
        .post(
            "/units",
            &owner.access_token,
            json!({ "building_id": building_id, "number": "2", "unit_type": "house" }),
        )
        .await;
    assert_eq!(second.status().as_u16(), 422);
    let err: Value = second.json().await.unwrap();
    assert_eq!(err["field"], "building_id");
}

#[tokio::test]
#[serial]
async fn multi_unit_building_rejects_house_and_duplicate_numbers() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (_, building_id, _) = create_hierarchy(&app, &owner).await;

    // Act
    let house = app
        .post(
            "/units",
            &owner.access_token,
            json!({ "building_id": building_id, "number": "9", "unit_type": "house" }),
        )
        .await;
    let duplicate = app
        .post(
            "/units",
            &owner.access_token,
            json!({ "building_id": building_id, "number": "1A", "unit_type": "apartment" }),
        )
        .await;

    // Assert
    assert_eq!(house.status().as_u16(), 422);
    let body: Value = house.json().await.unwrap();
    assert_eq!(body["field"], "unit_type");

    assert_eq!(duplicate.status().as_u16(), 422);
    let body: Value = duplicate.json().await.unwrap();
    assert_eq!(body["field"], "number");
}

#[tokio::test]
#[serial]
async fn building_in_foreign_estate_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let other = create_owner(&app).await;
    let (foreign_estate, _, _) = create_hierarchy(&app, &other).await;

    // Act
    let response = app
        .post(
            "/buildings",
            &owner.access_token,
            json!({ "name": "Intruder", "building_type": "complex", "estate_id": foreign_estate }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "estate_id");
}

#[tokio::test]
#[serial]
async fn foreign_property_returns_403_and_missing_returns_404() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let other = create_owner(&app).await;
    let (_, _, foreign_unit) = create_hierarchy(&app, &other).await;

    // Act
    let foreign = app
        .get(&format!("/units/{}", foreign_unit), &owner.access_token)
        .await;
    let missing = app.get("/units/999999", &owner.access_token).await;

    // Assert
    assert_eq!(foreign.status().as_u16(), 403);
    assert_eq!(missing.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn lists_are_scoped_and_filtered_by_parent() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let other = create_owner(&app).await;
    let (estate_id, building_id, _) = create_hierarchy(&app, &owner).await;
    create_hierarchy(&app, &other).await;
    app.post(
        "/buildings",
        &owner.access_token,
        json!({ "name": "Standalone", "building_type": "complex" }),
    )
    .await;

    // Act
    let all: Value = app
        .get("/buildings", &owner.access_token)
        .await
        .json()
        .await
        .unwrap();
    let in_estate: Value = app
        .get(
            &format!("/buildings?parent_id={}", estate_id),
            &owner.access_token,
        )
        .await
        .json()
        .await
        .unwrap();
    let units: Value = app
        .get(
            &format!("/units?parent_id={}", building_id),
            &owner.access_token,
        )
        .await
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(all["pagination"]["total_count"], 2);
    assert_eq!(in_estate["pagination"]["total_count"], 1);
    assert_eq!(units["pagination"]["total_count"], 1);
}

#[tokio::test]
#[serial]
async fn deleting_an_estate_cascades_down() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (estate_id, building_id, unit_id) = create_hierarchy(&app, &owner).await;
    let room: Value = app
        .post(
            "/subunits",
            &owner.access_token,
            json!({ "unit_id": unit_id, "name": "Box room", "sub_unit_type": "room" }),
        )
        .await
        .json()
        .await
        .unwrap();
    let room_id = room["id"].as_i64().unwrap();

    // Act
    let response = app
        .delete(&format!("/estates/{}", estate_id), &owner.access_token)
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 204);
    for path in [
        format!("/estates/{}", estate_id),
        format!("/buildings/{}", building_id),
        format!("/units/{}", unit_id),
        format!("/subunits/{}", room_id),
    ] {
        let gone = app.get(&path, &owner.access_token).await;
        assert_eq!(gone.status().as_u16(), 404, "{} still exists", path);
    }
}

#[tokio::test]
#[serial]
async fn tenant_can_read_but_not_write() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let (estate_id, _, _) = create_hierarchy(&app, &owner).await;
    let tenant = app.verified_user(None).await;
    app.invite(&owner, &tenant.email, "tenant").await;
    let tenant = app.login_user(&tenant.email, PASSWORD).await.unwrap();

    // Act
    let read = app
        .get(&format!("/estates/{}", estate_id), &tenant.access_token)
        .await;
    let write = app
        .post(
            "/estates",
            &tenant.access_token,
            json!({ "name": "Not mine", "estate_type": "residential" }),
        )
        .await;
    let delete = app
        .delete(&format!("/estates/{}", estate_id), &tenant.access_token)
        .await;

    // Assert
    assert_eq!(read.status().as_u16(), 200);
    assert_eq!(write.status().as_u16(), 403);
    assert_eq!(delete.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn company_user_can_create_properties() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_owner(&app).await;
    let staff = app.verified_user(None).await;
    app.invite(&owner, &staff.email, "company_user").await;
    let staff = app.login_user(&staff.email, PASSWORD).await.unwrap();

    // Act
    let response = app
        .post(
            "/estates",
            &staff.access_token,
            json!({ "name": "Staff Estate", "estate_type": "commercial" }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 201);
}
