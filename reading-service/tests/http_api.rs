use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use reading_client::{
    db::{self, schema},
    domain::MeterType,
};
use reading_service::{
    auth::{Role, UserDirectory},
    config::UserConfig,
    extract::{Extraction, ReadingExtractor},
    http::{self, AppState},
    media::MediaStore,
    ReadingIngest, TimestampResolver, ZoneChain,
};
use reqwest::{
    multipart::{Form, Part},
    StatusCode,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

struct Unrecognized;

#[async_trait]
impl ReadingExtractor for Unrecognized {
    async fn extract(&self, _image: &[u8], _meter_type: MeterType) -> Extraction {
        Extraction::Unrecognized
    }
}

struct TestApp {
    base: String,
    client: reqwest::Client,
    _media: TempDir,
}

fn user(id: &str, role: Role) -> UserConfig {
    UserConfig {
        id: id.to_string(),
        token: format!("t-{id}"),
        role,
    }
}

async fn spawn_app() -> TestApp {
    let pool = db::connect("sqlite::memory:", 1).await.unwrap();
    schema::apply(&pool).await.unwrap();
    let media = tempfile::tempdir().unwrap();

    let ingest = ReadingIngest::new(
        pool,
        MediaStore::new(media.path()),
        Arc::new(TimestampResolver::new(ZoneChain::utc())),
        Arc::new(Unrecognized),
    );
    let users = UserDirectory::from_config(&[
        user("alice", Role::Reader),
        user("bob", Role::Viewer),
        user("carol", Role::Reader),
    ]);
    let app = http::router(AppState::new(ingest, users), 1024 * 1024);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    TestApp {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        _media: media,
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn create_meter(&self, who: &str, name: &str) -> i64 {
        let res = self
            .client
            .post(self.url("/meters"))
            .bearer_auth(format!("t-{who}"))
            .json(&json!({ "name": name, "meter_type": "cold", "cost_per_unit": 0.01 }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json::<Value>().await.unwrap()["id"].as_i64().unwrap()
    }

    async fn upload(&self, who: &str, form: Form) -> reqwest::Response {
        self.client
            .post(self.url("/readings"))
            .bearer_auth(format!("t-{who}"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
}

fn reading_form(meter_id: i64, photo: &[u8], iso: &str, value: Option<&str>) -> Form {
    let mut form = Form::new()
        .text("meter", meter_id.to_string())
        .text("notes", "kitchen sink")
        .text("original_timestamp", iso.to_string())
        .text("original_tz_offset", "+02:00")
        .part("image", Part::bytes(photo.to_vec()).file_name("meter.jpg"));
    if let Some(v) = value {
        form = form.text("reading_value_manual", v.to_string());
    }
    form
}

async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn manual_upload_resolves_client_timestamp() {
    let app = spawn_app().await;
    let meter = app.create_meter("alice", "Kitchen").await;

    let res = app
        .upload("alice", reading_form(meter, b"photo-1", "2024-01-05 10:00:00", Some("123.5")))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reading"]["ts"], "2024-01-05T10:00:00+02:00");
    assert_eq!(body["reading"]["reading_value"], 123.5);
    assert_eq!(body["reading"]["processed"], true);
    assert_eq!(body["timestamp_source"], "client_timestamp");
    assert!(body["notice"].is_null());

    let list: Value = app
        .client
        .get(app.url("/readings"))
        .bearer_auth("t-alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn second_reading_at_same_instant_conflicts() {
    let app = spawn_app().await;
    let meter = app.create_meter("alice", "Kitchen").await;

    let first = app
        .upload("alice", reading_form(meter, b"photo-1", "2024-01-05 10:00:00", Some("1")))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .upload("alice", reading_form(meter, b"photo-2", "2024-01-05T08:00:00Z", Some("2")))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(second).await, "DuplicateReading");
}

#[tokio::test]
async fn unrecognized_photo_is_kept_with_notice() {
    let app = spawn_app().await;
    let meter = app.create_meter("alice", "Kitchen").await;

    let res = app
        .upload("alice", reading_form(meter, b"photo-1", "2024-01-05 10:00:00", None))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reading"]["processed"], false);
    assert!(body["reading"]["reading_value"].is_null());
    assert!(body["notice"].as_str().unwrap().contains("manually"));
}

#[tokio::test]
async fn roles_and_ownership_are_enforced() {
    let app = spawn_app().await;
    let meter = app.create_meter("alice", "Kitchen").await;
    let res = app
        .upload("alice", reading_form(meter, b"photo-1", "2024-01-05 10:00:00", Some("5")))
        .await;
    let reading_id = res.json::<Value>().await.unwrap()["reading"]["id"].as_i64().unwrap();

    let anonymous = app.client.get(app.url("/meters")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(anonymous).await, "Unauthenticated");

    let viewer = app
        .upload("bob", reading_form(meter, b"photo-2", "2024-01-06 10:00:00", Some("6")))
        .await;
    assert_eq!(viewer.status(), StatusCode::FORBIDDEN);

    let foreign_meter = app
        .upload("carol", reading_form(meter, b"photo-3", "2024-01-07 10:00:00", Some("7")))
        .await;
    assert_eq!(foreign_meter.status(), StatusCode::FORBIDDEN);

    let foreign_delete = app
        .client
        .delete(app.url(&format!("/readings/{reading_id}")))
        .bearer_auth("t-carol")
        .send()
        .await
        .unwrap();
    assert_eq!(foreign_delete.status(), StatusCode::FORBIDDEN);

    let missing = app
        .client
        .delete(app.url("/readings/9999"))
        .bearer_auth("t-alice")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(missing).await, "NotFound");

    let own_delete = app
        .client
        .delete(app.url(&format!("/readings/{reading_id}")))
        .bearer_auth("t-alice")
        .send()
        .await
        .unwrap();
    assert_eq!(own_delete.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn inactive_meter_and_bad_values_are_bad_requests() {
    let app = spawn_app().await;
    let meter = app.create_meter("alice", "Kitchen").await;

    let bad_value = app
        .upload("alice", reading_form(meter, b"photo-1", "2024-01-05 10:00:00", Some("lots")))
        .await;
    assert_eq!(bad_value.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(bad_value).await, "ValidationError");

    let res = app
        .client
        .put(app.url(&format!("/meters/{meter}")))
        .bearer_auth("t-alice")
        .json(&json!({ "is_active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let inactive = app
        .upload("alice", reading_form(meter, b"photo-1", "2024-01-05 10:00:00", Some("1")))
        .await;
    assert_eq!(inactive.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn edit_sets_manual_value_and_timestamp() {
    let app = spawn_app().await;
    let meter = app.create_meter("alice", "Kitchen").await;
    let res = app
        .upload("alice", reading_form(meter, b"photo-1", "2024-01-05 10:00:00", None))
        .await;
    let reading_id = res.json::<Value>().await.unwrap()["reading"]["id"].as_i64().unwrap();

    let form = Form::new()
        .text("reading_value_manual", "88.25")
        .text("timestamp", "2024-01-05T09:30:00+01:00");
    let res = app
        .client
        .put(app.url(&format!("/readings/{reading_id}")))
        .bearer_auth("t-alice")
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reading"]["reading_value"], 88.25);
    assert_eq!(body["reading"]["processed"], true);
    assert_eq!(body["reading"]["ts"], "2024-01-05T09:30:00+01:00");
    assert_eq!(body["reading"]["notes"], "kitchen sink");
}

#[tokio::test]
async fn usage_endpoints_report_recent_consumption() {
    let app = spawn_app().await;
    let meter = app.create_meter("alice", "Kitchen").await;

    let now = OffsetDateTime::now_utc();
    for (days_ago, value, photo) in [(3, "100", b"p1"), (2, "110", b"p2"), (1, "105", b"p3")] {
        let ts = (now - Duration::days(days_ago)).format(&Rfc3339).unwrap();
        let res = app.upload("alice", reading_form(meter, photo, &ts, Some(value))).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let data: Value = app
        .client
        .get(app.url("/api/usage-data"))
        .bearer_auth("t-bob")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // bob owns no meters
    assert_eq!(data, json!({}));

    let data: Value = app
        .client
        .get(app.url("/api/usage-data"))
        .bearer_auth("t-alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let series = data["Kitchen"].as_array().unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0]["usage"], 10.0);
    assert_eq!(series[1]["usage"], 0.0);
    assert_eq!(series[1]["reading"], 105.0);

    let analytics: Value = app
        .client
        .get(app.url("/analytics"))
        .bearer_auth("t-alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let kitchen = &analytics["Kitchen"];
    assert_eq!(kitchen["total_readings"], 3);
    assert_eq!(kitchen["negative_count"], 1);
    assert_eq!(kitchen["predicted_monthly_usage"], 300.0);

    let usage: Value = app
        .client
        .get(app.url(&format!("/meters/{meter}/usage")))
        .bearer_auth("t-alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(usage.as_array().unwrap().len(), 3);
}
