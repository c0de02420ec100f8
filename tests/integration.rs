use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use drivemate_dispatch::api::rest::router;
use drivemate_dispatch::config::Config;
use drivemate_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

const DRIVER_HEADER: &str = "x-driver-id";

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(&Config::default()));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn driver_request(method: &str, uri: &str, driver_id: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header(DRIVER_HEADER, driver_id)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn register_driver(app: &axum::Router, first_name: &str, contact: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "first_name": first_name,
                "last_name": "Fernando",
                "email": format!("{}@drivemate.test", first_name.to_lowercase()),
                "contact_number": contact,
                "vehicle": {
                    "vehicle_type": "Car",
                    "capacity": 4,
                    "license": "CP-CAB-5521"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    body_json(response).await["id"].as_str().unwrap().to_string()
}

async fn create_job(app: &axum::Router, post_type: &str, start: &str, end: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/jobs",
            json!({
                "client_name": "Hiroshi Tanaka",
                "nationality": "Japanese",
                "number_of_passengers": 2,
                "pickup_location": "Galle Fort",
                "start_date": start,
                "end_date": end,
                "pickup_time": start,
                "distance": 42.0,
                "payment_amount": 60.0,
                "additional_details": "Child seat needed",
                "post_type": post_type
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    body_json(response).await["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["jobs"], 0);
    assert_eq!(body["availability_records"], 0);
    assert_eq!(body["rankings"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Dilan", "+94-770000001").await;
    let job = create_job(&app, "PUBLIC", "2024-06-01T00:00:00Z", "2024-06-03T00:00:00Z").await;
    app.clone()
        .oneshot(driver_request("POST", &format!("/jobs/{job}/accept"), &driver, json!({})))
        .await
        .unwrap();

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("job_transitions_total"));
    assert!(body.contains("transaction_latency_seconds"));
}

#[tokio::test]
async fn registering_a_driver_creates_a_zeroed_ranking() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Kamal", "+94-770000002").await;

    let response = app
        .oneshot(get_request(&format!("/driver-ranking/{driver}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["driver_id"], driver.as_str());
    assert_eq!(body["work_rate"], 0);
    assert_eq!(body["feedback_rate"], 0);
    assert_eq!(body["cancellation_rate"], 0);
    assert_eq!(body["average_rate"], 0.0);
    assert_eq!(body["driver"]["first_name"], "Kamal");
}

#[tokio::test]
async fn duplicate_contact_number_is_a_conflict() {
    let (app, _state) = setup();
    register_driver(&app, "Lasith", "+94-770000003").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "first_name": "Other",
                "last_name": "Person",
                "email": "other@drivemate.test",
                "contact_number": "+94-770000003",
                "vehicle": { "vehicle_type": "Van", "capacity": 6, "license": "WP-1" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["kind"], "Conflict");
}

#[tokio::test]
async fn overlapping_busy_period_returns_409() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Nuwan", "+94-770000004").await;

    let first = app
        .clone()
        .oneshot(driver_request(
            "POST",
            "/availability/busy",
            &driver,
            json!({ "start_date": "2024-03-20T00:00:00Z", "end_date": "2024-03-25T00:00:00Z" }),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await["status"], "BUSY");

    let second = app
        .clone()
        .oneshot(driver_request(
            "POST",
            "/availability/busy",
            &driver,
            json!({ "start_date": "2024-03-22T00:00:00Z", "end_date": "2024-03-23T00:00:00Z" }),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let listed = app
        .oneshot(get_request(&format!("/availability/driver/{driver}")))
        .await
        .unwrap();
    assert_eq!(body_json(listed).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn inverted_busy_period_is_unprocessable() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Pathum", "+94-770000005").await;

    let response = app
        .oneshot(driver_request(
            "POST",
            "/availability/busy",
            &driver,
            json!({ "start_date": "2024-03-25T00:00:00Z", "end_date": "2024-03-20T00:00:00Z" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["kind"], "InvalidRange");
}

#[tokio::test]
async fn free_drivers_exclude_busy_ones() {
    let (app, _state) = setup();
    let busy = register_driver(&app, "Busy", "+94-770000006").await;
    let free = register_driver(&app, "Free", "+94-770000007").await;
    app.clone()
        .oneshot(driver_request(
            "POST",
            "/availability/busy",
            &busy,
            json!({ "start_date": "2024-03-20T00:00:00Z", "end_date": "2024-03-25T00:00:00Z" }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request(
            "/availability/free-drivers?start_date=2024-03-21T00:00:00Z&end_date=2024-03-22T00:00:00Z",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|driver| driver["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![free.as_str()]);
}

#[tokio::test]
async fn accept_then_reject_returns_job_to_the_pool() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Ruwan", "+94-770000008").await;
    let job = create_job(&app, "PUBLIC", "2024-07-01T08:00:00Z", "2024-07-02T18:00:00Z").await;

    let accepted = app
        .clone()
        .oneshot(driver_request("POST", &format!("/jobs/{job}/accept"), &driver, json!({})))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    let body = body_json(accepted).await;
    assert_eq!(body["job"]["state"], "ACCEPTED");
    assert_eq!(body["job"]["assigned_driver_id"], driver.as_str());

    let calendar = app
        .clone()
        .oneshot(get_request(&format!("/availability/driver/{driver}")))
        .await
        .unwrap();
    let calendar = body_json(calendar).await;
    assert_eq!(calendar[0]["status"], "JOB");
    assert_eq!(calendar[0]["job_id"], job.as_str());

    let rejected = app
        .clone()
        .oneshot(driver_request(
            "POST",
            &format!("/jobs/{job}/reject"),
            &driver,
            json!({ "rejection_reason": "vehicle breakdown" }),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::OK);
    let body = body_json(rejected).await;
    assert_eq!(body["job"]["state"], "PENDING");
    assert!(body["job"]["assigned_driver_id"].is_null());
    assert!(body["job"]["additional_details"]
        .as_str()
        .unwrap()
        .contains("vehicle breakdown"));

    let calendar = app
        .clone()
        .oneshot(get_request(&format!("/availability/driver/{driver}")))
        .await
        .unwrap();
    assert!(body_json(calendar).await.as_array().unwrap().is_empty());

    let ranking = app
        .oneshot(get_request(&format!("/driver-ranking/{driver}")))
        .await
        .unwrap();
    assert_eq!(body_json(ranking).await["cancellation_rate"], 1);
}

#[tokio::test]
async fn accepting_an_accepted_job_is_invalid_state() {
    let (app, _state) = setup();
    let first = register_driver(&app, "First", "+94-770000009").await;
    let second = register_driver(&app, "Second", "+94-770000010").await;
    let job = create_job(&app, "PUBLIC", "2024-07-05T08:00:00Z", "2024-07-05T18:00:00Z").await;

    app.clone()
        .oneshot(driver_request("POST", &format!("/jobs/{job}/accept"), &first, json!({})))
        .await
        .unwrap();
    let response = app
        .oneshot(driver_request("POST", &format!("/jobs/{job}/accept"), &second, json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["kind"], "InvalidState");
}

#[tokio::test]
async fn private_job_is_hidden_until_access_is_granted() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Tharindu", "+94-770000011").await;
    let job = create_job(&app, "PRIVATE", "2024-08-01T00:00:00Z", "2024-08-02T00:00:00Z").await;

    let before = app
        .clone()
        .oneshot(driver_request("GET", "/jobs/available", &driver, json!({})))
        .await
        .unwrap();
    assert!(body_json(before).await.as_array().unwrap().is_empty());

    let denied = app
        .clone()
        .oneshot(driver_request("POST", &format!("/jobs/{job}/accept"), &driver, json!({})))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let granted = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/jobs/{job}/private-access"),
            json!({ "driver_ids": [driver] }),
        ))
        .await
        .unwrap();
    assert_eq!(granted.status(), StatusCode::OK);

    let after = app
        .oneshot(driver_request("GET", "/jobs/available", &driver, json!({})))
        .await
        .unwrap();
    let after = body_json(after).await;
    assert_eq!(after.as_array().unwrap().len(), 1);
    assert_eq!(after[0]["id"], job.as_str());
}

#[tokio::test]
async fn feedback_on_pending_job_is_invalid_state() {
    let (app, _state) = setup();
    let job = create_job(&app, "PUBLIC", "2024-09-01T00:00:00Z", "2024-09-02T00:00:00Z").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/driver-ranking/job-feedback",
            json!({ "job_id": job, "feedback_value": 1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["kind"], "InvalidState");
}

#[tokio::test]
async fn feedback_on_completed_job_credits_the_driver() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Sunil", "+94-770000012").await;
    let job = create_job(&app, "PUBLIC", "2024-09-10T00:00:00Z", "2024-09-11T00:00:00Z").await;

    app.clone()
        .oneshot(driver_request("POST", &format!("/jobs/{job}/accept"), &driver, json!({})))
        .await
        .unwrap();
    for state in ["ONGOING", "COMPLETED"] {
        let response = app
            .clone()
            .oneshot(json_request("PATCH", &format!("/jobs/{job}"), json!({ "state": state })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(json_request(
            "POST",
            "/driver-ranking/job-feedback",
            json!({ "job_id": job, "feedback_value": 1 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["driver_id"], driver.as_str());
    assert_eq!(body["previous_feedback_rate"], 0);
    assert_eq!(body["new_feedback_rate"], 1);
    assert!(body["new_average_rate"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn out_of_range_feedback_value_is_rejected() {
    let (app, _state) = setup();
    let job = create_job(&app, "PUBLIC", "2024-09-01T00:00:00Z", "2024-09-02T00:00:00Z").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/driver-ranking/job-feedback",
            json!({ "job_id": job, "feedback_value": 0 }),
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn normalizing_a_single_driver_is_skipped() {
    let (app, _state) = setup();
    register_driver(&app, "Solo", "+94-770000013").await;

    let response = app
        .oneshot(json_request("POST", "/driver-ranking/normalize", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["applied"], false);
    assert_eq!(body["total_drivers"], 1);
}

#[tokio::test]
async fn process_work_rates_reports_the_window() {
    let (app, _state) = setup();
    register_driver(&app, "Idle", "+94-770000014").await;

    let response = app
        .oneshot(json_request("POST", "/driver-ranking/process-work-rates", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total_drivers_processed"], 0);
    assert_eq!(body["total_intervals_processed"], 0);
}

#[tokio::test]
async fn missing_driver_identity_is_unauthorized() {
    let (app, _state) = setup();
    let job = create_job(&app, "PUBLIC", "2024-10-01T00:00:00Z", "2024-10-02T00:00:00Z").await;

    let response = app
        .oneshot(json_request("POST", &format!("/jobs/{job}/accept"), json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["kind"], "Unauthorized");
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let (app, _state) = setup();
    let response = app
        .oneshot(get_request("/jobs/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn created_jobs_are_broadcast_to_subscribers() {
    let (app, state) = setup();
    let mut events = state.job_events_tx.subscribe();

    let job = create_job(&app, "PUBLIC", "2024-11-01T00:00:00Z", "2024-11-02T00:00:00Z").await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.job_id.to_string(), job);
    assert!(event.driver_ids.is_empty());
}

#[tokio::test]
async fn driver_profile_can_be_patched() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Udara", "+94-770000015").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/drivers/{driver}"),
            json!({ "last_name": "Jayasuriya", "vehicle": { "vehicle_type": "Van", "capacity": 9, "license": "WP-PH-7788" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["first_name"], "Udara");
    assert_eq!(body["last_name"], "Jayasuriya");
    assert_eq!(body["vehicle"]["capacity"], 9);

    register_driver(&app, "Other", "+94-770000016").await;
    let clash = app
        .oneshot(json_request(
            "PATCH",
            &format!("/drivers/{driver}"),
            json!({ "contact_number": "+94-770000016" }),
        ))
        .await
        .unwrap();
    assert_eq!(clash.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn dashboard_reports_current_month() {
    let (app, _state) = setup();
    register_driver(&app, "Malith", "+94-770000017").await;
    create_job(&app, "PUBLIC", "2024-12-01T00:00:00Z", "2024-12-02T00:00:00Z").await;
    create_job(&app, "PRIVATE", "2024-12-03T00:00:00Z", "2024-12-04T00:00:00Z").await;

    let response = app
        .clone()
        .oneshot(get_request("/dashboard/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total_drivers"], 1);
    assert_eq!(body["jobs_posted_this_month"], 2);
    assert_eq!(body["pending_jobs"], 2);
    assert_eq!(body["private_jobs"], 1);
    assert_eq!(body["monthly_revenue"], 120.0);

    let history = app
        .oneshot(get_request("/dashboard/monthly-stats?months=3"))
        .await
        .unwrap();
    assert_eq!(history.status(), StatusCode::OK);

    let body = body_json(history).await;
    let months = body["historical_data"].as_array().unwrap();
    assert_eq!(months.len(), 3);
    assert_eq!(months[2]["jobs_posted"], 2);
}
