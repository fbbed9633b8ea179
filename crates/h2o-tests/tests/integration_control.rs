// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Control Integration Tests
//!
//! - `test_loop_*`: the control loop driving relays from published pH
//! - `test_remote_*`: operator methods and attribute updates
//! - `test_api_*`: the same operations through the HTTP router

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tower::ServiceExt;

use h2o_api::{ApiServer, AppState};
use h2o_config::ApiConfig;
use h2o_core::persist::{CONTROL_STATE_FILE, PH_CALIBRATION_FILE};
use h2o_core::{ControlLoop, ControlSettings, ControlState, Relays, TripReason};
use h2o_tests::common::{
    fast_scheduler, init_test_logging, Plant, RecordingRelays, SensorFixtures,
};

fn arm(plant: &Plant) {
    let mut state = plant.state.lock();
    state.set_power(true);
    state.set_auto(true);
}

fn control_loop(plant: &Plant, relays: &RecordingRelays) -> (ControlLoop, watch::Sender<Option<f64>>) {
    let (tx, rx) = watch::channel(None);
    let control = ControlLoop::new(
        plant.state.clone(),
        plant.runtime.clone(),
        rx,
        relays.clone(),
        plant.store.clone(),
        Duration::from_secs(1),
    );
    (control, tx)
}

fn persisted(plant: &Plant) -> ControlState {
    plant.store.load(CONTROL_STATE_FILE).unwrap()
}

// =============================================================================
// Control Loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_loop_pump_in_band() {
    init_test_logging();
    let plant = Plant::new();
    arm(&plant);
    let relays = RecordingRelays::new();
    let (mut control, ph) = control_loop(&plant, &relays);

    ph.send_replace(Some(7.3));
    let outcome = control.step(Instant::now());

    assert_eq!(outcome.relays, Relays::PUMP);
    assert_eq!(outcome.trip, None);
    assert_eq!(relays.last(), Some(Relays::PUMP));
    assert!(plant.runtime.lock().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_loop_missing_reading_holds_outputs() {
    let plant = Plant::new();
    arm(&plant);
    let relays = RecordingRelays::new();
    let (mut control, ph) = control_loop(&plant, &relays);

    ph.send_replace(Some(8.1));
    control.step(Instant::now());
    ph.send_replace(None);
    control.step(Instant::now() + Duration::from_secs(1));

    assert_eq!(relays.history(), vec![Relays::DOSING, Relays::DOSING]);
    assert!(plant.state.lock().high_timer_running());
}

#[tokio::test(start_paused = true)]
async fn test_loop_high_timeout_trips_and_persists() {
    let plant = Plant::new();
    arm(&plant);
    let high_delay = ControlSettings::default().high_delay;
    let relays = RecordingRelays::new();
    let (mut control, ph) = control_loop(&plant, &relays);

    let t0 = Instant::now();
    ph.send_replace(Some(8.0));
    assert_eq!(control.step(t0).relays, Relays::DOSING);
    assert_eq!(control.step(t0 + high_delay / 2).relays, Relays::DOSING);

    let outcome = control.step(t0 + high_delay);
    assert_eq!(outcome.trip, Some(TripReason::HighTimeout));
    assert_eq!(outcome.relays, Relays::OFF);
    assert!(!outcome.powered);
    assert_eq!(relays.last(), Some(Relays::OFF));

    let saved = persisted(&plant);
    assert!(!saved.power_enabled);
    assert!(!saved.auto_enabled);

    // Stays down until the operator powers the plant again.
    ph.send_replace(Some(7.0));
    assert_eq!(control.step(t0 + high_delay * 2).relays, Relays::OFF);
    assert!(!plant.runtime.lock().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_loop_hard_stop_trips_immediately() {
    let plant = Plant::new();
    arm(&plant);
    let relays = RecordingRelays::new();
    let (mut control, ph) = control_loop(&plant, &relays);

    ph.send_replace(Some(4.2));
    let outcome = control.step(Instant::now());

    assert_eq!(outcome.trip, Some(TripReason::HardStop));
    assert!(!persisted(&plant).power_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_loop_run_releases_relays_on_shutdown() {
    let plant = Plant::new();
    arm(&plant);
    let relays = RecordingRelays::new();
    let (control, ph) = control_loop(&plant, &relays);
    ph.send_replace(Some(7.0));

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(control.run(rx));
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(relays.last(), Some(Relays::PUMP));

    tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(relays.last(), Some(Relays::OFF));
    assert_eq!(plant.state.lock().relays, Relays::OFF);
    // Switches are kept for the next start.
    assert!(plant.state.lock().power_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_loop_follows_scheduler_ph() {
    let plant = Plant::new();
    arm(&plant);
    plant.line.push_float(1, 8.4).push_float(1, 21.0);

    let (mut scheduler, ph) = plant.scheduler(fast_scheduler(), vec![SensorFixtures::ph(1)]).await;
    let relays = RecordingRelays::new();
    let mut control = ControlLoop::new(
        plant.state.clone(),
        plant.runtime.clone(),
        ph,
        relays.clone(),
        plant.store.clone(),
        Duration::from_secs(1),
    );

    scheduler.pass().await;
    assert_eq!(control.step(Instant::now()).relays, Relays::DOSING);
}

// =============================================================================
// Remote Control
// =============================================================================

#[tokio::test]
async fn test_remote_power_and_auto() {
    let plant = Plant::new();
    let remote = plant.remote();

    remote.call("setPower", &json!(true)).await.unwrap();
    let result = remote.call("setAuto", &json!({ "value": true })).await.unwrap();
    assert_eq!(result, json!({ "auto_enabled": true }));

    let saved = persisted(&plant);
    assert!(saved.power_enabled);
    assert!(saved.auto_enabled);

    // Power off disarms as well.
    remote.call("setPower", &json!({ "value": false })).await.unwrap();
    let saved = persisted(&plant);
    assert!(!saved.power_enabled);
    assert!(!saved.auto_enabled);
}

#[tokio::test]
async fn test_remote_rejects_bad_calls() {
    let plant = Plant::new();
    let remote = plant.remote();

    assert!(remote.call("selfDestruct", &json!(null)).await.is_err());
    assert!(remote.call("setPower", &json!("yes")).await.is_err());
    assert!(!plant.state.lock().power_enabled);
}

#[tokio::test]
async fn test_remote_telemetry_snapshot_is_pushed() {
    let plant = Plant::new();
    plant.latest.set("ph_1_ph_value", 7.1);
    let remote = plant.remote();

    let snapshot = remote.call("getTelemetry", &Value::Null).await.unwrap();
    assert_eq!(snapshot["ph_1_ph_value"], json!(7.1));
    assert_eq!(snapshot["pump_relay"], json!(false));
    assert_eq!(snapshot["total_flow_l"], json!(0.0));

    let pushed = plant.sink.with_key("pump_relay");
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].to_json(), snapshot);
}

#[tokio::test(start_paused = true)]
async fn test_remote_calibration_applies_to_next_read() {
    let plant = Plant::new();
    let remote = plant.remote();

    let result = remote
        .call(
            "calibratePh",
            &json!({ "high_ref": 10.0, "low_ref": 4.0, "measured_high": 9.0, "measured_low": 3.0 }),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({ "ph_slope": 1.0, "ph_intercept": 1.0 }));
    assert!(plant.store.path(PH_CALIBRATION_FILE).exists());

    plant.line.push_float(1, 6.0).push_float(1, 20.0);
    let (mut scheduler, ph) = plant.scheduler(fast_scheduler(), vec![SensorFixtures::ph(1)]).await;
    scheduler.pass().await;
    assert_eq!(*ph.borrow(), Some(7.0));
}

#[tokio::test]
async fn test_remote_calibration_rejects_equal_readings() {
    let plant = Plant::new();
    let before = plant.calibration.ph();

    let err = plant
        .remote()
        .call(
            "calibratePh",
            &json!({ "high_ref": 10.0, "low_ref": 4.0, "measured_high": 5.0, "measured_low": 5.0 }),
        )
        .await;
    assert!(err.is_err());
    assert_eq!(plant.calibration.ph(), before);
}

#[tokio::test(start_paused = true)]
async fn test_remote_reset_total_flow() {
    let plant = Plant::new();
    {
        let mut total = plant.total_flow.lock();
        let t0 = Instant::now();
        total.update(60.0, t0);
        total.update(60.0, t0 + Duration::from_secs(120));
        assert_eq!(total.total(), 120.0);
    }

    plant.remote().call("resetTotalFlow", &Value::Null).await.unwrap();

    assert_eq!(plant.total_flow.lock().total(), 0.0);
    let saved: Value = plant.store.load(h2o_core::persist::TOTAL_FLOW_FILE).unwrap();
    assert_eq!(saved["total_flow"], json!(0.0));
}

#[test]
fn test_remote_attributes_partial_update() {
    let plant = Plant::new();
    let attributes = json!({
        "targetPHValue": 6.5,
        "targetPHtolerrance": 0.3,
        "ph_high_delay_duration": 120,
        "minimumPHValStop": 42.0,
        "fanSpeed": 3,
    });

    let report = plant
        .remote()
        .apply_attributes(attributes.as_object().unwrap());

    assert_eq!(report.applied.len(), 3);
    assert!(report.rejected.contains_key("minimumPHValStop"));
    assert!(report.rejected.contains_key("fanSpeed"));

    let saved = persisted(&plant);
    assert_eq!(saved.target_ph, 6.5);
    assert_eq!(saved.tolerance, 0.3);
    assert_eq!(saved.high_delay, Duration::from_secs(120));
    assert_eq!(saved.hard_stop_ph, ControlSettings::default().hard_stop_ph);
}

#[test]
fn test_remote_state_survives_restart() {
    let plant = Plant::new();
    plant
        .remote()
        .apply_attributes(json!({ "powerButton": true, "autoSwitch": true }).as_object().unwrap());
    plant.state.lock().relays = Relays::PUMP;
    plant.state.lock().save(&plant.store).unwrap();

    let reloaded = ControlState::load(&plant.store, &ControlSettings::default());
    assert!(reloaded.power_enabled);
    assert!(reloaded.auto_enabled);
    assert_eq!(reloaded.relays, Relays::OFF);
}

// =============================================================================
// HTTP API
// =============================================================================

fn router(plant: &Plant) -> Router {
    ApiServer::new(AppState::new(plant.remote()), ApiConfig::default()).router()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_api_rpc_drives_shared_state() {
    let plant = Plant::new();
    let router = router(&plant);

    let (status, body) = send(
        router.clone(),
        post_json("/api/v1/rpc", json!({ "method": "setPower", "params": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["power_enabled"], json!(true));
    assert!(plant.state.lock().power_enabled);

    let (status, body) = send(router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["power_enabled"], json!(true));
    assert_eq!(body["auto_enabled"], json!(false));
}

#[tokio::test]
async fn test_api_attributes_rejected_entirely() {
    let plant = Plant::new();
    let (status, body) = send(
        router(&plant),
        post_json("/api/v1/attributes", json!({ "targetPHValue": "seven" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BAD_REQUEST"));
    assert!(body["error"]["details"]["targetPHValue"].is_string());
    assert_eq!(plant.state.lock().target_ph, ControlSettings::default().target_ph);
}

#[tokio::test]
async fn test_api_telemetry_snapshot() {
    let plant = Plant::new();
    plant.latest.set("turbidity_2_turbidity", 3.4);

    let (status, body) = send(router(&plant), get("/api/v1/telemetry")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["turbidity_2_turbidity"], json!(3.4));
    assert!(body["data"]["countdown_ph_high_s"].is_u64());
    // Reading the snapshot over HTTP does not push telemetry.
    assert!(plant.sink.payloads().is_empty());
}
