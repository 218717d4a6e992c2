use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::Json;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::approval::{InMemoryTemplateRepository, InMemoryTrackingRepository};
use crate::config::EventDeliveryConfig;
use crate::workflows::offer::router::{self, offer_router, ActorRequest, CloseRequest};
use crate::workflows::offer::InMemoryOfferRepository;

fn post_json(uri: String, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
        .expect("request")
}

#[tokio::test]
async fn offer_routes_drive_submit_and_approval() {
    let OfferHarness { service, .. } = offer_harness();
    let router = offer_router(service);

    let created = router
        .clone()
        .oneshot(post_json(
            "/api/v1/offers".to_string(),
            serde_json::to_value(draft("2")).expect("draft json"),
        ))
        .await
        .expect("route executes");
    assert_eq!(created.status(), StatusCode::CREATED);
    let offer = read_json_body(created).await;
    assert_eq!(offer["status"], json!("DRAFT"));
    let offer_id = offer["id"].as_u64().expect("offer id");

    let submitted = router
        .clone()
        .oneshot(post_json(
            format!("/api/v1/offers/{offer_id}/submit"),
            json!({ "actor_id": REQUESTER }),
        ))
        .await
        .expect("route executes");
    assert_eq!(submitted.status(), StatusCode::OK);
    let receipt = read_json_body(submitted).await;
    assert_eq!(receipt["offer"]["status"], json!("PENDING"));
    assert_eq!(receipt["delivery"]["state"], json!("delivered"));
    let tracking_id = receipt["current_step"]["id"].as_u64().expect("tracking id");

    let approved = router
        .clone()
        .oneshot(post_json(
            format!("/api/v1/offers/{offer_id}/approve"),
            json!({ "tracking_id": tracking_id, "actor_id": HEAD }),
        ))
        .await
        .expect("route executes");
    assert_eq!(approved.status(), StatusCode::OK);
    let receipt = read_json_body(approved).await;
    assert_eq!(receipt["current_step"]["assigned_approver_id"], json!(HR_DIRECTOR));

    let history = router
        .oneshot(
            Request::get(format!("/api/v1/offers/{offer_id}/history"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(history.status(), StatusCode::OK);
    let payload = read_json_body(history).await;
    assert_eq!(payload["rounds"][0]["request_id"], json!(format!("offer-{offer_id}/r1")));
    assert_eq!(payload["rounds"][0]["steps"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn withdraw_handler_maps_forbidden() {
    let OfferHarness { service, .. } = offer_harness();
    let offer = service.create(draft("2")).expect("drafted");
    service
        .submit(offer.id, &employee(REQUESTER))
        .expect("submitted");

    let response = router::withdraw_handler::<
        InMemoryTemplateRepository,
        InMemoryTrackingRepository,
        InMemoryOfferRepository,
    >(
        State(service),
        Path(offer.id.0),
        Json(CloseRequest {
            actor_id: employee("someone-else"),
            reason: None,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], json!("FORBIDDEN"));
}

#[tokio::test]
async fn delivery_retries_leave_the_runtime_free() {
    let OfferHarness { service, channel } = offer_harness_with(EventDeliveryConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(100),
    });
    let offer = service.create(draft("2")).expect("drafted");
    channel.set_available(false);

    let started = Instant::now();
    let (response, other_task_ran_at) = tokio::join!(
        router::submit_handler::<
            InMemoryTemplateRepository,
            InMemoryTrackingRepository,
            InMemoryOfferRepository,
        >(
            State(service.clone()),
            Path(offer.id.0),
            Json(ActorRequest {
                actor_id: employee(REQUESTER),
            }),
        ),
        async {
            tokio::task::yield_now().await;
            started.elapsed()
        }
    );

    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(
        other_task_ran_at < Duration::from_millis(100),
        "runtime was blocked for {other_task_ran_at:?}"
    );
    let payload = read_json_body(response).await;
    assert_eq!(payload["delivery"]["state"], json!("deferred"));
    assert_eq!(service.outbox().len(), 1);
}

#[tokio::test]
async fn submit_route_reports_missing_workflow_as_unprocessable() {
    let OfferHarness { service, .. } = offer_harness();
    let offer = service.create(draft("9")).expect("drafted");
    let router = offer_router(service);

    let response = router
        .oneshot(post_json(
            format!("/api/v1/offers/{}/submit", offer.id.0),
            json!({ "actor_id": REQUESTER }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], json!("NO_MATCHING_WORKFLOW"));
}

#[tokio::test]
async fn cancel_of_decided_offer_is_a_conflict() {
    let OfferHarness { service, .. } = offer_harness();
    let offer = service.create(draft("2")).expect("drafted");
    let first = service
        .submit(offer.id, &employee(REQUESTER))
        .expect("submitted")
        .current_step
        .expect("first step");
    service
        .reject_step(offer.id, first.id, &employee(HEAD), None)
        .expect("rejected");
    let router = offer_router(service);

    let response = router
        .oneshot(post_json(
            format!("/api/v1/offers/{}/cancel", offer.id.0),
            json!({ "actor_id": OWNER }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], json!("INVALID_STATE_TRANSITION"));
    assert_eq!(
        payload["error"],
        json!("cannot cancel a request in status REJECTED")
    );
}

#[tokio::test]
async fn unknown_offer_is_not_found() {
    let OfferHarness { service, .. } = offer_harness();
    let router = offer_router(service);

    let response = router
        .oneshot(
            Request::get("/api/v1/offers/404")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], json!("OFFER_NOT_FOUND"));
}
