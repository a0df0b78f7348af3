use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use tracing::{info, warn};

use crate::api::api_objects::{AppState, ErrorResponse, Job, MessageResponse, StatusResponse};
use crate::errors::AdmissionError;

pub async fn handle_ping() -> impl Responder {
    HttpResponse::Ok().json(MessageResponse::new("pong"))
}

pub async fn handle_status(app_data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(StatusResponse::new(app_data.admission.status(), app_data.pt_element))
}

pub async fn handle_start(job: web::Json<Job>, app_data: web::Data<AppState>) -> impl Responder {
    // Validates the request and hands it to the worker. Returns immediately, the caller polls /status.
    let job = job.into_inner();
    if let Err(reason) = job.validate(app_data.pt_element) {
        warn!(job_id = %job.id, %reason, "rejecting malformed job");
        return HttpResponse::BadRequest().json(ErrorResponse::new(reason));
    }

    let job_id = job.id.clone();
    match app_data.admission.try_submit(job) {
        Ok(()) => HttpResponse::Ok().json(MessageResponse::new("started")),
        Err(err @ AdmissionError::Busy) => {
            info!(%job_id, "job rejected, already running");
            HttpResponse::BadRequest().json(ErrorResponse::new(err))
        }
        Err(err @ AdmissionError::WorkerUnavailable) => {
            warn!(%job_id, "job rejected, worker unavailable");
            HttpResponse::ServiceUnavailable().json(ErrorResponse::new(err))
        }
    }
}

/// JSON extractor settings: body limit and `{"error": ...}` bodies for bad input.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            let response = HttpResponse::BadRequest().json(ErrorResponse::new(&err));
            InternalError::from_response(err, response).into()
        })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::post().to(handle_ping))
        .route("/status", web::get().to(handle_status))
        .route("/start", web::post().to(handle_start));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests_queue::{ExecutionSlot, admission_channel};
    use crate::utils::PtElement;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn state() -> (AppState, Arc<ExecutionSlot>, tokio::sync::mpsc::Receiver<Job>) {
        let slot = Arc::new(ExecutionSlot::new());
        let (admission, rx) = admission_channel(slot.clone());
        let state = AppState {
            admission,
            pt_element: PtElement::Integer,
        };
        (state, slot, rx)
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .app_data(json_config(1024 * 1024))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_ping() {
        let (state, _slot, _rx) = state();
        let app = app!(state);
        let req = test::TestRequest::post().uri("/ping").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"message": "pong"}));
    }

    #[actix_web::test]
    async fn test_start_then_busy_then_status() {
        let (state, slot, mut rx) = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/start")
            .set_json(json!({"id": "t1", "data": "", "targetActor": 1, "ptList": [90, 45, 0, -135], "deviationThreshold": 0.0}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"message": "started"}));

        let req = test::TestRequest::post()
            .uri("/start")
            .set_json(json!({"id": "t2"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": "already running"}));

        let req = test::TestRequest::get().uri("/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["isRunning"], true);
        assert_eq!(body["params"]["id"], "t1");
        assert_eq!(body["params"]["targetActor"], 1);
        assert_eq!(body["params"]["ptList"], json!([90, 45, 0, -135]));
        assert!(body["params"]["ptList"][0].is_i64());

        // worker takes and finishes the job
        let job = rx.recv().await.unwrap();
        assert_eq!(job.id, "t1");
        slot.finish();

        let req = test::TestRequest::get().uri("/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["params"]["id"], "");
    }

    #[actix_web::test]
    async fn test_malformed_body_never_reaches_admission() {
        let (state, slot, _rx) = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/start")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"id\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());

        let req = test::TestRequest::post()
            .uri("/start")
            .set_json(json!({"id": "../etc/passwd"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/start")
            .set_json(json!({"id": "t1", "ptList": [1.5]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        for body in [json!({"id": "t1", "ptList": [1e20]}), json!({"id": "t1", "targetActor": -1})] {
            let req = test::TestRequest::post().uri("/start").set_json(body).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        assert!(!slot.is_busy());
    }

    #[actix_web::test]
    async fn test_worker_gone_is_service_unavailable() {
        let (state, _slot, rx) = state();
        drop(rx);
        let app = app!(state);
        let req = test::TestRequest::post()
            .uri("/start")
            .set_json(json!({"id": "t1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
