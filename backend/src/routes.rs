use actix_multipart::{Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures::TryStreamExt;
use inspect_shared::{BatchSummary, ImageResult, SkippedItem};
use log::{info, warn};
use serde::Serialize;

use crate::encoding::InputItem;
use crate::notify::{completion_notice, Notification, Notifier};
use crate::orchestrator::{BatchError, BatchState, Orchestrator, SubmitError};

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectResponse {
    results: Vec<ImageResult>,
    summary: BatchSummary,
    skipped: Vec<SkippedItem>,
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    state: BatchState,
    busy: bool,
    backend: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("'{0}' is not an image")]
    NotAnImage(String),
    #[error("No images were uploaded")]
    EmptyUpload,
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Multipart(_) | ApiError::NotAnImage(_) | ApiError::EmptyUpload => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Submit(SubmitError::Busy(_)) => StatusCode::CONFLICT,
            ApiError::Submit(SubmitError::Batch(err)) => match err {
                BatchError::TooManyItems { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                BatchError::ItemFailed { .. } => StatusCode::BAD_GATEWAY,
                BatchError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/inspect").route(web::post().to(inspect)))
        .service(web::resource("/api/status").route(web::get().to(status)))
        .service(web::resource("/api/health").route(web::get().to(health)));
}

async fn inspect(
    orchestrator: web::Data<Orchestrator>,
    notifier: web::Data<dyn Notifier>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let items = read_upload(&mut payload, orchestrator.max_batch_size()).await?;
    if items.is_empty() {
        warn!("Upload contained no image data");
        return Err(ApiError::EmptyUpload);
    }
    info!("Received {} image(s) for inspection", items.len());

    notifier.notify(Notification::BatchStarted { count: items.len() });
    let outcome = orchestrator.submit(items).await;
    notifier.notify(completion_notice(&outcome));

    let batch = outcome?;
    Ok(HttpResponse::Ok().json(InspectResponse {
        summary: batch.summary(),
        results: batch.results,
        skipped: batch.skipped,
    }))
}

/// Turns every non-empty multipart field into an [`InputItem`], stopping as
/// soon as the upload holds more than `limit` images.
async fn read_upload(payload: &mut Multipart, limit: usize) -> Result<Vec<InputItem>, ApiError> {
    let mut items = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("image-{}", items.len() + 1));
        let mime_type = field.content_type().map(|m| m.essence_str().to_owned());

        if let Some(mime) = mime_type.as_deref() {
            if !mime.starts_with("image/") && mime != "application/octet-stream" {
                warn!("Rejecting non-image upload '{}' ({})", file_name, mime);
                return Err(ApiError::NotAnImage(file_name));
            }
        }

        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            image_data.extend_from_slice(&chunk);
        }

        if image_data.is_empty() {
            warn!("Ignoring empty upload field '{}'", file_name);
            continue;
        }
        items.push(InputItem::from_bytes(file_name, image_data).with_mime_type(mime_type));

        if items.len() > limit {
            warn!("Upload exceeds the limit of {} images, rejecting", limit);
            return Err(SubmitError::Batch(BatchError::TooManyItems {
                count: items.len(),
                limit,
            })
            .into());
        }
    }

    Ok(items)
}

async fn status(orchestrator: web::Data<Orchestrator>) -> HttpResponse {
    let state = orchestrator.state();
    HttpResponse::Ok().json(StatusResponse {
        state,
        busy: state == BatchState::Busy,
        backend: orchestrator.backend_name(),
    })
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::notify::tests::RecordingNotifier;
    use crate::orchestrator::testing::{Reply, ScriptedInferer};
    use crate::orchestrator::FailurePolicy;
    use actix_web::http::header;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::sync::Arc;

    const BOUNDARY: &str = "----inspect-test-boundary";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn multipart(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (file_name, content_type, bytes) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(parts: &[(&str, &str, &[u8])]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/inspect")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart(parts))
    }

    fn app_data(
        inferer: ScriptedInferer,
        settings: AnalysisConfig,
    ) -> (web::Data<Orchestrator>, web::Data<dyn Notifier>, Arc<RecordingNotifier>) {
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier: Arc<dyn Notifier> = recorder.clone();
        (
            web::Data::new(Orchestrator::new(Arc::new(inferer), settings)),
            web::Data::from(notifier),
            recorder,
        )
    }

    #[actix_web::test]
    async fn inspects_an_uploaded_batch() {
        let (orchestrator, notifier, recorder) = app_data(
            ScriptedInferer::new().on("b.jpg", Reply::Defect("stain")),
            AnalysisConfig::default(),
        );
        let app = test::init_service(
            App::new()
                .app_data(orchestrator)
                .app_data(notifier)
                .configure(configure_routes),
        )
        .await;

        let req = upload(&[
            ("a.jpg", "image/jpeg", JPEG),
            ("b.jpg", "image/jpeg", JPEG),
            ("c.jpg", "image/jpeg", JPEG),
        ])
        .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["summary"]["total"], 3);
        assert_eq!(body["summary"]["defects"], 1);
        assert_eq!(body["summary"]["passed"], 2);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results[1]["fileName"], "b.jpg");
        assert_eq!(results[1]["defectType"], "stain");
        assert!(results[0].get("defectType").is_none());
        assert!(results[0]["imageUrl"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                Notification::BatchStarted { count: 3 },
                Notification::DefectsFound { count: 1, skipped: 0 },
            ]
        );
    }

    #[actix_web::test]
    async fn fail_fast_batch_maps_to_bad_gateway() {
        let (orchestrator, notifier, recorder) = app_data(
            ScriptedInferer::new().on("b.jpg", Reply::Fail("model unavailable")),
            AnalysisConfig {
                failure_policy: FailurePolicy::FailFast,
                ..AnalysisConfig::default()
            },
        );
        let app = test::init_service(
            App::new()
                .app_data(orchestrator)
                .app_data(notifier)
                .configure(configure_routes),
        )
        .await;

        let req = upload(&[("a.jpg", "image/jpeg", JPEG), ("b.jpg", "image/jpeg", JPEG)]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("model unavailable"));
        assert!(matches!(
            recorder.seen.lock().unwrap().last(),
            Some(Notification::Failed { .. })
        ));
    }

    #[actix_web::test]
    async fn rejects_non_images_and_oversized_batches() {
        let (orchestrator, notifier, _) = app_data(
            ScriptedInferer::new(),
            AnalysisConfig {
                max_batch_size: 1,
                ..AnalysisConfig::default()
            },
        );
        let app = test::init_service(
            App::new()
                .app_data(orchestrator)
                .app_data(notifier)
                .configure(configure_routes),
        )
        .await;

        let req = upload(&[("notes.txt", "text/plain", b"hello")]).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = upload(&[("a.jpg", "image/jpeg", JPEG), ("b.jpg", "image/jpeg", JPEG)]).to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected_before_later_parts_are_read() {
        let (orchestrator, notifier, recorder) = app_data(
            ScriptedInferer::new(),
            AnalysisConfig {
                max_batch_size: 1,
                ..AnalysisConfig::default()
            },
        );
        let app = test::init_service(
            App::new()
                .app_data(orchestrator)
                .app_data(notifier)
                .configure(configure_routes),
        )
        .await;

        let large = vec![0xAB; 1024 * 1024];
        let req = upload(&[
            ("a.jpg", "image/jpeg", JPEG),
            ("b.jpg", "image/jpeg", large.as_slice()),
            ("c.jpg", "image/jpeg", large.as_slice()),
            ("notes.txt", "text/plain", b"hello"),
        ])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("limit of 1"));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn upload_without_image_data_is_a_bad_request() {
        let (orchestrator, notifier, recorder) =
            app_data(ScriptedInferer::new(), AnalysisConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(orchestrator)
                .app_data(notifier)
                .configure(configure_routes),
        )
        .await;

        let req = upload(&[("a.jpg", "image/jpeg", b""), ("b.jpg", "image/jpeg", b"")]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No images were uploaded");
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn status_reports_idle_backend() {
        let (orchestrator, notifier, _) = app_data(ScriptedInferer::new(), AnalysisConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(orchestrator)
                .app_data(notifier)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], "idle");
        assert_eq!(body["busy"], false);
        assert_eq!(body["backend"], "scripted");

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn busy_maps_to_conflict() {
        let err = ApiError::from(SubmitError::Busy(crate::orchestrator::BusyError));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(SubmitError::Batch(BatchError::Cancelled)).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
