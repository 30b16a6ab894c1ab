pub mod error;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::service::{CertificateRequest, CertificateService};

pub use error::ApiError;

type SharedService = Arc<CertificateService>;

pub fn create_router(service: SharedService) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/generar-constancia", post(generate_certificate))
        .route("/api/obtener-seguimiento", get(list_certificates))
        .route("/api/firmar-constancia", post(sign_certificate))
        .route("/api/validar-dni", post(validate_dni))
        .route("/api/validar-uni", post(validate_student))
        .route("/api/descargar-constancia/:id", get(download_certificate))
        .route("/api/eliminar-constancia/:id", delete(delete_certificate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

pub async fn start_api_server(service: SharedService, config: &ServerConfig) -> Result<()> {
    let app = create_router(service);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn generate_certificate(
    State(service): State<SharedService>,
    payload: std::result::Result<Json<CertificateRequest>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(payload) = payload?;
    let outcome = service.generate(payload).await?;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(outcome)).into_response())
}

async fn list_certificates(State(service): State<SharedService>) -> Json<Value> {
    let records = match service.list().await {
        Ok(records) => records,
        Err(e) => {
            warn!("Could not read tracking log: {}", e);
            Vec::new()
        }
    };
    Json(json!({ "constancias": records }))
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    registro_id: Option<String>,
}

async fn sign_certificate(
    State(service): State<SharedService>,
    payload: std::result::Result<Json<SignRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let id = payload
        .registro_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("ID de registro requerido"))?;

    service.sign(id.trim()).await?;
    Ok(Json(json!({
        "success": true,
        "mensaje": format!("Constancia {} firmada digitalmente", id.trim()),
    })))
}

#[derive(Debug, Deserialize)]
pub struct DniRequest {
    dni: Option<String>,
}

async fn validate_dni(
    State(service): State<SharedService>,
    payload: std::result::Result<Json<DniRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let dni = payload
        .dni
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("DNI es requerido"))?;

    let person = service.validate_dni(&dni).await;
    if person.success {
        Ok(Json(json!({ "success": true, "datos_persona": person })))
    } else {
        Ok(Json(json!({ "success": false, "error": person.error })))
    }
}

#[derive(Debug, Deserialize)]
pub struct UniRequest {
    codigo: Option<String>,
    nombre: Option<String>,
}

async fn validate_student(
    State(service): State<SharedService>,
    payload: std::result::Result<Json<UniRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let code = payload
        .codigo
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Código de estudiante es requerido"))?;

    let student = service.validate_student(&code, payload.nombre).await;
    if student.success {
        Ok(Json(json!({ "success": true, "data": student })))
    } else {
        Ok(Json(json!({ "success": false, "error": student.error })))
    }
}

async fn download_certificate(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let path = service.document_path(&id).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read {:?}: {}", path, e)))?;

    info!("Serving {:?}", path);
    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"constancia_{}.pdf\"", id),
        ),
    ];
    Ok((headers, bytes).into_response())
}

async fn delete_certificate(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    let record = service.delete(&id).await?;
    Ok(Json(json!({
        "success": true,
        "mensaje": format!("Constancia de {} eliminada", record.student),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::tracking::XlsxTrackingStore;
    use crate::validation::{MockIdentityLookup, MockStudentRegistry, PersonLookup, StudentLookup};

    fn found_student() -> StudentLookup {
        StudentLookup {
            success: true,
            code: "20220259H".to_string(),
            name: Some("PINTO RAMOS KEVIN".to_string()),
            status: Some("Activo".to_string()),
            validated: true,
            ..Default::default()
        }
    }

    fn app(dir: &TempDir, registry: MockStudentRegistry, identity: MockIdentityLookup) -> Router {
        let mut config = Config::default();
        config.storage.tracking_file = dir.path().join("seguimiento.xlsx");
        config.storage.pdf_dir = dir.path().join("autoridad_entrada");
        config.storage.extra_pdf_dirs = Vec::new();
        let store = Arc::new(XlsxTrackingStore::from_config(&config));
        let service = CertificateService::new(&config, Arc::new(registry), Arc::new(identity), store);
        create_router(Arc::new(service))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockStudentRegistry::new(), MockIdentityLookup::new());

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_generate_requires_fields() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockStudentRegistry::new(), MockIdentityLookup::new());

        let response = app
            .oneshot(post_json("/api/generar-constancia", json!({ "nombre": "Kevin", "codigo": "20220259H" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Campo carrera es requerido");
    }

    #[tokio::test]
    async fn test_generate_null_field_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockStudentRegistry::new(), MockIdentityLookup::new());

        let body = json!({ "nombre": null, "codigo": "20220259H", "carrera": "Sistemas", "ciclo": 3 });
        let response = app.oneshot(post_json("/api/generar-constancia", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Campo nombre es requerido");
    }

    #[tokio::test]
    async fn test_malformed_body_answers_json() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockStudentRegistry::new(), MockIdentityLookup::new());

        for uri in ["/api/generar-constancia", "/api/firmar-constancia", "/api/validar-dni", "/api/validar-uni"] {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from("{\"nombre\": "))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
            let body = body_json(response).await;
            assert_eq!(body["success"], false);
            assert!(body["error"].is_string());
        }

        let response = app
            .oneshot(post_json("/api/validar-dni", json!({ "dni": ["12345678"] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_list_unreadable_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("seguimiento.xlsx"), b"not a workbook").unwrap();
        let app = app(&dir, MockStudentRegistry::new(), MockIdentityLookup::new());

        let response = app
            .oneshot(Request::builder().uri("/api/obtener-seguimiento").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "constancias": [] }));
    }

    #[tokio::test]
    async fn test_generate_rejected_student() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = MockStudentRegistry::new();
        registry
            .expect_lookup_student()
            .returning(|code, _| StudentLookup::failed(code, "No se pudieron extraer datos del estudiante"));
        let app = app(&dir, registry, MockIdentityLookup::new());

        let response = app
            .oneshot(post_json(
                "/api/generar-constancia",
                json!({ "nombre": "Kevin", "codigo": "20220259H", "carrera": "Sistemas", "ciclo": "2024-I" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["validacion_uni"]["success"], false);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = MockStudentRegistry::new();
        registry.expect_lookup_student().returning(|_, _| found_student());
        let app = app(&dir, registry, MockIdentityLookup::new());

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/generar-constancia",
                json!({ "nombre": "Kevin Pinto", "codigo": "20220259H", "carrera": "Sistemas", "ciclo": "2024-I" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["datos_validados"]["nombre"], "PINTO RAMOS KEVIN");
        let id = body["registro_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/obtener-seguimiento").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["constancias"][0]["id"], id.as_str());
        assert_eq!(body["constancias"][0]["firma"], "Pendiente");

        let response = app
            .clone()
            .oneshot(post_json("/api/firmar-constancia", json!({ "registro_id": &id })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/descargar-constancia/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            format!("attachment; filename=\"constancia_{}.pdf\"", id).as_str()
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/eliminar-constancia/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/eliminar-constancia/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sign_requires_id() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockStudentRegistry::new(), MockIdentityLookup::new());

        let response = app.oneshot(post_json("/api/firmar-constancia", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "ID de registro requerido");
    }

    #[tokio::test]
    async fn test_validate_dni() {
        let dir = tempfile::tempdir().unwrap();
        let mut identity = MockIdentityLookup::new();
        identity.expect_lookup_person().returning(|dni| PersonLookup {
            success: true,
            dni: dni.to_string(),
            full_name: Some("KEVIN ALONSO PINTO RAMOS".to_string()),
            validated: true,
            ..Default::default()
        });
        let app = app(&dir, MockStudentRegistry::new(), identity);

        let response = app
            .oneshot(post_json("/api/validar-dni", json!({ "dni": "12345678" })))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["datos_persona"]["nombre_completo"], "KEVIN ALONSO PINTO RAMOS");
    }

    #[tokio::test]
    async fn test_validate_uni_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = MockStudentRegistry::new();
        registry
            .expect_lookup_student()
            .withf(|code, name| code == "2022" && name.is_none())
            .returning(|code, _| StudentLookup::failed(code, "Formato de código inválido"));
        let app = app(&dir, registry, MockIdentityLookup::new());

        let response = app
            .oneshot(post_json("/api/validar-uni", json!({ "codigo": "2022" })))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Formato de código inválido");
    }

    #[tokio::test]
    async fn test_download_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockStudentRegistry::new(), MockIdentityLookup::new());

        let response = app
            .oneshot(Request::builder().uri("/api/descargar-constancia/nope1234").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
