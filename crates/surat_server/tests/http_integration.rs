//! HTTP-level tests for the letter submission server.
//!
//! The router runs against the in-memory stores from `surat_core::memory`
//! and a filesystem blob store in a temp dir, so no database is needed.

use std::sync::Arc;

use axum::body::Body;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use surat_core::blob::LocalBlobStore;
use surat_core::memory::{
    MemoryLetterTypeStore, MemoryResidentStore, MemorySignatureStore, MemorySubmissionStore,
};
use surat_core::service::{SuratService, SuratServiceImpl};
use surat_core::types::Resident;
use surat_server::middleware::jwt::JwtConfig;
use surat_server::router::build_router;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

// ── Test JWT helpers ───────────────────────────────────────────

const TEST_JWT_SECRET: &[u8] = b"test-secret-for-http-tests";
const BOUNDARY: &str = "surat-test-boundary";
const PNG: [u8; 12] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

#[derive(Debug, Serialize)]
struct TestClaims {
    sub: String,
    roles: Vec<String>,
    exp: i64,
}

fn make_jwt(user_id: Uuid, roles: &[&str]) -> String {
    let claims = TestClaims {
        sub: user_id.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET),
    )
    .expect("failed to encode test JWT")
}

// ── Test app builder ───────────────────────────────────────────

struct TestApp {
    app: axum::Router,
    admin: String,
    warga: String,
    stranger: String,
    storage: TempDir,
}

async fn build_test_app() -> TestApp {
    let storage = tempfile::tempdir().unwrap();
    let residents = Arc::new(MemoryResidentStore::new());

    let warga_user = Uuid::new_v4();
    residents
        .insert(Resident {
            id: Uuid::new_v4(),
            user_id: Some(warga_user),
            nik: "3201010101010001".into(),
            name: "Siti Aminah".into(),
            address: Some("Dusun Krajan".into()),
        })
        .await;
    let stranger_user = Uuid::new_v4();
    residents
        .insert(Resident {
            id: Uuid::new_v4(),
            user_id: Some(stranger_user),
            nik: "3201010101010002".into(),
            name: "Budi Santoso".into(),
            address: None,
        })
        .await;

    let service: Arc<dyn SuratService> = Arc::new(SuratServiceImpl::new(
        Arc::new(MemoryLetterTypeStore::new()),
        Arc::new(MemorySubmissionStore::new()),
        residents,
        Arc::new(MemorySignatureStore::new()),
        Arc::new(LocalBlobStore::new(storage.path())),
    ));

    TestApp {
        app: build_router(service, JwtConfig::from_secret(TEST_JWT_SECRET), 20 * 1024 * 1024),
        admin: make_jwt(Uuid::new_v4(), &["admin"]),
        warga: make_jwt(warga_user, &["warga"]),
        stranger: make_jwt(stranger_user, &["warga"]),
        storage,
    }
}

// ── Request helpers ────────────────────────────────────────────

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(method: &str, uri: &str, token: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes).to_string() }));
    (status, json)
}

fn domicile_type() -> Value {
    json!({
        "name": "Surat Keterangan Domisili",
        "code": "skd",
        "attributes": [
            { "name": "Keperluan", "data_type": "text", "is_required": true, "display_order": 1 },
            {
                "name": "Bukti Alamat",
                "data_type": "text",
                "attachment_label": "Bukti Alamat",
                "min_attachment_count": 1,
                "display_order": 2
            }
        ]
    })
}

/// Creates the domicile type and returns (type id, Keperluan id, Bukti Alamat id).
async fn create_domicile(t: &TestApp) -> (String, String, String) {
    let (status, body) = send(
        &t.app,
        json_request("POST", "/api/letter-types", &t.admin, domicile_type()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let attr = |name: &str| {
        body["attributes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["name"] == name)
            .map(|a| a["id"].as_str().unwrap().to_string())
            .unwrap()
    };
    (
        body["id"].as_str().unwrap().to_string(),
        attr("Keperluan"),
        attr("Bukti Alamat"),
    )
}

async fn submit_domicile(t: &TestApp, keperluan: &str) -> (StatusCode, Value) {
    let (type_id, keperluan_id, bukti_id) = create_domicile(t).await;
    let value_field = format!("attribute[{keperluan_id}][nilai]");
    let file_field = format!("attribute[{bukti_id}][lampiran_files][]");
    send(
        &t.app,
        multipart_request(
            "POST",
            "/api/submissions",
            &t.warga,
            &[
                Part::Text("jenis_surat_id", &type_id),
                Part::Text(&value_field, keperluan),
                Part::File(&file_field, "kk.pdf", b"%PDF-1.4 kartu keluarga"),
            ],
        ),
    )
    .await
}

fn digital_signature() -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(PNG))
}

// ── Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_auth() {
    let t = build_test_app().await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let t = build_test_app().await;
    let req = Request::builder()
        .uri("/api/letter-types")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, _) = send(&t.app, get_request("/api/letter-types", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn residents_cannot_create_letter_types() {
    let t = build_test_app().await;
    let (status, body) = send(
        &t.app,
        json_request("POST", "/api/letter-types", &t.warga, domicile_type()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn letter_type_listing_shows_ordered_schema() {
    let t = build_test_app().await;
    create_domicile(&t).await;
    let (status, body) = send(&t.app, get_request("/api/letter-types", &t.warga)).await;
    assert_eq!(status, StatusCode::OK);
    let types = body.as_array().unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0]["code"], "SKD");
    assert_eq!(types[0]["attributes"][0]["name"], "Keperluan");
    assert_eq!(types[0]["attributes"][1]["name"], "Bukti Alamat");
}

#[tokio::test]
async fn duplicate_code_is_conflict() {
    let t = build_test_app().await;
    create_domicile(&t).await;
    let (status, body) = send(
        &t.app,
        json_request("POST", "/api/letter-types", &t.admin, domicile_type()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn oversized_attachment_count_is_422() {
    let t = build_test_app().await;
    let mut input = domicile_type();
    input["attributes"][1]["min_attachment_count"] = json!(3_000_000_000u64);
    let (status, body) = send(
        &t.app,
        json_request("POST", "/api/letter-types", &t.admin, input),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert!(body["errors"]
        .get("attributes.1.min_attachment_count")
        .is_some());
}

#[tokio::test]
async fn blank_required_value_is_422_with_field_key() {
    let t = build_test_app().await;
    let (type_id, keperluan_id, _) = create_domicile(&t).await;
    let value_field = format!("attribute[{keperluan_id}][nilai]");
    let (status, body) = send(
        &t.app,
        multipart_request(
            "POST",
            "/api/submissions",
            &t.warga,
            &[
                Part::Text("jenis_surat_id", &type_id),
                Part::Text(&value_field, "   "),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["errors"]
        .get(format!("attribute.{keperluan_id}.nilai"))
        .is_some());
}

#[tokio::test]
async fn submission_stores_attachment_and_renders_detail() {
    let t = build_test_app().await;
    let (status, body) = submit_domicile(&t, "Melamar kerja").await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["submission"]["status"], "pending");

    let id = body["submission"]["id"].as_str().unwrap();
    let uri = format!("/api/submissions/{id}");
    let (status, detail) = send(&t.app, get_request(&uri, &t.warga)).await;
    assert_eq!(status, StatusCode::OK);
    let attrs = detail["attributes"].as_array().unwrap();
    assert_eq!(attrs[0]["value"], "Melamar kerja");
    let paths = attrs[1]["file_paths"].as_array().unwrap();
    assert_eq!(paths.len(), 1);
    let key = paths[0].as_str().unwrap();
    assert!(key.starts_with(&format!("lampiran/{id}/")));
    assert!(t.storage.path().join(key).exists());
}

#[tokio::test]
async fn other_residents_cannot_view() {
    let t = build_test_app().await;
    let (_, body) = submit_domicile(&t, "Melamar kerja").await;
    let id = body["submission"]["id"].as_str().unwrap();
    let (status, _) = send(
        &t.app,
        get_request(&format!("/api/submissions/{id}"), &t.stranger),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = send(&t.app, get_request("/api/submissions", &t.stranger)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn approve_then_download_pdf() {
    let t = build_test_app().await;
    let (_, body) = submit_domicile(&t, "Melamar kerja").await;
    let id = body["submission"]["id"].as_str().unwrap().to_string();
    let signature = digital_signature();

    let (status, verified) = send(
        &t.app,
        multipart_request(
            "POST",
            &format!("/api/submissions/{id}/verify"),
            &t.admin,
            &[
                Part::Text("status", "approved"),
                Part::Text("tanda_tangan_type", "digital"),
                Part::Text("use_existing_ttd", "no"),
                Part::Text("tanda_tangan_digital", &signature),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{verified}");
    assert_eq!(verified["status"], "approved");
    let number = verified["letter_number"].as_str().unwrap();
    assert!(number.starts_with("001/SKD/"));

    let resp = t
        .app
        .clone()
        .oneshot(get_request(&format!("/api/submissions/{id}/pdf"), &t.warga))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/pdf");
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.contains("surat-001-SKD-"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"%PDF"));

    // Approved is terminal.
    let (status, body) = send(
        &t.app,
        multipart_request(
            "POST",
            &format!("/api/submissions/{id}/verify"),
            &t.admin,
            &[
                Part::Text("status", "rejected"),
                Part::Text("alasan_penolakan", "Data tidak lengkap sama sekali"),
                Part::Text("use_existing_ttd", "yes"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn digital_signature_without_data_is_rejected() {
    let t = build_test_app().await;
    let (_, body) = submit_domicile(&t, "Melamar kerja").await;
    let id = body["submission"]["id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &t.app,
        multipart_request(
            "POST",
            &format!("/api/submissions/{id}/verify"),
            &t.admin,
            &[
                Part::Text("status", "approved"),
                Part::Text("tanda_tangan_type", "digital"),
                Part::Text("use_existing_ttd", "no"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"].get("tanda_tangan_digital").is_some());
}

#[tokio::test]
async fn needs_revision_then_owner_resubmits() {
    let t = build_test_app().await;
    let (_, body) = submit_domicile(&t, "Melamar kerja").await;
    let id = body["submission"]["id"].as_str().unwrap().to_string();
    let keperluan_id = body["attributes"][0]["definition"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, verified) = send(
        &t.app,
        multipart_request(
            "POST",
            &format!("/api/submissions/{id}/verify"),
            &t.admin,
            &[
                Part::Text("status", "needs_revision"),
                Part::Text("alasan_penolakan", "Mohon perjelas keperluan surat"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{verified}");
    assert_eq!(verified["status"], "needs_revision");

    let value_field = format!("attribute[{keperluan_id}][nilai]");
    let (status, revised) = send(
        &t.app,
        multipart_request(
            "POST",
            &format!("/api/submissions/{id}"),
            &t.warga,
            &[Part::Text(&value_field, "Melamar kerja di kantor kecamatan")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{revised}");
    assert_eq!(revised["submission"]["status"], "pending");
    assert!(revised["submission"]["rejection_reason"].is_null());
    assert_eq!(
        revised["attributes"][0]["value"],
        "Melamar kerja di kantor kecamatan"
    );
}

#[tokio::test]
async fn owner_deletes_pending_submission() {
    let t = build_test_app().await;
    let (_, body) = submit_domicile(&t, "Melamar kerja").await;
    let id = body["submission"]["id"].as_str().unwrap().to_string();
    let key = body["attributes"][1]["file_paths"][0]
        .as_str()
        .unwrap()
        .to_string();
    assert!(t.storage.path().join(&key).exists());

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/api/submissions/{id}"))
        .header("authorization", format!("Bearer {}", t.warga))
        .body(Body::empty())
        .unwrap();
    let resp = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let (status, _) = send(&t.app, get_request(&format!("/api/submissions/{id}"), &t.warga)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!t.storage.path().join(&key).exists());
}

#[tokio::test]
async fn admin_list_filters_by_status() {
    let t = build_test_app().await;
    submit_domicile(&t, "Melamar kerja").await;
    let (status, body) = send(
        &t.app,
        get_request("/api/submissions?status=pending", &t.admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(
        &t.app,
        get_request("/api/submissions?status=approved", &t.admin),
    )
    .await;
    assert!(body.as_array().unwrap().is_empty());
}
