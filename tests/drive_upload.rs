//! Drive adapter exercised against a local simulator of the metadata and
//! resumable-upload endpoints.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{get, post, put};
use serde_json::{Value, json};

use hostbound::{
    DriveHost, DriveHostOptions, Error, FilePath, StaticAccessToken, StorageHost,
};

const CHUNK: usize = 262_144;

enum Scripted {
    Success,
    Resume(&'static str),
    Status(u16),
}

#[derive(Default)]
struct UploadSim {
    base_url: String,
    script: VecDeque<Scripted>,
    puts: Vec<String>,
    initiations: usize,
}

type SharedUploadSim = Arc<Mutex<UploadSim>>;

async fn initiate(State(sim): State<SharedUploadSim>) -> Response {
    let mut sim = sim.lock().unwrap();
    sim.initiations += 1;
    let session_url = format!("{}/session", sim.base_url);
    (StatusCode::OK, [(header::LOCATION, session_url)]).into_response()
}

async fn session_put(State(sim): State<SharedUploadSim>, headers: HeaderMap) -> Response {
    let mut sim = sim.lock().unwrap();
    let content_range = headers
        .get(header::CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    sim.puts.push(content_range);
    match sim.script.pop_front().unwrap_or(Scripted::Success) {
        Scripted::Success => StatusCode::OK.into_response(),
        Scripted::Resume(range) => {
            (StatusCode::PERMANENT_REDIRECT, [(header::RANGE, range)]).into_response()
        }
        Scripted::Status(code) => StatusCode::from_u16(code).unwrap().into_response(),
    }
}

/// Serves the upload endpoints and returns the simulator handle plus a
/// host wired at it.
async fn upload_fixture(
    script: Vec<Scripted>,
    max_upload_attempts: usize,
) -> (SharedUploadSim, DriveHost) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let sim = Arc::new(Mutex::new(UploadSim {
        base_url: base_url.clone(),
        script: script.into(),
        ..UploadSim::default()
    }));
    let app = Router::new()
        .route("/upload/files", post(initiate))
        .route("/session", put(session_put))
        .with_state(sim.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let host = DriveHost::new(
        Arc::new(StaticAccessToken("test-token".to_string())),
        DriveHostOptions {
            api_base_url: format!("{base_url}/api"),
            upload_base_url: format!("{base_url}/upload"),
            max_upload_attempts,
            upload_chunk_size: CHUNK,
        },
    )
    .unwrap();
    (sim, host)
}

#[tokio::test]
async fn resumable_upload_continues_from_the_reported_offset() {
    let (sim, host) = upload_fixture(
        vec![Scripted::Resume("bytes=0-262143"), Scripted::Success],
        3,
    )
    .await;
    let payload = "x".repeat(600 * 1024);

    host.write_file_unchecked(&FilePath::parse("/upload.bin"), &payload)
        .await
        .unwrap();

    let sim = sim.lock().unwrap();
    assert_eq!(sim.initiations, 1);
    assert_eq!(
        sim.puts,
        vec!["bytes 0-262143/614400", "bytes 262144-614399/614400"]
    );
}

#[tokio::test]
async fn a_failed_attempt_probes_the_session_and_resumes() {
    let (sim, host) = upload_fixture(
        vec![
            Scripted::Status(503),
            Scripted::Resume("bytes=0-262143"),
            Scripted::Success,
        ],
        3,
    )
    .await;
    let payload = "x".repeat(600 * 1024);

    host.write_file_unchecked(&FilePath::parse("/upload.bin"), &payload)
        .await
        .unwrap();

    let sim = sim.lock().unwrap();
    assert_eq!(sim.initiations, 1);
    assert_eq!(
        sim.puts,
        vec![
            "bytes 0-262143/614400",
            "bytes */614400",
            "bytes 262144-524287/614400",
        ]
    );
}

#[tokio::test]
async fn a_dead_session_is_reinitiated_from_zero() {
    let (sim, host) = upload_fixture(
        vec![
            Scripted::Status(500),
            Scripted::Status(404),
            Scripted::Success,
        ],
        3,
    )
    .await;
    let payload = "x".repeat(300_000);

    host.write_file_unchecked(&FilePath::parse("/upload.bin"), &payload)
        .await
        .unwrap();

    let sim = sim.lock().unwrap();
    assert_eq!(sim.initiations, 2);
    assert_eq!(
        sim.puts,
        vec![
            "bytes 0-262143/300000",
            "bytes */300000",
            "bytes 0-262143/300000",
        ]
    );
}

#[tokio::test]
async fn exhausted_attempts_surface_every_failure() {
    let script = (0..8).map(|_| Scripted::Status(500)).collect();
    let (sim, host) = upload_fixture(script, 2).await;
    let payload = "x".repeat(100 * 1024);

    let err = host
        .write_file_unchecked(&FilePath::parse("/upload.bin"), &payload)
        .await
        .unwrap_err();

    match err {
        Error::UploadExhausted { attempts } => assert_eq!(attempts.len(), 2),
        other => panic!("expected an exhausted upload, got {other}"),
    }
    // Initial attempt, then one retry whose probe found the session dead
    // and reinitiated.
    assert_eq!(sim.lock().unwrap().initiations, 2);
}

#[tokio::test]
async fn an_empty_upload_finalizes_the_session_directly() {
    let (sim, host) = upload_fixture(vec![Scripted::Success], 3).await;

    host.write_file_unchecked(&FilePath::parse("/empty"), "")
        .await
        .unwrap();

    let sim = sim.lock().unwrap();
    assert_eq!(sim.puts, vec!["bytes */0"]);
}

// Metadata-side simulator: a fixed object graph addressed by opaque ids.

struct GraphEntry {
    id: &'static str,
    name: &'static str,
    parent: &'static str,
    mime_type: &'static str,
}

const FOLDER: &str = "application/vnd.google-apps.folder";
const GRAPH: &[GraphEntry] = &[
    GraphEntry {
        id: "d1",
        name: "docs",
        parent: "root",
        mime_type: FOLDER,
    },
    GraphEntry {
        id: "f1",
        name: "b.txt",
        parent: "d1",
        mime_type: "text/plain",
    },
    GraphEntry {
        id: "f2",
        name: "a.txt",
        parent: "d1",
        mime_type: "text/plain",
    },
];

type SharedDeletions = Arc<Mutex<Vec<String>>>;

async fn files_query(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let q = params.get("q").cloned().unwrap_or_default();
    let name = q
        .split("name = '")
        .nth(1)
        .and_then(|rest| rest.split('\'').next());
    let parent = q
        .split(" in parents")
        .next()
        .and_then(|prefix| prefix.rsplit('\'').nth(1));

    let files: Vec<Value> = GRAPH
        .iter()
        .filter(|entry| parent == Some(entry.parent))
        .filter(|entry| name.is_none_or(|name| name == entry.name))
        .map(|entry| json!({ "id": entry.id, "name": entry.name, "mimeType": entry.mime_type }))
        .collect();
    Json(json!({ "files": files }))
}

async fn file_content(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "f1" => "content b".into_response(),
        "f2" => "content a".into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn file_delete(State(deleted): State<SharedDeletions>, Path(id): Path<String>) -> StatusCode {
    deleted.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn metadata_fixture() -> (SharedDeletions, DriveHost) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let deleted: SharedDeletions = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/files", get(files_query))
        .route("/api/files/{id}", get(file_content).delete(file_delete))
        .with_state(deleted.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let host = DriveHost::new(
        Arc::new(StaticAccessToken("test-token".to_string())),
        DriveHostOptions {
            api_base_url: format!("{base_url}/api"),
            upload_base_url: format!("{base_url}/upload"),
            ..DriveHostOptions::default()
        },
    )
    .unwrap();
    (deleted, host)
}

#[tokio::test]
async fn paths_resolve_through_the_object_graph() {
    let (_, host) = metadata_fixture().await;

    assert!(host.exists(&FilePath::parse("/docs")).await.unwrap());
    assert!(host.exists(&FilePath::parse("/docs/a.txt")).await.unwrap());
    assert!(!host.exists(&FilePath::parse("/docs/missing")).await.unwrap());
    assert!(!host.exists(&FilePath::parse("/other/a.txt")).await.unwrap());
}

#[tokio::test]
async fn directories_are_detected_by_their_mime_type() {
    let (_, host) = metadata_fixture().await;

    assert!(host.is_directory(&FilePath::parse("/")).await.unwrap());
    assert!(host.is_directory(&FilePath::parse("/docs")).await.unwrap());
    assert!(
        !host
            .is_directory(&FilePath::parse("/docs/a.txt"))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn listings_are_sorted_regardless_of_graph_order() {
    let (_, host) = metadata_fixture().await;

    assert_eq!(
        host.list(&FilePath::parse("/docs")).await.unwrap(),
        vec!["a.txt", "b.txt"]
    );
}

#[tokio::test]
async fn file_content_is_fetched_by_resolved_id() {
    let (_, host) = metadata_fixture().await;

    assert_eq!(
        host.read_file(&FilePath::parse("/docs/b.txt")).await.unwrap(),
        "content b"
    );
}

#[tokio::test]
async fn delete_targets_the_resolved_id() {
    let (deleted, host) = metadata_fixture().await;

    host.delete(&FilePath::parse("/docs/b.txt")).await.unwrap();

    assert_eq!(*deleted.lock().unwrap(), vec!["f1"]);
}
