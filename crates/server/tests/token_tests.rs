//! Upload token enforcement: token-guarded endpoints reject bad or
//! missing credentials before touching session state or disk.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::server::{TestServer, part_bytes};
use tower::ServiceExt;

#[tokio::test]
async fn test_part_upload_requires_token() {
    let server = TestServer::new().await;
    let chunk = server.chunk_size() as usize;
    let (upload_id, _token) = server.init_video("lesson-1", 2 * chunk as u64).await;

    // Missing header.
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/uploads/{upload_id}/parts/1"))
        .body(Body::from(part_bytes(1, chunk)))
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token.
    let status = server
        .put_part(&upload_id, 1, "not-the-token", part_bytes(1, chunk))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Neither attempt touched session state or the staging tree.
    let (_, body) = server
        .json_request("GET", &format!("/uploads/{upload_id}/status"), None, &[])
        .await;
    assert_eq!(body["status"], "initiated");
    assert_eq!(body["received_bytes"], 0);
    let parts_dir = server.base_dir().join(format!("tmp/{upload_id}/parts"));
    assert_eq!(std::fs::read_dir(&parts_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_listing_and_complete_require_token() {
    let server = TestServer::new().await;
    let chunk = server.chunk_size() as usize;
    let (upload_id, token) = server.init_video("lesson-2", chunk as u64).await;
    server
        .put_part(&upload_id, 1, &token, part_bytes(1, chunk))
        .await;

    for (method, uri) in [
        ("GET", format!("/uploads/{upload_id}/parts")),
        ("POST", format!("/uploads/{upload_id}/complete")),
    ] {
        let (status, _) = server.json_request(method, &uri, None, &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");

        let (status, _) = server
            .json_request(method, &uri, None, &[("X-Upload-Token", "wrong")])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }

    // The failed complete attempts did not advance the session.
    let (_, body) = server
        .json_request("GET", &format!("/uploads/{upload_id}/status"), None, &[])
        .await;
    assert_eq!(body["status"], "receiving");
}

#[tokio::test]
async fn test_unknown_upload_is_auth_failure_on_guarded_routes() {
    let server = TestServer::new().await;
    let ghost = uuid::Uuid::new_v4();

    // A guessed upload-id with a made-up token is indistinguishable from a
    // wrong token.
    let (status, _) = server
        .json_request(
            "GET",
            &format!("/uploads/{ghost}/parts"),
            None,
            &[("X-Upload-Token", "guess")],
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The unguarded status endpoint distinguishes: unknown id is 404.
    let (status, _) = server
        .json_request("GET", &format!("/uploads/{ghost}/status"), None, &[])
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tokens_are_scoped_per_session() {
    let server = TestServer::new().await;
    let chunk = server.chunk_size() as usize;
    let (upload_a, token_a) = server.init_video("lesson-3", chunk as u64).await;
    let (upload_b, _token_b) = server.init_video("lesson-4", chunk as u64).await;

    // Session A's token grants nothing on session B.
    let status = server
        .put_part(&upload_b, 1, &token_a, part_bytes(1, chunk))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = server
        .put_part(&upload_a, 1, &token_a, part_bytes(1, chunk))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
