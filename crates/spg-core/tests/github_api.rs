use std::time::Duration;

use mockito::Matcher;
use spg_core::{
    AssetDescriptor, DownloadRequest, Downloader, GitHubClient, InstallError, ReleaseType, Strategy,
};

const OWNER: &str = "SecurePassGenerator";
const REPO: &str = "SecurePassGenerator-PS";

fn client(server: &mockito::Server, token: Option<&str>) -> GitHubClient {
    GitHubClient::new(reqwest::Client::new(), &server.url(), OWNER, REPO, token)
}

fn releases_path(suffix: &str) -> String {
    format!("/repos/{OWNER}/{REPO}/releases{suffix}")
}

fn release_json(tag: &str, prerelease: bool) -> String {
    format!(
        r#"{{
            "tag_name": "{tag}",
            "name": "Release {tag}",
            "created_at": "2026-05-01T12:00:00Z",
            "prerelease": {prerelease},
            "draft": false,
            "assets": [
                {{
                    "name": "SecurePassGenerator-PS-{tag}.zip",
                    "id": 11,
                    "size": 2048,
                    "url": "https://api.github.com/repos/{OWNER}/{REPO}/releases/assets/11",
                    "browser_download_url": "https://github.com/{OWNER}/{REPO}/releases/download/{tag}/SecurePassGenerator-PS-{tag}.zip"
                }}
            ]
        }}"#
    )
}

#[tokio::test]
async fn latest_release_sends_github_headers_and_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", releases_path("/latest").as_str())
        .match_header("accept", "application/vnd.github+json")
        .match_header("x-github-api-version", "2022-11-28")
        .match_header("authorization", "token ghp_secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(release_json("v3.1.0", false))
        .create_async()
        .await;

    let fetched = client(&server, Some("ghp_secret"))
        .fetch_release(ReleaseType::Latest)
        .await
        .expect("latest release should be fetched");

    mock.assert_async().await;
    assert_eq!(fetched.release.tag_name, "v3.1.0");
    assert_eq!(fetched.actual, ReleaseType::Latest);
    assert!(!fetched.fell_back);
    assert_eq!(fetched.release.assets.len(), 1);
}

#[tokio::test]
async fn public_mode_omits_authorization() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", releases_path("/latest").as_str())
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(release_json("v3.1.0", false))
        .create_async()
        .await;

    client(&server, Some("  "))
        .fetch_release(ReleaseType::Latest)
        .await
        .expect("unauthenticated fetch should work");

    mock.assert_async().await;
}

#[tokio::test]
async fn prerelease_request_falls_back_to_latest() {
    let mut server = mockito::Server::new_async().await;
    let body = format!(
        "[{}, {}]",
        release_json("v3.1.0", false),
        release_json("v3.0.0", false)
    );
    server
        .mock("GET", releases_path("").as_str())
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let fetched = client(&server, None)
        .fetch_release(ReleaseType::PreRelease)
        .await
        .expect("fallback must not be an error");

    assert_eq!(fetched.release.tag_name, "v3.1.0");
    assert_eq!(fetched.requested, ReleaseType::PreRelease);
    assert_eq!(fetched.actual, ReleaseType::Latest);
    assert!(fetched.fell_back);
}

#[tokio::test]
async fn empty_release_list_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", releases_path("").as_str())
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let error = client(&server, None)
        .fetch_release(ReleaseType::PreRelease)
        .await
        .expect_err("no releases should fail");

    assert!(error.is_not_found());
}

#[tokio::test]
async fn missing_latest_release_is_no_releases_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", releases_path("/latest").as_str())
        .with_status(404)
        .with_body(r#"{"message": "Not Found"}"#)
        .create_async()
        .await;

    let error = client(&server, None)
        .fetch_release(ReleaseType::Latest)
        .await
        .expect_err("a repository without releases should fail");

    assert!(error.is_not_found());
    assert_eq!(
        error.to_string(),
        format!("release for {OWNER}/{REPO} not found")
    );
}

#[tokio::test]
async fn auth_failures_mention_the_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", releases_path("/latest").as_str())
        .with_status(401)
        .create_async()
        .await;

    let error = client(&server, Some("expired"))
        .fetch_release(ReleaseType::Latest)
        .await
        .expect_err("401 should fail");

    assert!(matches!(error, InstallError::AuthFailure { status: 401, .. }));
    assert!(error.to_string().contains("token was rejected"));
}

#[tokio::test]
async fn download_falls_through_to_public_url() {
    let mut server = mockito::Server::new_async().await;
    let api = server
        .mock("GET", "/api/assets/7")
        .match_header("accept", "application/octet-stream")
        .with_status(502)
        .expect(2)
        .create_async()
        .await;
    let public = server
        .mock("GET", "/public/App-1.2.0.zip")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("zip-bytes")
        .create_async()
        .await;

    let temp = tempfile::tempdir().expect("tempdir should be created");
    let dest = temp.path().join("App-1.2.0.zip");
    let asset = AssetDescriptor {
        name: "App-1.2.0.zip".to_string(),
        id: 7,
        size: 9,
        url: format!("{}/api/assets/7", server.url()),
        browser_download_url: Some(format!("{}/public/App-1.2.0.zip", server.url())),
    };

    let outcome = Downloader::new(reqwest::Client::new(), Some("ghp_secret"))
        .with_retry_policy(1, Duration::ZERO)
        .download(DownloadRequest::for_asset(&asset, &dest))
        .await
        .expect("public url should succeed");

    api.assert_async().await;
    public.assert_async().await;
    assert_eq!(outcome.strategy, Strategy::PublicUrl);
    assert_eq!(outcome.size, 9);
    assert_eq!(
        std::fs::read(&dest).expect("download should exist"),
        b"zip-bytes"
    );
}

#[tokio::test]
async fn exhausted_download_aggregates_errors_and_leaves_no_file() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/missing.zip")
        .with_status(500)
        .expect(4)
        .create_async()
        .await;

    let temp = tempfile::tempdir().expect("tempdir should be created");
    let dest = temp.path().join("missing.zip");
    let url = format!("{}/missing.zip", server.url());

    let error = Downloader::new(reqwest::Client::new(), None)
        .with_retry_policy(2, Duration::ZERO)
        .download(DownloadRequest::new(&url, &dest))
        .await
        .expect_err("every attempt fails");

    mock.assert_async().await;
    let message = error.to_string();
    assert!(message.contains("round 1 streaming"));
    assert!(message.contains("round 2 buffered"));
    assert!(!dest.exists());
}

#[tokio::test]
async fn repo_file_falls_back_to_main_branch() {
    let mut server = mockito::Server::new_async().await;
    let path = format!("/repos/{OWNER}/{REPO}/contents/SecurePassGenerator.ps1");
    let missing = server
        .mock("GET", path.as_str())
        .match_query(Matcher::UrlEncoded("ref".into(), "prerelease".into()))
        .with_status(404)
        .create_async()
        .await;
    // "\u{feff}Write-Host 'hi'" with a UTF-8 BOM, base64 encoded and wrapped.
    let found = server
        .mock("GET", path.as_str())
        .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
        .with_status(200)
        .with_body(r#"{"encoding": "base64", "content": "77u/V3JpdGUtSG9z\ndCAnaGkn\n"}"#)
        .create_async()
        .await;

    let file = client(&server, None)
        .fetch_repo_file_with_fallback("SecurePassGenerator.ps1", "prerelease", "main")
        .await
        .expect("fallback branch should serve the file");

    missing.assert_async().await;
    found.assert_async().await;
    assert_eq!(file.git_ref, "main");
    assert_eq!(file.bytes, b"Write-Host 'hi'");
}

#[tokio::test]
async fn repo_file_missing_everywhere_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/repos/.+/contents/LICENSE".to_string()))
        .with_status(404)
        .expect(2)
        .create_async()
        .await;

    let error = client(&server, None)
        .fetch_repo_file_with_fallback("LICENSE", "prerelease", "main")
        .await
        .expect_err("file is absent on both branches");

    assert!(error.is_not_found());
}

#[tokio::test]
async fn repo_file_binary_payload_is_written_untouched() {
    let mut server = mockito::Server::new_async().await;
    let icon = format!("/repos/{OWNER}/{REPO}/contents/SecurePassGenerator.ico");
    server
        .mock("GET", icon.as_str())
        .match_query(Matcher::UrlEncoded("ref".into(), "prerelease".into()))
        .with_status(404)
        .create_async()
        .await;
    // 0xEF 0xBB 0xBF 0x00 looks like a BOM but belongs to the icon bytes.
    server
        .mock("GET", icon.as_str())
        .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
        .with_status(200)
        .with_body(r#"{"encoding": "base64", "content": "77u/AA=="}"#)
        .create_async()
        .await;

    let temp = tempfile::tempdir().expect("tempdir should be created");
    let dest = temp.path().join("SecurePassGenerator.ico");
    let file = client(&server, None)
        .write_repo_file("SecurePassGenerator.ico", "prerelease", "main", &dest)
        .await
        .expect("icon should be written");

    assert_eq!(file.git_ref, "main");
    assert_eq!(
        std::fs::read(&dest).expect("icon should exist"),
        [0xEF, 0xBB, 0xBF, 0x00]
    );
}
