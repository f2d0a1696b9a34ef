//! End-to-end coordinator runs against a mock asset server and a local store

mod helper;

use std::sync::Arc;

use mockito::Server;
use tempfile::TempDir;

use helper::{
    FakeReleaseSource, asset, create_test_coordinator, create_test_store, read_file, release,
    sha256_hex, test_options,
};
use release_tracker::config::RepositoryOverride;
use release_tracker::coordinator::{NoMatchReason, RepositoryOutcome};
use release_tracker::release::RepositoryId;
use release_tracker::store::{UpdateMetadata, VersionStore};

const ASSET: &str = "tool-linux-amd64.tar.gz";

fn tool() -> RepositoryId {
    RepositoryId::new("acme", "tool")
}

fn asset_body() -> Vec<u8> {
    vec![b'x'; 100]
}

#[tokio::test]
async fn downloads_new_release_into_version_scoped_path() {
    let mut server = Server::new_async().await;
    let body = asset_body();
    let digest = sha256_hex(&body);
    let mock = server
        .mock("GET", "/acme/tool/v2.0.0/tool-linux-amd64.tar.gz")
        .with_status(200)
        .with_body(&body)
        .expect(1)
        .create_async()
        .await;
    let source = FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![release(
            "acme",
            "tool",
            "v2.0.0",
            false,
            vec![asset(
                ASSET,
                format!("{}/acme/tool/v2.0.0/{}", server.url(), ASSET),
                100,
                Some(&digest),
            )],
        )],
    );
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir);
    let coordinator = create_test_coordinator(test_options(&dir), Arc::new(source), store.clone());

    let summary = coordinator.run(&[tool()]).await.unwrap();

    mock.assert_async().await;
    let outcome = summary.outcome(&tool()).unwrap();
    assert_eq!(outcome.downloaded_count(), 1);
    let path = dir.path().join("downloads/acme/tool/v2.0.0").join(ASSET);
    let content = read_file(&path);
    assert_eq!(content.len(), 100);
    assert_eq!(sha256_hex(&content), digest);
    let RepositoryOutcome::Downloaded { assets, .. } = outcome else {
        panic!("unexpected outcome {:?}", outcome);
    };
    assert!(assets[0].checksum_verified);
    assert_eq!(
        store
            .get_current_version("acme", "tool")
            .await
            .unwrap()
            .map(|v| v.raw().to_string()),
        Some("v2.0.0".to_string())
    );
}

#[tokio::test]
async fn current_version_skips_without_fetching() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let source = FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![release(
            "acme",
            "tool",
            "v2.0.0",
            false,
            vec![asset(ASSET, format!("{}/{}", server.url(), ASSET), 100, None)],
        )],
    );
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir);
    store
        .update_version("acme", "tool", "v2.0.0", UpdateMetadata::default())
        .await
        .unwrap();
    let coordinator = create_test_coordinator(test_options(&dir), Arc::new(source), store);

    let summary = coordinator.run(&[tool()]).await.unwrap();

    mock.assert_async().await;
    assert!(matches!(
        summary.outcome(&tool()),
        Some(RepositoryOutcome::SkippedNotNewer { .. })
    ));
}

#[tokio::test]
async fn rerun_on_unchanged_releases_is_idempotent() {
    let mut server = Server::new_async().await;
    let body = asset_body();
    let mock = server
        .mock("GET", "/tool.tar.gz")
        .with_status(200)
        .with_body(&body)
        .expect(1)
        .create_async()
        .await;
    let source = Arc::new(FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![release(
            "acme",
            "tool",
            "v2.0.0",
            false,
            vec![asset("tool.tar.gz", format!("{}/tool.tar.gz", server.url()), 100, None)],
        )],
    ));
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir);
    let coordinator = create_test_coordinator(test_options(&dir), source.clone(), store.clone());

    let first = coordinator.run(&[tool()]).await.unwrap();
    let state_after_first = store.list_all().await.unwrap();
    let second = coordinator.run(&[tool()]).await.unwrap();
    let state_after_second = store.list_all().await.unwrap();

    mock.assert_async().await;
    assert_eq!(first.totals.downloaded, 1);
    assert_eq!(second.totals.downloaded, 0);
    assert_eq!(second.totals.skipped, 1);
    assert_eq!(state_after_first, state_after_second);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn pinned_version_wins_over_newer_release() {
    let mut server = Server::new_async().await;
    let old = server
        .mock("GET", "/v1.0.0-rc.1/tool.tar.gz")
        .with_status(200)
        .with_body("rc")
        .expect(1)
        .create_async()
        .await;
    let new = server
        .mock("GET", "/v2.0.0/tool.tar.gz")
        .expect(0)
        .create_async()
        .await;
    let source = FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![
            release(
                "acme",
                "tool",
                "v2.0.0",
                false,
                vec![asset("tool.tar.gz", format!("{}/v2.0.0/tool.tar.gz", server.url()), 0, None)],
            ),
            release(
                "acme",
                "tool",
                "v1.0.0-rc.1",
                true,
                vec![asset(
                    "tool.tar.gz",
                    format!("{}/v1.0.0-rc.1/tool.tar.gz", server.url()),
                    0,
                    None,
                )],
            ),
        ],
    );
    let dir = TempDir::new().unwrap();
    let mut options = test_options(&dir);
    options.include_prereleases = false;
    options.overrides.insert(
        "acme/tool".to_string(),
        RepositoryOverride {
            target_version: Some("1.0.0-rc.1".to_string()),
            ..Default::default()
        },
    );
    let store = create_test_store(&dir);
    let coordinator = create_test_coordinator(options, Arc::new(source), store.clone());

    let summary = coordinator.run(&[tool()]).await.unwrap();

    old.assert_async().await;
    new.assert_async().await;
    assert!(matches!(
        summary.outcome(&tool()),
        Some(RepositoryOutcome::Downloaded { version, .. }) if version == "v1.0.0-rc.1"
    ));
    let entry = store.get_entry("acme", "tool").await.unwrap().unwrap();
    assert_eq!(entry.current_version, "v1.0.0-rc.1");
}

#[tokio::test]
async fn missing_pin_skips_and_leaves_store_unchanged() {
    let source = FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![release(
            "acme",
            "tool",
            "v2.0.0",
            false,
            vec![asset("tool.tar.gz", "http://127.0.0.1:9/tool.tar.gz".to_string(), 0, None)],
        )],
    );
    let dir = TempDir::new().unwrap();
    let mut options = test_options(&dir);
    options.overrides.insert(
        "acme/tool".to_string(),
        RepositoryOverride {
            target_version: Some("v9.9.9".to_string()),
            ..Default::default()
        },
    );
    let store = create_test_store(&dir);
    store
        .update_version("acme", "tool", "v1.0.0", UpdateMetadata::default())
        .await
        .unwrap();
    let before = store.list_all().await.unwrap();
    let coordinator = create_test_coordinator(options, Arc::new(source), store.clone());

    let summary = coordinator.run(&[tool()]).await.unwrap();

    assert_eq!(
        summary.outcome(&tool()),
        Some(&RepositoryOutcome::SkippedNoMatch {
            reason: NoMatchReason::PinNotFound {
                target: "v9.9.9".to_string()
            }
        })
    );
    assert_eq!(store.list_all().await.unwrap(), before);
}

#[tokio::test]
async fn transient_failures_are_retried_up_to_ceiling() {
    let mut server = Server::new_async().await;
    let body = asset_body();
    // Matching prefers the first mock that still has expected hits left
    let failing = server
        .mock("GET", "/tool.tar.gz")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;
    let succeeding = server
        .mock("GET", "/tool.tar.gz")
        .with_status(200)
        .with_body(&body)
        .expect(1)
        .create_async()
        .await;
    let source = FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![release(
            "acme",
            "tool",
            "v2.0.0",
            false,
            vec![asset("tool.tar.gz", format!("{}/tool.tar.gz", server.url()), 100, None)],
        )],
    );
    let dir = TempDir::new().unwrap();
    let coordinator =
        create_test_coordinator(test_options(&dir), Arc::new(source), create_test_store(&dir));

    let summary = coordinator.run(&[tool()]).await.unwrap();

    failing.assert_async().await;
    succeeding.assert_async().await;
    let Some(RepositoryOutcome::Downloaded { assets, .. }) = summary.outcome(&tool()) else {
        panic!("expected download, got {:?}", summary.outcome(&tool()));
    };
    assert_eq!(assets[0].attempts, 3);
}

#[tokio::test]
async fn checksum_mismatch_fails_repository_without_recording() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/tool.tar.gz")
        .with_status(200)
        .with_body("tampered")
        .expect(2)
        .create_async()
        .await;
    let expected = sha256_hex(b"original");
    let source = FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![release(
            "acme",
            "tool",
            "v2.0.0",
            false,
            vec![asset(
                "tool.tar.gz",
                format!("{}/tool.tar.gz", server.url()),
                0,
                Some(&expected),
            )],
        )],
    );
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir);
    let coordinator = create_test_coordinator(test_options(&dir), Arc::new(source), store.clone());

    let summary = coordinator.run(&[tool()]).await.unwrap();

    mock.assert_async().await;
    assert!(summary.outcome(&tool()).unwrap().is_failure());
    assert!(!dir.path().join("downloads/acme/tool/v2.0.0/tool.tar.gz").exists());
    assert_eq!(store.get_entry("acme", "tool").await.unwrap(), None);
}

#[tokio::test]
async fn asset_patterns_select_what_is_fetched() {
    let mut server = Server::new_async().await;
    let wanted = server
        .mock("GET", "/a.tar.gz")
        .with_status(200)
        .with_body("archive")
        .expect(1)
        .create_async()
        .await;
    let unwanted = server
        .mock("GET", mockito::Matcher::Regex(r"^/a(-sources)?\.zip$".to_string()))
        .expect(0)
        .create_async()
        .await;
    let url = |name: &str| format!("{}/{}", server.url(), name);
    let source = FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![release(
            "acme",
            "tool",
            "v2.0.0",
            false,
            vec![
                asset("a.tar.gz", url("a.tar.gz"), 0, None),
                asset("a-sources.zip", url("a-sources.zip"), 0, None),
                asset("a.zip", url("a.zip"), 0, None),
            ],
        )],
    );
    let dir = TempDir::new().unwrap();
    let mut options = test_options(&dir);
    options.asset_patterns = vec!["*.tar.gz".to_string(), "!*-sources.zip".to_string()];
    let store = create_test_store(&dir);
    let coordinator = create_test_coordinator(options, Arc::new(source), store.clone());

    let summary = coordinator.run(&[tool()]).await.unwrap();

    wanted.assert_async().await;
    unwanted.assert_async().await;
    assert_eq!(summary.outcome(&tool()).unwrap().downloaded_count(), 1);
    let entry = store.get_entry("acme", "tool").await.unwrap().unwrap();
    assert_eq!(entry.download_history[0].assets, vec!["a.tar.gz".to_string()]);
}

#[tokio::test]
async fn failing_repository_does_not_stop_others() {
    let mut server = Server::new_async().await;
    let _asset = server
        .mock("GET", "/tool.tar.gz")
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;
    let source = FakeReleaseSource::new().with_releases(
        "acme",
        "tool",
        vec![release(
            "acme",
            "tool",
            "v1.0.0",
            false,
            vec![asset("tool.tar.gz", format!("{}/tool.tar.gz", server.url()), 0, None)],
        )],
    );
    let dir = TempDir::new().unwrap();
    let coordinator =
        create_test_coordinator(test_options(&dir), Arc::new(source), create_test_store(&dir));
    let unknown = RepositoryId::new("ghost", "project");

    let summary = coordinator.run(&[unknown.clone(), tool()]).await.unwrap();

    assert_eq!(summary.repositories[0].repository, unknown);
    assert!(summary.repositories[0].outcome.is_failure());
    assert_eq!(summary.repositories[1].outcome.downloaded_count(), 1);
    assert_eq!(summary.totals.failed, 1);
    assert_eq!(summary.totals.downloaded, 1);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["repositories"][0]["status"], "failed");
    assert_eq!(json["repositories"][1]["status"], "downloaded");
}
