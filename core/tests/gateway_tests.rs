//! Gateway behaviour against the in-memory contents host

use std::sync::Arc;

use codeatease_core::fake::MemoryContentHost;
use codeatease_core::gateway::{BINARY_PLACEHOLDER, REPOS_PER_PAGE};
use codeatease_core::transport::Method;
use codeatease_core::{
    FileDeletion, FileGateway, FileUpdate, NewFile, NodeKind, RemoteToken, RepoContext, SyncError,
    TreeEntry,
};

fn setup() -> (Arc<MemoryContentHost>, FileGateway, RepoContext) {
    let host = Arc::new(MemoryContentHost::new());
    let gateway = FileGateway::new(host.clone());
    let ctx = RepoContext::new("octo", "demo", RemoteToken::new("tok"));
    (host, gateway, ctx)
}

#[tokio::test]
async fn test_fetch_then_update_round() {
    let (host, gateway, ctx) = setup();
    host.put_text("octo", "demo", "src/lib.rs", "pub fn a() {}\n");

    let file = gateway.fetch(&ctx, "src/lib.rs").await.unwrap();
    assert_eq!(file.name, "lib.rs");
    assert_eq!(file.content, "pub fn a() {}\n");
    assert!(!file.binary);

    let receipt = gateway
        .update(
            &ctx,
            &FileUpdate {
                path: "src/lib.rs".into(),
                content: "pub fn b() {}\n".into(),
                message: "Update lib".into(),
                prior_sha: file.sha.clone(),
                branch: "main".into(),
            },
        )
        .await
        .unwrap();
    assert_ne!(receipt.sha, file.sha);
    assert_eq!(host.file_sha("octo", "demo", "src/lib.rs"), Some(receipt.sha));
}

#[tokio::test]
async fn test_stale_update_is_conflict() {
    let (host, gateway, ctx) = setup();
    let original = host.put_text("octo", "demo", "a.txt", "v1");
    host.put_text("octo", "demo", "a.txt", "v2");

    let err = gateway
        .update(
            &ctx,
            &FileUpdate {
                path: "a.txt".into(),
                content: "v3".into(),
                message: "m".into(),
                prior_sha: original,
                branch: "main".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));
    assert_eq!(host.file_text("octo", "demo", "a.txt").as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_missing_prior_sha_is_conflict_without_request() {
    let (host, gateway, ctx) = setup();
    host.put_text("octo", "demo", "a.txt", "v1");

    let err = gateway
        .update(
            &ctx,
            &FileUpdate {
                path: "a.txt".into(),
                content: "v2".into(),
                message: "m".into(),
                prior_sha: String::new(),
                branch: "main".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));
    assert!(host.requests().is_empty());
}

#[tokio::test]
async fn test_binary_payload_yields_placeholder() {
    let (host, gateway, ctx) = setup();
    host.put_bytes("octo", "demo", "logo.png", &[0x89, 0x50, 0x4e, 0x47, 0xff, 0x00]);

    let file = gateway.fetch(&ctx, "logo.png").await.unwrap();
    assert!(file.binary);
    assert_eq!(file.content, BINARY_PLACEHOLDER);
    assert_eq!(file.size, 6);
}

#[tokio::test]
async fn test_fetch_missing_and_directory() {
    let (host, gateway, ctx) = setup();
    host.put_text("octo", "demo", "src/lib.rs", "");

    assert!(matches!(
        gateway.fetch(&ctx, "nope.rs").await,
        Err(SyncError::NotFound(_))
    ));
    assert!(matches!(
        gateway.fetch(&ctx, "src").await,
        Err(SyncError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_create_existing_path_is_conflict() {
    let (host, gateway, ctx) = setup();
    host.put_text("octo", "demo", "a.txt", "v1");

    let new_file = |path: &str| NewFile {
        path: path.into(),
        content: "hello".into(),
        message: "Create".into(),
        branch: "main".into(),
    };

    assert!(matches!(
        gateway.create(&ctx, &new_file("a.txt")).await,
        Err(SyncError::Conflict(_))
    ));
    let receipt = gateway.create(&ctx, &new_file("b.txt")).await.unwrap();
    assert_eq!(receipt.path, "b.txt");
    assert_eq!(host.file_text("octo", "demo", "b.txt").as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_delete_checks_sha() {
    let (host, gateway, ctx) = setup();
    let sha = host.put_text("octo", "demo", "a.txt", "v1");

    let deletion = |sha: &str| FileDeletion {
        path: "a.txt".into(),
        message: "Delete".into(),
        prior_sha: sha.into(),
        branch: "main".into(),
    };

    assert!(matches!(
        gateway.delete(&ctx, &deletion("stale")).await,
        Err(SyncError::Conflict(_))
    ));
    let receipt = gateway.delete(&ctx, &deletion(&sha)).await.unwrap();
    assert!(receipt.commit.is_some());
    assert!(!host.file_exists("octo", "demo", "a.txt"));
    assert!(matches!(
        gateway.delete(&ctx, &deletion(&sha)).await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_status_mapping_for_faults() {
    let (host, gateway, ctx) = setup();
    host.put_text("octo", "demo", "a.txt", "v1");
    let path = "/repos/octo/demo/contents/a.txt";

    host.fail_next(Method::Get, path, 502);
    assert!(matches!(
        gateway.fetch(&ctx, "a.txt").await,
        Err(SyncError::UpstreamUnavailable { status: 502, .. })
    ));

    host.time_out_next(Method::Get, path);
    assert!(matches!(
        gateway.fetch(&ctx, "a.txt").await,
        Err(SyncError::UpstreamTimeout(_))
    ));

    host.accept_only("other");
    assert!(matches!(
        gateway.fetch(&ctx, "a.txt").await,
        Err(SyncError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_repository_listing_follows_pages() {
    let (host, gateway, _ctx) = setup();
    for i in 0..(REPOS_PER_PAGE + 5) {
        host.add_repository("octo", &format!("repo-{:03}", i), "main");
    }

    let repos = gateway
        .list_repositories(&RemoteToken::new("tok"))
        .await
        .unwrap();
    assert_eq!(repos.len(), REPOS_PER_PAGE + 5);
    assert_eq!(repos[0].owner, "octo");

    let pages = host
        .requests()
        .iter()
        .filter(|(_, path)| path == "/user/repos")
        .count();
    assert_eq!(pages, 2);
}

#[tokio::test]
async fn test_repository_listing_stops_on_empty_page() {
    let (host, gateway, _ctx) = setup();
    for i in 0..REPOS_PER_PAGE {
        host.add_repository("octo", &format!("repo-{:03}", i), "main");
    }

    let repos = gateway
        .list_repositories(&RemoteToken::new("tok"))
        .await
        .unwrap();
    assert_eq!(repos.len(), REPOS_PER_PAGE);
    assert_eq!(host.requests().len(), 2);
}

#[tokio::test]
async fn test_repository_tree_uses_default_branch() {
    let (host, gateway, ctx) = setup();
    host.add_repository("octo", "demo", "trunk");
    host.put_text("octo", "demo", "src/main.rs", "fn main() {}");
    host.put_text("octo", "demo", "README.md", "# demo");

    let tree = gateway.repository_tree(&ctx).await.unwrap();
    assert_eq!(tree.default_branch, "trunk");
    assert_eq!(tree.tree.len(), 2);
    let src = tree.tree.iter().find(|n| n.name == "src").unwrap();
    assert_eq!(src.kind, NodeKind::Folder);
    assert_eq!(src.children()[0].path, "src/main.rs");
}

#[tokio::test]
async fn test_repository_tree_reports_orphans() {
    let (host, gateway, ctx) = setup();
    host.add_repository("octo", "demo", "main");
    host.set_raw_tree(
        "octo",
        "demo",
        vec![TreeEntry::blob("a/b.txt"), TreeEntry::tree("a"), TreeEntry::blob("x/y.txt")],
    );

    let tree = gateway.repository_tree(&ctx).await.unwrap();
    assert_eq!(tree.tree.len(), 1);
    assert_eq!(tree.tree[0].children()[0].name, "b.txt");
    assert_eq!(tree.dropped, vec!["x/y.txt".to_string()]);
}

#[tokio::test]
async fn test_repository_tree_missing_repo() {
    let (_host, gateway, ctx) = setup();
    assert!(matches!(
        gateway.repository_tree(&ctx).await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_large_file_read_through_blob_api() {
    let (host, gateway, ctx) = setup();
    let sha = host.put_text("octo", "demo", "data/dump.sql", "INSERT INTO t VALUES (1);\n");
    host.serve_without_inline_content("octo", "demo", "data/dump.sql");

    let file = gateway.fetch(&ctx, "data/dump.sql").await.unwrap();
    assert_eq!(file.content, "INSERT INTO t VALUES (1);\n");
    assert_eq!(file.sha, sha);
    assert!(!file.binary);

    let blob_path = format!("/repos/octo/demo/git/blobs/{}", sha);
    assert!(host
        .requests()
        .iter()
        .any(|(m, p)| *m == Method::Get && *p == blob_path));
}

#[tokio::test]
async fn test_large_file_fails_when_blob_unavailable() {
    let (host, gateway, ctx) = setup();
    let sha = host.put_text("octo", "demo", "big.csv", "a,b\n1,2\n");
    host.serve_without_inline_content("octo", "demo", "big.csv");
    host.fail_next(Method::Get, &format!("/repos/octo/demo/git/blobs/{}", sha), 502);

    let err = gateway.fetch(&ctx, "big.csv").await.unwrap_err();
    assert!(matches!(err, SyncError::UpstreamUnavailable { status: 502, .. }));
}
