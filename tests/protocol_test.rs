//! Client against the real server loop over in-memory streams.

use proptest::prelude::*;
use serversync::client::{Requests, FILE_COUNT_UNKNOWN};
use serversync::config::TransferConfig;
use serversync::server::{serve, Catalog};
use serversync::{ActionEntry, FileManifest, FileMetadata, ManagedFileRef, RootResolver};
use std::fs;
use tempfile::TempDir;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

type LoopbackRequests = Requests<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

fn loopback(catalog: Catalog, client_root: &std::path::Path, chunk_size: usize) -> LoopbackRequests {
    let (client, server) = tokio::io::duplex(16 * 1024);
    let (sr, sw) = tokio::io::split(server);
    tokio::spawn(async move { serve(&catalog, sr, sw).await });

    let (cr, cw) = tokio::io::split(client);
    Requests::new(
        cr,
        cw,
        RootResolver::new(client_root),
        TransferConfig { chunk_size },
    )
}

#[tokio::test]
async fn test_update_reports_monotonic_progress() {
    let server = TempDir::new().unwrap();
    let client = TempDir::new().unwrap();
    fs::create_dir_all(server.path().join("mods")).unwrap();
    let body: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    fs::write(server.path().join("mods/foo.jar"), &body).unwrap();

    let catalog = Catalog::scan(server.path(), &["mods".into()]).await.unwrap();
    let mut requests = loopback(catalog, client.path(), 3000);

    let entry = ActionEntry::update(ManagedFileRef::new("mods/foo.jar").unwrap());
    let mut values = Vec::new();
    let mut completions = 0;
    let ok = requests
        .update_file(&entry, |p| {
            values.push(p.progress());
            if p.is_complete() {
                completions += 1;
            }
        })
        .await;

    assert!(ok);
    assert_eq!(completions, 1);
    assert_eq!(values.first(), Some(&-1.0));
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
    // unstarted, 4 chunks (3000+3000+3000+1000), complete
    assert_eq!(values.len(), 6);
    assert_eq!(values[values.len() - 2], 1.0);
    assert_eq!(fs::read(client.path().join("mods/foo.jar")).unwrap(), body);
}

#[tokio::test]
async fn test_connection_survives_absent_file() {
    let server = TempDir::new().unwrap();
    let client = TempDir::new().unwrap();
    fs::create_dir_all(server.path().join("config")).unwrap();
    fs::write(server.path().join("config/a.cfg"), b"a").unwrap();

    let catalog = Catalog::scan(server.path(), &["config".into()]).await.unwrap();
    let mut requests = loopback(catalog, client.path(), 1024);

    let missing = ActionEntry::update(ManagedFileRef::new("config/missing.cfg").unwrap());
    assert!(!requests.update_file(&missing, |_| {}).await);

    assert_eq!(requests.get_number_of_managed_files().await, 1);
    assert_eq!(requests.get_managed_directories().await, vec!["config"]);
    let present = ActionEntry::update(ManagedFileRef::new("config/a.cfg").unwrap());
    assert!(requests.update_file(&present, |_| {}).await);
}

#[tokio::test]
async fn test_server_gone_yields_sentinels() {
    let client = TempDir::new().unwrap();
    let (client_stream, server_stream) = tokio::io::duplex(1024);
    drop(server_stream);

    let (cr, cw) = tokio::io::split(client_stream);
    let mut requests = Requests::new(
        cr,
        cw,
        RootResolver::new(client.path()),
        TransferConfig::default(),
    );

    assert!(requests.get_manifest().await.is_err());
    assert!(requests.get_managed_directories().await.is_empty());
    assert_eq!(requests.get_number_of_managed_files().await, FILE_COUNT_UNKNOWN);
    let entry = ActionEntry::update(ManagedFileRef::new("mods/x.jar").unwrap());
    assert!(!requests.update_file(&entry, |_| {}).await);
}

fn manifest_strategy() -> impl Strategy<Value = FileManifest> {
    prop::collection::btree_map(
        "[a-z]{1,8}/[a-zA-Z0-9_.-]{1,16}",
        (any::<u64>(), "[0-9a-f]{0,64}"),
        0..24,
    )
    .prop_map(|files| {
        let mut manifest = FileManifest::new();
        for (path, (size, hash)) in files {
            let Ok(target) = ManagedFileRef::new(&path) else {
                continue;
            };
            // Case-insensitive collisions are dropped, as the server would
            let _ = manifest.insert(target, FileMetadata { size, hash });
        }
        manifest
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_manifest_survives_the_wire(manifest in manifest_strategy()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let client = TempDir::new().unwrap();

        let received = rt.block_on(async {
            let catalog = Catalog::new("/unused", vec![], manifest.clone());
            let mut requests = loopback(catalog, client.path(), 1024);
            requests.get_manifest().await
        });

        prop_assert_eq!(received.unwrap(), manifest);
    }
}
