//! End-to-end lifecycle: publish, mirror through a site-list, collect.

mod common;

use std::collections::BTreeMap;

use peerhost::config::store::read_sites;
use peerhost::config::{JsonFileStore, SiteConfig};
use peerhost::{ArchiveKey, LifecycleState, SiteHost, SiteSource};

#[tokio::test]
async fn test_publish_directory_and_serve() {
    let dir = tempfile::tempdir().unwrap();
    let site_dir = dir.path().join("site");
    std::fs::create_dir_all(&site_dir).unwrap();
    std::fs::write(site_dir.join("hello.txt"), "hello world").unwrap();

    let options = common::options(dir.path());
    let hosts_path = options.hosts.path.clone();
    let config_path = options.config_path.clone();
    let host = SiteHost::new(options).unwrap();
    host.add_site(
        "A.Test",
        None,
        SiteConfig {
            directory: Some(site_dir.clone()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    host.start().await.unwrap();
    assert_eq!(host.state().await, LifecycleState::Running);

    // Derived url and key are written back.
    let sites = read_sites(&JsonFileStore::new(&config_path)).await.unwrap();
    let key = ArchiveKey::parse(sites["a.test"].key.as_deref().unwrap()).unwrap();
    assert_eq!(sites["a.test"].url.as_deref(), Some(key.to_url().as_str()));
    assert_eq!(host.registry().local["a.test"].key(), Some(&key));

    assert_eq!(common::hosts_lines(&hosts_path), vec!["127.0.0.1 a.test".to_string()]);

    let addr = host.local_addr().await.unwrap();
    let (status, body) = common::get(addr, "a.test", "/").await;
    assert_eq!(status, 200);
    assert!(body.contains("hello.txt"));

    let (status, body) = common::get(addr, "a.test:80", "/hello.txt").await;
    assert_eq!(status, 200);
    assert_eq!(body, "hello world");

    let (status, body) = common::get(addr, "a.test", "/.well-known/dat").await;
    assert_eq!(status, 200);
    assert_eq!(body, format!("{}/\nTTL=3600", key.to_url()));

    let (status, _) = common::get(addr, "unknown.test", "/").await;
    assert_eq!(status, 404);

    host.stop().await.unwrap();
    assert_eq!(host.state().await, LifecycleState::Stopped);
    assert!(host.local_addr().await.is_none());
}

#[tokio::test]
async fn test_sitelist_mirror_is_collected_after_unsubscribe() {
    let dir = tempfile::tempdir().unwrap();
    let options = common::options(dir.path());
    let hosts_path = options.hosts.path.clone();
    let work = options.directory.clone();

    let list_key = ArchiveKey::from_digest(&[7; 32]);
    let mirror_key = ArchiveKey::from_digest(&[9; 32]);
    let list_dir = work.join(list_key.as_str());
    std::fs::create_dir_all(&list_dir).unwrap();
    let manifest = serde_json::json!({
        "sites": BTreeMap::from([("b.test", serde_json::json!({ "url": mirror_key.to_url() }))])
    });
    std::fs::write(list_dir.join("dat.json"), manifest.to_string()).unwrap();

    let host = SiteHost::new(options).unwrap();
    host.add_site_list(&list_key.to_url()).await.unwrap();
    host.start().await.unwrap();

    let registry = host.registry();
    let site = &registry.federated[&list_key]["b.test"];
    assert_eq!(site.source, SiteSource::SiteList(list_key.clone()));
    assert_eq!(site.key(), Some(&mirror_key));
    assert!(work.join(mirror_key.as_str()).is_dir());
    assert_eq!(common::hosts_lines(&hosts_path), vec!["127.0.0.1 b.test".to_string()]);

    let addr = host.local_addr().await.unwrap();
    let (status, _) = common::get(addr, "b.test", "/").await;
    assert_eq!(status, 200);

    host.remove_site_list(list_key.as_str()).await.unwrap();
    host.restart().await.unwrap();

    assert!(host.registry().is_empty());
    assert!(!work.join(mirror_key.as_str()).exists());
    assert!(!list_dir.exists());
    assert!(common::hosts_lines(&hosts_path).is_empty());

    let addr = host.local_addr().await.unwrap();
    let (status, _) = common::get(addr, "b.test", "/").await;
    assert_eq!(status, 404);

    host.stop().await.unwrap();
}

#[tokio::test]
async fn test_local_site_shadows_federated_hostname() {
    let dir = tempfile::tempdir().unwrap();
    let options = common::options(dir.path());
    let work = options.directory.clone();

    let list_key = ArchiveKey::from_digest(&[3; 32]);
    let federated_key = ArchiveKey::from_digest(&[4; 32]);
    let local_key = ArchiveKey::from_digest(&[5; 32]);
    let list_dir = work.join(list_key.as_str());
    std::fs::create_dir_all(&list_dir).unwrap();
    let manifest = serde_json::json!({
        "sites": { "c.test": { "url": federated_key.to_url() } }
    });
    std::fs::write(list_dir.join("dat.json"), manifest.to_string()).unwrap();

    let host = SiteHost::new(options).unwrap();
    host.add_site_list(list_key.as_str()).await.unwrap();
    host.add_site("c.test", Some(&local_key.to_url()), SiteConfig::default())
        .await
        .unwrap();
    host.start().await.unwrap();

    let registry = host.registry();
    let served: Vec<_> = registry.sites().filter(|s| s.hostname == "c.test").collect();
    assert_eq!(served.len(), 1);
    assert_eq!(served[0].key(), Some(&local_key));
    assert_eq!(served[0].source, SiteSource::Local);
    // The shadowed mirror is still referenced, so collection keeps it.
    assert!(work.join(federated_key.as_str()).is_dir());

    host.stop().await.unwrap();
}
