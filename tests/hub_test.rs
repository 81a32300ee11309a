use std::sync::Arc;
use std::time::Duration;

use sedge::{HubProxy, MemoryRegistry, RegistryStore, ServiceHub};

#[tokio::test(flavor = "multi_thread")]
async fn test_endpoint_without_heartbeat_expires() {
    let registry = Arc::new(MemoryRegistry::new());
    let hub = ServiceHub::new(registry.clone(), 1);

    hub.register("search", "127.0.0.1:7100", None).await.unwrap();
    assert_eq!(hub.discover("search").await.unwrap().len(), 1);

    // Nobody renews the lease, so the endpoint drops out after the TTL.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(hub.discover("search").await.unwrap().is_empty());

    registry.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_cache_tracks_membership() {
    let registry = Arc::new(MemoryRegistry::new());
    let hub = Arc::new(ServiceHub::new(registry.clone(), 3));
    let proxy = HubProxy::new(hub.clone(), 1000);

    assert!(proxy.discover("search").await.is_empty());

    hub.register("search", "127.0.0.1:7101", None).await.unwrap();
    hub.register("search", "127.0.0.1:7102", None).await.unwrap();

    let mut endpoints = Vec::new();
    for _ in 0..100 {
        endpoints = proxy.discover("search").await;
        if endpoints.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(endpoints, vec!["127.0.0.1:7101", "127.0.0.1:7102"]);

    // Pick rotates over the cached list.
    let first = proxy.pick("search").await.unwrap();
    let second = proxy.pick("search").await.unwrap();
    assert_ne!(first, second);

    proxy.close().await;
    registry.close().await.unwrap();
}
