//! Cached Fetch Example
//!
//! Demonstrates a tiered cache in front of a flaky backend:
//! - Read-through fetching with retries
//! - Priority eviction under capacity pressure
//! - Cold-start rehydration from an LMDB-backed persistent tier
//!
//! Run with: cargo run --example cached_fetch

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use holdfast::cache::{CacheConfig, CacheOptions, DiskStore, LmdbStore, Priority, TieredCache};
use holdfast::read_through::ReadThrough;
use holdfast::retry::{BackendError, ErrorKind};
use holdfast::RetryPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Profile {
    id: u32,
    name: String,
}

/// Pretend backend that fails every other call.
#[derive(Debug, Default)]
struct ProfileService {
    calls: AtomicU32,
}

impl ProfileService {
    async fn fetch(&self, id: u32) -> Result<Profile, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if n % 2 == 0 {
            return Err(BackendError::new(ErrorKind::Unavailable, "backend busy"));
        }
        Ok(Profile {
            id,
            name: format!("user-{}", id),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let dir = tempfile::TempDir::new()?;
    let store: Arc<dyn DiskStore> = Arc::new(LmdbStore::open(dir.path(), "profiles", 16)?);
    let config = CacheConfig::new()
        .with_namespace("profiles")
        .with_max_entries(3)
        .with_sweep_interval(Duration::from_secs(30));
    let service = ProfileService::default();
    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(50))
        .with_label("fetch_profile");

    println!("\n=== Read-through ===");
    {
        let cache: TieredCache<Profile> = TieredCache::open(config.clone(), store.clone()).await?;
        let profiles = ReadThrough::new(&cache, policy.clone());

        for id in [1, 2, 1] {
            let key = format!("profile:{}", id);
            let profile = profiles
                .get_or_fetch(&key, CacheOptions::ttl(Duration::from_secs(300)), || {
                    service.fetch(id)
                })
                .await?;
            println!("  {} -> {:?}", key, profile);
        }
        println!("  backend calls: {}", service.calls.load(Ordering::SeqCst));

        println!("\n=== Priority eviction ===");
        let pinned = CacheOptions::ttl(Duration::from_secs(300)).with_priority(Priority::High);
        cache.put(
            "profile:admin",
            Profile {
                id: 0,
                name: "admin".into(),
            },
            pinned,
        );
        for id in 10..13 {
            cache.put_default(
                format!("profile:{}", id),
                Profile {
                    id,
                    name: format!("guest-{}", id),
                },
            );
        }
        println!("  admin still cached: {}", cache.contains_key("profile:admin"));
        println!("  stats: {:?}", cache.stats());

        cache.close().await?;
    }

    println!("\n=== Cold start ===");
    let cache: TieredCache<Profile> = TieredCache::open(config, store).await?;
    println!("  memory entries before read: {}", cache.len());
    println!("  profile:admin -> {:?}", cache.get("profile:admin").await);
    println!("  stats: {:?}", cache.stats());
    cache.close().await?;

    Ok(())
}
