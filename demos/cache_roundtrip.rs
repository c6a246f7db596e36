//! Example: connect to Redis from `CACHE_*` variables and run each
//! repository operation once.
//!
//! ```bash
//! CACHE_DEPLOYMENT_MODE=single_node CACHE_HOST=localhost \
//!     cargo run --example cache_roundtrip
//! ```

use connector_kit::cache::{CacheAdapter, CacheRepository};
use connector_kit::error::Result;
use connector_kit::protocol::{CacheStore, ConnectionAdapter, HealthCheck};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Connector Kit - Cache Roundtrip ===\n");

    // 1. Resolve settings and connect
    println!("1. Resolving CACHE_* settings...");
    let mut adapter = CacheAdapter::config()?;
    println!(
        "   ✓ {} mode, {}\n",
        adapter.deployment_mode(),
        adapter.profile().uri
    );

    println!("2. Connecting...");
    adapter.connect().await?;
    let (ok, diagnostic) = adapter.healthcheck().await.into_parts();
    println!("   ✓ Healthy: {} {:?}\n", ok, diagnostic);

    // 2. Run each operation
    {
        let cache = CacheRepository::new(&adapter);

        println!("3. SET / GET");
        cache.set("demo:greeting", b"hello").await?;
        let value = cache.get("demo:greeting").await?;
        println!(
            "   ✓ demo:greeting = {:?}\n",
            value.as_deref().map(String::from_utf8_lossy)
        );

        println!("4. EXPIRE / TTL");
        cache.expire("demo:greeting", 30).await?;
        println!("   ✓ TTL: {:?}\n", cache.ttl("demo:greeting").await?);

        println!("5. EXISTS / DELETE");
        let present = cache.exists(&["demo:greeting", "demo:absent"]).await?;
        let removed = cache.delete(&["demo:greeting"]).await?;
        println!("   ✓ {} present, {} removed\n", present, removed);
    }

    // 3. Tear down
    adapter.disconnect().await?;
    println!("=== Done ===\n");
    Ok(())
}
