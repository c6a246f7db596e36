//! Example: produce a few orders and consume them back until Ctrl+C or
//! until every order has been seen.
//!
//! ```bash
//! BROKER_BOOTSTRAP_SERVERS=localhost:9092 BROKER_TOPICS=demo-orders \
//! BROKER_GROUP_ID=demo BROKER_MAX_POLL_RECORDS=100 BROKER_ENABLE_AUTO_COMMIT=false \
//! BROKER_MAX_POLL_INTERVAL_MS=300000 BROKER_SESSION_TIMEOUT_MS=45000 \
//! BROKER_HEARTBEAT_INTERVAL_MS=3000 BROKER_CONSUMER_TIMEOUT_MS=1000 \
//! BROKER_ISOLATION_LEVEL=read_committed BROKER_AUTO_OFFSET_RESET=earliest \
//!     cargo run --features kafka --example broker_pipeline
//! ```

use connector_kit::broker::{BrokerAdapter, BrokerMessage, BrokerRepository};
use connector_kit::error::{Error, Result};
use connector_kit::protocol::{ConnectionAdapter, HealthCheck, MessagePublisher};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Order {
    id: u32,
    item: String,
    quantity: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    println!("\n=== Connector Kit - Broker Pipeline ===\n");

    println!("1. Resolving BROKER_* settings and connecting...");
    let mut adapter = BrokerAdapter::config()?;
    adapter.connect().await?;
    println!("   ✓ Healthy: {}\n", adapter.healthcheck().await.ok);

    let topic = adapter
        .consumer_settings()
        .and_then(|s| s.topics.first().cloned())
        .ok_or_else(|| Error::Config("BROKER_TOPICS has no topic".to_string()))?;

    {
        let broker = BrokerRepository::new(&adapter);

        println!("2. Producing 3 orders to '{}'...", topic);
        let orders = [("keyboard", 1), ("mouse", 2), ("monitor", 1)];
        for (id, (item, quantity)) in orders.iter().enumerate() {
            let order = Order {
                id: id as u32,
                item: item.to_string(),
                quantity: *quantity,
            };
            broker.produce(&topic, &order).await?;
        }
        println!("   ✓ Produced\n");

        println!("3. Consuming (Ctrl+C to stop)...");
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let mut done_tx = Some(done_tx);
        let mut seen = 0usize;

        broker
            .consume_until(
                |message: BrokerMessage| {
                    let decoded = message.json::<Order>();
                    if let Ok(order) = &decoded {
                        seen += 1;
                        println!(
                            "   ✓ {}@{}: {} x{}",
                            message.partition, message.offset, order.item, order.quantity
                        );
                        if seen == orders.len() {
                            if let Some(tx) = done_tx.take() {
                                let _ = tx.send(());
                            }
                        }
                    }
                    async move { decoded.map(|_| ()) }
                },
                async {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = done_rx => {}
                    }
                },
            )
            .await?;
    }

    adapter.disconnect().await?;
    println!("\n=== Done ===\n");
    Ok(())
}
