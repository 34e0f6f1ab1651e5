//! Example walking one key through the cache: miss, fresh hit, stale hit
//! with a background refresh, and the refreshed value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use swr_wrap::{Counters, wrap};

#[derive(Clone, Debug)]
struct Quote {
    symbol: String,
    price: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let counters = Arc::new(Counters::default());
    let ticks = Arc::new(AtomicU32::new(100));

    let ticks_clone = ticks.clone();
    let quotes = wrap(move |(symbol,): (String,)| {
        let ticks = ticks_clone.clone();
        async move {
            println!("Loading quote from upstream: {}", symbol);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(Quote {
                symbol,
                price: ticks.fetch_add(1, Ordering::SeqCst),
            })
        }
    })
    .revalidate_after(Duration::from_millis(100))
    .max_age(Duration::from_secs(5))
    .metrics_sink(counters.clone())
    .build()?;

    // First call waits for the fetch
    let quote = quotes.call(("ACME".to_string(),)).await?;
    println!("Quote: {:?}", quote);

    // Second call is fresh, the loader is not called
    let quote = quotes.call(("ACME".to_string(),)).await?;
    println!("Quote (fresh): {:?}", quote);

    // Past revalidate_after: the old value comes back right away
    tokio::time::sleep(Duration::from_millis(150)).await;
    let quote = quotes.call(("ACME".to_string(),)).await?;
    println!("Quote (stale): {:?}", quote);

    // Wait for the background refresh to land
    tokio::time::sleep(Duration::from_millis(50)).await;
    let quote = quotes.call(("ACME".to_string(),)).await?;
    println!("Quote (refreshed): {} at {}", quote.symbol, quote.price);

    println!(
        "\nmisses={} fresh={} stale={} revalidations={}",
        counters.misses(),
        counters.fresh(),
        counters.stale(),
        counters.revalidations()
    );

    Ok(())
}
