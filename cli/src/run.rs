//! `heartwire run`
//!
//! Seeds a [`MemoryBus`] from a captured state tree and runs the engine on it
//! until Ctrl-C. Nothing updates the tree afterwards, so every channel with a
//! value goes silent and starts replaying after the silence delay.

use anyhow::Result;
use heartwire::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DELTA_CONTEXT: &str = "vessels.self";

pub async fn run_engine_command(
    config_path: Option<&Path>,
    tree_path: &Path,
    status_every: u64,
) -> Result<()> {
    let config = crate::load_config(config_path)?;
    let bus = MemoryBus::with_tree(crate::load_tree(tree_path)?);
    let mut engine = Engine::new(Arc::new(bus.clone()));

    engine.start(config).await?;
    println!("{}", engine.status());
    if engine.health() == EngineHealth::DiscoveryOnly {
        return Ok(());
    }

    let mut ticker = (status_every > 0)
        .then(|| tokio::time::interval(Duration::from_secs(status_every)));
    if let Some(ticker) = ticker.as_mut() {
        ticker.tick().await;
    }

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "Failed to listen for Ctrl-C");
                }
                break;
            }
            _ = next_tick(ticker.as_mut()) => {
                println!("{}", engine.status());
                let published = bus.published();
                if let Some(latest) = published.last() {
                    println!("Latest of {} synthetic delta(s):", published.len());
                    println!("{}", latest.to_envelope(DELTA_CONTEXT));
                }
            }
        }
    }

    engine.stop().await;
    println!("Stopped after {} synthetic delta(s)", bus.published().len());
    Ok(())
}

async fn next_tick(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
