//! Configuration validation

use anyhow::Result;
use heartwire::core::ChannelPath;
use heartwire::runtime::{discover, merge_entries};
use std::path::Path;

/// Validate a configuration and list the channels it would monitor.
pub fn run_check_command(config_path: &Path, tree_path: Option<&Path>) -> Result<()> {
    println!("Checking heartwire configuration: {}", config_path.display());
    let config = crate::load_config(Some(config_path))?;
    println!("  ✅ configuration is valid");

    println!(
        "  silence delay {}s, transmit interval {}s, at most {} channel(s)",
        config.silence_delay_secs, config.transmit_interval_secs, config.max_channels
    );
    let companions: Vec<_> = config.companion_specs().iter().map(|s| s.name).collect();
    println!("  companions: [{}]", companions.join(", "));
    if config.discovery_only {
        println!("  ⚠️  discovery-only mode: no channel will be monitored");
    }

    let discovered = match tree_path {
        Some(path) => {
            let tree = crate::load_tree(path)?;
            discover(tree.get(&config.domain_root), &config.domain_root)
        }
        None => Vec::new(),
    };

    let entries = merge_entries(&config.channels, &discovered);
    if entries.is_empty() {
        println!("  ⚠️  no channels configured; discovery decides at start");
    }

    let mut invalid = 0;
    for entry in &entries {
        match ChannelPath::parse(&entry.path, &config.domain_root, config.min_segments) {
            Ok(path) => {
                let authority = entry.source_filter().unwrap_or_else(|| "any source".to_string());
                println!("  ✅ {path} (id `{}`, authority: {authority})", path.id());
            }
            Err(err) => {
                invalid += 1;
                println!("  ❌ {err}");
            }
        }
    }
    if entries.len() - invalid > config.max_channels {
        println!(
            "  ⚠️  {} valid channel(s), only the first {} will be monitored",
            entries.len() - invalid,
            config.max_channels
        );
    }

    println!();
    if invalid > 0 {
        println!("Check complete: {invalid} entry(ies) will be skipped");
    } else {
        println!("✅ Check complete!");
    }
    Ok(())
}
