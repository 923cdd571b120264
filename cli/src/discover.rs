//! `heartwire discover`

use anyhow::{Context, Result};
use heartwire::core::leaf_value;
use heartwire::runtime::discover;
use std::path::Path;

pub fn run_discover_command(tree_path: &Path, root: &str, json: bool) -> Result<()> {
    let tree = crate::load_tree(tree_path)?;
    let found = discover(tree.get(root), root);

    if json {
        let output =
            serde_json::to_string_pretty(&found).context("Failed to serialize candidates")?;
        println!("{output}");
        return Ok(());
    }

    if found.is_empty() {
        println!("No run-time channels found under `{root}`");
        return Ok(());
    }

    println!("Found {} run-time channel(s) under `{root}`:", found.len());
    for candidate in &found {
        let current = root_relative(&tree, &candidate.path)
            .map(|node| leaf_value(node).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  - {candidate} = {current}");
    }
    Ok(())
}

fn root_relative<'a>(tree: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(tree, |node, segment| node.get(segment))
}
