//! Cache Command
//!
//! Inspect and clear generated fragments.
//!
//! Usage:
//!   reportforge cache list
//!   reportforge cache show <KEY>
//!   reportforge cache clear

use crate::cli::util::CommandContext;
use crate::storage::CacheStore;
use crate::types::{CacheKey, Result};

pub async fn list() -> Result<()> {
    let ctx = CommandContext::load(None)?;
    let cache = ctx.cache();
    let keys = cache.keys().await?;

    if keys.is_empty() {
        println!("  No cached fragments in {}", cache.cache_dir().display());
        return Ok(());
    }

    println!("Cached fragments ({})\n", cache.cache_dir().display());
    let mut total = 0;
    for key in &keys {
        let chars = cache
            .get(key)
            .await?
            .map(|text| text.chars().count())
            .unwrap_or_default();
        total += chars;
        println!("  {:<28} {:>8} chars", key.as_str(), chars);
    }
    println!("\n  Total: {} fragments, {} chars", keys.len(), total);

    Ok(())
}

pub async fn show(key: &str) -> Result<()> {
    let ctx = CommandContext::load(None)?;
    match ctx.cache().get(&CacheKey::new(key)).await? {
        Some(text) => println!("{}", text),
        None => println!("'{}' is not cached", key),
    }
    Ok(())
}

pub async fn clear() -> Result<()> {
    let ctx = CommandContext::load(None)?;
    let cleared = ctx.cache().clear().await?;
    if cleared > 0 {
        println!("✓ Cleared {} cached fragments", cleared);
    } else {
        println!("  No cached fragments to clear");
    }
    Ok(())
}
