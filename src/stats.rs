//! Memory store statistics and health overview.
//!
//! Provides a quick summary of what the store holds: per-collection counts,
//! document size, the open session and the health score the query service
//! would report. Used by `pmem stats`.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::knowledge::KnowledgeCache;
use crate::store::MemoryStore;

/// Run the stats command: load the store and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let store = MemoryStore::open(config)?;
    let stats = store.get_memory_stats();

    let mut cache = KnowledgeCache::new();
    cache.sync(&store);
    let health = cache.health(&stats, config.server.stale_after_secs);

    println!("Project Memory — Store Stats");
    println!("============================");
    println!();
    println!("  Project:     {}", store.document().project_name);
    println!("  Document:    {}", store.path().display());
    println!("  Size:        {}", format_bytes(stats.memory_size as u64));
    println!("  Updated:     {}", format_relative(stats.last_updated, Utc::now()));
    match store.current_session() {
        Some(session) => println!("  Session:     {} ({})", session.id, session.description),
        None => println!("  Session:     none"),
    }
    println!();

    let rows = [
        ("Sessions", stats.total_sessions),
        ("Insights", stats.total_insights),
        ("Patterns", stats.total_patterns),
        ("Problems", stats.total_problems),
        ("  solved", stats.solved_problems),
        ("Contexts", stats.context_windows),
        ("Classes", stats.key_classes),
        ("Files", stats.important_files),
        ("Events", stats.development_events),
    ];
    println!("  {:<12} {:>8}", "COLLECTION", "ITEMS");
    println!("  {}", "-".repeat(21));
    for (label, count) in rows {
        println!("  {:<12} {:>8}", label, count);
    }
    println!("  {:<12} {:>8}", "Total", stats.total_items);

    println!();
    println!("  Health:      {} ({})", health.score, health.status);
    for issue in &health.issues {
        println!("    - {}", issue);
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to `now` (e.g. "3 hours ago").
pub fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return format_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_iso(ts)
    }
}

fn format_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn bytes_scale() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = Utc::now();
        assert_eq!(format_relative(now, now), "just now");
        assert_eq!(format_relative(now - Duration::minutes(1), now), "1 min ago");
        assert_eq!(format_relative(now - Duration::hours(3), now), "3 hours ago");
        let old = now - Duration::days(90);
        assert_eq!(format_relative(old, now), old.format("%Y-%m-%d %H:%M").to_string());
    }
}
