//! Cache and trace directory paths
//!
//! Utilities for resolving the on-disk layout:
//! - `$CONFIG/cache/ai-analysis/`: cached `analyze ai` results
//! - `$CONFIG/cache/reports/`: sliced report fragments
//! - `$CONFIG/llmagent-trace/`: JSONL agent traces

use std::path::PathBuf;

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("DUMPSCOPE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG config directory or fallback
    dirs::config_dir()
        .map(|d| d.join("dumpscope"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("dumpscope"))
                .unwrap_or_else(|| PathBuf::from(".dumpscope"))
        })
}

/// Root directory for cached AI analysis results
///
/// Overridable with `DEBUGGER_MCP_AI_ANALYSIS_CACHE_DIR` or the short alias
/// `DUMPSCOPE_AI_CACHE_DIR`.
pub fn ai_analysis_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DEBUGGER_MCP_AI_ANALYSIS_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("DUMPSCOPE_AI_CACHE_DIR") {
        return PathBuf::from(dir);
    }

    config_dir().join("cache").join("ai-analysis")
}

/// Root directory for sliced report fragments
pub fn report_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DUMPSCOPE_REPORT_CACHE_DIR") {
        return PathBuf::from(dir);
    }

    config_dir().join("cache").join("reports")
}

/// Root directory for agent traces
pub fn trace_root_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DUMPSCOPE_TRACE_DIR") {
        return PathBuf::from(dir);
    }

    config_dir().join("llmagent-trace")
}

/// Ensure a directory exists
pub fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
