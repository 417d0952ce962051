//! CLI output formatting.
//!
//! Every `format_*` function is pure and returns display lines, so the exact
//! text is unit tested; the `print_*` wrappers only write those lines to
//! stdout.
//!
//! # Output Format
//!
//! ## Capabilities
//!
//! ```text
//! Decode
//!     jpeg, png, webp, gif
//! Encode
//!     jpeg, png, webp
//! Smart crop
//!     available
//! ```
//!
//! ## Batch
//!
//! ```text
//! photos/dawn.jpg → out/dawn.webp (48213 bytes, 112ms)
//! photos/broken.jpg
//!     Error: image processing failed: decode failed: ...
//!
//! 11 processed, 1 failed in 1.42s
//! ```

use crate::batch::{BatchEvent, BatchSummary};
use crate::imaging::CapabilityRegistry;
use crate::imaging::decode_cache::CacheStats;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn join_formats(formats: impl Iterator<Item = impl ToString>) -> String {
    let names: Vec<String> = formats.map(|f| f.to_string()).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

// ============================================================================
// Capabilities
// ============================================================================

pub fn format_capabilities(registry: &CapabilityRegistry) -> Vec<String> {
    vec![
        "Decode".to_string(),
        format!("{}{}", indent(1), join_formats(registry.decode_formats())),
        "Encode".to_string(),
        format!("{}{}", indent(1), join_formats(registry.encode_formats())),
        "Smart crop".to_string(),
        format!(
            "{}{}",
            indent(1),
            if registry.supports_smart_crop() {
                "available"
            } else {
                "unavailable"
            }
        ),
    ]
}

/// Machine-readable form of the registry.
pub fn format_capabilities_json(registry: &CapabilityRegistry) -> serde_json::Result<String> {
    serde_json::to_string_pretty(registry)
}

pub fn print_capabilities(registry: &CapabilityRegistry) {
    for line in format_capabilities(registry) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Processed {
            source,
            output,
            bytes,
            elapsed,
        } => vec![format!(
            "{} \u{2192} {} ({} bytes, {}ms)",
            source.display(),
            output.display(),
            bytes,
            elapsed.as_millis()
        )],
        BatchEvent::Failed { source, error } => vec![
            source.display().to_string(),
            format!("{}Error: {}", indent(1), error),
        ],
    }
}

pub fn format_batch_summary(summary: &BatchSummary, cache: Option<CacheStats>) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!(
            "{} processed, {} failed in {:.2}s",
            summary.processed,
            summary.failed,
            summary.elapsed.as_secs_f64()
        ),
    ];
    if let Some(stats) = cache {
        lines.push(format!("Decode cache: {}", stats));
    }
    lines
}

pub fn print_batch_summary(summary: &BatchSummary, cache: Option<CacheStats>) {
    for line in format_batch_summary(summary, cache) {
        println!("{}", line);
    }
}
