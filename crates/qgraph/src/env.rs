use std::env;
use std::sync::OnceLock;

static QGRAPH_DUMP: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Whether per-node tensor dumps were requested via `QGRAPH_DUMP_TENSORS`.
pub(crate) fn dump_tensors_enabled() -> bool {
    *QGRAPH_DUMP.get_or_init(|| match env::var("QGRAPH_DUMP_TENSORS") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}
