//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// System prompt shared by every generation call
pub const SYSTEM: &str = include_str!("../../prompts/system.pmt");

/// Per-iteration generation prompt
pub const GENERATE: &str = include_str!("../../prompts/generate.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "system" => Some(SYSTEM),
        "generate" => Some(GENERATE),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_system() {
        let system = get_embedded("system").unwrap();
        assert!(system.contains("Dockerfile"));
        assert!(system.contains("search_in_file"));
    }

    #[test]
    fn test_get_embedded_generate() {
        let generate = get_embedded("generate").unwrap();
        assert!(generate.contains("{{expected_output}}"));
        assert!(generate.contains("{{#if feedback}}"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
