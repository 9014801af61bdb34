//! Trace id generation: an 8-char base62 token propagated probe → gateway →
//! queue (`_meta.trace_id`) → ETL → logs (spec §6, I-Trace-Continuity).

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const TRACE_ID_LEN: usize = 8;

/// Generates a fresh 8-char base62 trace id.
pub fn generate_trace_id() -> String {
    let mut rng = rand::rng();
    (0..TRACE_ID_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Returns `existing` if present and well-formed, otherwise mints a new one —
/// the gateway's "generate one when absent on input" rule (spec §6).
pub fn trace_id_or_generate(existing: Option<&str>) -> String {
    match existing {
        Some(id) if is_valid_trace_id(id) => id.to_string(),
        _ => generate_trace_id(),
    }
}

fn is_valid_trace_id(id: &str) -> bool {
    id.len() == TRACE_ID_LEN && id.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_eight_char_base62() {
        let id = generate_trace_id();
        assert_eq!(id.len(), TRACE_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn inherits_valid_existing_id() {
        assert_eq!(trace_id_or_generate(Some("AbC12345")), "AbC12345");
    }

    #[test]
    fn generates_when_absent_or_malformed() {
        assert_ne!(trace_id_or_generate(None), "");
        assert_eq!(trace_id_or_generate(Some("too-long-id")).len(), TRACE_ID_LEN);
    }
}
