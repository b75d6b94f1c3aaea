use sha2::{Digest, Sha256};

use crate::canon::to_canonical_json;
use crate::graph::CompanyGraph;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 over the canonical JSON of the whole graph. Equal seeds and
/// configs must give equal fingerprints.
pub fn graph_fingerprint(graph: &CompanyGraph) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(&to_canonical_json(graph)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TicketStatus;

    #[test]
    fn known_digest() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn fingerprint_tracks_structure() {
        let graph = crate::graph::tests::sample_graph();
        let same = crate::graph::tests::sample_graph();
        let a = graph_fingerprint(&graph).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, graph_fingerprint(&same).unwrap());

        let mut moved = same;
        let at = moved.start;
        moved
            .transition_ticket("PROJ-2", TicketStatus::InProgress, at, "test")
            .unwrap();
        assert_ne!(a, graph_fingerprint(&moved).unwrap());
    }
}
