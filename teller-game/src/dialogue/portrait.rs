//! Customer portrait selection from node headers.
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::program::Node;
use crate::constants::{PORTRAIT_HEADER, RANDOM_PORTRAIT};

const DEFAULT_PORTRAITS_DATA: &str = include_str!("../../assets/portraits.json");

/// Head and body sprite ids available to the asset layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PortraitCatalog {
    #[serde(default)]
    pub heads: Vec<String>,
    #[serde(default)]
    pub bodies: Vec<String>,
}

impl PortraitCatalog {
    #[must_use]
    pub fn load_from_static() -> Self {
        serde_json::from_str(DEFAULT_PORTRAITS_DATA).unwrap_or_default()
    }

    /// Uniformly random head/body pair, or `None` if either list is empty.
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Portrait> {
        if self.heads.is_empty() || self.bodies.is_empty() {
            return None;
        }
        let head = self.heads[rng.gen_range(0..self.heads.len())].clone();
        let body = self.bodies[rng.gen_range(0..self.bodies.len())].clone();
        Some(Portrait {
            head,
            body,
            randomized: true,
        })
    }
}

/// A resolved composite portrait, ready for the asset layer to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portrait {
    pub head: String,
    pub body: String,
    /// True when the pair was drawn at random rather than authored.
    pub randomized: bool,
}

impl Portrait {
    /// Parse a `head:body` header value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (head, body) = value.split_once(':')?;
        let (head, body) = (head.trim(), body.trim());
        if head.is_empty() || body.is_empty() || body.contains(':') {
            return None;
        }
        Some(Self {
            head: head.to_string(),
            body: body.to_string(),
            randomized: false,
        })
    }
}

/// Pick the portrait for `node`: authored when the header parses, random
/// for the sentinel, a missing header, or a malformed value.
pub fn resolve_portrait<R: Rng + ?Sized>(
    node: &Node,
    catalog: &PortraitCatalog,
    rng: &mut R,
) -> Option<Portrait> {
    match node.header(PORTRAIT_HEADER) {
        None | Some(RANDOM_PORTRAIT) => {}
        Some(header) => {
            if let Some(portrait) = Portrait::parse(header) {
                return Some(portrait);
            }
            log::warn!("malformed portrait {header:?} on node {}; using random", node.name);
        }
    }
    catalog.random(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn catalog() -> PortraitCatalog {
        PortraitCatalog {
            heads: vec!["bald".to_string(), "bun".to_string()],
            bodies: vec!["suit".to_string()],
        }
    }

    #[test]
    fn authored_header_is_used_verbatim() {
        let node = Node::new("OldMan", vec![]).with_header("portrait", "bald:cardigan");
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let portrait = resolve_portrait(&node, &catalog(), &mut rng).unwrap();
        assert_eq!(portrait.head, "bald");
        assert_eq!(portrait.body, "cardigan");
        assert!(!portrait.randomized);
    }

    #[test]
    fn sentinel_missing_and_malformed_fall_back_to_random() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        for node in [
            Node::new("A", vec![]).with_header("portrait", "random"),
            Node::new("B", vec![]),
            Node::new("C", vec![]).with_header("portrait", "a:b:c"),
            Node::new("D", vec![]).with_header("portrait", "nocolon"),
        ] {
            let portrait = resolve_portrait(&node, &catalog(), &mut rng).unwrap();
            assert!(portrait.randomized, "node {}", node.name);
            assert_eq!(portrait.body, "suit");
        }
    }

    #[test]
    fn empty_catalog_yields_nothing() {
        let node = Node::new("A", vec![]);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert!(resolve_portrait(&node, &PortraitCatalog::default(), &mut rng).is_none());
    }

    #[test]
    fn bundled_catalog_has_parts() {
        let catalog = PortraitCatalog::load_from_static();
        assert!(!catalog.heads.is_empty());
        assert!(!catalog.bodies.is_empty());
    }
}
