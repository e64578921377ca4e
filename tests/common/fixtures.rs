// Test fixtures and data generators for integration tests

use edgefetch::{ContentId, EdgeDescriptor};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic random data generator for reproducible tests
pub struct TestDataGenerator {
    rng: StdRng,
}

impl TestDataGenerator {
    /// Creates a new generator with a fixed seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generates random bytes of specified length
    pub fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes[..]);
        bytes
    }

    /// Generates a content id with the usual `bafy` prefix
    pub fn content_id(&mut self) -> ContentId {
        let suffix: String = (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        cid(&format!("bafy{}", suffix))
    }

    /// Generates `count` distinct content ids
    pub fn content_ids(&mut self, count: usize) -> Vec<ContentId> {
        (0..count).map(|_| self.content_id()).collect()
    }
}

impl Default for TestDataGenerator {
    fn default() -> Self {
        Self::new(42)
    }
}

pub fn cid(s: &str) -> ContentId {
    ContentId::new(s).expect("valid content id")
}

/// A well-formed descriptor for edge `sn`.
pub fn descriptor(sn: i64) -> EdgeDescriptor {
    EdgeDescriptor::new(format!("http://edge-{}:3000/block/get", sn), "c2lnbmVk", sn)
        .with_validity(1_700_000_000, 60)
}

/// `count` descriptors with serial numbers `1..=count` and zero weight.
pub fn descriptors(count: i64) -> Vec<EdgeDescriptor> {
    (1..=count).map(descriptor).collect()
}
