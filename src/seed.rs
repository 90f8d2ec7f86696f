//! Seed generation for SecurityAccess (0x27).
//!
//! Pulled behind a trait object rather than calling `rand::thread_rng()`
//! inline so tests can pin the seed and assert on an exact key exchange.

pub trait SeedSource: Send + Sync {
    fn generate(&self) -> [u8; 4];
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandSeedSource;

impl SeedSource for RandSeedSource {
    fn generate(&self) -> [u8; 4] {
        use rand::RngCore;
        let mut seed = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut seed);
        seed
    }
}

/// Deterministic seed source for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeedSource(pub [u8; 4]);

impl SeedSource for FixedSeedSource {
    fn generate(&self) -> [u8; 4] {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_source_always_returns_same_seed() {
        let source = FixedSeedSource([0x01, 0x02, 0x03, 0x04]);
        assert_eq!(source.generate(), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(source.generate(), [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn rand_source_produces_four_bytes() {
        let source = RandSeedSource;
        let seed = source.generate();
        assert_eq!(seed.len(), 4);
    }
}
