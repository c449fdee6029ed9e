//! Broker-assigned message ids.
//!
//! Every `Message` needs a 64-bit `id`, including ones the broker itself
//! originates (pull task hand-outs, `mon` events, internal request
//! responses). A single process-wide counter is enough — uniqueness, not
//! unpredictability, is all the wire format needs.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IdGenerator(AtomicU64);

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonically_distinct() {
        let gen = IdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
