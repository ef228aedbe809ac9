//! Monotonic modification stamps
//!
//! A process-wide counter used to order mutations against cached build
//! results (the scalar tree rebuilds only when its dataset's stamp is newer
//! than the stamp recorded at build time).

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Return the next stamp. Stamps are strictly increasing across the process.
pub fn next_stamp() -> u64 {
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamps_increase() {
        let a = next_stamp();
        let b = next_stamp();
        assert!(b > a);
    }
}
