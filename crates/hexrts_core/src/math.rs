//! Fixed-point math utilities for deterministic simulation.
//!
//! All fractional simulation quantities (combat modifiers, casualty
//! fractions, movement progress, commander stamina) use fixed-point
//! arithmetic. Floating-point operations can produce different results
//! on different CPUs, which breaks lockstep replication.

use fixed::types::I32F32;

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Convenience constructor for a fixed-point percentage (`pct / 100`).
#[must_use]
pub fn percent(pct: i32) -> Fixed {
    Fixed::from_num(pct) / Fixed::from_num(100)
}

/// Pure progress function for timed processes (construction, training,
/// research, entrenchment).
///
/// Returns 0 before the process starts or for zero-length processes that
/// have not begun, 1 at or after completion, and the elapsed fraction in
/// between. Callers derive completion from the clock rather than from a
/// per-tick counter, so progress is a function of `(started, duration,
/// now)` alone.
#[must_use]
pub fn timed_progress(started: u64, duration: u64, now: u64) -> Fixed {
    if started == 0 || now <= started {
        return Fixed::ZERO;
    }
    if duration == 0 || now >= started + duration {
        return Fixed::ONE;
    }
    let elapsed = now - started;
    // Both fit in i64 after the bounds checks above.
    Fixed::from_num(elapsed as i64) / Fixed::from_num(duration as i64)
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}
