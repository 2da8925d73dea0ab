//! Time-ordered unique id generation.
//!
//! Layout (most significant bit first):
//!
//! ```text
//! 0 | 39 bits: 10ms ticks since EPOCH | 8 bits: sequence | 16 bits: machine id
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use thiserror::Error;

use crate::PurchaseId;

/// 2024-01-01T00:00:00Z in milliseconds.
const EPOCH_MILLIS: i64 = 1_704_067_200_000;
const TICK_MILLIS: i64 = 10;

const BITS_TIME: u32 = 39;
const BITS_SEQUENCE: u32 = 8;
const BITS_MACHINE: u32 = 16;

const SEQUENCE_MASK: u64 = (1 << BITS_SEQUENCE) - 1;
const MACHINE_MASK: u64 = (1 << BITS_MACHINE) - 1;

/// Errors produced by [`IdGenerator`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    /// The system clock reports a time before the generator epoch.
    #[error("system clock is before the id epoch")]
    ClockBeforeEpoch,

    /// The 39-bit time field is exhausted.
    #[error("id generator time space exhausted")]
    OverTimeLimit,
}

/// Decomposed fields of a generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    pub ticks: u64,
    pub sequence: u64,
    pub machine_id: u16,
}

/// Lock-free generator of time-ordered, globally unique purchase ids.
///
/// Ids from one generator are strictly increasing. Uniqueness across
/// processes relies on each process using a distinct machine id.
#[derive(Debug)]
pub struct IdGenerator {
    machine_id: u16,
    /// Packed `(ticks << BITS_SEQUENCE) | sequence` of the last issued id.
    state: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator for the given machine id.
    pub fn new(machine_id: u16) -> Self {
        Self {
            machine_id,
            state: AtomicU64::new(0),
        }
    }

    /// Returns the machine id embedded in generated ids.
    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    /// Generates the next id.
    ///
    /// When the sequence for the current tick is exhausted the generator
    /// moves on to the following tick instead of sleeping.
    pub fn next_id(&self) -> Result<PurchaseId, IdError> {
        let now = current_ticks()?;
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            let last_ticks = current >> BITS_SEQUENCE;
            let last_sequence = current & SEQUENCE_MASK;

            let (ticks, sequence) = if now > last_ticks {
                (now, 0)
            } else if last_sequence < SEQUENCE_MASK {
                (last_ticks, last_sequence + 1)
            } else {
                (last_ticks + 1, 0)
            };

            if ticks >= 1 << BITS_TIME {
                return Err(IdError::OverTimeLimit);
            }

            let next = (ticks << BITS_SEQUENCE) | sequence;
            match self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let raw = (ticks << (BITS_SEQUENCE + BITS_MACHINE))
                        | (sequence << BITS_MACHINE)
                        | u64::from(self.machine_id);
                    return Ok(PurchaseId::new(raw));
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Splits an id into its time, sequence and machine fields.
    pub fn decompose(id: PurchaseId) -> IdParts {
        let raw = id.as_u64();
        IdParts {
            ticks: raw >> (BITS_SEQUENCE + BITS_MACHINE),
            sequence: (raw >> BITS_MACHINE) & SEQUENCE_MASK,
            machine_id: (raw & MACHINE_MASK) as u16,
        }
    }
}

fn current_ticks() -> Result<u64, IdError> {
    let elapsed = Utc::now().timestamp_millis() - EPOCH_MILLIS;
    if elapsed < 0 {
        return Err(IdError::ClockBeforeEpoch);
    }
    Ok((elapsed / TICK_MILLIS) as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let generator = IdGenerator::new(1);
        let mut previous = generator.next_id().unwrap();
        for _ in 0..10_000 {
            let next = generator.next_id().unwrap();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn machine_id_is_embedded() {
        let generator = IdGenerator::new(0xBEEF);
        let id = generator.next_id().unwrap();
        let parts = IdGenerator::decompose(id);
        assert_eq!(parts.machine_id, 0xBEEF);
        assert!(parts.ticks > 0);
    }

    #[test]
    fn sign_bit_is_never_set() {
        let generator = IdGenerator::new(u16::MAX);
        let id = generator.next_id().unwrap();
        assert!(id.as_i64() > 0);
    }

    #[test]
    fn exhausted_sequence_borrows_next_tick() {
        let generator = IdGenerator::new(3);
        let first = IdGenerator::decompose(generator.next_id().unwrap());

        // More ids than fit into one tick
        let mut last = first;
        for _ in 0..(SEQUENCE_MASK as usize + 10) {
            last = IdGenerator::decompose(generator.next_id().unwrap());
        }
        assert!(last.ticks > first.ticks);
    }

    #[test]
    fn concurrent_generation_yields_unique_ids() {
        let generator = Arc::new(IdGenerator::new(9));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..2_000)
                        .map(|_| generator.next_id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 16_000);
    }
}
