//! Monotonic 64-bit identifier generation.
//!
//! Layout: 1 sign bit (always 0) | 41 bits of milliseconds since
//! [`EPOCH_MS`] | 10 bits machine id | 12 bits sequence. Up to 4096 ids per
//! millisecond per instance; the generator spins into the next millisecond
//! on sequence exhaustion.

use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

/// Generator epoch: 2025-01-01T00:00:00Z in Unix milliseconds.
pub const EPOCH_MS: i64 = 1_735_689_600_000;

const MACHINE_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

const MAX_MACHINE_ID: u64 = (1 << MACHINE_ID_BITS) - 1; // 1023
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1; // 4095

const MACHINE_ID_SHIFT: u32 = SEQUENCE_BITS; // 12
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + MACHINE_ID_BITS; // 22

#[derive(Debug, Error)]
pub enum IdGenError {
    #[error("machine id {0} out of range 0..={MAX_MACHINE_ID}")]
    MachineIdOutOfRange(u64),
    #[error("clock rewound: now {now_ms} < last observed {last_ms}")]
    ClockRewound { now_ms: i64, last_ms: i64 },
    #[error("current time predates the generator epoch")]
    BeforeEpoch,
}

/// The fields packed into an id, recovered by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    pub timestamp_ms: i64,
    pub machine_id: u64,
    pub sequence: u64,
}

struct GenState {
    last_ms: i64,
    sequence: u64,
}

/// Snowflake-style id generator.
///
/// Instances are independent; construct one per process with a distinct
/// machine id. `(last_ms, sequence)` are guarded by a mutex, which is the
/// only lock the generator takes.
pub struct IdGen {
    machine_id: u64,
    state: Mutex<GenState>,
}

impl IdGen {
    /// Create a generator for the given machine id (0..=1023).
    pub fn new(machine_id: u64) -> Result<Self, IdGenError> {
        if machine_id > MAX_MACHINE_ID {
            return Err(IdGenError::MachineIdOutOfRange(machine_id));
        }
        Ok(Self {
            machine_id,
            state: Mutex::new(GenState {
                last_ms: 0,
                sequence: 0,
            }),
        })
    }

    /// Generate the next id.
    ///
    /// Strictly increasing within this instance. Fails with
    /// [`IdGenError::ClockRewound`] when the wall clock has moved backwards
    /// relative to the last observed timestamp.
    pub fn next_id(&self) -> Result<u64, IdGenError> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut now = now_millis();
        if now < state.last_ms {
            return Err(IdGenError::ClockRewound {
                now_ms: now,
                last_ms: state.last_ms,
            });
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted within this millisecond.
                now = wait_next_millis(state.last_ms);
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        let elapsed = now - EPOCH_MS;
        if elapsed < 0 {
            return Err(IdGenError::BeforeEpoch);
        }

        Ok(((elapsed as u64) << TIMESTAMP_SHIFT)
            | (self.machine_id << MACHINE_ID_SHIFT)
            | state.sequence)
    }

    pub fn machine_id(&self) -> u64 {
        self.machine_id
    }
}

/// Decompose an id into its timestamp, machine id, and sequence.
///
/// Exact inverse of the packing in [`IdGen::next_id`]; `timestamp_ms` is an
/// absolute Unix-millisecond value.
pub fn parse(id: u64) -> IdParts {
    IdParts {
        timestamp_ms: (id >> TIMESTAMP_SHIFT) as i64 + EPOCH_MS,
        machine_id: (id >> MACHINE_ID_SHIFT) & MAX_MACHINE_ID,
        sequence: id & MAX_SEQUENCE,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn wait_next_millis(last_ms: i64) -> i64 {
    let mut now = now_millis();
    while now <= last_ms {
        std::thread::sleep(Duration::from_micros(100));
        now = now_millis();
    }
    now
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn rejects_out_of_range_machine_id() {
        assert!(IdGen::new(1024).is_err());
        assert!(IdGen::new(0).is_ok());
        assert!(IdGen::new(1023).is_ok());
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let gen = IdGen::new(7).unwrap();
        let mut last = 0u64;
        for _ in 0..10_000 {
            let id = gen.next_id().unwrap();
            assert!(id > last, "id {id} not greater than previous {last}");
            last = id;
        }
    }

    #[test]
    fn parse_is_the_exact_inverse() {
        let gen = IdGen::new(42).unwrap();
        let before = now_millis();
        let id = gen.next_id().unwrap();
        let after = now_millis();

        let parts = parse(id);
        assert_eq!(parts.machine_id, 42);
        assert!(parts.timestamp_ms >= before && parts.timestamp_ms <= after);
        assert!(parts.sequence <= MAX_SEQUENCE);
    }

    #[test]
    fn sequence_exhaustion_spins_into_next_millisecond() {
        let gen = IdGen::new(1).unwrap();
        // More than 4096 calls land in one millisecond on any modern host;
        // all ids must still be distinct and increasing.
        let mut last = 0u64;
        for _ in 0..5_000 {
            let id = gen.next_id().unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn parallel_callers_never_collide() {
        let gen = Arc::new(IdGen::new(3).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let gen = Arc::clone(&gen);
            handles.push(std::thread::spawn(move || {
                let mut ids = Vec::with_capacity(10_000);
                for _ in 0..10_000 {
                    ids.push(gen.next_id().unwrap());
                }
                ids
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            // Per-caller outputs are strictly increasing.
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(all.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(all.len(), 80_000);
    }
}
