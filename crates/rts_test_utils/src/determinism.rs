//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the spatial index
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! The index runs inside a lockstep simulation, so every replica must
//! reach the same cell membership, motion schedule and query answers.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`rts_spatial::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Cells keep ordered membership lists and snapshots sort by id.
//!
//! - **Search tie-breaking**: equal distances are ordered by entity id.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual operations (add, migrate, search)
//! 2. **Property tests**: Random operation sequences replay identically
//! 3. **Parallel tests**: Running N replicas in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use rts_spatial::index::{IndexSnapshot, SpatialIndex};

use self::strategies::IndexOp;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic index).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Spatial index is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance by one tick, given the tick number
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use rts_test_utils::determinism::verify_determinism;
/// use rts_test_utils::fixtures::{small_world, unit_at};
///
/// let result = verify_determinism(
///     3,
///     40,
///     || {
///         let mut index = small_world();
///         index.add(unit_at(1, 5, 5).moving()).unwrap();
///         index
///     },
///     |index, tick| {
///         let x = 5 + i32::try_from(tick).unwrap();
///         index
///             .set_entity_position(1, rts_test_utils::fixtures::pos(x, 5))
///             .unwrap();
///         index.tick();
///     },
///     rts_spatial::index::SpatialIndex::state_hash,
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for tick in 0..ticks {
            step(&mut state, tick);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Result of parallel replica runs.
#[derive(Debug, Clone)]
pub struct ParallelReplicaResult {
    /// Final state hash from each replica.
    pub hashes: Vec<u64>,
    /// Number of operations each replica applied.
    pub operations: usize,
    /// Number of replicas run.
    pub replicas: usize,
}

impl ParallelReplicaResult {
    /// Check if all replicas produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all replicas matched.
    ///
    /// # Panics
    ///
    /// Panics if replicas produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel replicas diverged!\n\
                 Replicas: {}\n\
                 Operations: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.replicas,
                self.operations,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Feed the same operation log to `replicas` indexes on scoped threads
/// and collect their final hashes.
///
/// # Panics
///
/// Panics if a replica thread panics.
pub fn run_parallel_replicas_scoped<F>(
    setup_fn: F,
    ops: &[IndexOp],
    replicas: usize,
) -> ParallelReplicaResult
where
    F: Fn() -> SpatialIndex + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..replicas)
            .map(|_| {
                s.spawn(|| {
                    let mut index = setup_fn();
                    for op in ops {
                        op.apply(&mut index);
                    }
                    index.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelReplicaResult {
        hashes,
        operations: ops.len(),
        replicas,
    }
}

/// Replay an operation log on two replicas, finding the first divergence.
///
/// # Returns
///
/// `None` if the replicas stay identical, `Some(n)` if they differ after
/// the `n`-th operation (`0` for the initial state).
pub fn find_first_divergence<F>(setup_fn: F, ops: &[IndexOp]) -> Option<usize>
where
    F: Fn() -> SpatialIndex,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for (i, op) in ops.iter().enumerate() {
        op.apply(&mut first);
        op.apply(&mut second);

        if first.state_hash() != second.state_hash() {
            return Some(i + 1);
        }
    }

    None
}

/// Verify that a snapshot survives a bincode round-trip unchanged.
pub fn verify_snapshot_round_trip(index: &SpatialIndex) -> bool {
    let snapshot = index.snapshot();
    let Ok(bytes) = snapshot.to_bytes() else {
        return false;
    };
    let Ok(restored) = IndexSnapshot::from_bytes(&bytes) else {
        return false;
    };
    compute_hash(&restored) == compute_hash(&snapshot) && restored == snapshot
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for spatial index testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of index bookkeeping and determinism.
pub mod strategies {
    use proptest::prelude::*;
    use rts_spatial::components::{EntityId, EntityKind, EntityRecord};
    use rts_spatial::index::SpatialIndex;
    use rts_spatial::math::{Fixed, Vec2Fixed};

    /// One call against the index.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum IndexOp {
        /// Add an entity.
        Add(EntityRecord),
        /// Remove an entity.
        Remove(EntityId),
        /// Update an entity's position.
        Move(EntityId, Vec2Fixed),
        /// Entity starts moving.
        StartMotion(EntityId),
        /// Entity stops moving.
        StopMotion(EntityId),
        /// Advance one tick.
        Tick,
    }

    impl IndexOp {
        /// Apply the operation, ignoring rejected calls.
        pub fn apply(&self, index: &mut SpatialIndex) {
            let outcome = match *self {
                Self::Add(record) => index.add(record).map(|_| ()),
                Self::Remove(id) => index.remove(id).map(|_| ()),
                Self::Move(id, position) => index.set_entity_position(id, position),
                Self::StartMotion(id) => index.on_motion_start(id),
                Self::StopMotion(id) => index.on_motion_stop(id),
                Self::Tick => {
                    index.tick();
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                tracing::trace!(op = ?self, %err, "Operation rejected");
            }
        }
    }

    /// Generate a coordinate inside `[0, size)`.
    pub fn arb_coordinate(size: i32) -> impl Strategy<Value = Fixed> {
        (0..size * 4).prop_map(|quarter| Fixed::from_num(quarter) / Fixed::from_num(4))
    }

    /// Generate a position inside a square world of `size`.
    pub fn arb_world_position(size: i32) -> impl Strategy<Value = Vec2Fixed> {
        (arb_coordinate(size), arb_coordinate(size)).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate an entity kind.
    pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
        prop_oneof![
            Just(EntityKind::Unit),
            Just(EntityKind::Building),
            Just(EntityKind::Resource),
            Just(EntityKind::Other),
        ]
    }

    /// Generate a record with an id below `max_id`.
    pub fn arb_entity_record(size: i32, max_id: u64) -> impl Strategy<Value = EntityRecord> {
        (0..max_id, arb_entity_kind(), arb_world_position(size), any::<bool>())
            .prop_map(|(id, kind, position, moving)| {
                let record = EntityRecord::new(id, kind, position);
                if moving {
                    record.moving()
                } else {
                    record
                }
            })
    }

    /// Generate a single operation over ids below `max_id`.
    pub fn arb_index_op(size: i32, max_id: u64) -> impl Strategy<Value = IndexOp> {
        prop_oneof![
            3 => arb_entity_record(size, max_id).prop_map(IndexOp::Add),
            1 => (0..max_id).prop_map(IndexOp::Remove),
            4 => (0..max_id, arb_world_position(size)).prop_map(|(id, p)| IndexOp::Move(id, p)),
            1 => (0..max_id).prop_map(IndexOp::StartMotion),
            1 => (0..max_id).prop_map(IndexOp::StopMotion),
            2 => Just(IndexOp::Tick),
        ]
    }

    /// Generate an operation log.
    pub fn arb_op_log(size: i32, max_id: u64, max_len: usize) -> impl Strategy<Value = Vec<IndexOp>> {
        proptest::collection::vec(arb_index_op(size, max_id), 0..max_len)
    }
}
