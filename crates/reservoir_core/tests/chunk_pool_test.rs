//! Integration tests for the chunk pool.
//!
//! Run with: cargo test --package reservoir_core --test chunk_pool_test

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reservoir_core::{ChunkId, ChunkPool, PoolConfig, PoolError};

/// Checks that every chunk's locations tile `[0, used)` in list order.
fn assert_packed(pool: &ChunkPool) {
    for index in 0..pool.chunk_count() {
        let chunk = pool.chunk(index).unwrap();
        let mut cursor = 0;
        for location in chunk.locations() {
            assert_eq!(location.start(), cursor, "gap in chunk {index}");
            cursor = location.end();
        }
        assert_eq!(cursor, chunk.capacity() - chunk.top_free());
        assert_eq!(chunk.locations().count(), chunk.len());
    }
}

#[test]
fn test_shift_on_erase() {
    let mut pool = ChunkPool::new(64).unwrap();
    let a = pool.insert(8).unwrap();
    let b = pool.insert(16).unwrap();
    let c = pool.insert(4).unwrap();
    pool.get_mut(a).unwrap().fill(0xAA);
    pool.get_mut(b).unwrap().copy_from_slice(&[0xB0; 16]);
    pool.get_mut(c).unwrap().copy_from_slice(&[1, 2, 3, 4]);

    pool.erase(a).unwrap();

    let chunk = pool.chunk(0).unwrap();
    let spans: Vec<(usize, usize)> = chunk.locations().map(|l| (l.start(), l.len())).collect();
    assert_eq!(spans, vec![(0, 16), (16, 4)]);
    assert_eq!(pool.get(b).unwrap(), &[0xB0; 16]);
    assert_eq!(pool.get(c).unwrap(), &[1, 2, 3, 4]);
    assert_packed(&pool);
}

#[test]
fn test_lifo_id_reuse_is_zeroed() {
    let mut pool = ChunkPool::new(128).unwrap();
    let a = pool.insert(8).unwrap();
    let b = pool.insert(8).unwrap();
    pool.get_mut(a).unwrap().fill(0xFF);
    pool.get_mut(b).unwrap().fill(0xEE);

    pool.erase(a).unwrap();
    pool.erase(b).unwrap();

    let first = pool.insert(8).unwrap();
    let second = pool.insert(8).unwrap();
    assert_eq!(first, b);
    assert_eq!(second, a);
    assert_eq!(pool.get(first).unwrap(), &[0; 8]);
    assert_eq!(pool.get(second).unwrap(), &[0; 8]);
}

#[test]
fn test_round_trip_typed() {
    let mut pool = ChunkPool::new(64).unwrap();
    let id = pool.insert(12).unwrap();
    pool.write(id, &[10u32, 20, 30]).unwrap();
    assert_eq!(pool.read::<[u32; 3]>(id).unwrap(), [10, 20, 30]);
    assert_eq!(
        pool.write(id, &[0u64; 2]),
        Err(PoolError::SizeMismatch {
            expected: 16,
            actual: 12
        })
    );
}

#[test]
fn test_iteration_order_spans_chunks() {
    let mut pool = ChunkPool::new(16).unwrap();
    let a = pool.insert(10).unwrap();
    let b = pool.insert(10).unwrap();
    let c = pool.insert(4).unwrap();
    let d = pool.insert(6).unwrap();

    // a, c in chunk 0; b, d in chunk 1.
    let order: Vec<ChunkId> = pool.iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec![a, c, b, d]);

    pool.erase(a).unwrap();
    let order: Vec<ChunkId> = (&pool).into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec![c, b, d]);
    assert_packed(&pool);
}

#[test]
fn test_excluded_entries_reappear_on_pop() {
    let mut pool = ChunkPool::new(64).unwrap();
    let a = pool.insert(4).unwrap();
    let hidden = pool.insert_excluded(4).unwrap();
    pool.write(hidden, &5u32).unwrap();

    let visible: Vec<ChunkId> = pool.iter().map(|(id, _)| id).collect();
    assert_eq!(visible, vec![a]);
    assert_eq!(pool.iter_all().count(), 2);
    assert!(pool.contains(hidden));

    assert_eq!(pool.pop_excluded(), Some(hidden));
    let visible: Vec<ChunkId> = pool.iter().map(|(id, _)| id).collect();
    assert_eq!(visible, vec![a, hidden]);
    assert_eq!(pool.read::<u32>(hidden).unwrap(), 5);
}

#[test]
fn test_from_config() {
    let config = PoolConfig::from_toml_str("[chunk]\nchunk_capacity = 100\n").unwrap();
    let pool = ChunkPool::from_config(&config.chunk).unwrap();
    assert_eq!(pool.chunk_capacity(), 100);
    assert_eq!(pool.chunk_count(), 1);
}

#[test]
fn test_random_workload_keeps_packing() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut pool = ChunkPool::new(256).unwrap();
    let mut shadow: HashMap<ChunkId, Vec<u8>> = HashMap::new();

    for step in 0..3_000u32 {
        if shadow.is_empty() || rng.gen_bool(0.55) {
            let size = rng.gen_range(1..=64usize);
            let id = pool.insert(size).unwrap();
            assert!(!shadow.contains_key(&id), "id {id} handed out twice");

            let bytes: Vec<u8> = (0..size).map(|i| (step as usize + i) as u8).collect();
            assert_eq!(pool.get(id).unwrap(), vec![0; size].as_slice());
            pool.get_mut(id).unwrap().copy_from_slice(&bytes);
            shadow.insert(id, bytes);
        } else {
            let id = *shadow.keys().nth(rng.gen_range(0..shadow.len())).unwrap();
            pool.erase(id).unwrap();
            shadow.remove(&id);
            assert_eq!(pool.get(id), Err(PoolError::UnknownId(id.get())));
        }

        assert_eq!(pool.count(), shadow.len());
    }

    assert_packed(&pool);
    for (id, bytes) in &shadow {
        assert_eq!(pool.get(*id).unwrap(), bytes.as_slice());
    }
    assert_eq!(pool.iter().count(), shadow.len());
}
