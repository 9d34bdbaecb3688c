use std::collections::HashMap;

use proptest::prelude::*;

use summit_engine::SyncError;
use summit_engine::cache::ResourceCache;
use summit_engine::device::RecordingDevice;
use summit_engine::shared::{VersionedBuffer, has_advanced};
use summit_engine::slots::{BindingScope, MAX_SLOTS_PER_GROUP, SlotTable};

#[derive(Debug, Clone)]
enum CacheOp {
    Add(usize),
    Remove(usize),
}

fn cache_op(buffers: usize) -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (0..buffers).prop_map(CacheOp::Add),
        (0..buffers).prop_map(CacheOp::Remove),
    ]
}

proptest! {
    /// The cache holds exactly one GPU buffer per identity with a positive
    /// reference count, and creates one only on a 0 -> 1 transition.
    #[test]
    fn dedup_matches_a_reference_count_model(ops in prop::collection::vec(cache_op(4), 1..64)) {
        let buffers: Vec<VersionedBuffer> = (0..4).map(|_| VersionedBuffer::create(16)).collect();
        let mut device = RecordingDevice::new();
        let mut cache = ResourceCache::new();
        let mut model: HashMap<usize, u32> = HashMap::new();
        let mut expected_creates = 0u64;

        for op in ops {
            match op {
                CacheOp::Add(i) => {
                    cache.add_buffer(&mut device, &buffers[i], wgpu::BufferUsages::VERTEX).unwrap();
                    let count = model.entry(i).or_insert(0);
                    if *count == 0 {
                        expected_creates += 1;
                    }
                    *count += 1;
                }
                CacheOp::Remove(i) => {
                    let result = cache.remove_buffer(&mut device, buffers[i].identity());
                    match model.get_mut(&i) {
                        Some(count) if *count > 0 => {
                            prop_assert!(result.is_ok());
                            *count -= 1;
                        }
                        _ => prop_assert!(matches!(result, Err(SyncError::UnknownResource(_)))),
                    }
                }
            }

            let live = model.values().filter(|c| **c > 0).count();
            prop_assert_eq!(cache.len(), live);
            prop_assert_eq!(device.live_buffers(), live);
            for (i, count) in &model {
                let cached = cache.buffer(buffers[*i].identity()).map(|r| r.reference_count);
                prop_assert_eq!(cached, (*count > 0).then_some(*count));
            }
        }
        prop_assert_eq!(device.counters().buffers_created, expected_creates);
    }

    /// Versions only move forward, and after any burst of writes one sync
    /// leaves the GPU copy equal to the final payload.
    #[test]
    fn sync_uploads_the_final_state(
        writes in prop::collection::vec((0usize..32, prop::collection::vec(any::<u8>(), 0..8)), 0..24)
    ) {
        let buffer = VersionedBuffer::create(32);
        let mut device = RecordingDevice::new();
        let mut cache = ResourceCache::new();
        let handle = cache.add_buffer(&mut device, &buffer, wgpu::BufferUsages::UNIFORM).unwrap();

        let mut last = buffer.peek_version();
        for (offset, bytes) in &writes {
            match buffer.write(bytes, *offset) {
                Ok(version) => {
                    prop_assert!(has_advanced(last, version));
                    prop_assert_eq!(version, buffer.peek_version());
                    last = version;
                }
                Err(err) => {
                    prop_assert!(offset + bytes.len() > 32);
                    prop_assert!(matches!(err, SyncError::OutOfBounds { .. }), "unexpected error: {}", err);
                    prop_assert_eq!(buffer.peek_version(), last);
                }
            }
        }

        let dirty = last != 0;
        prop_assert_eq!(cache.sync_buffer(&mut device, buffer.identity()).unwrap(), dirty);
        prop_assert!(!cache.sync_buffer(&mut device, buffer.identity()).unwrap());
        let payload = buffer.read(|_, payload| payload.to_vec());
        prop_assert_eq!(device.buffer_contents(handle).unwrap(), payload.as_slice());
    }

    /// A name keeps its first slot forever; slots are handed out densely in
    /// first-seen order.
    #[test]
    fn slots_are_stable_and_dense(names in prop::collection::vec("[a-f]{1,2}", 1..80)) {
        let mut table = SlotTable::new(BindingScope::Object);
        let mut first_seen: Vec<&str> = Vec::new();

        for name in &names {
            let slot = table.get_or_create_slot(name).unwrap();
            match first_seen.iter().position(|n| n == name) {
                Some(index) => prop_assert_eq!(slot as usize, index),
                None => {
                    prop_assert_eq!(slot as usize, first_seen.len());
                    first_seen.push(name);
                }
            }
        }
        prop_assert_eq!(table.len(), first_seen.len());
        prop_assert_eq!(table.high_water_mark() as usize, first_seen.len());
    }
}

#[test]
fn slot_namespace_fills_at_capacity() {
    let mut table = SlotTable::new(BindingScope::Target);
    for i in 0..MAX_SLOTS_PER_GROUP {
        assert_eq!(table.get_or_create_slot(&format!("b{i}")).unwrap(), i);
    }
    assert_eq!(table.get_or_create_slot("b0").unwrap(), 0);
    assert!(matches!(
        table.get_or_create_slot("one_more"),
        Err(SyncError::SlotExhausted { requested, .. }) if requested == MAX_SLOTS_PER_GROUP
    ));
}
