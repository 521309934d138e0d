//! # Integration Tests
//!
//! Lifecycle and concurrency behaviour of the shadow store across both
//! storage strategies.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use taintflow_store::{
    ElementKind, FieldIndex, FileTarget, HeapId, PrimitiveKind, ShadowKey, ShadowStore,
    StoragePolicy, StorageStrategy, Value,
};
use taintflow_tag::Tag;

fn both_policies() -> [StoragePolicy; 2] {
    [StoragePolicy::new(), StoragePolicy::side_tables_only()]
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_reclaim_then_reuse_never_inherits_taint() {
    for policy in both_policies() {
        let store = ShadowStore::new(policy);

        let first = store.alloc_array(ElementKind::BYTES, 8);
        store
            .array_store(first, 0, Value::Byte(7), Tag::PASSWORD)
            .unwrap();
        assert_eq!(store.get_tag(ShadowKey::Array(first)), Tag::PASSWORD);
        assert!(store.reclaim_object(first));

        // The collector hands the same identity out for a different kind.
        let second = store.alloc_instance("Session", 2);
        assert_eq!(second, first);
        assert_eq!(store.get_tag(ShadowKey::Object(second)), Tag::CLEAR);
        assert_eq!(store.get_tag(ShadowKey::Field(second, FieldIndex(0))), Tag::CLEAR);
        assert_eq!(store.get_tag(ShadowKey::Array(second)), Tag::CLEAR);

        assert!(store.reclaim_object(second));
        let third = store.alloc_array(ElementKind::BYTES, 8);
        assert_eq!(third, first);
        assert_eq!(store.get_tag(ShadowKey::Array(third)), Tag::CLEAR);
    }
}

#[test]
fn test_descriptor_lifecycle() {
    let store = ShadowStore::default();
    let log = PathBuf::from("/sdcard/log.txt");

    let fd = store.open(FileTarget::Path(log.clone())).unwrap();
    store.merge_tag(ShadowKey::Descriptor(fd), Tag::SMS);
    store.merge_tag(ShadowKey::Descriptor(fd), Tag::CONTACTS);
    assert_eq!(store.get_tag(ShadowKey::Descriptor(fd)), Tag::SMS | Tag::CONTACTS);
    assert_eq!(store.descriptor_target(fd), Some(FileTarget::Path(log.clone())));

    store.close(fd).unwrap();
    assert!(!store.merge_tag(ShadowKey::Descriptor(fd), Tag::SMS));
    assert!(store.close(fd).is_err());

    // Same path, same number, fresh tag.
    let again = store.open(FileTarget::Path(log)).unwrap();
    assert_eq!(again, fd);
    assert_eq!(store.get_tag(ShadowKey::Descriptor(again)), Tag::CLEAR);
}

#[test]
fn test_buffer_lifecycle() {
    let store = ShadowStore::default();
    let buf = store.alloc_direct_buffer(32);
    store.buffer_write(buf, 0, b"+15551234", Tag::PHONE_NUMBER).unwrap();
    assert!(store.free_buffer(buf));
    assert!(!store.free_buffer(buf));
    assert_eq!(store.get_tag(ShadowKey::Buffer(buf)), Tag::CLEAR);

    let reused = store.alloc_direct_buffer(32);
    assert_eq!(reused, buf);
    assert_eq!(store.buffer_read(reused, 0, 4).unwrap(), (vec![0; 4], Tag::CLEAR));
}

#[test]
fn test_unknown_locations_fail_open() {
    let store = ShadowStore::default();
    let ghost = HeapId(999);
    assert_eq!(store.get_tag(ShadowKey::Array(ghost)), Tag::CLEAR);
    assert_eq!(store.get_tag(ShadowKey::Field(ghost, FieldIndex(0))), Tag::CLEAR);
    assert!(!store.set_tag(ShadowKey::Object(ghost), Tag::IMEI));
    assert!(!store.merge_tag(ShadowKey::Array(ghost), Tag::IMEI));
    assert!(store.array_load(ghost, 0).is_err());
}

// ============================================================================
// Strategy equivalence
// ============================================================================

#[test]
fn test_strategies_observe_identical_tags() {
    let parallel = ShadowStore::new(StoragePolicy::new());
    let side = ShadowStore::new(StoragePolicy::side_tables_only());
    assert_eq!(parallel.policy().arrays, StorageStrategy::ParallelSlot);
    assert_eq!(side.policy().arrays, StorageStrategy::SideTable);

    let ints = ElementKind::Primitive(PrimitiveKind::Int);
    let writes = [
        (0, Tag::LOCATION),
        (3, Tag::CLEAR),
        (1, Tag::MIC | Tag::CAMERA),
        (2, Tag::from_bits(0x8000_0000)),
    ];

    let mut observed = Vec::new();
    for store in [&parallel, &side] {
        let array = store.alloc_array(ints, 4);
        let obj = store.alloc_instance("Reading", 2);
        let mut tags = Vec::new();
        for (i, tag) in writes {
            store.array_store(array, i, Value::Int(i as i32), tag).unwrap();
            store
                .field_store(obj, FieldIndex((i % 2) as u16), Value::Int(1), tag)
                .unwrap();
            tags.push(store.array_load(array, 0).unwrap().tag);
            tags.push(store.field_load(obj, FieldIndex(0)).unwrap().tag);
            tags.push(store.field_load(obj, FieldIndex(1)).unwrap().tag);
        }
        store.clear_tag(ShadowKey::Array(array));
        tags.push(store.get_tag(ShadowKey::Array(array)));
        observed.push(tags);
    }

    assert_eq!(observed[0], observed[1]);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_array_merges_lose_no_bits() {
    for policy in both_policies() {
        let store = Arc::new(ShadowStore::new(policy));
        let array = store.alloc_array(ElementKind::BYTES, 64);

        let handles: Vec<_> = (0..16u32)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..64 {
                        store
                            .array_store(array, i, Value::Byte(1), Tag::from_bits(1 << t))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_tag(ShadowKey::Array(array)), Tag::from_bits(0xffff));
    }
}

#[test]
fn test_concurrent_alloc_reclaim_keeps_store_consistent() {
    let store = Arc::new(ShadowStore::new(StoragePolicy::side_tables_only()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 0..200 {
                    let id = store.alloc_instance("Churn", 1);
                    // A fresh identity must never carry someone else's taint.
                    assert_eq!(store.get_tag(ShadowKey::Object(id)), Tag::CLEAR);
                    if round % 2 == 0 {
                        store.merge_tag(ShadowKey::Object(id), Tag::ACCOUNT);
                    }
                    assert!(store.reclaim_object(id));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = store.stats();
    assert_eq!(stats.live_objects, 0);
    assert_eq!(stats.tainted_objects, 0);
}
