//! Cross-module unit tests for taintflow-core.

use crate::{Sink, Taint, TaintConfig, TaintError};
use taintflow_engine::ThreadContext;
use taintflow_store::{Location, Register, StorageStrategy};
use taintflow_tag::Tag;

#[test]
fn test_invalid_config_rejected_by_facade() {
    let mut config = TaintConfig::default();
    config.engine.max_frame_depth = 0;
    assert!(matches!(Taint::new(config), Err(TaintError::Config(_))));
}

#[test]
fn test_store_section_selects_policy() {
    let mut config = TaintConfig::default();
    config.store.arrays = StorageStrategy::SideTable;
    let taint = Taint::new(config).unwrap();
    assert_eq!(taint.store().policy().arrays, StorageStrategy::SideTable);
    assert_eq!(taint.store().policy().fields, StorageStrategy::ParallelSlot);
}

#[test]
fn test_configured_sink_lookup_and_check() {
    let taint = Taint::new(TaintConfig::default()).unwrap();
    let log = taint.sink("log").unwrap();
    assert!(taint.check_sink(Tag::LOCATION, log).is_ok());
    assert!(taint.check_sink(Tag::IMSI, log).is_err());
    assert!(taint.sink("printer").is_none());
}

#[test]
fn test_declassify_through_facade() {
    let taint = Taint::new(TaintConfig::default()).unwrap();
    let mut ctx = ThreadContext::new();
    taint.engine().invoke(&mut ctx, "hash", 1, &[]).unwrap();

    taint.add_taint_value(&mut ctx, Register(0), 42_i64, Tag::PASSWORD).unwrap();
    assert!(taint.check_sink(taint.query_sink(&ctx, Location::reg(0)), &Sink::file()).is_err());

    assert!(taint.declassify(&mut ctx, Location::reg(0)));
    assert_eq!(taint.query_sink(&ctx, Location::reg(0)), Tag::CLEAR);
}

#[test]
fn test_clones_share_the_store() {
    let taint = Taint::new(TaintConfig::default()).unwrap();
    let other = taint.clone();
    let string = taint.store().alloc_string("imei");
    taint.add_taint_ref(string, Tag::IMEI);
    assert_eq!(other.get_taint_ref(string), Tag::IMEI);
}
