//! Page and zone-reservation tiers driven through the pool handle.

mod common;

use std::time::Duration;

use common::*;
use pagepool_core::config::{PoolConfig, RELEASE_TASK_DELAY};
use pagepool_mem::TearDownOutcome;

#[test]
fn test_local_reuse_is_lifo() {
    let h = harness(PoolConfig::default());
    let a = h.group.create_context();

    let pages: Vec<_> = (0..3).map(|_| h.source.page()).collect();
    let ids: Vec<u64> = pages.iter().map(|p| p.id).collect();
    for page in pages {
        h.pool.add(a, page);
    }

    let got: Vec<u64> = (0..3).map(|_| h.pool.remove(a).unwrap().id).collect();
    assert_eq!(got, vec![ids[2], ids[1], ids[0]]);
    assert!(h.pool.remove(a).is_none());
    assert!(h.source.released_pages().is_empty());
}

#[test]
fn test_drained_context_has_no_local_count() {
    let h = harness(PoolConfig::default());
    let a = h.group.create_context();
    h.pool.add(a, h.source.page());
    assert_eq!(h.pool.get_count(a), 1);

    let _page = h.pool.remove(a).unwrap();
    assert_eq!(h.pool.get_count(a), 0);
    assert_eq!(h.pool.get_total_count(), 0);
}

#[test]
fn test_contexts_do_not_see_each_others_local_pages() {
    let h = harness(PoolConfig::default());
    let a = h.group.create_context();
    let b = h.group.create_context();
    h.pool.add(a, h.source.page());

    assert!(h.pool.remove(b).is_none());
    assert_eq!(h.pool.get_count(a), 1);
}

#[test]
fn test_teardown_handoff_delays_release() {
    let h = harness(sharing());
    let a = h.group.create_context();
    let b = h.group.create_context();

    let page_ids: Vec<u64> = (0..2)
        .map(|_| {
            let page = h.source.page();
            let id = page.id;
            h.pool.add(a, page);
            id
        })
        .collect();
    h.pool.add_zone_reservation(a, h.source.reservation());

    let outcome = h.pool.release_on_tear_down(a);
    assert!(matches!(outcome, TearDownOutcome::HandedOff { target, .. } if target == b));
    h.group.remove_context(a);

    // Shared right away, nothing released yet.
    assert_eq!(h.pool.get_shared_count(), 2);
    assert_eq!(h.pool.zone_reservation_count(), 1);
    assert_eq!(h.group.pending_tasks(b), 1);

    assert_eq!(h.group.advance(RELEASE_TASK_DELAY - Duration::from_secs(1)), 0);
    assert_eq!(h.pool.get_shared_count(), 2);
    assert!(h.source.released_pages().is_empty());

    assert_eq!(h.group.advance(Duration::from_secs(1)), 1);
    assert_eq!(h.pool.get_shared_count(), 0);
    assert_eq!(h.pool.zone_reservation_count(), 0);

    let mut released = h.source.released_pages();
    released.sort();
    assert_eq!(released, page_ids);
    assert_eq!(h.source.released_reservations().len(), 1);
}

#[test]
fn test_handoff_window_matches_direct_release_up_to() {
    let h = harness(sharing());
    let a = h.group.create_context();
    let b = h.group.create_context();
    h.pool.add(a, h.source.page());

    let TearDownOutcome::HandedOff { time, .. } = h.pool.release_on_tear_down(a) else {
        panic!("expected a handoff");
    };
    assert_eq!(h.pool.get_shared_count(), 1);

    let report = h.pool.release_up_to(b, time);
    assert_eq!(report.pages_removed, 1);
    assert_eq!(h.pool.get_shared_count(), 0);

    // The scheduled task finds nothing left.
    assert_eq!(h.group.run_until_idle(), 1);
    assert_eq!(h.source.released_pages().len(), 1);
}

#[test]
fn test_sole_context_teardown_releases_immediately() {
    let h = harness(sharing());
    let a = h.group.create_context();
    h.pool.add(a, h.source.page());
    h.pool.add_zone_reservation(a, h.source.reservation());

    let outcome = h.pool.release_on_tear_down(a);
    assert!(matches!(outcome, TearDownOutcome::NoPeer { .. }));
    assert_eq!(h.pool.get_total_count(), 0);
    assert_eq!(h.pool.zone_reservation_count(), 0);
    assert_eq!(h.source.released_pages().len(), 1);
    assert_eq!(h.source.released_reservations().len(), 1);
    assert_eq!(h.group.run_until_idle(), 0);
}

#[test]
fn test_sharing_disabled_releases_only_own_pages() {
    let h = harness(PoolConfig::default());
    let a = h.group.create_context();
    let b = h.group.create_context();
    h.pool.add(a, h.source.page());
    h.pool.add(b, h.source.page());

    assert_eq!(h.pool.release_on_tear_down(a), TearDownOutcome::ReleasedImmediately);
    assert_eq!(h.source.released_pages().len(), 1);
    assert_eq!(h.pool.get_count(b), 1);
    assert_eq!(h.pool.get_shared_count(), 0);
}

#[test]
fn test_live_context_reuses_shared_pages_before_eviction() {
    let h = harness(sharing());
    let a = h.group.create_context();
    let b = h.group.create_context();
    let page = h.source.page();
    let id = page.id;
    h.pool.add(a, page);
    h.pool.release_on_tear_down(a);
    h.group.remove_context(a);

    // B has no local pool, so it takes from the shared pool.
    let reused = h.pool.remove(b).unwrap();
    assert_eq!(reused.id, id);

    h.group.run_until_idle();
    assert!(h.source.released_pages().is_empty());
}

#[test]
fn test_later_teardown_survives_earlier_window() {
    let h = harness(sharing());
    let a = h.group.create_context();
    let b = h.group.create_context();
    let c = h.group.create_context();

    h.pool.add(a, h.source.page());
    h.pool.release_on_tear_down(a);
    h.group.remove_context(a);
    h.group.advance(Duration::from_secs(4));

    h.pool.add(c, h.source.page());
    h.pool.add(c, h.source.page());
    h.pool.release_on_tear_down(c);
    h.group.remove_context(c);
    assert_eq!(h.pool.get_shared_count(), 3);
    assert_eq!(h.group.pending_tasks(b), 2);

    // A's window closes first and leaves C's batch alone.
    h.group.advance(Duration::from_secs(4));
    assert_eq!(h.pool.get_shared_count(), 2);

    h.group.advance(Duration::from_secs(4));
    assert_eq!(h.pool.get_shared_count(), 0);
    assert_eq!(h.group.pending_tasks(b), 0);
}

#[test]
fn test_cancelled_handoff_is_picked_up_by_next_teardown() {
    let h = harness(sharing());
    let a = h.group.create_context();
    let b = h.group.create_context();
    h.pool.add(a, h.source.page());
    h.pool.release_on_tear_down(a);
    h.group.remove_context(a);

    // B dies before its task fires; its task is cancelled.
    assert!(matches!(
        h.pool.release_on_tear_down(b),
        TearDownOutcome::NoPeer { .. }
    ));
    assert_eq!(h.group.remove_context(b), 1);
    assert_eq!(h.pool.get_shared_count(), 0);
    assert_eq!(h.source.released_pages().len(), 1);
}

#[test]
fn test_cancelled_handoff_leaves_memory_until_process_teardown() {
    let h = harness(sharing());
    let a = h.group.create_context();
    let b = h.group.create_context();
    h.pool.add(a, h.source.page());
    h.pool.release_on_tear_down(a);
    h.group.remove_context(a);

    // B goes away without a pool teardown, so nothing picks the work up.
    h.group.remove_context(b);
    assert_eq!(h.group.run_until_idle(), 0);
    assert_eq!(h.pool.get_shared_count(), 1);

    h.pool.tear_down();
    assert_eq!(h.pool.get_total_count(), 0);
    assert_eq!(h.source.released_pages().len(), 1);
}

#[test]
fn test_zone_reservations_follow_page_rules() {
    let h = harness(PoolConfig::default());
    let a = h.group.create_context();
    let first = h.source.reservation();
    let second = h.source.reservation();
    let second_id = second.id;
    h.pool.add_zone_reservation(a, first);
    h.pool.add_zone_reservation(a, second);

    let got = h.pool.remove_zone_reservation(a).unwrap();
    assert_eq!(got.id, second_id);
    assert!(h.source.released_reservations().is_empty());

    h.pool.release_immediately(a);
    assert_eq!(h.source.released_reservations().len(), 1);
    assert_eq!(h.pool.stats().zone_reservations_released, 1);
    drop(got);
}

#[test]
fn test_stats_snapshot_tracks_releases() {
    let h = harness(sharing());
    let a = h.group.create_context();
    let _b = h.group.create_context();
    h.pool.add(a, h.source.page());
    h.pool.add(a, h.source.page());
    h.pool.release_on_tear_down(a);

    let stats = h.pool.stats();
    assert_eq!(stats.pooled_pages, 2);
    assert_eq!(stats.shared_pages, 2);
    assert_eq!(stats.pages_released, 0);

    h.group.run_until_idle();
    let stats = h.pool.stats();
    assert_eq!(stats.pooled_pages, 0);
    assert_eq!(stats.pages_released, 2);

    assert_eq!(stats.large_pool_capacity_bytes, 32 * MB);

    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["pages_released"], 2);
}
