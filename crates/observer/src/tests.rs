// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::sync::Arc;

use tokio::sync::Mutex;
use xrelay_cache::OutboundCache;
use xrelay_chain_traits::mock::{MockCentralChain, MockChainObserver, MockItem};
use xrelay_chain_traits::{
    CentralChain, ComplianceChecker, Located, RestrictedAddressList,
};
use xrelay_config::InboundConfig;
use xrelay_store::{CursorStore, InMemoryStore};
use xrelay_types::{
    ChainId, Cursor, InboundTracker, OutboundState, OutboundTracker,
    TrackedOutbound, TxHandle, TxStatus,
};
use xrelay_utils::metric::Metrics;

use super::*;

const CHAIN: ChainId = ChainId(101);

struct Harness {
    chain: Arc<MockChainObserver>,
    central: Arc<MockCentralChain>,
    store: InMemoryStore,
    metrics: Arc<Mutex<Metrics>>,
    cache: Arc<OutboundCache>,
    observer: Observer<MockChainObserver, InMemoryStore>,
}

fn test_config() -> InboundConfig {
    InboundConfig {
        vote_retry_interval: 1,
        ..Default::default()
    }
}

fn harness_with(restricted: &[&str], config: InboundConfig) -> Harness {
    let chain = Arc::new(MockChainObserver::new(CHAIN));
    let central = Arc::new(MockCentralChain::default());
    let store = InMemoryStore::default();
    let metrics = Arc::new(Mutex::new(Metrics::new().unwrap()));
    let cache = Arc::new(OutboundCache::new(16));
    let central_dyn: Arc<dyn CentralChain> = central.clone();
    let compliance: Arc<dyn ComplianceChecker> =
        Arc::new(RestrictedAddressList::new(restricted.iter().copied()));
    let observer = Observer::builder()
        .chain(chain.clone())
        .central(central_dyn)
        .store(store.clone())
        .compliance(compliance)
        .outbound_cache(cache.clone())
        .config(config)
        .metrics(metrics.clone())
        .build();
    Harness {
        chain,
        central,
        store,
        metrics,
        cache,
        observer,
    }
}

fn harness() -> Harness {
    harness_with(&[], test_config())
}

fn position(h: &Harness) -> Option<u64> {
    h.store.get_cursor(CHAIN).unwrap().map(|c| c.position)
}

#[tokio::test]
#[tracing_test::traced_test]
async fn normal_deposit_is_voted_and_cursor_advances() {
    let h = harness();
    h.store.set_cursor(CHAIN, &Cursor::new(5, "0x5,0")).unwrap();
    h.chain.push_item(MockItem::deposit(6, "0x6", "0xsender", "R", 100));
    h.chain.push_item(MockItem::garbage(7, "0x7"));

    h.observer.observe_inbound().await.unwrap();

    let votes = h.central.inbound_votes();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].chain_id, CHAIN);
    assert_eq!(votes[0].inbound.amount, 100);
    assert_eq!(votes[0].inbound.receiver, "R");
    assert_eq!(votes[0].observed_height, 100);
    assert_eq!(position(&h), Some(7));
    assert_eq!(h.chain.fetches()[0].position, 5);
    let metrics = h.metrics.lock().await;
    assert_eq!(metrics.inbound_votes_posted.get() as u64, 1);
    assert_eq!(metrics.inbound_items_unparseable.get() as u64, 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn bootstraps_cursor_from_earliest_position() {
    let h = harness();
    h.chain.set_earliest(Cursor::new(3, "deploy"));
    h.chain.push_item(MockItem::deposit(2, "0x2", "0xs", "0xr", 1));
    h.chain.push_item(MockItem::deposit(4, "0x4", "0xs", "0xr", 1));

    h.observer.observe_inbound().await.unwrap();

    assert_eq!(h.chain.fetches()[0], Cursor::new(3, "deploy"));
    let votes = h.central.inbound_votes();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].inbound.source_tx_hash, "0x4");
    assert_eq!(position(&h), Some(4));
}

#[tokio::test]
async fn scan_from_overrides_the_earliest_position() {
    let config = InboundConfig {
        scan_from: Some(10),
        ..test_config()
    };
    let h = harness_with(&[], config);
    h.chain.push_item(MockItem::deposit(9, "0x9", "0xs", "0xr", 1));
    h.chain.push_item(MockItem::deposit(11, "0xb", "0xs", "0xr", 1));

    h.observer.observe_inbound().await.unwrap();

    assert_eq!(h.chain.fetches()[0].position, 10);
    assert_eq!(h.central.inbound_votes().len(), 1);
    assert_eq!(position(&h), Some(11));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn halts_on_a_source_transaction_not_found_yet() {
    let h = harness();
    h.store.set_cursor(CHAIN, &Cursor::new(5, "")).unwrap();
    h.chain.push_item(MockItem::deposit(6, "0x6", "0xs", "0xr", 1));
    h.chain.push_item(MockItem::deposit(7, "0x7", "0xs", "0xr", 2));
    h.chain.push_item(MockItem::deposit(8, "0x8", "0xs", "0xr", 3));
    h.chain.set_location("0x7", Located::NotFound);

    h.observer.observe_inbound().await.unwrap();

    assert_eq!(h.central.inbound_votes().len(), 1);
    assert_eq!(position(&h), Some(6));
    assert_eq!(h.metrics.lock().await.inbound_scan_halts.get() as u64, 1);

    // the next tick resumes right at the halted item
    h.chain.set_location("0x7", Located::Finalized { height: 120 });
    h.observer.observe_inbound().await.unwrap();

    let votes = h.central.inbound_votes();
    assert_eq!(votes.len(), 3);
    assert_eq!(votes[1].inbound.source_tx_hash, "0x7");
    assert_eq!(votes[1].observed_height, 120);
    assert_eq!(position(&h), Some(8));
}

#[tokio::test]
async fn halts_on_unfinalized_and_unreachable_sources() {
    let h = harness();
    h.chain.push_item(MockItem::deposit(1, "0x1", "0xs", "0xr", 1));
    h.chain.set_location("0x1", Located::NotFinalized);

    h.observer.observe_inbound().await.unwrap();
    assert!(h.central.inbound_votes().is_empty());
    assert_eq!(position(&h), Some(0));

    h.chain.set_location("0x1", Located::Finalized { height: 7 });
    h.chain.fail_locate("0x1");
    h.observer.observe_inbound().await.unwrap();
    assert!(h.central.inbound_votes().is_empty());
    assert_eq!(position(&h), Some(0));
    assert_eq!(h.metrics.lock().await.inbound_scan_halts.get() as u64, 2);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn restricted_parties_are_skipped_but_cursor_advances() {
    let h = harness_with(&["0xBAD"], test_config());
    h.chain.push_item(MockItem::deposit(1, "0x1", "0xbad", "0xr", 1));
    h.chain.push_item(MockItem::deposit(2, "0x2", "0xs", "0xBad", 1));
    h.chain.push_item(MockItem::deposit(3, "0x3", "0xs", "0xr", 1));

    h.observer.observe_inbound().await.unwrap();

    let votes = h.central.inbound_votes();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].inbound.source_tx_hash, "0x3");
    assert_eq!(position(&h), Some(3));
    assert_eq!(h.metrics.lock().await.compliance_skips.get() as u64, 2);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn failed_vote_is_retried_after_the_cursor_advanced() {
    let h = harness();
    // one initial attempt plus the configured retries
    for _ in 0..=test_config().vote_max_retries {
        h.central.fail_next_vote("central chain unavailable");
    }
    h.chain.push_item(MockItem::deposit(1, "0x1", "0xs", "0xr", 1));
    h.chain.push_item(MockItem::deposit(2, "0x2", "0xs", "0xr", 1));

    h.observer.observe_inbound().await.unwrap();

    let votes = h.central.inbound_votes();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].inbound.source_tx_hash, "0x2");
    assert_eq!(position(&h), Some(2));
    assert_eq!(h.metrics.lock().await.inbound_vote_failures.get() as u64, 1);
    assert!(logs_contain("Giving up on inbound vote"));
    assert_eq!(
        h.observer.internal_trackers(),
        vec![InboundTracker {
            chain_id: CHAIN,
            tx_hash: "0x1".into(),
        }]
    );

    // the central chain is back, the tracker scan picks the deposit up again
    h.chain.set_tx_events(
        "0x1",
        vec![MockItem::deposit(1, "0x1", "0xs", "0xr", 1)],
    );
    h.observer.process_inbound_trackers().await.unwrap();

    let votes = h.central.inbound_votes();
    assert_eq!(votes.len(), 2);
    assert_eq!(votes[1].inbound.source_tx_hash, "0x1");
    assert!(h.observer.internal_trackers().is_empty());
    assert_eq!(position(&h), Some(2), "the cursor never moves back");
}

#[tokio::test]
async fn internal_trackers_come_after_posted_ones() {
    let config = InboundConfig {
        max_trackers_per_scan: 1,
        vote_max_retries: 0,
        ..test_config()
    };
    let h = harness_with(&[], config);
    h.central.fail_next_vote("central chain unavailable");
    h.chain.push_item(MockItem::deposit(1, "0x1", "0xs", "0xr", 1));
    h.observer.observe_inbound().await.unwrap();
    assert_eq!(h.observer.internal_trackers().len(), 1);

    h.central.push_inbound_tracker(InboundTracker {
        chain_id: CHAIN,
        tx_hash: "0xposted".into(),
    });
    for tx in ["0x1", "0xposted"] {
        h.chain.set_tx_events(
            tx,
            vec![MockItem::deposit(1, tx, "0xs", "0xr", 1)],
        );
    }

    h.observer.process_inbound_trackers().await.unwrap();
    let votes = h.central.inbound_votes();
    assert_eq!(votes.len(), 1, "the scan is truncated to one tracker");
    assert_eq!(votes[0].inbound.source_tx_hash, "0xposted");
    assert_eq!(h.observer.internal_trackers().len(), 1);
}

#[tokio::test]
async fn internal_trackers_are_bounded() {
    let total = MAX_INTERNAL_TRACKERS as u64 + 5;
    let config = InboundConfig {
        max_items_per_scan: total,
        vote_max_retries: 0,
        ..test_config()
    };
    let h = harness_with(&[], config);
    for p in 1..=total {
        h.central.fail_next_vote("central chain unavailable");
        h.chain
            .push_item(MockItem::deposit(p, &format!("0x{p}"), "0xs", "0xr", 1));
    }

    h.observer.observe_inbound().await.unwrap();

    assert_eq!(position(&h), Some(total));
    let trackers = h.observer.internal_trackers();
    assert_eq!(trackers.len(), MAX_INTERNAL_TRACKERS);
    assert_eq!(trackers[0].tx_hash, "0x6", "the oldest ones are dropped");
}

#[tokio::test]
async fn transient_vote_failure_is_retried() {
    let h = harness();
    h.central.fail_next_vote("timeout");
    h.chain.push_item(MockItem::deposit(1, "0x1", "0xs", "0xr", 1));

    h.observer.observe_inbound().await.unwrap();

    assert_eq!(h.central.inbound_votes().len(), 1);
    assert_eq!(h.metrics.lock().await.inbound_vote_failures.get() as u64, 0);
}

#[tokio::test]
async fn scan_is_bounded_and_cursor_never_moves_back() {
    let config = InboundConfig {
        max_items_per_scan: 2,
        ..test_config()
    };
    let h = harness_with(&[], config);
    for p in 1..=5 {
        h.chain
            .push_item(MockItem::deposit(p, &format!("0x{p}"), "0xs", "0xr", 1));
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        h.observer.observe_inbound().await.unwrap();
        seen.push(position(&h).unwrap());
    }

    assert_eq!(seen, vec![2, 4, 5]);
    assert_eq!(h.central.inbound_votes().len(), 5);
    assert_eq!(h.store.get_target_position(CHAIN).unwrap(), Some(5));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn inbound_trackers_are_truncated_and_isolated() {
    let config = InboundConfig {
        max_trackers_per_scan: 2,
        ..test_config()
    };
    let h = harness_with(&[], config);
    for tx in ["0xa", "0xb", "0xc"] {
        h.central.push_inbound_tracker(InboundTracker {
            chain_id: CHAIN,
            tx_hash: tx.into(),
        });
        h.chain.set_tx_events(
            tx,
            vec![MockItem::deposit(50, tx, "0xs", "0xr", 7)],
        );
    }
    h.chain.fail_locate("0xa");

    h.observer.process_inbound_trackers().await.unwrap();

    let votes = h.central.inbound_votes();
    assert_eq!(votes.len(), 1, "0xa fails, 0xc is beyond the limit");
    assert_eq!(votes[0].inbound.source_tx_hash, "0xb");
    assert_eq!(position(&h), None, "trackers never touch the cursor");
}

#[tokio::test]
async fn outbound_trackers_are_voted_once_final() {
    let h = harness();
    for (nonce, tx) in [(3, "0xsuccess"), (4, "0xcancel"), (5, "0xpending")] {
        h.central.push_outbound_tracker(OutboundTracker {
            chain_id: CHAIN,
            nonce,
            tx_hashes: vec![TxHandle::from(tx)],
        });
    }
    h.chain.set_status("0xsuccess", TxStatus::Success);
    h.chain.set_status("0xcancel", TxStatus::Cancelled);
    h.chain.set_status("0xpending", TxStatus::Pending);

    h.observer.process_outbound_trackers().await.unwrap();

    let votes = h.central.outbound_votes();
    assert_eq!(votes.len(), 2);
    assert_eq!((votes[0].nonce, votes[0].success), (3, true));
    assert_eq!((votes[1].nonce, votes[1].success), (4, false));
    assert_eq!(
        h.cache.get(3).map(|t| t.state),
        Some(OutboundState::Confirmed)
    );
    assert!(h.cache.get(5).is_none());
    assert_eq!(h.metrics.lock().await.outbound_votes_posted.get() as u64, 2);
}

#[tokio::test]
async fn failed_outbound_tx_leaves_the_nonce_pending() {
    let h = harness();
    h.central.push_outbound_tracker(OutboundTracker {
        chain_id: CHAIN,
        nonce: 8,
        tx_hashes: vec!["0xfailed".into(), "0xok".into()],
    });
    h.chain.set_status("0xfailed", TxStatus::Failed("out of gas".into()));
    h.chain.set_status("0xok", TxStatus::Success);

    h.observer.process_outbound_trackers().await.unwrap();

    let votes = h.central.outbound_votes();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].tx, TxHandle::from("0xok"));
    assert!(votes[0].success);
}

#[tokio::test]
async fn cached_outcome_skips_the_status_query() {
    let h = harness();
    h.cache.put(TrackedOutbound::with_tx(
        9,
        "0x9".into(),
        OutboundState::Confirmed,
    ));
    h.central.push_outbound_tracker(OutboundTracker {
        chain_id: CHAIN,
        nonce: 9,
        tx_hashes: vec!["0x9".into()],
    });

    h.observer.process_outbound_trackers().await.unwrap();

    assert_eq!(h.chain.status_queries(), 0);
    assert_eq!(h.central.outbound_votes().len(), 1);
}

#[tokio::test]
async fn consumed_nonce_is_voted_from_cache_or_trackers() {
    let h = harness();
    h.cache.put(TrackedOutbound::with_tx(
        1,
        "0xcancel-1".into(),
        OutboundState::Failed { retryable: false },
    ));
    assert!(h.observer.vote_outbound_if_confirmed(1).await.unwrap());

    assert!(!h.observer.vote_outbound_if_confirmed(2).await.unwrap());

    h.central.push_outbound_tracker(OutboundTracker {
        chain_id: CHAIN,
        nonce: 2,
        tx_hashes: vec!["0x2".into()],
    });
    h.chain.set_status("0x2", TxStatus::Success);
    assert!(h.observer.vote_outbound_if_confirmed(2).await.unwrap());

    let votes = h.central.outbound_votes();
    assert_eq!(votes.len(), 2);
    assert!(!votes[0].success);
    assert_eq!(votes[0].tx, TxHandle::from("0xcancel-1"));
    assert!(votes[1].success);
}
