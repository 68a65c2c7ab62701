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


use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use xrelay_chain_traits::mock::{
    MockCentralChain, MockChainObserver, MockChainSigner, MockItem,
    MOCK_PROTOCOL_VERSION,
};
use xrelay_config::RelayerConfig;
use xrelay_scheduler::TaskState;
use xrelay_store::SledStore;
use xrelay_tss::mock::MockSigningClient;
use xrelay_types::{CoinType, OutboundTracker, TxHandle, TxStatus};

use super::*;

/// Hands out one pair of mocks per chain id, and remembers them.
#[derive(Default)]
struct TestFactory {
    chains: Mutex<HashMap<ChainId, ChainClients<MockChainObserver, MockChainSigner>>>,
    connects: AtomicUsize,
}

impl TestFactory {
    fn clients(
        &self,
        chain_id: ChainId,
    ) -> ChainClients<MockChainObserver, MockChainSigner> {
        self.chains
            .lock()
            .entry(chain_id)
            .or_insert_with(|| ChainClients {
                observer: Arc::new(MockChainObserver::new(chain_id)),
                signer: Arc::new(MockChainSigner::new(chain_id)),
            })
            .clone()
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChainFactory for TestFactory {
    type Observer = MockChainObserver;
    type Signer = MockChainSigner;

    async fn connect(
        &self,
        config: &ChainConfig,
    ) -> Result<ChainClients<MockChainObserver, MockChainSigner>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.clients(config.chain_id))
    }
}

struct Harness {
    ctx: RelayerContext,
    central: Arc<MockCentralChain>,
    factory: Arc<TestFactory>,
    orchestrator: Orchestrator<TestFactory>,
}

impl Harness {
    fn new(config: RelayerConfig) -> Self {
        let ctx =
            RelayerContext::new(config, SledStore::temporary().unwrap())
                .unwrap();
        let central = Arc::new(MockCentralChain::default());
        let factory = Arc::new(TestFactory::default());
        let tss: Arc<dyn SigningClient> = Arc::new(MockSigningClient::default());
        let orchestrator = Orchestrator::new(
            ctx.clone(),
            central.clone(),
            factory.clone(),
            tss,
        );
        Self {
            ctx,
            central,
            factory,
            orchestrator,
        }
    }

    /// Waits until the block task of `chain_id` is subscribed.
    async fn wait_for_chain(&self, chain_id: i64) {
        let group = chain_group(ChainId(chain_id));
        let scheduler = self.orchestrator.scheduler().clone();
        eventually(move || {
            scheduler.task_state(&group, "schedule_outbound").is_some()
        })
        .await;
    }
}

/// `chains` lists `(chain id, outbound enabled)`.
fn config(chains: &[(i64, bool)]) -> RelayerConfig {
    let chains = chains
        .iter()
        .map(|(id, outbound)| {
            let chain = json!({
                "name": format!("chain{id}"),
                "chain-id": id,
                "rpc-endpoint": "http://localhost:9000",
                "inbound": { "polling-interval": 20 },
                "outbound": {
                    "enabled": outbound,
                    "polling-interval": 20,
                    "confirmation-poll-interval": 5,
                    "schedule-lookahead": 10,
                },
            });
            (id.to_string(), chain)
        })
        .collect::<serde_json::Map<_, _>>();
    serde_json::from_value(json!({
        "central": { "block-time": 50, "config-update-interval": 50 },
        "compliance": { "restricted-addresses": ["0xBAD"] },
        "chains": chains,
    }))
    .unwrap()
}

fn intent(chain_id: i64, nonce: u64) -> OutboundIntent {
    OutboundIntent {
        nonce,
        receiver_chain_id: ChainId(chain_id),
        receiver: String::from("0xreceiver"),
        amount: 500,
        coin_type: CoinType::Gas,
        asset: String::new(),
        gas_budget: 1_000,
        protocol_version: MOCK_PROTOCOL_VERSION,
        payload: None,
    }
}

async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn chain_groups_follow_the_configuration() {
    let h = Harness::new(config(&[(1, true), (2, true)]));
    h.orchestrator.start().unwrap();

    let scheduler = h.orchestrator.scheduler().clone();
    eventually(|| scheduler.groups() == ["chain-1", "chain-2", CORE_GROUP])
        .await;
    assert_eq!(h.factory.connects(), 2);

    h.ctx.set_config(config(&[(2, true), (3, true)]));
    eventually(|| scheduler.groups() == ["chain-2", "chain-3", CORE_GROUP])
        .await;
    // chain 2 kept running, only chain 3 was connected.
    assert_eq!(h.factory.connects(), 3);
    assert_eq!(
        scheduler.task_state("chain-1", "observe_inbound"),
        None,
        "removed chains are stopped"
    );

    h.orchestrator.stop();
    assert!(scheduler.groups().is_empty());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn pending_outbounds_are_dispatched_on_new_blocks() {
    let h = Harness::new(config(&[(1, true)]));
    h.central
        .set_pending(vec![intent(1, 0), intent(1, 1), intent(1, 2)]);
    h.orchestrator.start().unwrap();
    h.wait_for_chain(1).await;

    h.central.publish_block(10);
    let central = h.central.clone();
    eventually(move || central.posted_trackers().len() == 3).await;

    let mut nonces = h
        .central
        .posted_trackers()
        .into_iter()
        .map(|(chain_id, nonce, _)| {
            assert_eq!(chain_id, ChainId(1));
            nonce
        })
        .collect::<Vec<_>>();
    nonces.sort();
    assert_eq!(nonces, vec![0, 1, 2]);
    assert_eq!(h.factory.clients(ChainId(1)).signer.broadcasts().len(), 3);

    // the same intents on the next block are already settled.
    h.central.publish_block(11);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.central.posted_trackers().len(), 3);
    assert_eq!(h.factory.clients(ChainId(1)).signer.broadcasts().len(), 3);
    h.orchestrator.stop();
}

#[tokio::test]
#[tracing_test::traced_test]
async fn stale_blocks_are_not_scheduled() {
    let h = Harness::new(config(&[(1, true)]));
    h.central.set_pending(vec![intent(1, 0)]);
    h.orchestrator.start().unwrap();
    h.wait_for_chain(1).await;

    h.central.set_height(20);
    h.central.announce_block(10);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.central.pending_queries(), 0);
    assert!(logs_contain("Stale block"));

    h.central.announce_block(20);
    let central = h.central.clone();
    eventually(move || central.posted_trackers().len() == 1).await;
    assert_eq!(h.factory.clients(ChainId(1)).signer.broadcasts().len(), 1);
    h.orchestrator.stop();
}

#[tokio::test]
#[tracing_test::traced_test]
async fn consumed_nonces_are_voted_on_not_broadcast() {
    let h = Harness::new(config(&[(1, true)]));
    let clients = h.factory.clients(ChainId(1));
    clients.signer.set_next_nonce(5);
    clients
        .observer
        .set_status("0xconsumed", TxStatus::Success);
    h.central.push_outbound_tracker(OutboundTracker {
        chain_id: ChainId(1),
        nonce: 3,
        tx_hashes: vec![TxHandle::from("0xconsumed")],
    });
    h.central.set_pending(vec![intent(1, 3)]);
    h.orchestrator.start().unwrap();
    h.wait_for_chain(1).await;

    h.central.publish_block(10);
    let central = h.central.clone();
    eventually(move || {
        central.outbound_votes().iter().any(|v| v.nonce == 3 && v.success)
    })
    .await;
    let central = h.central.clone();
    eventually(move || central.pending_queries() >= 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(clients.signer.broadcasts().is_empty());
    h.orchestrator.stop();
}

#[tokio::test]
#[tracing_test::traced_test]
async fn deposits_are_voted_and_restricted_senders_skipped() {
    let h = Harness::new(config(&[(1, false)]));
    let clients = h.factory.clients(ChainId(1));
    clients
        .observer
        .push_item(MockItem::deposit(1, "0xaa", "0xalice", "0xbob", 10));
    clients
        .observer
        .push_item(MockItem::deposit(2, "0xbb", "0xbad", "0xbob", 20));
    h.orchestrator.start().unwrap();

    let central = h.central.clone();
    eventually(move || central.inbound_votes().len() == 1).await;
    let store = h.ctx.store().clone();
    eventually(move || {
        xrelay_store::CursorStore::get_cursor(&store, ChainId(1))
            .unwrap()
            .map(|c| c.position)
            == Some(2)
    })
    .await;
    assert_eq!(h.central.inbound_votes()[0].inbound.source_tx_hash, "0xaa");
    h.orchestrator.stop();
}

#[tokio::test]
#[tracing_test::traced_test]
async fn disabled_outbound_never_lists_pending_intents() {
    let h = Harness::new(config(&[(1, false)]));
    h.central.set_pending(vec![intent(1, 0)]);
    h.orchestrator.start().unwrap();
    h.wait_for_chain(1).await;

    h.central.publish_block(10);
    h.central.publish_block(11);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.central.pending_queries(), 0);
    assert!(h.factory.clients(ChainId(1)).signer.broadcasts().is_empty());
    assert_eq!(
        h.orchestrator
            .scheduler()
            .task_state("chain-1", "schedule_outbound"),
        Some(TaskState::Idle)
    );
    h.orchestrator.stop();
}

#[tokio::test]
#[tracing_test::traced_test]
async fn configuration_directory_is_reloaded() {
    const CENTRAL: &str = "[central]\nblock-time = 50\nconfig-update-interval = 50\n";
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.toml");
    std::fs::write(&main, CENTRAL).unwrap();
    let h = Harness::new(config(&[]));
    let orchestrator = h.orchestrator.clone().with_config_dir(dir.path());
    orchestrator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(orchestrator.scheduler().groups(), [CORE_GROUP]);

    let late = r#"
[chains.late]
name = "late"
chain-id = 9
rpc-endpoint = "http://localhost:9000"
"#;
    std::fs::write(&main, format!("{CENTRAL}{late}")).unwrap();
    let scheduler = orchestrator.scheduler().clone();
    eventually(|| scheduler.has_group("chain-9")).await;
    assert_eq!(h.ctx.config().chain(ChainId(9)).unwrap().name, "late");
    orchestrator.stop();
}

#[tokio::test]
async fn shutdown_signal_stops_the_scheduler() {
    let h = Harness::new(config(&[(1, true)]));
    h.orchestrator.start().unwrap();
    h.wait_for_chain(1).await;

    h.ctx.shutdown();
    let scheduler = h.orchestrator.scheduler().clone();
    eventually(move || scheduler.groups().is_empty()).await;
}

#[test]
fn intents_are_bounded_by_the_lookahead() {
    let chain = ChainId(1);
    assert!(check_intent(chain, &intent(1, 10), 10, 30).is_ok());
    assert!(check_intent(chain, &intent(1, 43), 10, 30).is_ok());
    assert!(matches!(
        check_intent(chain, &intent(1, 44), 10, 30),
        Err(Error::NonceTooHigh {
            nonce: 44,
            earliest: 10
        })
    ));
    assert!(matches!(
        check_intent(chain, &intent(2, 10), 10, 30),
        Err(Error::ChainIdMismatch {
            expected: 1,
            got: 2
        })
    ));
}

#[test]
fn group_names_round_trip_chain_ids() {
    assert_eq!(chain_group(ChainId(-4)), "chain--4");
    assert_eq!(group_chain_id("chain--4"), Some(ChainId(-4)));
    assert_eq!(group_chain_id(CORE_GROUP), None);
    assert_eq!(group_chain_id("chain-x"), None);
}
