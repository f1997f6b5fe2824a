// tests/property/ring_test.rs

//! Ring-ordering consistency and `updateServerList` idempotence
//! (spec.md §8 properties 3 and 7). Pure state manipulation, no network
//! or runtime needed since `ReplicaState::update_ring` is synchronous.

use proptest::prelude::*;
use scriptorium::core::replica::{DocumentStore, ReplicaState};
use std::sync::Arc;

fn new_replica(address: &str, master_addr: &str) -> Arc<ReplicaState> {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path().join("docs.json")).unwrap();
    ReplicaState::new(address.to_string(), master_addr.to_string(), reqwest::Client::new(), store)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

    /// Every replica that applies the same membership broadcast computes
    /// a successor that is simply the next address in the list, wrapping
    /// around — i.e. all replicas agree on one ring, differing only in
    /// where they sit on it.
    #[test]
    fn successor_is_the_next_address_for_every_position(ports in prop::collection::btree_set(1u16..65000, 2..8)) {
        let list: Vec<String> = ports.into_iter().map(|p| format!("127.0.0.1:{p}")).collect();

        for (i, address) in list.iter().enumerate() {
            let replica = new_replica(address, "127.0.0.1:9000");
            replica.update_ring(list.clone());
            let expected = list[(i + 1) % list.len()].clone();
            assert_eq!(replica.current_successor(), Some(expected));
        }
    }

    /// Applying the same membership list twice leaves the ring and the
    /// computed successor unchanged.
    #[test]
    fn update_server_list_is_idempotent(ports in prop::collection::btree_set(1u16..65000, 1..8)) {
        let list: Vec<String> = ports.into_iter().map(|p| format!("127.0.0.1:{p}")).collect();
        let replica = new_replica(&list[0], "127.0.0.1:9000");

        replica.update_ring(list.clone());
        let first_successor = replica.current_successor();
        let first_size = replica.ring_size();

        replica.update_ring(list.clone());
        assert_eq!(replica.current_successor(), first_successor);
        assert_eq!(replica.ring_size(), first_size);
    }
}
