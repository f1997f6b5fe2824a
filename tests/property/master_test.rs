// tests/property/master_test.rs

//! `replicaCrashed` idempotence (spec.md §8 property 6). Each case needs
//! one async call into `MasterState`, so it uses `tokio_test::block_on`
//! rather than the teacher's manually-built `tokio::runtime::Runtime`
//! (`examples/spineldb-spineldb/tests/property/consistency_test.rs`) —
//! equivalent effect, one line instead of three.

use proptest::prelude::*;
use scriptorium::core::master::MasterState;

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, ..ProptestConfig::default() })]

    #[test]
    fn replica_crashed_is_idempotent(port in 1u16..65000) {
        tokio_test::block_on(async {
            let state = MasterState::new(reqwest::Client::new());
            state.join("127.0.0.1".to_string(), port.to_string()).await.unwrap();
            let address = format!("127.0.0.1:{port}");
            assert_eq!(state.membership_size(), 1);

            state.replica_crashed(&address).await;
            assert_eq!(state.membership_size(), 0);

            // reporting the same crash again must be a no-op, not a panic
            // or a further change to membership.
            state.replica_crashed(&address).await;
            assert_eq!(state.membership_size(), 0);
        });
    }
}
