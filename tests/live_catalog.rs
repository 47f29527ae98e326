#![cfg(feature = "live-tests")]

//! Change detection against the real catalog API
//!
//! Gated behind the `live-tests` feature flag. Requires network access.
//!
//! ```bash
//! cargo test --features live-tests --test live_catalog -- --nocapture
//! ```

mod common;

use catalog_mirror::CatalogMirror;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn live_index_fetch_and_fingerprint_are_stable() {
    let (config, _temp_dir) = common::offline_config();
    let mirror = CatalogMirror::new(config).await.unwrap();

    let first = mirror
        .check_for_update(false)
        .await
        .expect("remote index should be reachable");
    assert!(first.changed, "first check on an empty store is a change");
    assert!(first.key_count > 0);

    let second = mirror.check_for_update(false).await.unwrap();
    println!(
        "fingerprint {} ({} keys), changed on recheck: {}",
        second.fingerprint, second.key_count, second.changed
    );
}

#[tokio::test]
#[serial]
async fn live_full_run_succeeds() {
    let (config, _temp_dir) = common::offline_config();
    let mirror = CatalogMirror::new(config).await.unwrap();

    let change = mirror.check_for_update(false).await.unwrap();
    let report = mirror.run_full(false).await;
    println!(
        "keys: {}, items: {:?}",
        change.key_count,
        report.listings.as_ref().map(|l| l.items_found)
    );
    assert!(report.success, "{:?}", report.error);
}
