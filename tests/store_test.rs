//! Telemetry store tests against an in-memory SQLite database.

use helios::error::HeliosError;
use helios::store::{
    NewChargeStatus, RuntimeConfig, RuntimeConfigHandle, TelemetryStore,
};

async fn memory_store() -> TelemetryStore {
    TelemetryStore::connect("sqlite::memory:")
        .await
        .expect("in-memory store")
}

fn seed() -> RuntimeConfig {
    RuntimeConfig {
        enabled: true,
        max_grid_draw_watts: 0.0,
    }
}

#[tokio::test]
async fn empty_store_has_no_status_and_zero_amps() {
    let store = memory_store().await;
    assert!(store.latest_charge_status().await.unwrap().is_none());
    assert_eq!(store.latest_charging_amps().await.unwrap(), 0);
    assert!(store.average_surplus(5).await.unwrap().is_none());
}

#[tokio::test]
async fn latest_status_follows_insertion_order() {
    let store = memory_store().await;
    store
        .append_charge_status(&NewChargeStatus {
            charging_amps: 6,
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .append_charge_status(&NewChargeStatus {
            charging_amps: 9,
            latitude: Some(52.09),
            longitude: Some(5.12),
            battery_level: Some(71),
        })
        .await
        .unwrap();

    let latest = store.latest_charge_status().await.unwrap().unwrap();
    assert_eq!(latest.charging_amps, 9);
    assert_eq!(latest.battery_level, Some(71));
    assert_eq!(store.latest_charging_amps().await.unwrap(), 9);
}

#[tokio::test]
async fn average_surplus_covers_the_trailing_window() {
    let store = memory_store().await;
    store.append_energy_balance(3000.0, -1000.0, 1000.0).await.unwrap();
    store.append_energy_balance(3000.0, -2000.0, 2000.0).await.unwrap();
    store.append_energy_balance(3000.0, -3000.0, 3000.0).await.unwrap();

    let avg = store.average_surplus(5).await.unwrap().unwrap();
    assert!((avg - 2000.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn runtime_config_row_is_seeded_once() {
    let store = memory_store().await;
    assert!(store.load_runtime_config().await.unwrap().is_none());

    let handle = RuntimeConfigHandle::load_or_seed(store.clone(), seed())
        .await
        .unwrap();
    assert_eq!(handle.get().await, seed());
    assert_eq!(store.load_runtime_config().await.unwrap(), Some(seed()));

    // A second handle over the same store reads the row, not the seed.
    let other_seed = RuntimeConfig {
        enabled: false,
        max_grid_draw_watts: 999.0,
    };
    let second = RuntimeConfigHandle::load_or_seed(store.clone(), other_seed)
        .await
        .unwrap();
    assert_eq!(second.get().await, seed());
}

#[tokio::test]
async fn updates_persist_through_the_row() {
    let store = memory_store().await;
    let handle = RuntimeConfigHandle::load_or_seed(store.clone(), seed())
        .await
        .unwrap();

    handle.update("enabled", "off").await.unwrap();
    handle.update("max_grid_draw_watts", "250.5").await.unwrap();

    let persisted = store.load_runtime_config().await.unwrap().unwrap();
    assert!(!persisted.enabled);
    assert!((persisted.max_grid_draw_watts - 250.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn invalid_updates_change_nothing() {
    let store = memory_store().await;
    let handle = RuntimeConfigHandle::load_or_seed(store.clone(), seed())
        .await
        .unwrap();

    let err = handle.update("enabled", "maybe").await.unwrap_err();
    assert!(matches!(err, HeliosError::Validation { .. }));
    let err = handle.update("max_grid_draw_watts", "lots").await.unwrap_err();
    assert!(matches!(err, HeliosError::Validation { .. }));
    let err = handle.update("tick_interval_secs", "5").await.unwrap_err();
    assert!(matches!(err, HeliosError::Validation { .. }));

    assert_eq!(handle.get().await, seed());
    assert_eq!(store.load_runtime_config().await.unwrap(), Some(seed()));
}

#[tokio::test]
async fn failed_trip_write_leaves_memory_unchanged() {
    let store = memory_store().await;
    let handle = RuntimeConfigHandle::load_or_seed(store.clone(), seed())
        .await
        .unwrap();

    store.close().await;

    assert!(handle.set_enabled(false).await.is_err());
    // The in-memory value only changes once the row write succeeds.
    assert!(handle.get().await.enabled);
}

#[tokio::test]
async fn safety_trip_flips_and_persists_enabled() {
    let store = memory_store().await;
    let handle = RuntimeConfigHandle::load_or_seed(store.clone(), seed())
        .await
        .unwrap();

    handle.set_enabled(false).await.unwrap();

    assert!(!handle.get().await.enabled);
    assert!(!store.load_runtime_config().await.unwrap().unwrap().enabled);
}

#[tokio::test]
async fn entries_render_the_operator_view() {
    let store = memory_store().await;
    let handle = RuntimeConfigHandle::load_or_seed(store.clone(), seed())
        .await
        .unwrap();
    handle.update("max_grid_draw_watts", "300").await.unwrap();

    let entries = handle.entries().await;
    assert!(entries.contains(&("enabled".to_string(), "ON".to_string())));
    assert!(entries.contains(&("max_grid_draw_watts".to_string(), "300".to_string())));
}
