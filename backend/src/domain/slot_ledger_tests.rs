//! Tests for slot ledger operations.

use chrono::Utc;
use serde_json::Value;

use super::*;
use crate::domain::ports::store::{DocumentStore, collections};
use crate::domain::slot::{BookingDate, DEFAULT_SLOT_CAPACITY, SlotKey, TimeWindow};
use crate::outbound::memory::MemoryDocumentStore;

fn key(date: &str, window: TimeWindow) -> SlotKey {
    SlotKey::new(BookingDate::parse(date).expect("valid date"), window)
}

async fn booked_count(store: &MemoryDocumentStore, key: &SlotKey) -> Option<u32> {
    store
        .get(collections::SLOTS, &key.document_id())
        .await
        .expect("read slot")
        .and_then(|doc| doc.get("bookedCount").and_then(Value::as_u64))
        .map(|count| u32::try_from(count).expect("count fits u32"))
}

async fn seed_slot(store: &MemoryDocumentStore, key: SlotKey, capacity: u32, booked: u32) {
    let now = Utc::now();
    let mut slot = Slot::first_booking(key, capacity, now);
    slot.booked_count = booked;
    let mut tx = store.begin().await.expect("begin");
    tx.set(
        collections::SLOTS,
        &key.document_id(),
        encode_document(&slot).expect("encode slot"),
    );
    tx.commit().await.expect("seed commit");
}

#[tokio::test]
async fn reserve_creates_the_slot_lazily() {
    let store = MemoryDocumentStore::new();
    let slot_key = key("2025-06-01", TimeWindow::H09);

    let mut tx = store.begin().await.expect("begin");
    let reservation = reserve_unit(tx.as_mut(), &slot_key, DEFAULT_SLOT_CAPACITY, Utc::now())
        .await
        .expect("reserve");
    tx.commit().await.expect("commit");

    assert_eq!(reservation.booked_count, 1);
    assert_eq!(reservation.capacity, DEFAULT_SLOT_CAPACITY);
    assert_eq!(booked_count(&store, &slot_key).await, Some(1));
}

#[tokio::test]
async fn reserve_increments_an_existing_slot() {
    let store = MemoryDocumentStore::new();
    let slot_key = key("2025-06-01", TimeWindow::H10);
    seed_slot(&store, slot_key, 400, 10).await;

    let mut tx = store.begin().await.expect("begin");
    let reservation = reserve_unit(tx.as_mut(), &slot_key, DEFAULT_SLOT_CAPACITY, Utc::now())
        .await
        .expect("reserve");
    tx.commit().await.expect("commit");

    assert_eq!(reservation.booked_count, 11);
    assert_eq!(booked_count(&store, &slot_key).await, Some(11));
}

#[tokio::test]
async fn reserve_hard_fails_at_capacity() {
    let store = MemoryDocumentStore::new();
    let slot_key = key("2025-06-01", TimeWindow::H11);
    seed_slot(&store, slot_key, 3, 3).await;

    let mut tx = store.begin().await.expect("begin");
    let result = reserve_unit(tx.as_mut(), &slot_key, DEFAULT_SLOT_CAPACITY, Utc::now()).await;
    drop(tx);

    assert_eq!(
        result,
        Err(LedgerError::SlotFull {
            key: slot_key.document_id(),
            capacity: 3,
        })
    );
    assert_eq!(booked_count(&store, &slot_key).await, Some(3));
}

#[tokio::test]
async fn release_decrements_and_floors_at_zero() {
    let store = MemoryDocumentStore::new();
    let slot_key = key("2025-06-01", TimeWindow::H13);
    seed_slot(&store, slot_key, 400, 1).await;

    for expected in [0u32, 0] {
        let mut tx = store.begin().await.expect("begin");
        let outcome = release_unit(tx.as_mut(), &slot_key, Utc::now())
            .await
            .expect("release");
        tx.commit().await.expect("commit");
        assert_eq!(
            outcome,
            ReleaseOutcome::Released {
                booked_count: expected
            }
        );
    }
    assert_eq!(booked_count(&store, &slot_key).await, Some(0));
}

#[tokio::test]
async fn release_on_an_absent_slot_is_a_no_op() {
    let store = MemoryDocumentStore::new();
    let slot_key = key("2025-06-01", TimeWindow::H14);

    let mut tx = store.begin().await.expect("begin");
    let outcome = release_unit(tx.as_mut(), &slot_key, Utc::now())
        .await
        .expect("release");
    tx.commit().await.expect("commit");

    assert_eq!(outcome, ReleaseOutcome::SlotMissing);
    assert_eq!(booked_count(&store, &slot_key).await, None);
}

#[tokio::test]
async fn move_round_trip_restores_both_counts() {
    let store = MemoryDocumentStore::new();
    let a = key("2025-06-01", TimeWindow::H09);
    let b = key("2025-06-02", TimeWindow::H09);
    seed_slot(&store, a, 400, 7).await;
    seed_slot(&store, b, 400, 2).await;

    for (from, to) in [(a, b), (b, a)] {
        let mut tx = store.begin().await.expect("begin");
        move_unit(tx.as_mut(), &from, &to, DEFAULT_SLOT_CAPACITY, Utc::now())
            .await
            .expect("move");
        tx.commit().await.expect("commit");
    }

    assert_eq!(booked_count(&store, &a).await, Some(7));
    assert_eq!(booked_count(&store, &b).await, Some(2));
}

#[tokio::test]
async fn move_fails_when_the_source_is_missing() {
    let store = MemoryDocumentStore::new();
    let a = key("2025-06-01", TimeWindow::H09);
    let b = key("2025-06-02", TimeWindow::H09);

    let mut tx = store.begin().await.expect("begin");
    let result = move_unit(tx.as_mut(), &a, &b, DEFAULT_SLOT_CAPACITY, Utc::now()).await;
    drop(tx);

    assert_eq!(
        result,
        Err(LedgerError::SourceSlotMissing {
            key: a.document_id(),
        })
    );
    assert_eq!(booked_count(&store, &b).await, None);
}

#[tokio::test]
async fn move_into_a_full_slot_changes_nothing() {
    let store = MemoryDocumentStore::new();
    let a = key("2025-06-01", TimeWindow::H09);
    let b = key("2025-06-02", TimeWindow::H09);
    seed_slot(&store, a, 400, 1).await;
    seed_slot(&store, b, 400, 400).await;

    let mut tx = store.begin().await.expect("begin");
    let result = move_unit(tx.as_mut(), &a, &b, DEFAULT_SLOT_CAPACITY, Utc::now()).await;
    drop(tx);

    assert_eq!(
        result,
        Err(LedgerError::SlotFull {
            key: b.document_id(),
            capacity: 400,
        })
    );
    // No partial decrement on the source.
    assert_eq!(booked_count(&store, &a).await, Some(1));
    assert_eq!(booked_count(&store, &b).await, Some(400));
}

#[tokio::test]
async fn move_creates_the_destination_lazily() {
    let store = MemoryDocumentStore::new();
    let a = key("2025-06-01", TimeWindow::H09);
    let b = key("2025-06-02", TimeWindow::H09);
    seed_slot(&store, a, 400, 5).await;

    let mut tx = store.begin().await.expect("begin");
    let reservation = move_unit(tx.as_mut(), &a, &b, DEFAULT_SLOT_CAPACITY, Utc::now())
        .await
        .expect("move");
    tx.commit().await.expect("commit");

    assert_eq!(reservation.booked_count, 1);
    assert_eq!(booked_count(&store, &a).await, Some(4));
    assert_eq!(booked_count(&store, &b).await, Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_exceed_capacity() {
    let store = MemoryDocumentStore::new();
    let slot_key = key("2025-06-01", TimeWindow::H09);
    seed_slot(&store, slot_key, 5, 0).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let mut tx = store.begin().await.expect("begin");
                match reserve_unit(tx.as_mut(), &slot_key, DEFAULT_SLOT_CAPACITY, Utc::now()).await
                {
                    Ok(_) => {
                        if tx.commit().await.is_ok() {
                            return true;
                        }
                        // Lost the race; re-read and try again.
                    }
                    Err(LedgerError::SlotFull { .. }) => return false,
                    Err(err) => panic!("unexpected ledger error: {err}"),
                }
            }
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.expect("task") {
            successes += 1;
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(booked_count(&store, &slot_key).await, Some(5));
}
