//! Racing transitions against the in-memory store

use chrono::Utc;
use futures::future::join_all;
use ringline_core::models::{CallRequest, CallRequestStatus, CallTransition, Session};
use ringline_core::traits::{CallRequestRepository, Repository, SessionRepository};
use ringline_db::MemoryStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

async fn seed(store: &MemoryStore) -> CallRequest {
    let call = CallRequest {
        caller_id: Uuid::new_v4(),
        broadcaster_id: Uuid::new_v4(),
        total_price: dec!(21.00),
        duration_minutes: 30,
        caller_name: "Casey".to_string(),
        ..Default::default()
    };
    Repository::<CallRequest, Uuid>::create(store, &call)
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_transition_wins() {
    for _ in 0..50 {
        let store = Arc::new(MemoryStore::new());
        let call = seed(&store).await;

        let attempts = [
            CallTransition::Accept,
            CallTransition::Reject,
            CallTransition::Ban,
            CallTransition::Cancel,
            CallTransition::Accept,
        ];

        let handles = attempts.into_iter().map(|transition| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .transition_if_ringing(call.id, transition, Utc::now())
                    .await
            })
        });

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.is_stale()));

        let stored = Repository::<CallRequest, Uuid>::find_by_id(store.as_ref(), call.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, winners[0].status);
        assert_ne!(stored.status, CallRequestStatus::Ringing);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_session_creation_yields_one_session() {
    let store = Arc::new(MemoryStore::new());
    let call = seed(&store).await;
    let accepted = store
        .transition_if_ringing(call.id, CallTransition::Accept, Utc::now())
        .await
        .unwrap();

    let handles = (0..8).map(|_| {
        let store = Arc::clone(&store);
        let accepted = accepted.clone();
        tokio::spawn(async move {
            store
                .create_for_call_request(&Session::from_call_request(&accepted, dec!(14.70)))
                .await
        })
    });

    let ids: Vec<Uuid> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.all_sessions().len(), 1);
}
