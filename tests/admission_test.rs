use std::sync::Arc;
use std::time::Duration;

use heimdall::{AdmissionController, ConcurrencyConfig, EndpointClass, HeimdallError, TimeoutConfig};
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};

fn controller(query: usize, global: usize) -> AdmissionController {
    AdmissionController::new(
        ConcurrencyConfig {
            global,
            query,
            ..ConcurrencyConfig::default()
        },
        TimeoutConfig::default(),
    )
}

#[test]
fn third_concurrent_request_is_rejected_at_capacity_two() {
    let admission = controller(2, 20);
    let first = assert_ok!(admission.admit("/query", EndpointClass::Query));
    let _second = assert_ok!(admission.admit("/query", EndpointClass::Query));

    let err = assert_err!(admission.admit("/query", EndpointClass::Query));
    assert!(matches!(
        err,
        HeimdallError::TooManyConcurrentRequests { ref route, limit: 2 } if route == "/query"
    ));
    assert_eq!(err.code(), "too_many_concurrent_requests");
    assert_eq!(admission.in_flight("/query"), 2);

    drop(first);
    assert_eq!(admission.in_flight("/query"), 1);
    assert_ok!(admission.admit("/query", EndpointClass::Query));
}

#[test]
fn routes_have_separate_pools() {
    let admission = controller(1, 20);
    let _a = assert_ok!(admission.admit("/query", EndpointClass::Query));
    let _b = assert_ok!(admission.admit("/query/stream", EndpointClass::Query));
    assert_err!(admission.admit("/query", EndpointClass::Query));
}

#[test]
fn global_cap_applies_across_routes() {
    let admission = controller(5, 2);
    let _a = assert_ok!(admission.admit("/query", EndpointClass::Query));
    let _b = assert_ok!(admission.admit("/health", EndpointClass::Health));
    let err = assert_err!(admission.admit("/documents", EndpointClass::Default));
    assert!(matches!(err, HeimdallError::TooManyConcurrentRequests { limit: 2, .. }));
    assert_eq!(admission.in_flight_total(), 2);

    // the rejected route did not keep its route permit
    assert_eq!(admission.in_flight("/documents"), 0);
}

#[test]
fn cheap_routes_get_more_capacity() {
    let admission = AdmissionController::new(ConcurrencyConfig::default(), TimeoutConfig::default());
    let leases: Vec<_> = (0..10)
        .map(|_| admission.admit("/health", EndpointClass::Health))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(leases.len(), 10);
    assert_err!(admission.admit("/health", EndpointClass::Health));

    let ingest: Vec<_> = (0..3)
        .map(|_| admission.admit("/ingest", EndpointClass::Ingest))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ingest.len(), 3);
    assert_err!(admission.admit("/ingest", EndpointClass::Ingest));
}

#[tokio::test]
async fn run_releases_permit_after_success_and_failure() {
    let admission = controller(1, 20);

    let ok = admission
        .run("/query", EndpointClass::Query, async { Ok(42) })
        .await;
    assert_eq!(ok.unwrap(), 42);
    assert_eq!(admission.in_flight("/query"), 0);

    let failed: heimdall::Result<()> = admission
        .run("/query", EndpointClass::Query, async {
            Err(HeimdallError::Internal("handler failed".into()))
        })
        .await;
    assert!(failed.is_err());
    assert_eq!(admission.in_flight("/query"), 0);
}

#[tokio::test]
async fn permit_released_when_handler_panics() {
    let admission = Arc::new(controller(1, 20));

    let task = {
        let admission = Arc::clone(&admission);
        tokio::spawn(async move {
            admission
                .run("/query", EndpointClass::Query, async {
                    if true {
                        panic!("handler blew up");
                    }
                    Ok(())
                })
                .await
        })
    };
    assert!(task.await.unwrap_err().is_panic());

    assert_eq!(admission.in_flight("/query"), 0);
    assert_ok!(admission.admit("/query", EndpointClass::Query));
}

#[tokio::test]
async fn concurrent_requests_see_rejection_while_slot_held() {
    let admission = Arc::new(controller(1, 20));
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let holder = {
        let admission = Arc::clone(&admission);
        tokio::spawn(async move {
            admission
                .run("/query", EndpointClass::Query, async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok(())
                })
                .await
        })
    };

    started_rx.await.unwrap();
    let rejected = admission
        .run("/query", EndpointClass::Query, async { Ok(()) })
        .await;
    assert!(matches!(
        rejected,
        Err(HeimdallError::TooManyConcurrentRequests { .. })
    ));

    release_tx.send(()).unwrap();
    holder.await.unwrap().unwrap();
    assert_eq!(admission.in_flight("/query"), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_handler_times_out_and_releases() {
    let admission = AdmissionController::new(
        ConcurrencyConfig::default(),
        TimeoutConfig::uniform(Duration::from_secs(2)),
    );

    let result: heimdall::Result<()> = admission
        .run("/query", EndpointClass::Query, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, HeimdallError::RequestTimeout { after } if after == Duration::from_secs(2)));
    assert_eq!(err.status_code(), 408);
    assert_eq!(admission.in_flight("/query"), 0);
}

#[tokio::test(start_paused = true)]
async fn class_ceilings_differ() {
    let admission = AdmissionController::new(ConcurrencyConfig::default(), TimeoutConfig::default());

    // 40s is past the query ceiling (25s) but within the ingest one (60s)
    let query: heimdall::Result<()> = admission
        .with_deadline(EndpointClass::Query, async {
            tokio::time::sleep(Duration::from_secs(40)).await;
            Ok(())
        })
        .await;
    assert!(matches!(query, Err(HeimdallError::RequestTimeout { .. })));

    let ingest: heimdall::Result<()> = admission
        .with_deadline(EndpointClass::Ingest, async {
            tokio::time::sleep(Duration::from_secs(40)).await;
            Ok(())
        })
        .await;
    assert!(ingest.is_ok());
}

#[tokio::test(start_paused = true)]
async fn fast_handler_is_not_timed_out() {
    let admission = AdmissionController::new(
        ConcurrencyConfig::default(),
        TimeoutConfig::uniform(Duration::from_secs(2)),
    );
    let result = admission
        .with_deadline(EndpointClass::Default, async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok("done")
        })
        .await;
    assert_eq!(result.unwrap(), "done");
}
