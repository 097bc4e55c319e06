//! Concurrency properties of the submission tracker.

use std::sync::{Arc, Barrier};

use color_eyre::Result;
use pretty_assertions::assert_eq as pretty_assert_eq;
use resubmit::{Admission, SubmissionState, SubmissionTracker};
use simple_test_case::test_case;

use crate::{TTL, fingerprint};

fn count_admitted(verdicts: &[Admission]) -> usize {
    verdicts
        .iter()
        .filter(|verdict| matches!(verdict, Admission::Admitted(_)))
        .count()
}

#[test_case(2; "pair")]
#[test_case(10; "ten")]
#[test_case(100; "hundred")]
#[test_case(1000; "thousand")]
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 8))]
async fn exactly_one_concurrent_task_is_admitted(contenders: usize) -> Result<()> {
    let tracker = Arc::new(SubmissionTracker::new());
    let barrier = Arc::new(tokio::sync::Barrier::new(contenders));
    let fp = fingerprint("double click");

    let tasks = (0..contenders)
        .map(|_| {
            let tracker = tracker.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                tracker.try_admit(fp, TTL)
            })
        })
        .collect::<Vec<_>>();
    let verdicts = futures::future::try_join_all(tasks).await?;

    pretty_assert_eq!(count_admitted(&verdicts), 1);
    pretty_assert_eq!(verdicts.len() - count_admitted(&verdicts), contenders - 1);
    pretty_assert_eq!(tracker.state(&fp), Some(SubmissionState::InFlight));
    Ok(())
}

#[test_log::test]
fn exactly_one_os_thread_is_admitted() {
    const THREADS: usize = 64;
    const ROUNDS: usize = 20;

    for round in 0..ROUNDS {
        let tracker = SubmissionTracker::new();
        let barrier = Barrier::new(THREADS);
        let fp = fingerprint(&format!("round {round}"));

        let verdicts = std::thread::scope(|scope| {
            let handles = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        tracker.try_admit(fp, TTL)
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread does not panic"))
                .collect::<Vec<_>>()
        });

        pretty_assert_eq!(count_admitted(&verdicts), 1, "round {round}");
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 8))]
async fn distinct_fingerprints_do_not_contend() -> Result<()> {
    let tracker = Arc::new(SubmissionTracker::new());
    let tasks = (0..500)
        .map(|i| {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.try_admit(fingerprint(&format!("order {i}")), TTL) })
        })
        .collect::<Vec<_>>();
    let verdicts = futures::future::try_join_all(tasks).await?;

    pretty_assert_eq!(count_admitted(&verdicts), 500);
    pretty_assert_eq!(tracker.len(), 500);
    Ok(())
}
