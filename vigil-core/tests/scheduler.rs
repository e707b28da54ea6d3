//! Scheduler Tests
//!
//! Ordering, de-duplication, recursion and failure behaviour of the flush
//! loop, exercised through the public API only.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;

use vigil_core::scheduler::{Job, JobRef, PostJobs, Scheduler, TokioDriver};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recorder(log: &Log, name: &'static str) -> Job {
    let log = log.clone();
    Job::new(move || log.lock().push(name))
}

/// A job that needs a reference to itself, filled in after construction.
fn self_ref() -> Arc<OnceLock<JobRef>> {
    Arc::new(OnceLock::new())
}

/// Enqueueing the same job twice before a flush runs it once.
#[test]
fn duplicate_enqueue_runs_once() {
    let scheduler = Scheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let job = Job::new({
        let runs = runs.clone();
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
        }
    })
    .into_ref();

    scheduler.enqueue(&job);
    scheduler.enqueue(&job);
    scheduler.flush();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Jobs without ids run in enqueue order.
#[test]
fn jobs_run_fifo() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    for name in ["a", "b", "c"] {
        scheduler.enqueue(&recorder(&log, name).into_ref());
    }
    scheduler.flush();

    assert_eq!(*log.lock(), vec!["a", "b", "c"]);
}

/// Jobs with ids run in id order, ahead of jobs without one.
#[test]
fn ids_order_the_main_queue() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    scheduler.enqueue(&recorder(&log, "plain").into_ref());
    scheduler.enqueue(&recorder(&log, "third").with_id(3).into_ref());
    scheduler.enqueue(&recorder(&log, "first").with_id(1).into_ref());
    scheduler.enqueue(&recorder(&log, "second").with_id(2).into_ref());
    scheduler.flush();

    assert_eq!(*log.lock(), vec!["first", "second", "third", "plain"]);
}

/// Post jobs run after every main job, including ones a main job added.
#[test]
fn post_runs_after_transitive_main_jobs() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let late = recorder(&log, "late main").into_ref();

    scheduler.enqueue_post(recorder(&log, "post").into_ref());
    scheduler.enqueue(
        &Job::new({
            let scheduler = scheduler.clone();
            let log = log.clone();
            let late = late.clone();
            move || {
                log.lock().push("main");
                scheduler.enqueue(&late);
            }
        })
        .into_ref(),
    );
    scheduler.flush();

    assert_eq!(*log.lock(), vec!["main", "late main", "post"]);
}

/// X, Y on the main queue and Z on the post queue run as X, Y, Z. When Y
/// re-queues X and X allows recursion, X runs again before Z.
#[test]
fn recursive_job_runs_again_before_post() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let x = recorder(&log, "X").allow_recurse(true).into_ref();
    let y = Job::new({
        let scheduler = scheduler.clone();
        let log = log.clone();
        let x = x.clone();
        move || {
            log.lock().push("Y");
            scheduler.enqueue(&x);
        }
    })
    .into_ref();
    let z = recorder(&log, "Z").into_ref();

    scheduler.enqueue(&x);
    scheduler.enqueue(&y);
    scheduler.enqueue_post(z);
    scheduler.flush();

    assert_eq!(*log.lock(), vec!["X", "Y", "X", "Z"]);
}

/// A self-queueing job with `allow_recurse` runs 100 times in one flush,
/// then is skipped instead of hanging.
#[test]
fn self_recursion_stops_at_the_ceiling() {
    let scheduler = Scheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let slot = self_ref();

    let job = Job::new({
        let scheduler = scheduler.clone();
        let runs = runs.clone();
        let slot = slot.clone();
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = slot.get() {
                scheduler.enqueue(me);
            }
        }
    })
    .allow_recurse(true)
    .into_ref();
    slot.set(job.clone()).unwrap();

    scheduler.enqueue(&job);
    let stats = scheduler.flush();

    assert_eq!(runs.load(Ordering::SeqCst), 100);
    assert_eq!(stats.jobs_run, 100);
    assert_eq!(stats.skipped, 1);
    assert!(!job.is_queued());
    assert!(!scheduler.has_pending());

    // The next flush starts counting from zero.
    scheduler.enqueue(&job);
    scheduler.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 200);
}

/// Without `allow_recurse`, a job that queues itself waits for the next
/// flush.
#[test]
fn self_recursion_disallowed_defers_to_next_flush() {
    let scheduler = Scheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let requeue = Arc::new(AtomicUsize::new(1));
    let slot = self_ref();

    let job = Job::new({
        let scheduler = scheduler.clone();
        let runs = runs.clone();
        let requeue = requeue.clone();
        let slot = slot.clone();
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            if requeue.swap(0, Ordering::SeqCst) == 1 {
                if let Some(me) = slot.get() {
                    scheduler.enqueue(me);
                }
            }
        }
    })
    .into_ref();
    slot.set(job.clone()).unwrap();

    scheduler.enqueue(&job);
    scheduler.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!job.is_queued());

    // Re-queued from outside the job: runs in the next flush.
    scheduler.enqueue(&job);
    scheduler.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A post job that queues another post job gets it run in the same flush.
#[test]
fn post_job_queued_during_post_drain_runs_same_flush() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let second = recorder(&log, "second").into_ref();

    scheduler.enqueue_post(
        Job::new({
            let scheduler = scheduler.clone();
            let log = log.clone();
            let second = second.clone();
            move || {
                log.lock().push("first");
                scheduler.enqueue_post(second.clone());
            }
        })
        .into_ref(),
    );
    let stats = scheduler.flush();

    assert_eq!(*log.lock(), vec!["first", "second"]);
    assert_eq!(stats.post_jobs_run, 2);
    assert!(!scheduler.has_pending());
}

/// A post job can queue main work; the flush loops until both queues are
/// empty.
#[test]
fn post_job_can_requeue_main_work() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let main = recorder(&log, "main").into_ref();

    scheduler.enqueue_post(
        Job::new({
            let scheduler = scheduler.clone();
            let log = log.clone();
            let main = main.clone();
            move || {
                log.lock().push("post");
                scheduler.enqueue(&main);
            }
        })
        .into_ref(),
    );
    let stats = scheduler.flush();

    assert_eq!(*log.lock(), vec!["post", "main"]);
    assert_eq!(stats.passes, 2);
}

/// A follow-up job jumps ahead of the rest of the running post batch.
#[test]
fn follow_up_runs_right_after_current_post_job() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let urgent = Job::follow_up({
        let log = log.clone();
        move || log.lock().push("urgent")
    })
    .into_ref();

    let a = Job::new({
        let scheduler = scheduler.clone();
        let log = log.clone();
        let urgent = urgent.clone();
        move || {
            log.lock().push("a");
            scheduler.enqueue_post(urgent.clone());
        }
    })
    .into_ref();
    let b = recorder(&log, "b").into_ref();

    scheduler.enqueue_post(PostJobs::Batch(vec![a, b]));
    scheduler.flush();

    assert_eq!(*log.lock(), vec!["a", "urgent", "b"]);
}

/// Batches skip the enqueue-time check but are de-duplicated at drain time.
#[test]
fn post_batch_is_deduplicated() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let a = recorder(&log, "a").into_ref();
    let b = recorder(&log, "b").into_ref();

    scheduler.enqueue_post(vec![a.clone(), b, a]);
    scheduler.flush();

    assert_eq!(*log.lock(), vec!["a", "b"]);
}

/// With nothing pending, the next tick is already resolved. With a job
/// pending, it resolves only once the job ran.
#[test]
fn next_tick_settles_after_flush() {
    let scheduler = Scheduler::new();
    assert_eq!(scheduler.next_tick().now_or_never(), Some(()));

    let runs = Arc::new(AtomicUsize::new(0));
    scheduler.enqueue(
        &Job::new({
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }
        })
        .into_ref(),
    );

    let tick = scheduler.next_tick_then({
        let runs = runs.clone();
        move || runs.load(Ordering::SeqCst)
    });
    let mut tick = Box::pin(tick);
    assert_eq!(tick.as_mut().now_or_never(), None);

    scheduler.flush();
    assert_eq!(tick.now_or_never(), Some(1));
}

/// A panicking job propagates out of `flush`, but the scheduler is left
/// clean: flags cleared, post work done, ticket settled.
#[test]
fn panicking_job_does_not_wedge_the_scheduler() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let boom = Job::new(|| panic!("job failed")).into_ref();
    let after = recorder(&log, "after").into_ref();
    let post = recorder(&log, "post").into_ref();

    scheduler.enqueue(&boom);
    scheduler.enqueue(&after);
    scheduler.enqueue_post(post);
    let tick = scheduler.next_tick();

    let result = panic::catch_unwind(AssertUnwindSafe(|| scheduler.flush()));
    assert!(result.is_err());

    assert_eq!(*log.lock(), vec!["post"]);
    assert!(!boom.is_queued());
    assert!(!after.is_queued());
    assert!(!scheduler.has_pending());
    assert!(!scheduler.is_flushing());
    assert!(tick.is_ready());

    // Usable again afterwards.
    scheduler.enqueue(&after);
    scheduler.flush();
    assert_eq!(*log.lock(), vec!["post", "after"]);
}

/// A panicking post job still releases the active list.
#[test]
fn panicking_post_job_releases_the_batch() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let boom = Job::new(|| panic!("post failed")).into_ref();
    let rest = recorder(&log, "rest").into_ref();
    scheduler.enqueue_post(boom);
    scheduler.enqueue_post(rest.clone());

    let result = panic::catch_unwind(AssertUnwindSafe(|| scheduler.flush()));
    assert!(result.is_err());
    assert!(log.lock().is_empty());
    assert!(!rest.is_queued());

    scheduler.enqueue_post(rest);
    scheduler.flush();
    assert_eq!(*log.lock(), vec!["rest"]);
}

/// The tokio driver flushes on its own; awaiting the next tick observes it.
#[tokio::test]
async fn tokio_driver_flushes_on_next_tick() {
    let scheduler = Scheduler::with_driver(TokioDriver::current().unwrap());
    let log = Log::default();

    scheduler.enqueue(&recorder(&log, "a").into_ref());
    scheduler.enqueue(&recorder(&log, "b").into_ref());
    assert!(log.lock().is_empty());

    scheduler.next_tick().await;
    assert_eq!(*log.lock(), vec!["a", "b"]);
    assert!(!scheduler.has_pending());
}

/// Enqueues from several worker threads race flushes that are finishing.
/// Every round's next tick must still settle.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enqueues_never_wedge_the_tokio_driver() {
    let scheduler = Scheduler::with_driver(TokioDriver::current().unwrap());
    let runs = Arc::new(AtomicUsize::new(0));

    for _ in 0..200 {
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                let runs = runs.clone();
                tokio::spawn(async move {
                    let job = Job::new(move || {
                        runs.fetch_add(1, Ordering::SeqCst);
                    });
                    scheduler.enqueue(&job.into_ref());
                    tokio::time::timeout(Duration::from_secs(5), scheduler.next_tick()).await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok(), "next tick never settled");
        }
    }

    assert_eq!(runs.load(Ordering::SeqCst), 800);
    assert!(!scheduler.has_pending());
}
