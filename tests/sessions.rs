use dmxp_resq::error::{PoolError, QueueError};
use dmxp_resq::Core::permit::MAX_PERMITS;
use dmxp_resq::MPMC::Buffer::ResizeDirection;
use dmxp_resq::MPMC::{Role, Session, SessionSummary, Status};
use dmxp_resq::Discipline;
use serial_test::serial;
use std::thread;
use std::time::{Duration, Instant};

// Test lock to prevent parallel test execution
static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

const DISCIPLINES: [Discipline; 2] = [Discipline::Permit, Discipline::Monitor];

fn fast_session(discipline: Discipline, capacity: usize) -> Session {
    Session::builder()
        .with_discipline(discipline)
        .with_capacity(capacity)
        .with_wait_timeout(Duration::from_millis(50))
        .with_retry_backoff(Duration::from_millis(1))
        .with_work_delay(Duration::ZERO, Duration::ZERO)
        .with_seed(7)
        .build()
        .unwrap()
}

fn wait_until(session: &Session, limit: Duration, mut done: impl FnMut(&Status) -> bool) -> Status {
    let deadline = Instant::now() + limit;
    loop {
        let status = session.status();
        if done(&status) {
            return status;
        }
        assert!(Instant::now() < deadline, "condition not reached, last status:\n{status}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn assert_conserved(summary: &SessionSummary) {
    assert_eq!(
        summary.total_enqueued - summary.total_dequeued,
        summary.destroyed as u64
    );

    let produced: u64 = summary
        .workers
        .iter()
        .filter(|r| r.role == Role::Producer)
        .map(|r| r.processed)
        .sum();
    let consumed: u64 = summary
        .workers
        .iter()
        .filter(|r| r.role == Role::Consumer)
        .map(|r| r.processed)
        .sum();
    assert_eq!(produced, summary.total_enqueued);
    assert_eq!(consumed, summary.total_dequeued);
    assert!(summary.workers.iter().all(|r| r.integrity_failures == 0));
}

// Workers parked on the queue lock or a condvar must never form a cycle
fn assert_no_deadlock() {
    let deadlocks = parking_lot::deadlock::check_deadlock();
    assert!(
        deadlocks.is_empty(),
        "{} deadlock cycle(s), first involves threads {:?}",
        deadlocks.len(),
        deadlocks[0].iter().map(|t| t.thread_id()).collect::<Vec<_>>()
    );
}

#[test]
#[serial]
fn producers_and_consumers_move_messages() {
    let _guard = TEST_LOCK.lock();

    for discipline in DISCIPLINES {
        let session = fast_session(discipline, 10);
        for _ in 0..3 {
            session.spawn_producer().unwrap();
        }
        for _ in 0..2 {
            session.spawn_consumer().unwrap();
        }

        let status = wait_until(&session, Duration::from_secs(20), |s| {
            assert!(s.occupied <= s.capacity, "occupancy above capacity: {s:?}");
            s.total_enqueued >= 1000
        });
        assert_eq!(status.active_producers, 3);
        assert_eq!(status.active_consumers, 2);
        assert_no_deadlock();

        let summary = session.shutdown();
        assert!(summary.destroyed <= 10);
        assert_eq!(summary.workers.len(), 5);
        assert_conserved(&summary);
    }
}

#[test]
#[serial]
fn shutdown_releases_blocked_workers() {
    let _guard = TEST_LOCK.lock();

    for discipline in DISCIPLINES {
        let session = Session::builder()
            .with_discipline(discipline)
            .with_capacity(2)
            .with_wait_timeout(Duration::from_millis(200))
            .with_work_delay(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap();

        // No consumers: every producer ends up blocked on the full queue
        for _ in 0..3 {
            session.spawn_producer().unwrap();
        }
        wait_until(&session, Duration::from_secs(5), |s| s.occupied == 2);

        let started = Instant::now();
        let summary = session.shutdown();
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "{discipline} shutdown took {:?}",
            started.elapsed()
        );
        assert_eq!(summary.destroyed, 2);
        assert_conserved(&summary);

        // Idempotent
        assert_eq!(session.shutdown(), summary);
        assert!(!session.is_running());
        assert!(matches!(session.spawn_producer(), Err(PoolError::ShuttingDown)));
    }
}

#[test]
#[serial]
fn shutdown_releases_consumers_waiting_on_empty_queue() {
    let _guard = TEST_LOCK.lock();

    for discipline in DISCIPLINES {
        let session = Session::builder()
            .with_discipline(discipline)
            .with_capacity(4)
            .with_work_delay(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap();

        for _ in 0..4 {
            session.spawn_consumer().unwrap();
        }
        wait_until(&session, Duration::from_secs(5), |s| s.active_consumers == 4);
        // Let every consumer settle into its wait
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let summary = session.shutdown();
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "{discipline} shutdown took {:?}",
            started.elapsed()
        );
        assert_eq!(summary.workers.len(), 4);
        assert_eq!(summary.destroyed, 0);
        assert_conserved(&summary);
    }
}

#[test]
#[serial]
fn shutdown_with_shrink_pending_keeps_every_message_accounted() {
    let _guard = TEST_LOCK.lock();

    for discipline in DISCIPLINES {
        let session = Session::builder()
            .with_discipline(discipline)
            .with_capacity(6)
            .with_work_delay(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap();

        for _ in 0..3 {
            session.spawn_producer().unwrap();
        }
        wait_until(&session, Duration::from_secs(5), |s| s.occupied == 6);
        assert_eq!(session.request_shrink(3), Ok(3));
        assert_eq!(
            session.status().pending_resize,
            Some((ResizeDirection::Shrink, 3))
        );

        let started = Instant::now();
        let summary = session.shutdown();
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "{discipline} shutdown took {:?}",
            started.elapsed()
        );
        assert_eq!(summary.destroyed, 6);
        assert_eq!(summary.workers.len(), 3);
        assert_conserved(&summary);
    }
}

#[test]
fn permit_session_rejects_capacity_above_permit_ceiling() {
    let result = Session::builder()
        .with_discipline(Discipline::Permit)
        .with_capacity(MAX_PERMITS + 1)
        .build();
    assert!(matches!(
        result,
        Err(QueueError::InvalidCapacity { requested }) if requested == MAX_PERMITS + 1
    ));
}

#[test]
#[serial]
fn shrink_while_full_stays_pending_until_drained() {
    let _guard = TEST_LOCK.lock();

    for discipline in DISCIPLINES {
        let session = fast_session(discipline, 10);
        session.spawn_producer().unwrap();
        session.spawn_producer().unwrap();
        wait_until(&session, Duration::from_secs(5), |s| s.occupied == 10);

        assert_eq!(session.shrink(), Ok(5));
        thread::sleep(Duration::from_millis(100));

        // No consumer: nothing may be dropped, so the request just waits
        let status = session.status();
        assert_eq!(status.capacity, 10);
        assert_eq!(status.occupied, 10);
        assert_eq!(status.pending_resize, Some((ResizeDirection::Shrink, 5)));

        session.spawn_consumer().unwrap();
        let status = wait_until(&session, Duration::from_secs(5), |s| s.pending_resize.is_none());
        assert_eq!(status.capacity, 5);

        // Producers resume against the smaller queue
        let settled_at = status.total_enqueued;
        let status = wait_until(&session, Duration::from_secs(5), |s| {
            assert!(s.occupied <= s.capacity);
            s.total_enqueued > settled_at + 50
        });
        assert_eq!(status.capacity, 5);
        assert_no_deadlock();

        let summary = session.shutdown();
        assert!(summary.destroyed <= 5);
        assert_conserved(&summary);
    }
}

#[test]
#[serial]
fn grow_needs_a_consumer_to_apply() {
    let _guard = TEST_LOCK.lock();

    for discipline in DISCIPLINES {
        let session = fast_session(discipline, 4);
        session.spawn_producer().unwrap();
        wait_until(&session, Duration::from_secs(5), |s| s.occupied == 4);

        assert_eq!(session.request_grow(6), Ok(10));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            session.status().pending_resize,
            Some((ResizeDirection::Grow, 10))
        );

        session.spawn_consumer().unwrap();
        let status = wait_until(&session, Duration::from_secs(5), |s| s.pending_resize.is_none());
        assert_eq!(status.capacity, 10);

        assert_conserved(&session.shutdown());
    }
}

#[test]
#[serial]
fn retire_and_worker_limits() {
    let _guard = TEST_LOCK.lock();

    let session = Session::builder()
        .with_discipline(Discipline::Permit)
        .with_max_workers(2)
        .with_wait_timeout(Duration::from_millis(50))
        .with_work_delay(Duration::from_millis(5), Duration::from_millis(10))
        .build()
        .unwrap();

    assert!(matches!(
        session.retire_consumer(),
        Err(PoolError::NoActiveWorker { role: Role::Consumer })
    ));

    assert_eq!(session.spawn_producer().unwrap(), 0);
    assert_eq!(session.spawn_producer().unwrap(), 1);
    assert!(matches!(
        session.spawn_producer(),
        Err(PoolError::WorkerLimit { max: 2, .. })
    ));

    assert_eq!(session.retire_producer().unwrap(), 1);
    assert_eq!(session.status().active_producers, 1);
    // The retired id is not handed out again
    assert_eq!(session.spawn_producer().unwrap(), 2);

    let status = session.status();
    assert!(status.permits.is_some());
    assert!(status.to_string().contains("Queue capacity"));

    let summary = session.shutdown();
    assert_eq!(summary.workers.len(), 3);
    assert_conserved(&summary);
}

#[test]
#[serial]
fn drop_shuts_the_session_down() {
    let _guard = TEST_LOCK.lock();

    let started = Instant::now();
    {
        let session = fast_session(Discipline::Monitor, 3);
        session.spawn_producer().unwrap();
        session.spawn_consumer().unwrap();
        thread::sleep(Duration::from_millis(50));
    }
    assert!(started.elapsed() < Duration::from_secs(2));
}
