//! Backoff schedule behaviour.

use std::sync::Arc;
use std::time::Duration;

use digester::{Backoff, BackoffStrategy, IntervalBackoff};

#[test]
fn constant_backoff_polls_immediately_then_holds() {
    let b = IntervalBackoff::constant(Duration::from_secs(1));
    assert_eq!(b.current(), Duration::ZERO);

    b.next();
    assert_eq!(b.current(), Duration::from_secs(1));

    b.next();
    b.next();
    assert_eq!(b.current(), Duration::from_secs(1));

    b.reset();
    assert_eq!(b.current(), Duration::ZERO);
}

#[test]
fn exponential_backoff_doubles_then_saturates() {
    let d = Duration::from_millis(250);
    let b = IntervalBackoff::exponential(4, d);
    assert_eq!(b.current(), Duration::ZERO);

    for k in 1..=4u32 {
        b.next();
        assert_eq!(b.current(), d * 2u32.pow(k - 1), "after {k} next() calls");
    }

    for _ in 0..10 {
        b.next();
    }
    assert_eq!(b.current(), d * 8);
    assert_eq!(b.position(), 4);

    b.reset();
    assert_eq!(b.current(), Duration::ZERO);
}

#[test]
fn exponential_depth_two_matches_reference_sequence() {
    let b = IntervalBackoff::exponential(2, Duration::from_secs(1));
    assert_eq!(
        b.intervals(),
        &[Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[test]
fn current_has_no_side_effects() {
    let b = IntervalBackoff::exponential(3, Duration::from_secs(1));
    b.next();
    for _ in 0..5 {
        assert_eq!(b.current(), Duration::from_secs(1));
    }
    assert_eq!(b.position(), 1);
}

#[test]
fn cursor_never_passes_the_end_under_contention() {
    let b = Arc::new(IntervalBackoff::exponential(3, Duration::from_millis(1)));
    let last = b.intervals().len() - 1;

    let threads: Vec<_> = (0..8)
        .map(|i| {
            let b = Arc::clone(&b);
            std::thread::spawn(move || {
                for n in 0..1_000 {
                    if i == 0 && n % 100 == 0 {
                        b.reset();
                    } else {
                        b.next();
                    }
                    assert!(b.position() <= last);
                    let _ = b.current();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    // Whatever the interleaving, one more round of next() lands on the end.
    for _ in 0..=last {
        b.next();
    }
    assert_eq!(b.position(), last);
    assert_eq!(b.current(), Duration::from_millis(4));
}

#[test]
fn strategy_builds_matching_schedule() {
    let constant = BackoffStrategy::constant(Duration::from_secs(10)).build();
    assert_eq!(constant.intervals(), &[Duration::ZERO, Duration::from_secs(10)]);

    let exp = BackoffStrategy::exponential(3, Duration::from_millis(100)).build();
    assert_eq!(
        exp.intervals(),
        &[
            Duration::ZERO,
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
        ]
    );
}

#[test]
fn default_strategy_is_ten_second_constant() {
    assert_eq!(
        BackoffStrategy::default(),
        BackoffStrategy::Constant { delay_ms: 10_000 }
    );
}

#[test]
fn boxed_and_shared_backoffs_delegate() {
    let shared = Arc::new(IntervalBackoff::constant(Duration::from_secs(2)));
    let boxed: Box<dyn Backoff> = Box::new(Arc::clone(&shared));

    boxed.next();
    assert_eq!(shared.current(), Duration::from_secs(2));
    shared.reset();
    assert_eq!(boxed.current(), Duration::ZERO);
}
