use std::sync::Arc;
use std::time::Duration;

use relaybot::governor::RateGovernor;
use relaybot::utils::{Clock, ManualClock};

fn governor(rpm: u32, tpm: u64) -> (RateGovernor, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    (RateGovernor::new(rpm, tpm, dyn_clock), clock)
}

#[test]
fn test_request_limit_ignores_token_cost() {
    let (governor, _clock) = governor(3, 0);
    for _ in 0..3 {
        assert!(governor.can_admit(0));
        governor.record(0);
    }

    assert!(!governor.can_admit(0));
    assert!(!governor.can_admit(1));
    assert_eq!(governor.snapshot(), (3, 0));
}

#[test]
fn test_request_limit_denies_even_with_token_headroom() {
    let (governor, _clock) = governor(2, 1_000_000);
    governor.record(1);
    governor.record(1);

    assert!(!governor.can_admit(1));
}

#[test]
fn test_old_tokens_leave_the_window() {
    let (governor, clock) = governor(0, 150);
    governor.record(100);

    clock.advance(Duration::from_secs(59));
    assert!(!governor.can_admit(150));

    clock.advance(Duration::from_secs(2));
    assert!(governor.can_admit(150));
    assert_eq!(governor.snapshot(), (0, 0));
}

#[test]
fn test_window_boundary_is_inclusive() {
    let (governor, clock) = governor(1, 0);
    governor.record(10);

    clock.advance(Duration::from_secs(60));
    assert!(!governor.can_admit(0));

    clock.advance(Duration::from_millis(1));
    assert!(governor.can_admit(0));
}

#[test]
fn test_partial_expiry_keeps_recent_records() {
    let (governor, clock) = governor(0, 300);
    governor.record(100);
    clock.advance(Duration::from_secs(30));
    governor.record(150);

    clock.advance(Duration::from_secs(31));
    assert_eq!(governor.snapshot(), (1, 150));
    assert!(governor.can_admit(150));
    assert!(!governor.can_admit(151));
}

#[test]
fn test_zero_limits_admit_everything() {
    let (governor, _clock) = governor(0, 0);
    for _ in 0..1000 {
        governor.record(1_000_000);
    }
    assert!(governor.can_admit(u64::MAX));
}
