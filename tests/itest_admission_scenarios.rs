use std::{
    sync::{Arc, Barrier},
    thread,
    time::{Duration, Instant},
};

use windowgate::{AdmissionController, AdmissionDecision, AdmissionOptions, RequestLimit, WindowSize};

fn sixty_second_controller() -> AdmissionController {
    AdmissionController::with_options(AdmissionOptions {
        limit: RequestLimit::try_from(3u64).unwrap(),
        window: WindowSize::from_secs(60).unwrap(),
    })
}

fn secs(base: Instant, s: u64) -> Instant {
    base + Duration::from_secs(s)
}

#[test]
fn fourth_rapid_request_is_denied() {
    let controller = sixty_second_controller();
    let base = Instant::now();

    let results: Vec<bool> = [0, 1, 2, 3]
        .into_iter()
        .map(|s| controller.is_allowed("user1", secs(base, s)))
        .collect();

    assert_eq!(results, [true, true, true, false]);
}

#[test]
fn request_after_window_elapsed_is_allowed() {
    let controller = sixty_second_controller();
    let base = Instant::now();

    for s in [0, 1, 2] {
        assert!(controller.is_allowed("user1", secs(base, s)));
    }
    assert!(!controller.is_allowed("user1", secs(base, 4)));

    assert!(controller.is_allowed("user1", secs(base, 61)));
}

#[test]
fn requests_straddling_the_window_are_allowed() {
    let controller = sixty_second_controller();
    let base = Instant::now();

    let results: Vec<bool> = [0, 10, 59, 61]
        .into_iter()
        .map(|s| controller.is_allowed("user1", secs(base, s)))
        .collect();

    assert_eq!(results, [true; 4]);
}

#[test]
fn keys_do_not_interfere() {
    let controller = sixty_second_controller();
    let base = Instant::now();

    let mut user1 = Vec::new();
    let mut user2 = Vec::new();
    for s in 0..4 {
        user1.push(controller.is_allowed("user1", secs(base, s)));
        user2.push(controller.is_allowed("user2", secs(base, s)));
    }

    assert_eq!(user1, [true, true, true, false]);
    assert_eq!(user2, [true, true, true, false]);
}

#[test]
fn concurrent_callers_admit_exactly_the_limit() {
    let controller = Arc::new(sixty_second_controller());
    let callers = 16;
    let base = Instant::now();
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|i| {
            let controller = Arc::clone(&controller);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                controller.is_allowed("user1", base + Duration::from_millis(i as u64))
            })
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|allowed| *allowed)
        .count();

    assert_eq!(admitted, 3);
}

#[test]
fn idle_key_is_reclaimed_by_sweep_and_recreated_on_next_request() {
    let controller = sixty_second_controller();
    let base = Instant::now();

    controller.is_allowed("user1", base);
    assert_eq!(controller.len(), 1);

    assert_eq!(controller.sweep(secs(base, 30)), 0);
    assert_eq!(controller.sweep(secs(base, 60)), 1);
    assert!(controller.is_empty());

    assert!(matches!(
        controller.check("user1", secs(base, 61)),
        AdmissionDecision::Allowed
    ));
    assert_eq!(controller.len(), 1);
}
