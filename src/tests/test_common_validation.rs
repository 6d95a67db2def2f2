use std::time::Duration;

use crate::{AdmissionController, AdmissionDecision, RequestLimit, WindowGateError, WindowSize};

#[test]
fn request_limit_try_from_validates_positive() {
    let limit = RequestLimit::try_from(1u64).unwrap();
    assert_eq!(*limit, 1u64);

    assert_eq!(
        RequestLimit::try_from(0u64).unwrap_err(),
        WindowGateError::InvalidConfiguration("limit must be greater than 0")
    );
}

#[test]
fn window_size_try_from_validates_nonzero() {
    let w = WindowSize::try_from(Duration::from_nanos(1)).unwrap();
    assert_eq!(*w, Duration::from_nanos(1));

    assert_eq!(
        WindowSize::try_from(Duration::ZERO).unwrap_err(),
        WindowGateError::InvalidConfiguration("window must be greater than 0")
    );
}

#[test]
fn window_size_helpers_match_duration_constructors() {
    assert_eq!(*WindowSize::from_secs(60).unwrap(), Duration::from_secs(60));
    assert_eq!(*WindowSize::from_millis(250).unwrap(), Duration::from_millis(250));

    assert!(WindowSize::from_secs(0).is_err());
    assert!(WindowSize::from_millis(0).is_err());
}

#[test]
fn controller_new_rejects_invalid_configuration() {
    assert!(matches!(
        AdmissionController::new(0, Duration::from_secs(60)),
        Err(WindowGateError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        AdmissionController::new(3, Duration::ZERO),
        Err(WindowGateError::InvalidConfiguration(_))
    ));

    let controller = AdmissionController::new(3, Duration::from_secs(60)).unwrap();
    assert_eq!(*controller.limit(), 3);
    assert_eq!(*controller.window(), Duration::from_secs(60));
    assert!(controller.is_empty());
}

#[test]
fn invalid_configuration_message_names_the_field() {
    let err = AdmissionController::new(0, Duration::from_secs(1))
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "invalid configuration: limit must be greater than 0"
    );
}

#[test]
fn decision_is_allowed_maps_variants() {
    assert!(AdmissionDecision::Allowed.is_allowed());
    assert!(
        !AdmissionDecision::Rejected {
            window: Duration::from_secs(1),
            retry_after: Duration::ZERO,
            live_count: 1,
        }
        .is_allowed()
    );
}
