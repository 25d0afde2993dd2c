use chrono::Utc;
use sekisyo_license::{FailureMode, LicenseState, PluginRecord};

fn valid_state() -> LicenseState {
    LicenseState::validated("KEY", Utc::now())
}

#[test]
fn validated_state_is_valid_with_zero_failures() {
    let state = valid_state();
    assert!(state.valid);
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.license_key, "KEY");
    assert!(state.has_key());
}

#[test]
fn validated_empty_key_is_never_valid() {
    let state = LicenseState::validated("", Utc::now());
    assert!(!state.valid);
}

#[test]
fn rejected_invalidate_mode_clears_valid() {
    let next = valid_state().rejected("KEY", FailureMode::Invalidate, Utc::now());
    assert!(!next.valid);
    assert_eq!(next.consecutive_failures, 1);
}

#[test]
fn rejected_preserve_mode_keeps_previous_valid() {
    let now = Utc::now();
    let next = valid_state().rejected("KEY", FailureMode::PreserveStatus, now);
    assert!(next.valid);
    assert_eq!(next.consecutive_failures, 1);
    assert_eq!(next.last_checked, Some(now));

    let still_invalid = LicenseState::default().rejected("KEY", FailureMode::PreserveStatus, now);
    assert!(!still_invalid.valid);
}

#[test]
fn rejected_counter_saturates() {
    let state = LicenseState {
        consecutive_failures: u32::MAX,
        ..Default::default()
    };
    let next = state.rejected("K", FailureMode::Invalidate, Utc::now());
    assert_eq!(next.consecutive_failures, u32::MAX);
}

#[test]
fn unlinked_state_is_reset_but_checked() {
    let state = LicenseState::unlinked(Utc::now());
    assert_eq!(state.license_key, "");
    assert!(!state.valid);
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.last_checked.is_some());
}

#[test]
fn deactivated_keeps_key_and_counter() {
    let state = LicenseState {
        consecutive_failures: 4,
        ..valid_state()
    };
    let off = state.deactivated();
    assert!(!off.valid);
    assert_eq!(off.license_key, "KEY");
    assert_eq!(off.consecutive_failures, 4);
    assert_eq!(off.last_checked, state.last_checked);
}

#[test]
fn tolerance_comparison_is_strict() {
    let record = PluginRecord::new("p", "p.php", "P", "", "https://a.test", 2);
    assert!(record.tolerance_enabled());
    assert!(!record.exceeds_tolerance(2));
    assert!(record.exceeds_tolerance(3));

    let unlimited = PluginRecord::new("q", "q.php", "Q", "", "https://a.test", 0);
    assert!(!unlimited.tolerance_enabled());
    assert!(!unlimited.exceeds_tolerance(u32::MAX));
}
