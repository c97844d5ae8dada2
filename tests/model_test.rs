use harvestq::error::Error;
use harvestq::model::{ImageState, SourceState, TransitionSummary};

#[test]
fn source_state_round_trips_through_strings() {
    let states = [
        SourceState::Pending,
        SourceState::Populating,
        SourceState::Standby,
        SourceState::Refreshing,
        SourceState::Error,
    ];
    for state in states {
        let parsed: SourceState = state.as_str().parse().unwrap();
        assert_eq!(parsed, state);
        assert_eq!(state.to_string(), state.as_str());
    }
}

#[test]
fn unknown_source_state_is_rejected_at_the_boundary() {
    let result: Result<SourceState, _> = "archived".parse();
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn transition_legality() {
    use SourceState::*;

    assert!(Pending.can_transition_to(Populating));
    assert!(Populating.can_transition_to(Populating)); // crash-recovery re-claim
    assert!(Populating.can_transition_to(Standby));
    assert!(Standby.can_transition_to(Refreshing));
    assert!(Refreshing.can_transition_to(Standby));

    // Error marking is unconditional.
    assert!(Pending.can_transition_to(Error));
    assert!(Populating.can_transition_to(Error));
    assert!(Refreshing.can_transition_to(Error));
    assert!(Standby.can_transition_to(Error));

    assert!(!Pending.can_transition_to(Standby));
    assert!(!Pending.can_transition_to(Refreshing));
    assert!(!Standby.can_transition_to(Populating));
    assert!(!Refreshing.can_transition_to(Populating));
    assert!(!Error.can_transition_to(Standby));
}

#[test]
fn in_progress_states_match_claimed_states() {
    assert!(SourceState::Populating.is_in_progress());
    assert!(SourceState::Refreshing.is_in_progress());
    assert!(!SourceState::Pending.is_in_progress());
    assert!(!SourceState::Standby.is_in_progress());
    assert!(!SourceState::Error.is_in_progress());

    let in_progress = SourceState::in_progress_states();
    assert!(in_progress.iter().all(|s| s.is_in_progress()));
}

#[test]
fn image_state_round_trips_through_strings() {
    for state in [ImageState::Pending, ImageState::Storing, ImageState::Stored] {
        let parsed: ImageState = state.as_str().parse().unwrap();
        assert_eq!(parsed, state);
    }
    let result: Result<ImageState, _> = "uploading".parse();
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn empty_transition_summary() {
    let summary = TransitionSummary::empty();
    assert_eq!(summary.requested, 0);
    assert_eq!(summary.affected, 0);
}
