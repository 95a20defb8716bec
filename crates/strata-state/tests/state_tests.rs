use proptest::prelude::*;
use strata_state::fsm::{allowed_events, next_state, StateMachineKind};
use strata_state::{SchEvent, State};

fn any_state() -> impl Strategy<Value = State> {
    proptest::sample::select(State::ALL.to_vec())
}

fn any_event() -> impl Strategy<Value = SchEvent> {
    proptest::sample::select(SchEvent::ALL.to_vec())
}

fn any_kind() -> impl Strategy<Value = StateMachineKind> {
    prop_oneof![Just(StateMachineKind::Daemon), Just(StateMachineKind::Client)]
}

#[test]
fn test_predicate_membership() {
    let desired: Vec<State> = State::ALL.into_iter().filter(|s| s.is_valid_desired_state()).collect();
    assert_eq!(
        desired,
        vec![State::Init, State::Installed, State::Started, State::Uninstalled, State::Maintenance]
    );

    let in_progress: Vec<State> = State::ALL.into_iter().filter(|s| s.is_in_progress_state()).collect();
    assert_eq!(
        in_progress,
        vec![
            State::Installing,
            State::Starting,
            State::Stopping,
            State::Uninstalling,
            State::WipingOut,
            State::Upgrading
        ]
    );

    let removable: Vec<State> = State::ALL.into_iter().filter(|s| s.is_removable_state()).collect();
    assert_eq!(
        removable,
        vec![
            State::Init,
            State::Installing,
            State::InstallFailed,
            State::Installed,
            State::Uninstalled,
            State::Maintenance,
            State::Unknown
        ]
    );
}

#[test]
fn test_install_lifecycle() {
    let kind = StateMachineKind::Daemon;
    let mut state = State::Init;
    for (event, expected) in [
        (SchEvent::Install, State::Installing),
        (SchEvent::OpInProgress, State::Installing),
        (SchEvent::OpSucceeded, State::Installed),
        (SchEvent::Start, State::Starting),
        (SchEvent::Started, State::Started),
        (SchEvent::Stop, State::Stopping),
        (SchEvent::Stopped, State::Installed),
        (SchEvent::Uninstall, State::Uninstalling),
        (SchEvent::OpSucceeded, State::Uninstalled),
        (SchEvent::Wipeout, State::WipingOut),
        (SchEvent::OpSucceeded, State::Init),
    ] {
        state = next_state(kind, state, event)
            .unwrap_or_else(|| panic!("{event} rejected in {state}"))
            .to;
        assert_eq!(state, expected);
    }
}

#[test]
fn test_maintenance_round_trip() {
    let kind = StateMachineKind::Client;
    let t = next_state(kind, State::Installed, SchEvent::Disable).unwrap();
    assert_eq!(t.to, State::Maintenance);
    let t = next_state(kind, t.to, SchEvent::Restore).unwrap();
    assert_eq!(t.to, State::Installed);
}

proptest! {
    #[test]
    fn prop_desired_and_in_progress_disjoint(state in any_state()) {
        prop_assert!(!(state.is_valid_desired_state() && state.is_in_progress_state()));
    }

    #[test]
    fn prop_in_progress_states_cannot_be_desired(state in any_state()) {
        if state.is_in_progress_state() {
            prop_assert!(!state.is_valid_desired_state());
        }
    }

    #[test]
    fn prop_client_machine_stays_in_client_states(state in any_state(), event in any_event()) {
        if state.is_valid_client_component_state() {
            if let Some(t) = next_state(StateMachineKind::Client, state, event) {
                prop_assert!(t.to.is_valid_client_component_state());
            }
        }
    }

    #[test]
    fn prop_client_table_is_subset_of_daemon_table(state in any_state(), event in any_event()) {
        if let Some(client) = next_state(StateMachineKind::Client, state, event) {
            prop_assert_eq!(Some(client), next_state(StateMachineKind::Daemon, state, event));
        }
    }

    #[test]
    fn prop_allowed_events_match_table(kind in any_kind(), state in any_state(), event in any_event()) {
        let allowed = allowed_events(kind, state);
        prop_assert_eq!(allowed.contains(&event), next_state(kind, state, event).is_some());
    }
}
