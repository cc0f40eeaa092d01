use proc_warden::models::worker_state::WorkerState;

#[test]
fn only_exited_is_terminal() {
    let states = [
        WorkerState::Idle,
        WorkerState::Starting,
        WorkerState::Running,
        WorkerState::GracefulStop,
        WorkerState::RestartPending,
        WorkerState::ForcedStop,
    ];
    for state in states {
        assert!(!state.is_terminal(), "{state} must not be terminal");
    }
    assert!(WorkerState::Exited.is_terminal());
}

#[test]
fn serializes_as_snake_case() {
    let json = serde_json::to_string(&WorkerState::RestartPending).expect("serialize");
    assert_eq!(json, "\"restart_pending\"");
    assert_eq!(WorkerState::GracefulStop.to_string(), "graceful_stop");
}
