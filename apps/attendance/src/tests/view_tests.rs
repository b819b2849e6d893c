use super::*;
use shared::{
    domain::TxHash,
    error::{ContractError, ErrorCode},
};

fn address(raw: &str) -> Address {
    Address::parse(raw).expect("address")
}

const OWNER_UPPER: &str = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";
const OWNER_LOWER: &str = "0xabcdef0123456789abcdef0123456789abcdef01";
const OTHER: &str = "0x0000000000000000000000000000000000000002";

fn data_with_owner(owner: &str) -> ContractData {
    ContractData {
        contract_owner: Some(address(owner)),
        ..ContractData::default()
    }
}

#[test]
fn disconnected_wallet_sees_only_connect_prompt() {
    let view = AttendanceView::new();
    let data = data_with_owner(OWNER_UPPER);

    let out = view.render(
        ConnectionStatus::Disconnected,
        &data,
        &ContractState::default(),
    );

    assert_eq!(out, format!("{TITLE}\n{CONNECT_PROMPT}\n"));
}

#[test]
fn owner_controls_match_case_insensitively() {
    let view = AttendanceView::new();
    let data = data_with_owner(OWNER_UPPER);
    let connection = ConnectionStatus::Connected(address(OWNER_LOWER));

    assert!(is_owner(connection, &data));
    let out = view.render(connection, &data, &ContractState::default());
    assert!(out.contains("Clear Attendance (Owner)"));
}

#[test]
fn non_owner_does_not_see_clear_control() {
    let view = AttendanceView::new();
    let data = data_with_owner(OWNER_UPPER);
    let connection = ConnectionStatus::Connected(address(OTHER));

    assert!(!is_owner(connection, &data));
    assert!(!is_owner(connection, &ContractData::default()));
    let out = view.render(connection, &data, &ContractState::default());
    assert!(!out.contains("Clear Attendance"));
}

#[test]
fn empty_attendee_list_renders_placeholder() {
    let view = AttendanceView::new();
    let out = view.render(
        ConnectionStatus::Connected(address(OTHER)),
        &ContractData::default(),
        &ContractState::default(),
    );

    assert!(out.contains(NO_ATTENDEES));
    assert!(out.contains("Contract Owner:   —"));
    assert!(out.contains("Your Attendance:  Not marked"));
}

#[test]
fn attendees_render_indexed_rows() {
    let view = AttendanceView::new();
    let first = address("0x0000000000000000000000000000000000000001");
    let second = address(OTHER);
    let data = ContractData {
        attendee_count: 2,
        attendees: vec![first, second],
        ..ContractData::default()
    };

    let out = view.render(
        ConnectionStatus::Connected(second),
        &data,
        &ContractState::default(),
    );

    assert!(out.contains(&format!("  {first}  #0\n")));
    assert!(out.contains(&format!("  {second}  #1\n")));
    assert!(!out.contains(NO_ATTENDEES));
}

#[test]
fn mark_label_follows_attendance_and_busy_state() {
    let idle = ContractState::default();
    let busy = ContractState {
        is_loading: true,
        ..ContractState::default()
    };
    let attended = ContractData {
        my_attendance_timestamp: Some(1_700_000_000),
        ..ContractData::default()
    };

    assert_eq!(mark_label(&ContractData::default(), &idle), "Mark Attendance");
    assert_eq!(mark_label(&attended, &idle), "Update Attendance");
    assert_eq!(mark_label(&attended, &busy), "Marking...");
    assert_eq!(clear_label(&busy), "Clearing...");
    assert_eq!(clear_label(&idle), "Clear Attendance");
}

#[test]
fn busy_state_disables_actions() {
    let view = AttendanceView::new();
    let state = ContractState {
        is_pending: true,
        is_loading: true,
        ..ContractState::default()
    };

    let out = view.render(
        ConnectionStatus::Connected(address(OWNER_LOWER)),
        &data_with_owner(OWNER_UPPER),
        &state,
    );

    assert!(out.contains("> Marking... (disabled)"));
    assert!(out.contains("> Clearing... (disabled)"));
}

#[test]
fn query_for_connected_address_returns_current_timestamp() {
    let mut view = AttendanceView::new();
    let connection = ConnectionStatus::Connected(address(OWNER_LOWER));
    let data = ContractData {
        my_attendance_timestamp: Some(1_700_000_000),
        ..ContractData::default()
    };

    view.set_query_input(OWNER_UPPER);
    view.query_timestamp(connection, &data);

    assert_eq!(
        view.queried,
        Some(QueryOutcome::Resolved(Some(1_700_000_000)))
    );
    let out = view.render(connection, &data, &ContractState::default());
    assert!(out.contains("Timestamp: 2023-11-14 22:13:20 UTC"));
}

#[test]
fn query_for_connected_address_without_attendance_is_not_marked() {
    let mut view = AttendanceView::new();
    let connection = ConnectionStatus::Connected(address(OTHER));

    view.set_query_input(OTHER);
    view.query_timestamp(connection, &ContractData::default());

    assert_eq!(view.queried, Some(QueryOutcome::Resolved(None)));
    let out = view.render(connection, &ContractData::default(), &ContractState::default());
    assert!(out.contains("Timestamp: Not marked"));
}

#[test]
fn query_for_other_address_is_unresolvable() {
    let mut view = AttendanceView::new();
    let connection = ConnectionStatus::Connected(address(OTHER));
    let data = ContractData {
        my_attendance_timestamp: Some(1_700_000_000),
        ..ContractData::default()
    };

    view.set_query_input(OWNER_LOWER);
    view.query_timestamp(connection, &data);

    assert_eq!(view.queried, Some(QueryOutcome::Unresolvable));
    let out = view.render(connection, &data, &ContractState::default());
    assert!(out.contains(UNRESOLVABLE_QUERY));
    assert!(!out.contains("Timestamp: "));
}

#[test]
fn malformed_query_keeps_previous_result() {
    let mut view = AttendanceView::new();
    let connection = ConnectionStatus::Connected(address(OTHER));
    view.set_query_input(OTHER);
    view.query_timestamp(connection, &ContractData::default());
    assert_eq!(view.queried, Some(QueryOutcome::Resolved(None)));

    view.queried = Some(QueryOutcome::Resolved(Some(5)));
    view.query_input = "0xnot-an-address".to_string();
    view.query_timestamp(connection, &ContractData::default());

    assert_eq!(view.queried, Some(QueryOutcome::Resolved(Some(5))));
}

#[test]
fn changing_query_input_clears_result() {
    let mut view = AttendanceView::new();
    let connection = ConnectionStatus::Connected(address(OTHER));
    view.set_query_input(OTHER);
    view.query_timestamp(connection, &ContractData::default());

    view.set_query_input(OTHER);
    assert!(view.queried.is_some());

    view.set_query_input(OWNER_LOWER);
    assert_eq!(view.queried, None);
    assert_eq!(view.query_input, OWNER_LOWER);
}

#[test]
fn changing_connected_address_clears_result() {
    let mut view = AttendanceView::new();
    let connection = ConnectionStatus::Connected(address(OTHER));
    view.observe_connection(connection);
    view.set_query_input(OTHER);
    view.query_timestamp(connection, &ContractData::default());

    view.observe_connection(connection);
    assert!(view.queried.is_some());

    view.observe_connection(ConnectionStatus::Connected(address(OWNER_LOWER)));
    assert_eq!(view.queried, None);
}

#[test]
fn transaction_status_and_error_are_rendered() {
    let view = AttendanceView::new();
    let hash = TxHash([0xab; 32]);
    let state = ContractState {
        is_loading: true,
        is_confirming: true,
        hash: Some(hash),
        ..ContractState::default()
    };
    let connection = ConnectionStatus::Connected(address(OTHER));

    let out = view.render(connection, &ContractData::default(), &state);
    assert!(out.contains(&format!("Transaction Hash\n  {hash}\n  Waiting for confirmation...")));

    let state = ContractState {
        is_confirmed: true,
        hash: Some(hash),
        error: Some(ContractError::new(ErrorCode::Rejected, "user rejected")),
        ..ContractState::default()
    };
    let out = view.render(connection, &ContractData::default(), &state);
    assert!(out.contains("Transaction confirmed!"));
    assert!(!out.contains("Waiting for confirmation..."));
    assert!(out.ends_with("Error: user rejected\n"));
}

#[test]
fn formats_timestamps_in_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
    assert_eq!(format_timestamp(u64::MAX), u64::MAX.to_string());
}

#[test]
fn query_matches_connected_address_regardless_of_prefix_case() {
    let mut view = AttendanceView::new();
    let connection = ConnectionStatus::Connected(address(OWNER_LOWER));
    let data = ContractData {
        my_attendance_timestamp: Some(1_700_000_000),
        ..ContractData::default()
    };

    view.set_query_input(OWNER_UPPER.replacen("0x", "0X", 1));
    view.query_timestamp(connection, &data);
    assert_eq!(
        view.queried,
        Some(QueryOutcome::Resolved(Some(1_700_000_000)))
    );

    view.set_query_input(format!("{OWNER_LOWER}0"));
    view.query_timestamp(connection, &data);
    assert_eq!(view.queried, None);
}
