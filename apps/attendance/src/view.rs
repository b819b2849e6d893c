//! Terminal presentation of the attendance contract.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use client_core::{ContractData, ContractState};
use shared::domain::{is_address, Address, ConnectionStatus};
use tracing::debug;

pub const TITLE: &str = "Attendance Contract";
pub const CONNECT_PROMPT: &str =
    "Please connect your wallet to interact with the attendance contract.";
pub const NO_ATTENDEES: &str = "No attendees yet.";
pub const NOT_MARKED: &str = "Not marked";
pub const UNRESOLVABLE_QUERY: &str = "Unable to fetch timestamp for an arbitrary address in this view. \
Connect the queried wallet or run `attendance lookup <address>` to call getAttendanceTimestamp(address).";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Timestamp of the connected wallet, `None` when it has not attended.
    Resolved(Option<u64>),
    Unresolvable,
}

pub fn is_owner(connection: ConnectionStatus, data: &ContractData) -> bool {
    match (connection.address(), data.contract_owner) {
        (Some(connected), Some(owner)) => connected == owner,
        _ => false,
    }
}

pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn describe_timestamp(timestamp: Option<u64>) -> String {
    match timestamp {
        Some(ts) if ts > 0 => format_timestamp(ts),
        _ => NOT_MARKED.to_string(),
    }
}

pub fn mark_label(data: &ContractData, state: &ContractState) -> &'static str {
    if state.is_busy() {
        "Marking..."
    } else if data.has_attended() {
        "Update Attendance"
    } else {
        "Mark Attendance"
    }
}

pub fn clear_label(state: &ContractState) -> &'static str {
    if state.is_busy() {
        "Clearing..."
    } else {
        "Clear Attendance"
    }
}

#[derive(Debug, Default)]
pub struct AttendanceView {
    query_input: String,
    queried: Option<QueryOutcome>,
    last_connected: Option<Address>,
}

impl AttendanceView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_query_input(&mut self, input: impl Into<String>) {
        let input = input.into();
        if input != self.query_input {
            self.query_input = input;
            self.queried = None;
        }
    }

    pub fn observe_connection(&mut self, connection: ConnectionStatus) {
        let connected = connection.address();
        if connected != self.last_connected {
            self.last_connected = connected;
            self.queried = None;
        }
    }

    /// Only the connected wallet's timestamp is known to the view. Malformed
    /// input leaves the previous result untouched.
    pub fn query_timestamp(&mut self, connection: ConnectionStatus, data: &ContractData) {
        if !is_address(&self.query_input) {
            debug!(input = %self.query_input, "view: ignoring malformed query address");
            return;
        }
        self.queried = Some(match connection.address() {
            Some(connected) if connected.to_string().eq_ignore_ascii_case(&self.query_input) => {
                QueryOutcome::Resolved(data.my_attendance_timestamp)
            }
            _ => QueryOutcome::Unresolvable,
        });
    }

    pub fn render(
        &self,
        connection: ConnectionStatus,
        data: &ContractData,
        state: &ContractState,
    ) -> String {
        let mut out = String::new();
        if !connection.is_connected() {
            let _ = writeln!(out, "{TITLE}");
            let _ = writeln!(out, "{CONNECT_PROMPT}");
            return out;
        }

        let _ = writeln!(out, "{TITLE}");
        let _ = writeln!(out, "Mark and manage attendance on-chain");
        let _ = writeln!(out);

        let owner = data
            .contract_owner
            .map(|owner| owner.to_string())
            .unwrap_or_else(|| "—".to_string());
        let _ = writeln!(out, "Contract Owner:   {owner}");
        let _ = writeln!(out, "Attendee Count:   {}", data.attendee_count);
        let _ = writeln!(
            out,
            "Your Attendance:  {}",
            describe_timestamp(data.my_attendance_timestamp)
        );
        let _ = writeln!(out);

        let disabled = if state.is_busy() { " (disabled)" } else { "" };
        let _ = writeln!(out, "[1] Mark Attendance");
        let _ = writeln!(
            out,
            "    Mark your attendance on-chain. This action will record your address and a timestamp."
        );
        let _ = writeln!(out, "    > {}{disabled}", mark_label(data, state));
        if is_owner(connection, data) {
            let _ = writeln!(out, "[!] Clear Attendance (Owner)");
            let _ = writeln!(
                out,
                "    Clear the attendance list. Only the contract owner can perform this action."
            );
            let _ = writeln!(out, "    > {}{disabled}", clear_label(state));
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "Attendees");
        if data.attendees.is_empty() {
            let _ = writeln!(out, "  {NO_ATTENDEES}");
        } else {
            for (idx, attendee) in data.attendees.iter().enumerate() {
                let _ = writeln!(out, "  {attendee}  #{idx}");
            }
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "Query Attendance Timestamp");
        let input = if self.query_input.is_empty() {
            "0x..."
        } else {
            self.query_input.as_str()
        };
        let _ = writeln!(out, "  Address: {input}");
        match self.queried {
            Some(QueryOutcome::Resolved(timestamp)) => {
                let _ = writeln!(out, "  Timestamp: {}", describe_timestamp(timestamp));
            }
            Some(QueryOutcome::Unresolvable) => {
                let _ = writeln!(out, "  {UNRESOLVABLE_QUERY}");
            }
            None if !self.query_input.is_empty() => {
                let _ = writeln!(out, "  {UNRESOLVABLE_QUERY}");
            }
            None => {}
        }

        if let Some(hash) = state.hash {
            let _ = writeln!(out);
            let _ = writeln!(out, "Transaction Hash");
            let _ = writeln!(out, "  {hash}");
            if state.is_confirming {
                let _ = writeln!(out, "  Waiting for confirmation...");
            }
            if state.is_confirmed {
                let _ = writeln!(out, "  Transaction confirmed!");
            }
        }

        if let Some(err) = &state.error {
            let _ = writeln!(out);
            let _ = writeln!(out, "Error: {}", err.message);
        }
        out
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
