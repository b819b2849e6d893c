//! Event handlers tying user actions to the contract binding and the view.

use std::sync::Arc;

use client_core::AttendanceContract;
use shared::{
    domain::{Address, ConnectionStatus},
    error::{ContractError, ErrorCode},
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::{
    shell::{ShellCommand, HELP},
    view::{format_timestamp, is_owner, AttendanceView, NOT_MARKED},
};

fn parse_address(input: &str) -> Result<Address, ContractError> {
    Address::parse(input.trim()).map_err(|err| {
        ContractError::new(
            ErrorCode::InvalidInput,
            format!("invalid address '{input}': {err}"),
        )
    })
}

pub struct Session {
    contract: Arc<AttendanceContract>,
    view: AttendanceView,
}

impl Session {
    pub fn new(contract: Arc<AttendanceContract>) -> Self {
        Self {
            contract,
            view: AttendanceView::new(),
        }
    }

    async fn connection(&mut self) -> ConnectionStatus {
        let connection = match self.contract.connection_status().await {
            Ok(connection) => connection,
            Err(err) => {
                warn!("session: wallet connection unavailable: {err}");
                ConnectionStatus::Disconnected
            }
        };
        self.view.observe_connection(connection);
        connection
    }

    pub async fn render(&mut self) -> String {
        let connection = self.connection().await;
        let data = self.contract.data().await;
        let state = self.contract.state().await;
        self.view.render(connection, &data, &state)
    }

    pub async fn refresh(&mut self) {
        if !self.connection().await.is_connected() {
            return;
        }
        if let Err(err) = self.contract.refetch().await {
            error!("Error: {err}");
        }
    }

    pub async fn handle_mark(&mut self) {
        if !self.connection().await.is_connected() {
            return;
        }
        match self.contract.mark_attendance().await {
            Ok(_) => self.await_confirmation().await,
            Err(err) => error!("Error: {err}"),
        }
    }

    pub async fn handle_clear(&mut self) {
        let connection = self.connection().await;
        if !connection.is_connected() {
            return;
        }
        if !is_owner(connection, &self.contract.data().await) {
            warn!("session: clear attendance is only available to the contract owner");
            return;
        }
        match self.contract.clear_attendance().await {
            Ok(_) => self.await_confirmation().await,
            Err(err) => error!("Error: {err}"),
        }
    }

    async fn await_confirmation(&mut self) {
        if let Err(err) = self.contract.wait_for_confirmation().await {
            error!("Error: {err}");
        }
    }

    pub fn handle_query(&mut self, input: String) {
        self.view.set_query_input(input);
    }

    pub async fn handle_check(&mut self) {
        let connection = self.connection().await;
        if !connection.is_connected() {
            return;
        }
        let data = self.contract.data().await;
        self.view.query_timestamp(connection, &data);
    }

    /// Direct read for any address, bypassing the view's connected-wallet
    /// restriction.
    pub async fn lookup(&self, input: &str) -> String {
        let result = match parse_address(input) {
            Ok(address) => self
                .contract
                .read_attendance_timestamp(address)
                .await
                .map(|timestamp| (address, timestamp)),
            Err(err) => Err(err),
        };
        match result {
            Ok((address, 0)) => format!("{address}: {NOT_MARKED}"),
            Ok((address, timestamp)) => format!("{address}: {}", format_timestamp(timestamp)),
            Err(err) => {
                error!(input, code = ?err.code, "session: lookup failed: {err}");
                format!("Error: {err}")
            }
        }
    }

    /// Reads commands line by line, re-rendering after each one.
    pub async fn run_shell<R, W>(&mut self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.refresh().await;
        output.write_all(self.render().await.as_bytes()).await?;
        output.write_all(b"\n> ").await?;
        output.flush().await?;

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            let command = match ShellCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => {
                    output.write_all(b"> ").await?;
                    output.flush().await?;
                    continue;
                }
                Err(message) => {
                    output.write_all(format!("{message}\n> ").as_bytes()).await?;
                    output.flush().await?;
                    continue;
                }
            };
            info!(?command, "session: command");

            match command {
                ShellCommand::Quit => break,
                ShellCommand::Help => {
                    output.write_all(format!("{HELP}\n> ").as_bytes()).await?;
                    output.flush().await?;
                    continue;
                }
                ShellCommand::Mark => self.handle_mark().await,
                ShellCommand::Clear => self.handle_clear().await,
                ShellCommand::Query(input) => self.handle_query(input),
                ShellCommand::Check => self.handle_check().await,
                ShellCommand::Refresh => self.refresh().await,
            }
            output.write_all(self.render().await.as_bytes()).await?;
            output.write_all(b"\n> ").await?;
            output.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
