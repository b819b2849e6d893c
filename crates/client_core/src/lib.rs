use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    abi::{ReadCall, ReadValue, WriteCall},
    domain::{Address, ConnectionStatus, ReceiptStatus, TxHash, TxReceipt},
    error::{ContractError, ErrorCode},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

pub mod rpc;
pub use rpc::{JsonRpcProvider, RpcError, RpcSettings};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connection_status(&self) -> Result<ConnectionStatus>;
}

#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn read(&self, contract: Address, call: ReadCall) -> Result<ReadValue>;
}

#[async_trait]
pub trait ContractWriter: Send + Sync {
    async fn write(&self, contract: Address, from: Address, call: WriteCall) -> Result<TxHash>;
}

#[async_trait]
pub trait ReceiptWatcher: Send + Sync {
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt>;
}

/// Read-derived view of the contract. Rebuilt from the latest read results on
/// every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractData {
    pub contract_owner: Option<Address>,
    pub attendee_count: u64,
    pub attendees: Vec<Address>,
    pub my_attendance_timestamp: Option<u64>,
}

impl ContractData {
    pub fn has_attended(&self) -> bool {
        self.my_attendance_timestamp.is_some_and(|ts| ts > 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractState {
    pub is_loading: bool,
    pub is_pending: bool,
    pub is_confirming: bool,
    pub is_confirmed: bool,
    pub hash: Option<TxHash>,
    pub error: Option<ContractError>,
}

impl ContractState {
    pub fn is_busy(&self) -> bool {
        self.is_loading || self.is_pending
    }
}

#[derive(Debug, Clone)]
pub enum ContractEvent {
    StateChanged(ContractState),
    DataRefreshed(ContractData),
    Error(String),
}

#[derive(Default)]
struct ReadCache {
    owner: Option<Address>,
    attendee_count: Option<u64>,
    attendees: Vec<Address>,
    my_timestamp: Option<u64>,
    timestamp_account: Option<Address>,
}

impl ReadCache {
    fn data(&self) -> ContractData {
        ContractData {
            contract_owner: self.owner,
            attendee_count: match self.attendee_count {
                Some(count) if count > 0 => count,
                _ => self.attendees.len() as u64,
            },
            attendees: self.attendees.clone(),
            my_attendance_timestamp: self.my_timestamp.filter(|ts| *ts > 0),
        }
    }

    fn sync_account(&mut self, account: Option<Address>) {
        if self.timestamp_account != account {
            self.my_timestamp = None;
            self.timestamp_account = account;
        }
    }
}

#[derive(Default)]
struct TxTracker {
    in_flight: bool,
    write_pending: bool,
    confirming: bool,
    confirmed: bool,
    hash: Option<TxHash>,
    error: Option<ContractError>,
}

impl TxTracker {
    fn state(&self) -> ContractState {
        ContractState {
            is_loading: self.in_flight || self.write_pending || self.confirming,
            is_pending: self.write_pending,
            is_confirming: self.confirming,
            is_confirmed: self.confirmed,
            hash: self.hash,
            error: self.error.clone(),
        }
    }
}

fn to_contract_error(err: &anyhow::Error, fallback: ErrorCode) -> ContractError {
    match err.downcast_ref::<ContractError>() {
        Some(contract_error) => contract_error.clone(),
        None => ContractError::new(fallback, format!("{err:#}")),
    }
}

/// Binds the attendance contract's reads and writes to application-level
/// data and transaction state.
pub struct AttendanceContract {
    contract: Address,
    connection: Arc<dyn ConnectionProvider>,
    reader: Arc<dyn ContractReader>,
    writer: Arc<dyn ContractWriter>,
    receipts: Arc<dyn ReceiptWatcher>,
    reads: Mutex<ReadCache>,
    tx: Mutex<TxTracker>,
    events: broadcast::Sender<ContractEvent>,
}

impl AttendanceContract {
    pub fn new<P>(contract: Address, provider: Arc<P>) -> Arc<Self>
    where
        P: ConnectionProvider + ContractReader + ContractWriter + ReceiptWatcher + 'static,
    {
        Self::new_with_dependencies(
            contract,
            provider.clone(),
            provider.clone(),
            provider.clone(),
            provider,
        )
    }

    pub fn new_with_dependencies(
        contract: Address,
        connection: Arc<dyn ConnectionProvider>,
        reader: Arc<dyn ContractReader>,
        writer: Arc<dyn ContractWriter>,
        receipts: Arc<dyn ReceiptWatcher>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            contract,
            connection,
            reader,
            writer,
            receipts,
            reads: Mutex::new(ReadCache::default()),
            tx: Mutex::new(TxTracker::default()),
            events,
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ContractEvent> {
        self.events.subscribe()
    }

    pub async fn data(&self) -> ContractData {
        self.reads.lock().await.data()
    }

    pub async fn state(&self) -> ContractState {
        self.tx.lock().await.state()
    }

    pub async fn connection_status(&self) -> std::result::Result<ConnectionStatus, ContractError> {
        self.connection
            .connection_status()
            .await
            .map_err(|err| to_contract_error(&err, ErrorCode::Transport))
    }

    pub async fn mark_attendance(&self) -> std::result::Result<TxHash, ContractError> {
        self.submit(WriteCall::MarkAttendance).await
    }

    pub async fn clear_attendance(&self) -> std::result::Result<TxHash, ContractError> {
        self.submit(WriteCall::ClearAttendance).await
    }

    async fn submit(&self, call: WriteCall) -> std::result::Result<TxHash, ContractError> {
        {
            let mut tx = self.tx.lock().await;
            *tx = TxTracker {
                in_flight: true,
                write_pending: true,
                ..TxTracker::default()
            };
        }
        self.publish_state().await;

        let result = self.send_write(call).await;

        {
            let mut tx = self.tx.lock().await;
            tx.in_flight = false;
            tx.write_pending = false;
            match &result {
                Ok(hash) => {
                    info!(
                        contract = %self.contract,
                        function = call.function_name(),
                        hash = %hash,
                        "contract: write submitted"
                    );
                    tx.hash = Some(*hash);
                    tx.confirming = true;
                }
                Err(err) => {
                    error!(
                        contract = %self.contract,
                        function = call.function_name(),
                        code = ?err.code,
                        "contract: write failed: {err}"
                    );
                    tx.error = Some(err.clone());
                }
            }
        }
        self.publish_state().await;
        if let Err(err) = &result {
            let _ = self.events.send(ContractEvent::Error(err.message.clone()));
        }
        result
    }

    async fn send_write(&self, call: WriteCall) -> std::result::Result<TxHash, ContractError> {
        let from = self
            .connection_status()
            .await?
            .address()
            .ok_or_else(ContractError::not_connected)?;
        self.writer
            .write(self.contract, from, call)
            .await
            .map_err(|err| to_contract_error(&err, ErrorCode::Rejected))
    }

    /// Waits for the receipt of the most recent write. A successful receipt
    /// marks the state confirmed and, on the first confirmation of that
    /// transaction, re-issues every read once.
    pub async fn wait_for_confirmation(
        &self,
    ) -> std::result::Result<Option<TxReceipt>, ContractError> {
        let Some(hash) = self.tx.lock().await.hash else {
            return Ok(None);
        };

        let outcome = self
            .receipts
            .wait_for_receipt(hash)
            .await
            .map_err(|err| to_contract_error(&err, ErrorCode::Transport));

        let (newly_confirmed, failure) = {
            let mut tx = self.tx.lock().await;
            if tx.hash != Some(hash) {
                // A newer write replaced this one while we were waiting.
                return outcome.map(Some);
            }
            tx.confirming = false;
            match &outcome {
                Ok(receipt) if receipt.status == ReceiptStatus::Success => {
                    info!(
                        hash = %hash,
                        block = receipt.block_number,
                        "contract: transaction confirmed"
                    );
                    let was_confirmed = tx.confirmed;
                    tx.confirmed = true;
                    (!was_confirmed, None)
                }
                Ok(receipt) => {
                    warn!(hash = %hash, block = receipt.block_number, "contract: transaction reverted");
                    let err = ContractError::new(
                        ErrorCode::Reverted,
                        format!("transaction {hash} reverted"),
                    );
                    tx.error = Some(err.clone());
                    (false, Some(err))
                }
                Err(err) => {
                    error!(hash = %hash, "contract: receipt wait failed: {err}");
                    tx.error = Some(err.clone());
                    (false, Some(err.clone()))
                }
            }
        };
        self.publish_state().await;
        if let Some(err) = failure {
            let _ = self.events.send(ContractEvent::Error(err.message));
        }

        if newly_confirmed {
            if let Err(err) = self.refetch().await {
                warn!("contract: refresh after confirmation incomplete: {err}");
            }
        }
        outcome.map(Some)
    }

    /// Re-issues every read concurrently. Each successful read replaces its
    /// cached value; the first failure is returned and the rest are only
    /// logged.
    pub async fn refetch(&self) -> std::result::Result<(), ContractError> {
        let mut first_error: Option<ContractError> = None;

        let account = match self.connection_status().await {
            Ok(status) => status.address(),
            Err(err) => {
                warn!("contract: connection status unavailable: {err}");
                first_error = Some(err);
                None
            }
        };

        let (owner, count, attendees, timestamp) = futures::join!(
            self.read(ReadCall::Owner),
            self.read(ReadCall::AttendeeCount),
            self.read(ReadCall::AllAttendees),
            async {
                match account {
                    Some(account) => Some(self.read(ReadCall::AttendanceTimestamp(account)).await),
                    None => None,
                }
            },
        );

        let mut note_failure = |function: &str, err: ContractError| {
            warn!(function, "contract: read failed: {err}");
            first_error.get_or_insert(err);
        };

        let data = {
            let mut reads = self.reads.lock().await;
            reads.sync_account(account);

            match owner.and_then(|value| decoded(value.into_address())) {
                Ok(owner) => reads.owner = Some(owner),
                Err(err) => note_failure("owner", err),
            }
            match count.and_then(|value| decoded(value.into_uint())) {
                Ok(count) => reads.attendee_count = Some(count),
                Err(err) => note_failure("getAttendeeCount", err),
            }
            match attendees.and_then(|value| decoded(value.into_addresses())) {
                Ok(attendees) => reads.attendees = attendees,
                Err(err) => note_failure("getAllAttendees", err),
            }
            if let Some(timestamp) = timestamp {
                match timestamp.and_then(|value| decoded(value.into_uint())) {
                    Ok(timestamp) => reads.my_timestamp = Some(timestamp),
                    Err(err) => note_failure("getAttendanceTimestamp", err),
                }
            }
            reads.data()
        };

        info!(
            contract = %self.contract,
            attendee_count = data.attendee_count,
            "contract: reads refreshed"
        );
        let _ = self.events.send(ContractEvent::DataRefreshed(data));

        match first_error {
            Some(err) => {
                let _ = self.events.send(ContractEvent::Error(err.message.clone()));
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// One-off read of any address's attendance timestamp. Not cached.
    pub async fn read_attendance_timestamp(
        &self,
        address: Address,
    ) -> std::result::Result<u64, ContractError> {
        let value = self.read(ReadCall::AttendanceTimestamp(address)).await?;
        decoded(value.into_uint())
    }

    async fn read(&self, call: ReadCall) -> std::result::Result<ReadValue, ContractError> {
        self.reader
            .read(self.contract, call)
            .await
            .map_err(|err| to_contract_error(&err, ErrorCode::Transport))
    }

    async fn publish_state(&self) {
        let state = self.state().await;
        let _ = self.events.send(ContractEvent::StateChanged(state));
    }
}

fn decoded<T>(
    result: std::result::Result<T, shared::abi::AbiError>,
) -> std::result::Result<T, ContractError> {
    result.map_err(|err| ContractError::new(ErrorCode::Decode, err.to_string()))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
