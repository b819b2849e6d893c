use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use client_core::RpcSettings;
use serde::Deserialize;
use shared::domain::Address;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "attendance.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: String,
    pub contract_address: Option<String>,
    pub account: Option<String>,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            contract_address: None,
            account: None,
            receipt_poll_interval_ms: 1000,
            receipt_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    rpc_url: Option<String>,
    contract_address: Option<String>,
    account: Option<String>,
    receipt_poll_interval_ms: Option<u64>,
    receipt_timeout_secs: Option<u64>,
}

/// Defaults, then the config file, then environment. A missing file is only
/// an error when the path was given explicitly.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let (path, explicit) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(err) if explicit => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.rpc_url {
        settings.rpc_url = v;
    }
    if let Some(v) = file_cfg.contract_address {
        settings.contract_address = Some(v);
    }
    if let Some(v) = file_cfg.account {
        settings.account = Some(v);
    }
    if let Some(v) = file_cfg.receipt_poll_interval_ms {
        settings.receipt_poll_interval_ms = v;
    }
    if let Some(v) = file_cfg.receipt_timeout_secs {
        settings.receipt_timeout_secs = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ATTENDANCE_RPC_URL") {
        settings.rpc_url = v;
    }
    if let Some(v) = lookup("APP__RPC_URL") {
        settings.rpc_url = v;
    }

    if let Some(v) = lookup("APP__CONTRACT_ADDRESS") {
        settings.contract_address = Some(v);
    }

    if let Some(v) = lookup("APP__ACCOUNT") {
        settings.account = Some(v);
    }

    if let Some(v) = lookup("APP__RECEIPT_POLL_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.receipt_poll_interval_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__RECEIPT_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.receipt_timeout_secs = parsed;
        }
    }
}

impl Settings {
    pub fn apply_overrides(
        &mut self,
        rpc_url: Option<String>,
        contract_address: Option<String>,
        account: Option<String>,
    ) {
        if let Some(v) = rpc_url {
            self.rpc_url = v;
        }
        if let Some(v) = contract_address {
            self.contract_address = Some(v);
        }
        if let Some(v) = account {
            self.account = Some(v);
        }
    }

    pub fn contract_address(&self) -> Result<Address> {
        let raw = self.contract_address.as_deref().ok_or_else(|| {
            anyhow!("contract address is not configured (set contract_address or APP__CONTRACT_ADDRESS)")
        })?;
        Address::parse(raw).with_context(|| format!("invalid contract address '{raw}'"))
    }

    pub fn rpc_settings(&self) -> Result<RpcSettings> {
        let url = Url::parse(self.rpc_url.trim())
            .with_context(|| format!("invalid rpc url '{}'", self.rpc_url))?;
        let account = self
            .account
            .as_deref()
            .map(|raw| {
                Address::parse(raw).with_context(|| format!("invalid account address '{raw}'"))
            })
            .transpose()?;

        let mut rpc = RpcSettings::new(url);
        rpc.account = account;
        rpc.receipt_poll_interval = Duration::from_millis(self.receipt_poll_interval_ms.max(1));
        rpc.receipt_timeout = Duration::from_secs(self.receipt_timeout_secs);
        Ok(rpc)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
