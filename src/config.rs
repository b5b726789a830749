// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Run settings loaded from a JSON file.
//!
//! [`Settings::load`] parses and validates in one step; the returned value is
//! never mutated afterwards and is shared by reference with every worker.

use crate::error::ConfigError;
use crate::period::ReportingPeriod;
use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static UPI_ID: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{2,256}@[A-Za-z]{2,64}$"));

const MAX_NAME: usize = 50;
const MAX_TAGLINE: usize = 100;
const MAX_NOTE: usize = 50;
const MAX_DECIMALS: u32 = 6;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    pub seller: SellerSettings,
    #[serde(default)]
    pub invoice: InvoiceSettings,
    #[serde(default)]
    pub receipt: ReceiptSettings,
    #[serde(default)]
    pub signature: Option<SignatureSettings>,
    #[serde(default)]
    pub payment: PaymentSettings,
    #[serde(default)]
    pub footer: FooterSettings,
    pub input: InputSettings,
    pub output: BTreeMap<String, OutputSettings>,
    /// Rendering threads; defaults to the available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SellerSettings {
    pub name: String,
    #[serde(default)]
    pub tagline: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InvoiceSettings {
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(default = "default_true")]
    pub show_subtotal: bool,
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            show_subtotal: true,
            date_format: default_date_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReceiptSettings {
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            date_format: default_date_format(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SignatureSettings {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PaymentSettings {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub payment_methods_text: Option<String>,
    #[serde(default)]
    pub upi: Option<UpiSettings>,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            payment_methods_text: None,
            upi: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct UpiSettings {
    pub upi_id: String,
    /// Defaults to the seller name.
    #[serde(default)]
    pub payee_name: Option<String>,
    #[serde(default = "default_true")]
    pub include_amount: bool,
    /// `{INVOICE_NUMBER}` is replaced by the document reference.
    #[serde(default)]
    pub transaction_note: String,
    #[serde(default)]
    pub bottom_note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FooterSettings {
    #[serde(default)]
    pub text: Option<String>,
}

/// Ledger CSV files.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InputSettings {
    pub clients: PathBuf,
    pub invoices: PathBuf,
    pub receipts: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Everything in one file.
    Combined,
    /// One statement file per client.
    Clients,
    /// One file per invoice and per receipt.
    Individual,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    /// File path template; may use `{CLIENT}` and `{NUMBER}`.
    pub path: String,
    #[serde(default)]
    pub include_summary: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl OutputSettings {
    pub fn period(&self) -> Result<ReportingPeriod, ConfigError> {
        ReportingPeriod::new(self.start_date, self.end_date)
    }
}

fn default_decimals() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_date_format() -> String {
    "%Y-%m-%d".into()
}

fn default_currency() -> String {
    "INR".into()
}

impl Settings {
    /// Reads, parses and validates a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(data)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let name_len = self.seller.name.chars().count();
        if name_len == 0 || name_len > MAX_NAME {
            return Err(invalid("seller.name", format!("must be 1 to {MAX_NAME} characters")));
        }
        check_len("seller.tagline", self.seller.tagline.as_deref(), MAX_TAGLINE)?;

        check_decimals("invoice.decimals", self.invoice.decimals)?;
        check_decimals("receipt.decimals", self.receipt.decimals)?;
        check_date_format("invoice.date-format", &self.invoice.date_format)?;
        check_date_format("receipt.date-format", &self.receipt.date_format)?;

        if let Some(signature) = &self.signature {
            check_len("signature.prefix", signature.prefix.as_deref(), MAX_NOTE)?;
            check_len("signature.text", signature.text.as_deref(), MAX_NOTE)?;
        }

        if self.payment.currency.trim().is_empty() {
            return Err(invalid("payment.currency", "must not be empty"));
        }
        check_len(
            "payment.payment-methods-text",
            self.payment.payment_methods_text.as_deref(),
            MAX_NOTE,
        )?;
        if let Some(upi) = &self.payment.upi {
            let pattern = UPI_ID
                .as_ref()
                .map_err(|e| invalid("payment.upi.upi-id", e.to_string()))?;
            if !pattern.is_match(&upi.upi_id) {
                return Err(invalid(
                    "payment.upi.upi-id",
                    format!("`{}` is not a valid UPI id", upi.upi_id),
                ));
            }
            check_len("payment.upi.payee-name", upi.payee_name.as_deref(), MAX_NAME)?;
            check_len("payment.upi.transaction-note", Some(&upi.transaction_note), MAX_NOTE)?;
            check_len("payment.upi.bottom-note", upi.bottom_note.as_deref(), MAX_NOTE)?;
        }

        if self.output.is_empty() {
            return Err(invalid("output", "at least one output must be configured"));
        }
        for (name, output) in &self.output {
            if output.path.trim().is_empty() {
                return Err(invalid(format!("output.{name}.path"), "must not be empty"));
            }
            output.period()?;
        }

        if self.workers == Some(0) {
            return Err(invalid("workers", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        message: message.into(),
    }
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), ConfigError> {
    match value {
        Some(v) if v.chars().count() > max => {
            Err(invalid(field, format!("must be at most {max} characters")))
        }
        _ => Ok(()),
    }
}

fn check_decimals(field: &str, decimals: u32) -> Result<(), ConfigError> {
    if decimals > MAX_DECIMALS {
        return Err(invalid(field, format!("must be between 0 and {MAX_DECIMALS}")));
    }
    Ok(())
}

fn check_date_format(field: &str, format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(invalid(field, format!("`{format}` is not a valid date format")));
    }
    Ok(())
}
