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

//! Error types for ledger ingestion, reconciliation and rendering.
//!
//! Fatal errors ([`ValidationError`], [`ConfigError`], [`InputError`],
//! [`PlanError`]) abort a run before any output is written. Rendering
//! problems are isolated per unit of work as [`RenderFailure`]s and only
//! surface at the end of a run as a [`RunError`].

use crate::base::{ClientId, InvoiceId, ReceiptId};
use crate::pipeline::UnitKey;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for whole-run operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed or out-of-range ledger records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate client `{0}`")]
    DuplicateClient(ClientId),

    #[error("duplicate invoice number `{0}`")]
    DuplicateInvoice(InvoiceId),

    #[error("duplicate receipt number `{0}`")]
    DuplicateReceipt(ReceiptId),

    /// Invoice or receipt references a client missing from the client list
    #[error("{record} references unknown client `{client}`")]
    UnknownClient { record: String, client: ClientId },

    #[error("invoice `{0}` has no line items")]
    EmptyInvoice(InvoiceId),

    /// Quantity, unit price, discount or tax below zero
    #[error("invoice `{invoice}` line {line}: {field} must not be negative")]
    NegativeLineItem {
        invoice: InvoiceId,
        line: usize,
        field: &'static str,
    },

    #[error("invoice `{invoice}` total {total} is negative")]
    NegativeInvoiceTotal { invoice: InvoiceId, total: Decimal },

    /// Refunds and empty receipts are rejected rather than flipped into debits
    #[error("receipt `{receipt}` amount {amount} must be positive")]
    NonPositiveReceipt { receipt: ReceiptId, amount: Decimal },
}

/// Internal allocation defects. Never produced by a valid ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("invariant violated: {amount} to invoice `{invoice}` over outstanding {outstanding}")]
    InvoiceOverAllocated {
        invoice: InvoiceId,
        amount: Decimal,
        outstanding: Decimal,
    },

    #[error("invariant violated: {amount} from receipt `{receipt}` exceeds remaining {remaining}")]
    ReceiptOverAllocated {
        receipt: ReceiptId,
        amount: Decimal,
        remaining: Decimal,
    },

    #[error("invariant violated: allocation amount {0} must be positive")]
    NonPositiveAllocation(Decimal),
}

/// Failure rendering a single unit of work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Text the output backend cannot encode
    #[error("unsupported character {ch:?} in `{text}`")]
    UnsupportedText { text: String, ch: char },

    /// A payment code was requested that the warm-up pass never produced
    #[error("QR code for `{0}` was not generated before rendering")]
    QrMissing(String),

    #[error("QR encoding failed: {0}")]
    QrEncoding(String),

    #[error("PDF backend error: {0}")]
    Pdf(String),

    #[error("I/O error writing {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("renderer panicked: {0}")]
    Panicked(String),
}

/// A [`RenderError`] tagged with the unit of work it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub unit: UnitKey,
    pub reason: RenderError,
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.reason)
    }
}

impl std::error::Error for RenderFailure {}

/// Aggregate signal for a run in which at least one unit failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} of {} units failed to render", failures.len(), failures.len() + written.len())]
pub struct RunError {
    /// Files that were still written successfully.
    pub written: Vec<PathBuf>,
    pub failures: Vec<RenderFailure>,
}

/// Settings file problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration field `{field}`: {message}")]
    Invalid { field: String, message: String },

    #[error("reporting period start {start} is after end {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
}

/// Ledger input (CSV) problems.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: {message}")]
    Row {
        path: PathBuf,
        row: usize,
        message: String,
    },
}

/// Problems turning configured outputs into units of work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Two units would write the same file
    #[error("output path {} is written by both {first} and {second}", path.display())]
    DuplicateOutput {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("output `{output}` path must contain the {placeholder} placeholder")]
    MissingPlaceholder {
        output: String,
        placeholder: &'static str,
    },
}

/// Top-level error for a complete run.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("cannot write balances: {0}")]
    Balances(#[from] csv::Error),
}
