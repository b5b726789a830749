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

//! # Bulk Invoicer
//!
//! Batch generation of invoices, receipts and account statements from a
//! small business ledger.
//!
//! ## Core Components
//!
//! - [`Ledger`]: validated clients, invoices and receipts
//! - [`Reconciler`]: matches receipts to invoices, oldest first, keeping
//!   over-payment as advance credit
//! - [`ClientAccount`]: reconciled state of one client
//! - [`summary`]: period figures, monthly balances and timelines
//! - [`Plan`] and [`Pipeline`]: turn configured outputs into units of work
//!   and render them in parallel against a frozen [`QrCache`]
//!
//! ## Example
//!
//! ```
//! use bulk_invoicer::{
//!     Client, ClientId, Invoice, InvoiceStatus, LineItem, Ledger, Receipt, Reconciler,
//! };
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let day = |d| NaiveDate::from_ymd_opt(2024, 4, d).unwrap();
//! let ledger = Ledger::new(
//!     vec![Client::new("C1")],
//!     vec![Invoice::new(
//!         "INV-1",
//!         "C1",
//!         day(1),
//!         vec![LineItem::new("Tuition", dec!(1), dec!(1000))],
//!     )],
//!     vec![Receipt::new("R-1", "C1", day(5), dec!(400))],
//! )
//! .unwrap();
//!
//! let reconciliation = Reconciler::new(&ledger).run().unwrap();
//! let account = reconciliation.account(&ClientId::from("C1")).unwrap();
//! assert_eq!(account.balance(), dec!(600));
//! assert_eq!(account.invoices()[0].status(), InvoiceStatus::PartiallyPaid);
//! ```
//!
//! ## Thread Safety
//!
//! Everything up to the QR warm-up runs on the calling thread. Rendering
//! workers share the plan's documents by value and the QR cache read-only.

pub mod account;
mod base;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod input;
pub mod output_registry;
pub mod period;
pub mod pipeline;
pub mod qr;
pub mod record;
pub mod render;
pub mod summary;

pub use account::{ClientAccount, InvoiceState, ReceiptState, RoundedAccount};
pub use base::{ClientId, InvoiceId, ReceiptId};
pub use config::Settings;
pub use document::{Assembler, Document};
pub use engine::{Allocation, AllocationSource, Reconciler, Reconciliation};
pub use error::{Error, Result};
pub use output_registry::OutputRegistry;
pub use period::ReportingPeriod;
pub use pipeline::{Pipeline, Plan, RunReport, UnitKey, UnitOfWork, warm_qr_cache};
pub use qr::{QrCache, QrPayload};
pub use record::{Client, Invoice, InvoiceStatus, Ledger, LineItem, Receipt};
pub use render::{PdfRenderer, Renderer};
