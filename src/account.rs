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

//! Reconciled client accounts.
//!
//! A [`ClientAccount`] holds the derived payment state of one client's
//! invoices and receipts together with the allocations linking them.
//! Entities are referenced by position in the account (oldest first) and by
//! identifier in each [`Allocation`]; nothing points back from an invoice to
//! the receipts that paid it.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use bulk_invoicer::{ClientAccount, ClientId};
//!
//! let account = ClientAccount::new(ClientId::from("C1"));
//! assert_eq!(account.balance(), dec!(0));
//! ```

use crate::base::{ClientId, InvoiceId, ReceiptId};
use crate::engine::{Allocation, AllocationSource};
use crate::error::ReconciliationError;
use crate::record::InvoiceStatus;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Payment progress of one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceState {
    pub invoice_id: InvoiceId,
    pub date: NaiveDate,
    pub total: Decimal,
    pub allocated: Decimal,
}

impl InvoiceState {
    pub fn outstanding(&self) -> Decimal {
        self.total - self.allocated
    }

    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_amounts(self.total, self.outstanding())
    }
}

/// Allocation progress of one receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptState {
    pub receipt_id: ReceiptId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub allocated: Decimal,
}

impl ReceiptState {
    /// Amount not matched to any invoice (advance credit).
    pub fn remaining(&self) -> Decimal {
        self.amount - self.allocated
    }
}

/// Reconciled state of a single client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAccount {
    client_id: ClientId,
    invoices: Vec<InvoiceState>,
    receipts: Vec<ReceiptState>,
    allocations: Vec<Allocation>,
}

impl ClientAccount {
    const DECIMAL_PRECISION: u32 = 2;

    /// View of the account's totals that serializes them at `decimals` places.
    pub fn rounded(&self, decimals: u32) -> RoundedAccount<'_> {
        RoundedAccount {
            account: self,
            decimals,
        }
    }

    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            invoices: Vec::new(),
            receipts: Vec::new(),
            allocations: Vec::new(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Invoices, oldest first.
    pub fn invoices(&self) -> &[InvoiceState] {
        &self.invoices
    }

    /// Receipts, oldest first.
    pub fn receipts(&self) -> &[ReceiptState] {
        &self.receipts
    }

    /// Allocations in the order they were made.
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn total_invoiced(&self) -> Decimal {
        self.invoices.iter().map(|inv| inv.total).sum()
    }

    pub fn total_received(&self) -> Decimal {
        self.receipts.iter().map(|rec| rec.amount).sum()
    }

    /// Sum of unpaid invoice amounts.
    pub fn outstanding(&self) -> Decimal {
        self.invoices.iter().map(InvoiceState::outstanding).sum()
    }

    /// Receipt money not matched to any invoice.
    pub fn unapplied_credit(&self) -> Decimal {
        self.receipts.iter().map(ReceiptState::remaining).sum()
    }

    /// Returns `total invoiced - total received`.
    ///
    /// Positive means the client owes money, negative means advance credit.
    pub fn balance(&self) -> Decimal {
        self.total_invoiced() - self.total_received()
    }

    pub(crate) fn push_invoice(
        &mut self,
        invoice_id: InvoiceId,
        date: NaiveDate,
        total: Decimal,
    ) -> usize {
        self.invoices.push(InvoiceState {
            invoice_id,
            date,
            total,
            allocated: Decimal::ZERO,
        });
        self.invoices.len() - 1
    }

    pub(crate) fn push_receipt(
        &mut self,
        receipt_id: ReceiptId,
        date: NaiveDate,
        amount: Decimal,
    ) -> usize {
        self.receipts.push(ReceiptState {
            receipt_id,
            date,
            amount,
            allocated: Decimal::ZERO,
        });
        self.receipts.len() - 1
    }

    pub(crate) fn invoice(&self, pos: usize) -> &InvoiceState {
        &self.invoices[pos]
    }

    pub(crate) fn receipt(&self, pos: usize) -> &ReceiptState {
        &self.receipts[pos]
    }

    /// Moves `amount` from receipt `rec` onto invoice `inv`.
    ///
    /// # Errors
    ///
    /// Any [`ReconciliationError`] means the caller computed a bad amount;
    /// the account is left unchanged.
    pub(crate) fn allocate(
        &mut self,
        inv: usize,
        rec: usize,
        amount: Decimal,
        source: AllocationSource,
    ) -> Result<(), ReconciliationError> {
        if amount <= Decimal::ZERO {
            return Err(ReconciliationError::NonPositiveAllocation(amount));
        }
        let invoice = &self.invoices[inv];
        if amount > invoice.outstanding() {
            return Err(ReconciliationError::InvoiceOverAllocated {
                invoice: invoice.invoice_id.clone(),
                amount,
                outstanding: invoice.outstanding(),
            });
        }
        let receipt = &self.receipts[rec];
        if amount > receipt.remaining() {
            return Err(ReconciliationError::ReceiptOverAllocated {
                receipt: receipt.receipt_id.clone(),
                amount,
                remaining: receipt.remaining(),
            });
        }

        self.allocations.push(Allocation {
            receipt_id: receipt.receipt_id.clone(),
            invoice_id: invoice.invoice_id.clone(),
            amount,
            source,
        });
        self.invoices[inv].allocated += amount;
        self.receipts[rec].allocated += amount;
        self.assert_invariants();
        Ok(())
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.invoices.iter().all(|inv| inv.allocated <= inv.total),
            "Invariant violated: invoice allocated beyond its total"
        );
        debug_assert!(
            self.receipts.iter().all(|rec| rec.allocated <= rec.amount),
            "Invariant violated: receipt allocated beyond its amount"
        );
        debug_assert_eq!(
            self.balance(),
            self.outstanding() - self.unapplied_credit(),
            "Invariant violated: balance differs from outstanding minus credit"
        );
    }
}

impl Serialize for ClientAccount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.rounded(Self::DECIMAL_PRECISION).serialize(serializer)
    }
}

/// Client totals rounded and rescaled to a fixed number of decimal places.
#[derive(Debug, Clone, Copy)]
pub struct RoundedAccount<'a> {
    account: &'a ClientAccount,
    decimals: u32,
}

impl Serialize for RoundedAccount<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let round = |value: Decimal| {
            let mut rounded = value.round_dp(self.decimals);
            rounded.rescale(self.decimals);
            rounded
        };
        let account = self.account;
        let mut state = serializer.serialize_struct("ClientAccount", 6)?;
        state.serialize_field("client", &account.client_id)?;
        state.serialize_field("invoiced", &round(account.total_invoiced()))?;
        state.serialize_field("received", &round(account.total_received()))?;
        state.serialize_field("outstanding", &round(account.outstanding()))?;
        state.serialize_field("credit", &round(account.unapplied_credit()))?;
        state.serialize_field("balance", &round(account.balance()))?;
        state.end()
    }
}
