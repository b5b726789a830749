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

//! Reconciliation engine.
//!
//! The [`Reconciler`] matches each client's receipts against their invoices,
//! oldest invoice first, and derives invoice statuses, advance credit and
//! balances.
//!
//! # Matching
//!
//! Each client's records are walked as one timeline ordered by date. On the
//! same date invoices come before receipts; records of the same kind keep
//! their input order.
//!
//! - **Invoice**: draws on the unapplied-credit pool, oldest credit first.
//! - **Receipt**: pays outstanding invoices, oldest first. Whatever is left
//!   joins the credit pool.
//!
//! Zero-total invoices are paid on arrival and never take part in matching.
//! Over-payment is never an error; the excess simply stays as credit.
//!
//! The engine is a pure function of the [`Ledger`]: running it twice on the
//! same ledger yields identical allocations.

use crate::account::{ClientAccount, InvoiceState, ReceiptState};
use crate::base::{ClientId, InvoiceId, ReceiptId};
use crate::error::ReconciliationError;
use crate::record::Ledger;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Where the money of an allocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationSource {
    /// Applied as the receipt arrived.
    Direct,
    /// Drawn from earlier over-payment held as credit.
    Credit,
}

/// Part or all of a receipt applied to one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub receipt_id: ReceiptId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub source: AllocationSource,
}

/// Output of a reconciliation run: one account per client, in client input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    accounts: Vec<ClientAccount>,
    by_client: HashMap<ClientId, usize>,
    invoices: HashMap<InvoiceId, (usize, usize)>,
    receipts: HashMap<ReceiptId, (usize, usize)>,
}

impl Reconciliation {
    pub fn accounts(&self) -> &[ClientAccount] {
        &self.accounts
    }

    pub fn account(&self, client_id: &ClientId) -> Option<&ClientAccount> {
        self.by_client.get(client_id).map(|&idx| &self.accounts[idx])
    }

    pub fn invoice_state(&self, invoice_id: &InvoiceId) -> Option<&InvoiceState> {
        self.invoices
            .get(invoice_id)
            .map(|&(acc, pos)| self.accounts[acc].invoice(pos))
    }

    pub fn receipt_state(&self, receipt_id: &ReceiptId) -> Option<&ReceiptState> {
        self.receipts
            .get(receipt_id)
            .map(|&(acc, pos)| self.accounts[acc].receipt(pos))
    }

    /// Every allocation, grouped by client.
    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.accounts.iter().flat_map(|account| account.allocations())
    }

    /// Allocations made from a receipt, in the order they were made.
    pub fn allocations_from<'a>(
        &'a self,
        receipt_id: &ReceiptId,
    ) -> impl Iterator<Item = &'a Allocation> + use<'a> {
        let receipt_id = receipt_id.clone();
        self.receipts
            .get(&receipt_id)
            .into_iter()
            .flat_map(move |&(acc, _)| self.accounts[acc].allocations())
            .filter(move |alloc| alloc.receipt_id == receipt_id)
    }

    /// Allocations made to an invoice, in the order they were made.
    pub fn allocations_to<'a>(
        &'a self,
        invoice_id: &InvoiceId,
    ) -> impl Iterator<Item = &'a Allocation> + use<'a> {
        let invoice_id = invoice_id.clone();
        self.invoices
            .get(&invoice_id)
            .into_iter()
            .flat_map(move |&(acc, _)| self.accounts[acc].allocations())
            .filter(move |alloc| alloc.invoice_id == invoice_id)
    }
}

/// Allocates receipts to invoices for every client of a ledger.
pub struct Reconciler<'a> {
    ledger: &'a Ledger,
}

impl<'a> Reconciler<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        Reconciler { ledger }
    }

    /// Reconciles every client.
    ///
    /// # Errors
    ///
    /// Only [`ReconciliationError`]s, which signal a defect in the matching
    /// itself; a validated ledger never produces one.
    pub fn run(&self) -> Result<Reconciliation, ReconciliationError> {
        info!(clients = self.ledger.clients().len(), "Matching payments to invoices");

        let mut accounts = Vec::with_capacity(self.ledger.clients().len());
        let mut by_client = HashMap::new();
        let mut invoices = HashMap::new();
        let mut receipts = HashMap::new();

        for client in self.ledger.clients() {
            let account = self.reconcile_client(&client.id)?;
            let idx = accounts.len();
            for (pos, state) in account.invoices().iter().enumerate() {
                invoices.insert(state.invoice_id.clone(), (idx, pos));
            }
            for (pos, state) in account.receipts().iter().enumerate() {
                receipts.insert(state.receipt_id.clone(), (idx, pos));
            }
            debug!(
                client = %client.id,
                balance = %account.balance(),
                credit = %account.unapplied_credit(),
                "Client reconciled"
            );
            by_client.insert(client.id.clone(), idx);
            accounts.push(account);
        }

        info!("Payments matched to invoices");
        Ok(Reconciliation {
            accounts,
            by_client,
            invoices,
            receipts,
        })
    }

    /// Reconciles a single client's timeline.
    pub fn reconcile_client(
        &self,
        client_id: &ClientId,
    ) -> Result<ClientAccount, ReconciliationError> {
        let mut account = ClientAccount::new(client_id.clone());
        for invoice in self.ledger.client_invoices(client_id) {
            account.push_invoice(invoice.id.clone(), invoice.date, invoice.total());
        }
        for receipt in self.ledger.client_receipts(client_id) {
            account.push_receipt(receipt.id.clone(), receipt.date, receipt.amount);
        }

        let invoice_count = account.invoices().len();
        let receipt_count = account.receipts().len();

        // Unpaid invoices already reached on the timeline, oldest first.
        let mut unpaid: VecDeque<usize> = VecDeque::new();
        // Receipts with money left over, oldest first.
        let mut credit: VecDeque<usize> = VecDeque::new();

        let (mut next_inv, mut next_rec) = (0, 0);
        while next_inv < invoice_count || next_rec < receipt_count {
            let take_invoice = next_rec >= receipt_count
                || (next_inv < invoice_count
                    && account.invoice(next_inv).date <= account.receipt(next_rec).date);

            if take_invoice {
                let inv = next_inv;
                next_inv += 1;
                if account.invoice(inv).total.is_zero() {
                    continue;
                }
                settle_invoice(&mut account, inv, &mut credit)?;
                if account.invoice(inv).outstanding() > Decimal::ZERO {
                    unpaid.push_back(inv);
                }
            } else {
                let rec = next_rec;
                next_rec += 1;
                while let Some(&inv) = unpaid.front() {
                    let amount = account
                        .invoice(inv)
                        .outstanding()
                        .min(account.receipt(rec).remaining());
                    if amount <= Decimal::ZERO {
                        break;
                    }
                    account.allocate(inv, rec, amount, AllocationSource::Direct)?;
                    if account.invoice(inv).outstanding().is_zero() {
                        unpaid.pop_front();
                    }
                }
                if account.receipt(rec).remaining() > Decimal::ZERO {
                    credit.push_back(rec);
                }
            }
        }

        Ok(account)
    }
}

/// Draws credit, oldest first, onto invoice `inv` until it is paid or the pool is empty.
fn settle_invoice(
    account: &mut ClientAccount,
    inv: usize,
    credit: &mut VecDeque<usize>,
) -> Result<(), ReconciliationError> {
    while let Some(&rec) = credit.front() {
        let amount = account.invoice(inv).outstanding().min(account.receipt(rec).remaining());
        if amount <= Decimal::ZERO {
            break;
        }
        account.allocate(inv, rec, amount, AllocationSource::Credit)?;
        if account.receipt(rec).remaining().is_zero() {
            credit.pop_front();
        }
    }
    Ok(())
}
