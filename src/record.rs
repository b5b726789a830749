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

//! Ledger records: clients, invoices and receipts.
//!
//! A [`Ledger`] is the validated, immutable record set the rest of the crate
//! works from. Records are stored in input order; a record's position in its
//! arena is its input sequence number and breaks ties between records that
//! share a date.

use crate::base::{ClientId, InvoiceId, ReceiptId};
use crate::error::ValidationError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub display_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Client {
    pub fn new(id: impl Into<ClientId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            address: None,
            phone: None,
            email: None,
        }
    }

    /// Display name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub tax: Decimal,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
        }
    }

    /// `quantity × unit price`, before discount and tax.
    pub fn gross(&self) -> Decimal {
        self.quantity * self.unit_price
    }

    pub fn amount(&self) -> Decimal {
        self.gross() - self.discount + self.tax
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub client_id: ClientId,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub items: Vec<LineItem>,
}

impl Invoice {
    /// Creates an invoice due on its issue date.
    pub fn new(
        id: impl Into<InvoiceId>,
        client_id: impl Into<ClientId>,
        date: NaiveDate,
        items: Vec<LineItem>,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            date,
            due_date: date,
            items,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(LineItem::gross).sum()
    }

    pub fn discount(&self) -> Decimal {
        self.items.iter().map(|item| item.discount).sum()
    }

    pub fn tax(&self) -> Decimal {
        self.items.iter().map(|item| item.tax).sum()
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub client_id: ClientId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payment_mode: Option<String>,
    pub reference: Option<String>,
    pub note: Option<String>,
}

impl Receipt {
    pub fn new(
        id: impl Into<ReceiptId>,
        client_id: impl Into<ClientId>,
        date: NaiveDate,
        amount: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            date,
            amount,
            payment_mode: None,
            reference: None,
            note: None,
        }
    }
}

/// Payment state of an invoice, derived from its outstanding amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Open,
    PartiallyPaid,
    Paid,
}

impl InvoiceStatus {
    pub fn from_amounts(total: Decimal, outstanding: Decimal) -> Self {
        if outstanding <= Decimal::ZERO {
            Self::Paid
        } else if outstanding < total {
            Self::PartiallyPaid
        } else {
            Self::Open
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "Unpaid",
            Self::PartiallyPaid => "Partially paid",
            Self::Paid => "Paid",
        })
    }
}

/// Positions of one client's records, each list sorted by (date, sequence).
#[derive(Debug, Clone, Default)]
struct ClientBook {
    invoices: Vec<usize>,
    receipts: Vec<usize>,
}

/// Validated record set.
///
/// # Invariants
///
/// - Client, invoice and receipt identifiers are unique.
/// - Every invoice and receipt belongs to a known client.
/// - Invoice totals are non-negative; receipt amounts are positive.
#[derive(Debug, Clone)]
pub struct Ledger {
    clients: Vec<Client>,
    invoices: Vec<Invoice>,
    receipts: Vec<Receipt>,
    client_index: HashMap<ClientId, usize>,
    invoice_index: HashMap<InvoiceId, usize>,
    receipt_index: HashMap<ReceiptId, usize>,
    books: HashMap<ClientId, ClientBook>,
}

impl Ledger {
    /// Validates the records and indexes them per client.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, naming the offending record.
    pub fn new(
        clients: Vec<Client>,
        invoices: Vec<Invoice>,
        receipts: Vec<Receipt>,
    ) -> Result<Self, ValidationError> {
        let mut client_index = HashMap::with_capacity(clients.len());
        let mut books = HashMap::with_capacity(clients.len());
        for (seq, client) in clients.iter().enumerate() {
            match client_index.entry(client.id.clone()) {
                Entry::Occupied(_) => {
                    return Err(ValidationError::DuplicateClient(client.id.clone()));
                }
                Entry::Vacant(entry) => {
                    entry.insert(seq);
                    books.insert(client.id.clone(), ClientBook::default());
                }
            }
        }

        let mut invoice_index = HashMap::with_capacity(invoices.len());
        for (seq, invoice) in invoices.iter().enumerate() {
            validate_invoice(invoice)?;
            let book = books.get_mut(&invoice.client_id).ok_or_else(|| {
                ValidationError::UnknownClient {
                    record: format!("invoice `{}`", invoice.id),
                    client: invoice.client_id.clone(),
                }
            })?;
            if invoice_index.insert(invoice.id.clone(), seq).is_some() {
                return Err(ValidationError::DuplicateInvoice(invoice.id.clone()));
            }
            book.invoices.push(seq);
        }

        let mut receipt_index = HashMap::with_capacity(receipts.len());
        for (seq, receipt) in receipts.iter().enumerate() {
            if receipt.amount <= Decimal::ZERO {
                return Err(ValidationError::NonPositiveReceipt {
                    receipt: receipt.id.clone(),
                    amount: receipt.amount,
                });
            }
            let book = books.get_mut(&receipt.client_id).ok_or_else(|| {
                ValidationError::UnknownClient {
                    record: format!("receipt `{}`", receipt.id),
                    client: receipt.client_id.clone(),
                }
            })?;
            if receipt_index.insert(receipt.id.clone(), seq).is_some() {
                return Err(ValidationError::DuplicateReceipt(receipt.id.clone()));
            }
            book.receipts.push(seq);
        }

        // Stable sorts keep input order for same-date records.
        for book in books.values_mut() {
            book.invoices.sort_by_key(|&seq| invoices[seq].date);
            book.receipts.sort_by_key(|&seq| receipts[seq].date);
        }

        Ok(Self {
            clients,
            invoices,
            receipts,
            client_index,
            invoice_index,
            receipt_index,
            books,
        })
    }

    /// Clients in input order.
    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    /// Invoices in input order.
    pub fn invoices(&self) -> &[Invoice] {
        &self.invoices
    }

    /// Receipts in input order.
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn client(&self, id: &ClientId) -> Option<&Client> {
        self.client_index.get(id).map(|&seq| &self.clients[seq])
    }

    pub fn invoice(&self, id: &InvoiceId) -> Option<&Invoice> {
        self.invoice_index.get(id).map(|&seq| &self.invoices[seq])
    }

    pub fn receipt(&self, id: &ReceiptId) -> Option<&Receipt> {
        self.receipt_index.get(id).map(|&seq| &self.receipts[seq])
    }

    /// A client's invoices in chronological order.
    pub fn client_invoices<'a>(
        &'a self,
        id: &ClientId,
    ) -> impl Iterator<Item = &'a Invoice> + use<'a> {
        self.books
            .get(id)
            .into_iter()
            .flat_map(|book| book.invoices.iter())
            .map(|&seq| &self.invoices[seq])
    }

    /// A client's receipts in chronological order.
    pub fn client_receipts<'a>(
        &'a self,
        id: &ClientId,
    ) -> impl Iterator<Item = &'a Receipt> + use<'a> {
        self.books
            .get(id)
            .into_iter()
            .flat_map(|book| book.receipts.iter())
            .map(|&seq| &self.receipts[seq])
    }
}

fn validate_invoice(invoice: &Invoice) -> Result<(), ValidationError> {
    if invoice.items.is_empty() {
        return Err(ValidationError::EmptyInvoice(invoice.id.clone()));
    }
    for (index, item) in invoice.items.iter().enumerate() {
        let negative = [
            ("quantity", item.quantity),
            ("unit price", item.unit_price),
            ("discount", item.discount),
            ("tax", item.tax),
        ]
        .into_iter()
        .find(|(_, value)| *value < Decimal::ZERO);
        if let Some((field, _)) = negative {
            return Err(ValidationError::NegativeLineItem {
                invoice: invoice.id.clone(),
                line: index + 1,
                field,
            });
        }
    }
    let total = invoice.total();
    if total < Decimal::ZERO {
        return Err(ValidationError::NegativeInvoiceTotal {
            invoice: invoice.id.clone(),
            total,
        });
    }
    Ok(())
}
