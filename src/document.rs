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

//! Document models and their assembly.
//!
//! Assembly is a pure function of the ledger, the reconciliation, the
//! settings and a generation date. Documents hold raw figures; formatting is
//! left to the renderer.

use crate::base::{ClientId, InvoiceId, ReceiptId};
use crate::config::Settings;
use crate::engine::{AllocationSource, Reconciliation};
use crate::period::ReportingPeriod;
use crate::qr::QrPayload;
use crate::record::{Client, Invoice, InvoiceStatus, Ledger, LineItem, Receipt};
use crate::summary::{
    self, ClientSummary, MonthlyBalance, OverallTotals, StatusRow, TimelineEntry,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// A labelled amount shown in a summary's key-figures block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFigure {
    pub label: &'static str,
    pub amount: Decimal,
    /// e.g. `(3 invoices)` or `(Due)`; may be empty.
    pub note: String,
    /// Drawn emphasized (an amount the client owes).
    pub highlight: bool,
}

impl KeyFigure {
    fn counted(label: &'static str, amount: Decimal, count: usize, noun: &str) -> Self {
        Self {
            label,
            amount,
            note: format!("({count} {noun})"),
            highlight: false,
        }
    }

    fn balance(label: &'static str, amount: Decimal, credit_word: &str) -> Self {
        let note = if amount > Decimal::ZERO {
            "(Due)".to_string()
        } else if amount < Decimal::ZERO {
            format!("({credit_word})")
        } else {
            String::new()
        };
        Self {
            label,
            amount,
            note,
            highlight: amount > Decimal::ZERO,
        }
    }
}

/// A payment applied to an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentLine {
    pub receipt: ReceiptId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub source: AllocationSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDocument {
    pub number: InvoiceId,
    pub client: Client,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub paid: Decimal,
    pub outstanding: Decimal,
    pub status: InvoiceStatus,
    pub payments: Vec<PaymentLine>,
    /// Present while the invoice is not fully paid.
    #[serde(skip)]
    pub qr: Option<QrPayload>,
}

/// One line of a receipt: money applied to an invoice, or left as advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedLine {
    /// `None` for the advance (unapplied) part.
    pub invoice: Option<InvoiceId>,
    pub amount: Decimal,
}

impl AppliedLine {
    pub fn description(&self) -> String {
        match &self.invoice {
            Some(invoice) => format!("Payment for Invoice {invoice}"),
            None => "Advance Payment".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptDocument {
    pub number: ReceiptId,
    pub client: Client,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payment_mode: Option<String>,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub lines: Vec<AppliedLine>,
    pub unapplied: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRow {
    pub number: InvoiceId,
    pub date: NaiveDate,
    pub total: Decimal,
    pub outstanding: Decimal,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptRow {
    pub number: ReceiptId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payment_mode: Option<String>,
}

/// Account statement of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSummaryDocument {
    pub client: Client,
    pub period: Option<String>,
    pub generated: NaiveDate,
    pub key_figures: Vec<KeyFigure>,
    pub invoices: Vec<InvoiceRow>,
    pub receipts: Vec<ReceiptRow>,
    pub monthly: Vec<MonthlyBalance>,
    pub timeline: Vec<TimelineEntry>,
    pub closing_balance: Decimal,
    /// Present while the client owes money.
    #[serde(skip)]
    pub qr: Option<QrPayload>,
}

/// Business-wide summary for one output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverallSummaryDocument {
    pub title: String,
    pub period: Option<String>,
    pub generated: NaiveDate,
    pub key_figures: Vec<KeyFigure>,
    pub totals: OverallTotals,
    pub statuses: Vec<StatusRow>,
    pub monthly: Vec<MonthlyBalance>,
    pub clients: Vec<ClientSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Document {
    Invoice(Box<InvoiceDocument>),
    Receipt(Box<ReceiptDocument>),
    ClientSummary(Box<ClientSummaryDocument>),
    OverallSummary(Box<OverallSummaryDocument>),
}

impl Document {
    pub fn qr(&self) -> Option<&QrPayload> {
        match self {
            Document::Invoice(doc) => doc.qr.as_ref(),
            Document::ClientSummary(doc) => doc.qr.as_ref(),
            Document::Receipt(_) | Document::OverallSummary(_) => None,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Document::Invoice(doc) => format!("Invoice {}", doc.number),
            Document::Receipt(doc) => format!("Receipt {}", doc.number),
            Document::ClientSummary(doc) => {
                format!("Account Statement {}", doc.client.display_name())
            }
            Document::OverallSummary(doc) => doc.title.clone(),
        }
    }
}

/// Builds documents from a reconciled ledger.
pub struct Assembler<'a> {
    settings: &'a Settings,
    ledger: &'a Ledger,
    reconciliation: &'a Reconciliation,
    generated: NaiveDate,
}

impl<'a> Assembler<'a> {
    pub fn new(
        settings: &'a Settings,
        ledger: &'a Ledger,
        reconciliation: &'a Reconciliation,
        generated: NaiveDate,
    ) -> Self {
        Self {
            settings,
            ledger,
            reconciliation,
            generated,
        }
    }

    pub fn ledger(&self) -> &'a Ledger {
        self.ledger
    }

    fn client(&self, id: &ClientId) -> Client {
        self.ledger
            .client(id)
            .cloned()
            .unwrap_or_else(|| Client::new(id.clone()))
    }

    fn payment_code(&self, reference: &str, amount: Decimal) -> Option<QrPayload> {
        let upi = self.settings.payment.upi.as_ref()?;
        Some(QrPayload::new(
            upi,
            &self.settings.payment,
            &self.settings.seller.name,
            reference,
            amount,
            self.settings.invoice.decimals,
        ))
    }

    pub fn invoice(&self, invoice: &Invoice) -> InvoiceDocument {
        let payments: Vec<PaymentLine> = self
            .reconciliation
            .allocations_to(&invoice.id)
            .map(|alloc| PaymentLine {
                date: self
                    .ledger
                    .receipt(&alloc.receipt_id)
                    .map_or(invoice.date, |rec| rec.date),
                receipt: alloc.receipt_id.clone(),
                amount: alloc.amount,
                source: alloc.source,
            })
            .collect();
        let total = invoice.total();
        let paid: Decimal = payments.iter().map(|p| p.amount).sum();
        let outstanding = total - paid;

        InvoiceDocument {
            number: invoice.id.clone(),
            client: self.client(&invoice.client_id),
            date: invoice.date,
            due_date: invoice.due_date,
            items: invoice.items.clone(),
            subtotal: invoice.subtotal(),
            discount: invoice.discount(),
            tax: invoice.tax(),
            total,
            paid,
            outstanding,
            status: InvoiceStatus::from_amounts(total, outstanding),
            payments,
            qr: if outstanding > Decimal::ZERO {
                self.payment_code(invoice.id.as_str(), outstanding)
            } else {
                None
            },
        }
    }

    pub fn receipt(&self, receipt: &Receipt) -> ReceiptDocument {
        let mut lines: Vec<AppliedLine> = self
            .reconciliation
            .allocations_from(&receipt.id)
            .map(|alloc| AppliedLine {
                invoice: Some(alloc.invoice_id.clone()),
                amount: alloc.amount,
            })
            .collect();
        let applied: Decimal = lines.iter().map(|line| line.amount).sum();
        let unapplied = receipt.amount - applied;
        if unapplied > Decimal::ZERO {
            lines.push(AppliedLine {
                invoice: None,
                amount: unapplied,
            });
        }

        ReceiptDocument {
            number: receipt.id.clone(),
            client: self.client(&receipt.client_id),
            date: receipt.date,
            amount: receipt.amount,
            payment_mode: receipt.payment_mode.clone(),
            reference: receipt.reference.clone(),
            note: receipt.note.clone(),
            lines,
            unapplied,
        }
    }

    /// Statement for the client behind `summary`.
    pub fn client_summary(
        &self,
        summary: &ClientSummary,
        period: &ReportingPeriod,
    ) -> ClientSummaryDocument {
        let id = summary.client_id();
        let invoices = self
            .ledger
            .client_invoices(id)
            .filter(|inv| period.contains(inv.date))
            .map(|inv| {
                let total = inv.total();
                let outstanding = self
                    .reconciliation
                    .invoice_state(&inv.id)
                    .map_or(total, |state| state.outstanding());
                InvoiceRow {
                    number: inv.id.clone(),
                    date: inv.date,
                    total,
                    outstanding,
                    status: InvoiceStatus::from_amounts(total, outstanding),
                }
            })
            .collect();
        let receipts = self
            .ledger
            .client_receipts(id)
            .filter(|rec| period.contains(rec.date))
            .map(|rec| ReceiptRow {
                number: rec.id.clone(),
                date: rec.date,
                amount: rec.amount,
                payment_mode: rec.payment_mode.clone(),
            })
            .collect();

        let window = period.monthly_window(self.generated);
        let monthly = summary::monthly_balances(self.ledger, id, window)
            .into_iter()
            .filter(MonthlyBalance::has_activity)
            .collect();

        let closing = summary.closing_balance;
        ClientSummaryDocument {
            client: summary.client.clone(),
            period: period.text(&self.settings.invoice.date_format),
            generated: self.generated,
            key_figures: vec![
                KeyFigure::balance("Opening Balance", summary.opening_balance, "Advance"),
                KeyFigure::counted(
                    "Total Billed",
                    summary.invoice_total,
                    summary.invoice_count,
                    "invoices",
                ),
                KeyFigure::counted(
                    "Total Paid",
                    summary.receipt_total,
                    summary.receipt_count,
                    "receipts",
                ),
                KeyFigure::balance("Closing Balance", closing, "Advance"),
            ],
            invoices,
            receipts,
            monthly,
            timeline: summary::timeline(self.ledger, id, period),
            closing_balance: closing,
            qr: if closing > Decimal::ZERO {
                self.payment_code(id.as_str(), closing)
            } else {
                None
            },
        }
    }

    /// Overall summary of `summaries`, which must come from the same period.
    pub fn overall_summary(
        &self,
        title: impl Into<String>,
        summaries: &[ClientSummary],
        period: &ReportingPeriod,
    ) -> OverallSummaryDocument {
        let totals = OverallTotals::from_summaries(summaries);
        let window = period.monthly_window(self.generated);
        let histories: Vec<Vec<MonthlyBalance>> = summaries
            .iter()
            .map(|s| summary::monthly_balances(self.ledger, s.client_id(), window))
            .collect();

        OverallSummaryDocument {
            title: title.into(),
            period: period.text(&self.settings.invoice.date_format),
            generated: self.generated,
            key_figures: vec![
                KeyFigure::balance("Opening Balance", totals.opening_balance, "Overpaid"),
                KeyFigure::counted(
                    "Total Invoiced",
                    totals.invoice_total,
                    totals.invoice_count,
                    "invoices",
                ),
                KeyFigure::counted(
                    "Total Received",
                    totals.receipt_total,
                    totals.receipt_count,
                    "receipts",
                ),
                KeyFigure::balance("Closing Balance", totals.closing_balance, "Overpaid"),
            ],
            statuses: summary::status_breakdown(summaries),
            monthly: summary::aggregate_monthly(histories.iter().map(Vec::as_slice)),
            clients: summaries.iter().filter(|s| s.has_figures()).cloned().collect(),
            totals,
        }
    }
}
