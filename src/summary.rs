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

//! Period figures per client and across the business.
//!
//! Everything here is derived from the ledger and a [`ReportingPeriod`]:
//! opening balances come from records dated before the period, closing
//! balances from records up to its end.

use crate::base::ClientId;
use crate::period::{ReportingPeriod, first_of_month, months_between};
use crate::record::{Client, Ledger};
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Per-client figures for one reporting period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    pub client: Client,
    pub invoice_count: usize,
    pub receipt_count: usize,
    pub invoice_total: Decimal,
    pub receipt_total: Decimal,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
}

impl ClientSummary {
    pub fn client_id(&self) -> &ClientId {
        &self.client.id
    }

    /// Whether the client belongs in a client-wise listing.
    ///
    /// Clients with invoices always do; clients without invoices only when
    /// they carry a balance (e.g. pure advance payments).
    pub fn qualifies(&self) -> bool {
        self.invoice_count > 0 || !self.closing_balance.is_zero()
    }

    /// Any non-zero figure; rows without one are left out of overall listings.
    pub fn has_figures(&self) -> bool {
        [
            self.opening_balance,
            self.closing_balance,
            self.invoice_total,
            self.receipt_total,
        ]
        .iter()
        .any(|amount| !amount.is_zero())
    }

    pub fn status(&self) -> BalanceStatus {
        BalanceStatus::of(self.closing_balance)
    }
}

/// Closing position of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum BalanceStatus {
    Outstanding,
    Advance,
    Settled,
}

impl BalanceStatus {
    pub fn of(balance: Decimal) -> Self {
        if balance > Decimal::ZERO {
            Self::Outstanding
        } else if balance < Decimal::ZERO {
            Self::Advance
        } else {
            Self::Settled
        }
    }
}

impl fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Outstanding => "Outstanding",
            Self::Advance => "Advance",
            Self::Settled => "Settled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub status: BalanceStatus,
    pub clients: usize,
    pub amount: Decimal,
}

/// One month of a balance history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyBalance {
    /// First day of the month.
    pub month: NaiveDate,
    pub open: Decimal,
    pub invoiced: Decimal,
    pub received: Decimal,
    pub balance: Decimal,
}

impl MonthlyBalance {
    pub fn month_end(&self) -> NaiveDate {
        self.month
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(self.month)
    }

    pub fn has_activity(&self) -> bool {
        !self.invoiced.is_zero() || !self.received.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Invoice,
    Receipt,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invoice => "Invoice",
            Self::Receipt => "Receipt",
        })
    }
}

/// A line of a client statement with the running balance after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub date: NaiveDate,
    pub kind: EntryKind,
    pub reference: String,
    /// Positive for invoices, negative for receipts.
    pub amount: Decimal,
    pub balance: Decimal,
}

/// Business-wide figures for one period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverallTotals {
    pub invoice_count: usize,
    pub receipt_count: usize,
    pub invoice_total: Decimal,
    pub receipt_total: Decimal,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    /// Sum of positive closing balances.
    pub total_outstanding: Decimal,
    pub clients_outstanding: usize,
}

impl OverallTotals {
    pub fn from_summaries(summaries: &[ClientSummary]) -> Self {
        summaries.iter().fold(Self::default(), |mut totals, s| {
            totals.invoice_count += s.invoice_count;
            totals.receipt_count += s.receipt_count;
            totals.invoice_total += s.invoice_total;
            totals.receipt_total += s.receipt_total;
            totals.opening_balance += s.opening_balance;
            totals.closing_balance += s.closing_balance;
            if s.closing_balance > Decimal::ZERO {
                totals.total_outstanding += s.closing_balance;
                totals.clients_outstanding += 1;
            }
            totals
        })
    }
}

/// Summaries of every client with any record up to the period end.
///
/// Sorted by closing balance, then invoiced amount, both descending.
pub fn client_summaries(ledger: &Ledger, period: &ReportingPeriod) -> Vec<ClientSummary> {
    let mut summaries: Vec<ClientSummary> = ledger
        .clients()
        .iter()
        .filter_map(|client| summarize_client(ledger, client, period))
        .collect();
    summaries.sort_by(|a, b| {
        b.closing_balance
            .cmp(&a.closing_balance)
            .then(b.invoice_total.cmp(&a.invoice_total))
    });
    summaries
}

fn summarize_client(
    ledger: &Ledger,
    client: &Client,
    period: &ReportingPeriod,
) -> Option<ClientSummary> {
    let mut summary = ClientSummary {
        client: client.clone(),
        invoice_count: 0,
        receipt_count: 0,
        invoice_total: Decimal::ZERO,
        receipt_total: Decimal::ZERO,
        opening_balance: Decimal::ZERO,
        closing_balance: Decimal::ZERO,
    };
    let mut seen = false;

    for invoice in ledger.client_invoices(&client.id) {
        if !period.closes(invoice.date) {
            continue;
        }
        seen = true;
        let total = invoice.total();
        summary.closing_balance += total;
        if period.precedes(invoice.date) {
            summary.opening_balance += total;
        } else {
            summary.invoice_count += 1;
            summary.invoice_total += total;
        }
    }
    for receipt in ledger.client_receipts(&client.id) {
        if !period.closes(receipt.date) {
            continue;
        }
        seen = true;
        summary.closing_balance -= receipt.amount;
        if period.precedes(receipt.date) {
            summary.opening_balance -= receipt.amount;
        } else {
            summary.receipt_count += 1;
            summary.receipt_total += receipt.amount;
        }
    }

    seen.then_some(summary)
}

/// Clients per closing status, in `Outstanding, Advance, Settled` order.
/// Statuses with no clients are left out.
pub fn status_breakdown(summaries: &[ClientSummary]) -> Vec<StatusRow> {
    let mut rows: BTreeMap<BalanceStatus, StatusRow> = BTreeMap::new();
    for summary in summaries {
        let status = summary.status();
        let row = rows.entry(status).or_insert(StatusRow {
            status,
            clients: 0,
            amount: Decimal::ZERO,
        });
        row.clients += 1;
        row.amount += summary.closing_balance;
    }
    rows.into_values().collect()
}

/// Month-by-month balance of one client over `window` (inclusive).
///
/// The first month opens with everything dated before it.
pub fn monthly_balances(
    ledger: &Ledger,
    client_id: &ClientId,
    window: (NaiveDate, NaiveDate),
) -> Vec<MonthlyBalance> {
    let (start, end) = window;
    let months = months_between(start, end);
    let Some(&first) = months.first() else {
        return Vec::new();
    };

    let mut opening = Decimal::ZERO;
    let mut invoiced: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    let mut received: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();

    for invoice in ledger.client_invoices(client_id).filter(|inv| inv.date <= end) {
        let month = first_of_month(invoice.date);
        if month < first {
            opening += invoice.total();
        } else {
            *invoiced.entry(month).or_default() += invoice.total();
        }
    }
    for receipt in ledger.client_receipts(client_id).filter(|rec| rec.date <= end) {
        let month = first_of_month(receipt.date);
        if month < first {
            opening -= receipt.amount;
        } else {
            *received.entry(month).or_default() += receipt.amount;
        }
    }

    let mut balance = opening;
    months
        .into_iter()
        .map(|month| {
            let open = balance;
            let invoiced = invoiced.get(&month).copied().unwrap_or_default();
            let received = received.get(&month).copied().unwrap_or_default();
            balance = open + invoiced - received;
            MonthlyBalance {
                month,
                open,
                invoiced,
                received,
                balance,
            }
        })
        .collect()
}

/// Sums per-client histories month by month, keeping months with activity.
pub fn aggregate_monthly<'a>(
    histories: impl IntoIterator<Item = &'a [MonthlyBalance]>,
) -> Vec<MonthlyBalance> {
    let mut months: BTreeMap<NaiveDate, MonthlyBalance> = BTreeMap::new();
    for history in histories {
        for row in history {
            let total = months.entry(row.month).or_insert(MonthlyBalance {
                month: row.month,
                open: Decimal::ZERO,
                invoiced: Decimal::ZERO,
                received: Decimal::ZERO,
                balance: Decimal::ZERO,
            });
            total.open += row.open;
            total.invoiced += row.invoiced;
            total.received += row.received;
            total.balance += row.balance;
        }
    }
    months.into_values().filter(MonthlyBalance::has_activity).collect()
}

/// A client's invoices and receipts within `period`, oldest first, with the
/// running balance including everything before the period.
pub fn timeline(
    ledger: &Ledger,
    client_id: &ClientId,
    period: &ReportingPeriod,
) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = ledger
        .client_invoices(client_id)
        .map(|inv| TimelineEntry {
            date: inv.date,
            kind: EntryKind::Invoice,
            reference: inv.id.to_string(),
            amount: inv.total(),
            balance: Decimal::ZERO,
        })
        .chain(ledger.client_receipts(client_id).map(|rec| TimelineEntry {
            date: rec.date,
            kind: EntryKind::Receipt,
            reference: rec.id.to_string(),
            amount: -rec.amount,
            balance: Decimal::ZERO,
        }))
        .filter(|entry| period.closes(entry.date))
        .collect();

    // Stable: same-day invoices stay ahead of receipts.
    entries.sort_by_key(|entry| entry.date);

    let mut balance = Decimal::ZERO;
    for entry in &mut entries {
        balance += entry.amount;
        entry.balance = balance;
    }
    entries.retain(|entry| !period.precedes(entry.date));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Invoice, LineItem, Receipt};
    use rust_decimal_macros::dec;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn invoice(id: &str, client: &str, when: NaiveDate, amount: Decimal) -> Invoice {
        Invoice::new(id, client, when, vec![LineItem::new("Work", dec!(1), amount)])
    }

    fn sample_ledger() -> Ledger {
        Ledger::new(
            vec![Client::new("C1"), Client::new("C2"), Client::new("C3"), Client::new("C4")],
            vec![
                invoice("INV-1", "C1", date(1, 5), dec!(100)),
                invoice("INV-2", "C1", date(2, 10), dec!(50)),
                invoice("INV-3", "C2", date(2, 1), dec!(200)),
            ],
            vec![
                Receipt::new("R-1", "C1", date(1, 20), dec!(80)),
                Receipt::new("R-2", "C2", date(2, 3), dec!(200)),
                Receipt::new("R-3", "C3", date(2, 4), dec!(25)),
            ],
        )
        .unwrap()
    }

    fn find<'a>(summaries: &'a [ClientSummary], id: &str) -> &'a ClientSummary {
        summaries.iter().find(|s| s.client.id.as_str() == id).unwrap()
    }

    #[test]
    fn summaries_split_opening_and_period_activity() {
        let ledger = sample_ledger();
        let period = ReportingPeriod::new(Some(date(2, 1)), Some(date(2, 28))).unwrap();
        let summaries = client_summaries(&ledger, &period);

        let c1 = find(&summaries, "C1");
        assert_eq!(c1.opening_balance, dec!(20));
        assert_eq!(c1.invoice_count, 1);
        assert_eq!(c1.invoice_total, dec!(50));
        assert_eq!(c1.receipt_count, 0);
        assert_eq!(c1.closing_balance, dec!(70));

        // C4 has no records at all
        assert!(summaries.iter().all(|s| s.client.id.as_str() != "C4"));
    }

    #[test]
    fn summaries_sorted_by_closing_balance_descending() {
        let ledger = sample_ledger();
        let summaries = client_summaries(&ledger, &ReportingPeriod::all());
        let order: Vec<&str> = summaries.iter().map(|s| s.client.id.as_str()).collect();
        assert_eq!(order, vec!["C1", "C2", "C3"]);
    }

    #[test]
    fn inclusion_rule() {
        let ledger = sample_ledger();
        let summaries = client_summaries(&ledger, &ReportingPeriod::all());

        // Settled but invoiced
        assert!(find(&summaries, "C2").qualifies());
        // Advance credit without invoices
        assert!(find(&summaries, "C3").qualifies());

        let idle = ClientSummary {
            client: Client::new("C9"),
            invoice_count: 0,
            receipt_count: 0,
            invoice_total: Decimal::ZERO,
            receipt_total: Decimal::ZERO,
            opening_balance: Decimal::ZERO,
            closing_balance: Decimal::ZERO,
        };
        assert!(!idle.qualifies());
    }

    #[test]
    fn breakdown_groups_by_status() {
        let ledger = sample_ledger();
        let summaries = client_summaries(&ledger, &ReportingPeriod::all());
        let rows = status_breakdown(&summaries);
        assert_eq!(
            rows,
            vec![
                StatusRow { status: BalanceStatus::Outstanding, clients: 1, amount: dec!(70) },
                StatusRow { status: BalanceStatus::Advance, clients: 1, amount: dec!(-25) },
                StatusRow { status: BalanceStatus::Settled, clients: 1, amount: dec!(0) },
            ]
        );
    }

    #[test]
    fn overall_totals() {
        let ledger = sample_ledger();
        let summaries = client_summaries(&ledger, &ReportingPeriod::all());
        let totals = OverallTotals::from_summaries(&summaries);
        assert_eq!(totals.invoice_total, dec!(350));
        assert_eq!(totals.receipt_total, dec!(305));
        assert_eq!(totals.closing_balance, dec!(45));
        assert_eq!(totals.total_outstanding, dec!(70));
        assert_eq!(totals.clients_outstanding, 1);
    }

    #[test]
    fn monthly_balances_carry_forward() {
        let ledger = sample_ledger();
        let rows = monthly_balances(&ledger, &ClientId::from("C1"), (date(2, 1), date(3, 31)));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].month, date(2, 1));
        assert_eq!(rows[0].open, dec!(20));
        assert_eq!(rows[0].invoiced, dec!(50));
        assert_eq!(rows[0].balance, dec!(70));
        assert_eq!(rows[1].open, dec!(70));
        assert!(!rows[1].has_activity());
        assert_eq!(rows[0].month_end(), date(2, 29));
    }

    #[test]
    fn aggregate_drops_quiet_months() {
        let ledger = sample_ledger();
        let window = (date(1, 1), date(3, 31));
        let histories: Vec<Vec<MonthlyBalance>> = ["C1", "C2"]
            .iter()
            .map(|id| monthly_balances(&ledger, &ClientId::from(*id), window))
            .collect();
        let total = aggregate_monthly(histories.iter().map(Vec::as_slice));
        assert_eq!(total.len(), 2);
        assert_eq!(total[1].invoiced, dec!(250));
        assert_eq!(total[1].received, dec!(200));
    }

    #[test]
    fn timeline_runs_balance_from_before_the_period() {
        let ledger = sample_ledger();
        let period = ReportingPeriod::new(Some(date(2, 1)), None).unwrap();
        let entries = timeline(&ledger, &ClientId::from("C1"), &period);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reference, "INV-2");
        assert_eq!(entries[0].balance, dec!(70));

        let all = timeline(&ledger, &ClientId::from("C1"), &ReportingPeriod::all());
        let kinds: Vec<EntryKind> = all.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::Invoice, EntryKind::Receipt, EntryKind::Invoice]);
        assert_eq!(all[1].amount, dec!(-80));
    }
}
