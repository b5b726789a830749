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

//! Property-based tests for reconciliation, period summaries and the QR cache.
//!
//! These tests verify invariants that should hold for any ledger of valid
//! invoices and receipts.

use bulk_invoicer::config::{PaymentSettings, UpiSettings};
use bulk_invoicer::summary::client_summaries;
use bulk_invoicer::{
    Client, ClientId, Invoice, Ledger, LineItem, QrCache, QrPayload, Receipt, Reconciler,
    ReportingPeriod,
};
use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

const CLIENTS: [&str; 3] = ["C1", "C2", "C3"];

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Invoice total from 0 to 10000 with 2 decimal places.
fn arb_total() -> impl Strategy<Value = Decimal> {
    (0i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Positive receipt amount up to 10000 with 2 decimal places.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// (client index, day offset, amount)
fn arb_records(
    amount: impl Strategy<Value = Decimal>,
) -> impl Strategy<Value = Vec<(usize, u64, Decimal)>> {
    prop::collection::vec((0..CLIENTS.len(), 0u64..120, amount), 0..25)
}

fn date(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(offset)
}

fn build_ledger(invoices: &[(usize, u64, Decimal)], receipts: &[(usize, u64, Decimal)]) -> Ledger {
    let invoices = invoices
        .iter()
        .enumerate()
        .map(|(i, &(client, day, total))| {
            Invoice::new(
                format!("INV-{i}"),
                CLIENTS[client],
                date(day),
                vec![LineItem::new("Item", Decimal::ONE, total)],
            )
        })
        .collect();
    let receipts = receipts
        .iter()
        .enumerate()
        .map(|(i, &(client, day, amount))| {
            Receipt::new(format!("R-{i}"), CLIENTS[client], date(day), amount)
        })
        .collect();
    Ledger::new(CLIENTS.iter().map(|&id| Client::new(id)).collect(), invoices, receipts).unwrap()
}

// =============================================================================
// Allocation Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Every invoice is allocated at most its total, and exactly the sum of
    /// the allocations that name it.
    #[test]
    fn invoice_allocation_bounded_and_consistent(
        invoices in arb_records(arb_total()),
        receipts in arb_records(arb_amount()),
    ) {
        let ledger = build_ledger(&invoices, &receipts);
        let recon = Reconciler::new(&ledger).run().unwrap();

        for account in recon.accounts() {
            for state in account.invoices() {
                let sum: Decimal = recon.allocations_to(&state.invoice_id).map(|a| a.amount).sum();
                prop_assert!(state.allocated <= state.total);
                prop_assert_eq!(sum, state.allocated);
            }
        }
    }

    /// No receipt gives away more than it brought in.
    #[test]
    fn receipt_allocation_bounded(
        invoices in arb_records(arb_total()),
        receipts in arb_records(arb_amount()),
    ) {
        let ledger = build_ledger(&invoices, &receipts);
        let recon = Reconciler::new(&ledger).run().unwrap();

        for account in recon.accounts() {
            for state in account.receipts() {
                let sum: Decimal = recon
                    .allocations_from(&state.receipt_id)
                    .map(|a| a.amount)
                    .sum();
                prop_assert!(sum <= state.amount);
                prop_assert!(state.remaining() >= Decimal::ZERO);
            }
        }
        prop_assert!(recon.allocations().all(|a| a.amount > Decimal::ZERO));
    }

    /// Balance is exactly invoiced minus received, however the money was matched.
    #[test]
    fn balance_is_exact(
        invoices in arb_records(arb_total()),
        receipts in arb_records(arb_amount()),
    ) {
        let ledger = build_ledger(&invoices, &receipts);
        let recon = Reconciler::new(&ledger).run().unwrap();

        for (idx, id) in CLIENTS.iter().enumerate() {
            let invoiced: Decimal = invoices.iter().filter(|r| r.0 == idx).map(|r| r.2).sum();
            let received: Decimal = receipts.iter().filter(|r| r.0 == idx).map(|r| r.2).sum();
            let account = recon.account(&ClientId::from(*id)).unwrap();

            prop_assert_eq!(account.balance(), invoiced - received);
            prop_assert_eq!(account.balance(), account.outstanding() - account.unapplied_credit());
        }
    }

    /// Credit is only left over once every invoice is paid.
    #[test]
    fn credit_implies_nothing_outstanding(
        invoices in arb_records(arb_total()),
        receipts in arb_records(arb_amount()),
    ) {
        let ledger = build_ledger(&invoices, &receipts);
        let recon = Reconciler::new(&ledger).run().unwrap();

        for account in recon.accounts() {
            if account.unapplied_credit() > Decimal::ZERO {
                prop_assert_eq!(account.outstanding(), Decimal::ZERO);
            }
        }
    }

    /// Running twice over the same ledger gives identical results.
    #[test]
    fn reconciliation_is_idempotent(
        invoices in arb_records(arb_total()),
        receipts in arb_records(arb_amount()),
    ) {
        let ledger = build_ledger(&invoices, &receipts);
        let first = Reconciler::new(&ledger).run().unwrap();
        let second = Reconciler::new(&ledger).run().unwrap();
        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// Period Summary Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Opening plus period movement gives the closing balance.
    #[test]
    fn closing_is_opening_plus_movement(
        invoices in arb_records(arb_total()),
        receipts in arb_records(arb_amount()),
        start in 0u64..120,
        len in 0u64..60,
    ) {
        let ledger = build_ledger(&invoices, &receipts);
        let period = ReportingPeriod::new(Some(date(start)), Some(date(start + len))).unwrap();

        for summary in client_summaries(&ledger, &period) {
            prop_assert_eq!(
                summary.closing_balance,
                summary.opening_balance + summary.invoice_total - summary.receipt_total
            );
        }
    }

    /// Over all time the closing balance is the reconciled balance.
    #[test]
    fn unbounded_period_matches_reconciliation(
        invoices in arb_records(arb_total()),
        receipts in arb_records(arb_amount()),
    ) {
        let ledger = build_ledger(&invoices, &receipts);
        let recon = Reconciler::new(&ledger).run().unwrap();

        for summary in client_summaries(&ledger, &ReportingPeriod::all()) {
            let account = recon.account(summary.client_id()).unwrap();
            prop_assert_eq!(summary.closing_balance, account.balance());
            prop_assert_eq!(summary.opening_balance, Decimal::ZERO);
        }
    }

    /// Summaries are ordered by closing balance, highest first.
    #[test]
    fn summaries_sorted_by_closing_balance(
        invoices in arb_records(arb_total()),
        receipts in arb_records(arb_amount()),
    ) {
        let ledger = build_ledger(&invoices, &receipts);
        let summaries = client_summaries(&ledger, &ReportingPeriod::all());
        for pair in summaries.windows(2) {
            prop_assert!(pair[0].closing_balance >= pair[1].closing_balance);
        }
    }
}

// =============================================================================
// QR Cache Tests
// =============================================================================

fn upi() -> (UpiSettings, PaymentSettings) {
    let upi = UpiSettings {
        upi_id: "acme@okbank".to_string(),
        payee_name: None,
        include_amount: true,
        transaction_note: "Invoice {INVOICE_NUMBER}".to_string(),
        bottom_note: None,
    };
    let payment = PaymentSettings {
        currency: "INR".to_string(),
        payment_methods_text: None,
        upi: Some(upi.clone()),
    };
    (upi, payment)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// N documents sharing M distinct payloads cost exactly M encodings.
    #[test]
    fn warm_generates_each_distinct_payload_once(
        refs in prop::collection::vec(0usize..6, 1..40),
    ) {
        let (upi, payment) = upi();
        let payloads: Vec<QrPayload> = refs
            .iter()
            .map(|r| {
                let amount = Decimal::new(10_000, 2);
                QrPayload::new(&upi, &payment, "Acme", &format!("INV-{r}"), amount, 2)
            })
            .collect();
        let distinct = refs.iter().collect::<std::collections::HashSet<_>>().len();

        let mut cache = QrCache::new();
        prop_assert_eq!(cache.warm(&payloads), distinct);
        prop_assert_eq!(cache.warm(&payloads), 0);

        let cache = cache.freeze();
        prop_assert_eq!(cache.generations(), distinct);
        for payload in &payloads {
            prop_assert!(cache.get(payload).is_ok());
        }
    }
}
