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

//! Rendering pipeline integration tests.
//!
//! Planning, the QR warm-up and the worker fan-out are exercised with a stub
//! renderer that can be told to fail or panic on chosen units. The fan-out
//! tests run under parking_lot's deadlock detector.

use bulk_invoicer::error::{Error, PlanError, RenderError};
use bulk_invoicer::{
    Assembler, Client, Document, Invoice, Ledger, LineItem, PdfRenderer, Pipeline, Plan, QrCache,
    Receipt, Reconciler, Reconciliation, Renderer, Settings, UnitKey, warm_qr_cache,
};
use chrono::NaiveDate;
use parking_lot::deadlock;
use rust_decimal_macros::dec;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// === Fixtures ===

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
}

fn item(amount: rust_decimal::Decimal) -> Vec<LineItem> {
    vec![LineItem::new("Tuition", dec!(1), amount)]
}

/// C1 owes money, C2 and C3 hold advance credit, C4 has no records.
fn sample_ledger() -> Ledger {
    Ledger::new(
        vec![
            Client::new("C1"),
            Client::new("C2"),
            Client::new("C3"),
            Client::new("C4"),
        ],
        vec![
            Invoice::new("INV-1", "C1", day(1), item(dec!(1000))),
            Invoice::new("INV-2", "C1", day(10), item(dec!(500))),
            Invoice::new("INV-3", "C2", day(2), item(dec!(300))),
        ],
        vec![
            Receipt::new("R-1", "C1", day(5), dec!(400)),
            Receipt::new("R-2", "C2", day(3), dec!(800)),
            Receipt::new("R-3", "C3", day(4), dec!(200)),
        ],
    )
    .unwrap()
}

fn settings(outputs: &str) -> Settings {
    Settings::from_json(&format!(
        r#"{{
            "seller": {{ "name": "Acme Tutors" }},
            "payment": {{
                "currency": "INR",
                "upi": {{
                    "upi-id": "acme@okbank",
                    "transaction-note": "Invoice {{INVOICE_NUMBER}}"
                }}
            }},
            "input": {{
                "clients": "clients.csv",
                "invoices": "invoices.csv",
                "receipts": "receipts.csv"
            }},
            "output": {{ {outputs} }}
        }}"#
    ))
    .unwrap()
}

fn out(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).display().to_string()
}

struct Fixture {
    settings: Settings,
    ledger: Ledger,
    reconciliation: Reconciliation,
}

impl Fixture {
    fn new(settings: Settings, ledger: Ledger) -> Self {
        let reconciliation = Reconciler::new(&ledger).run().unwrap();
        Self {
            settings,
            ledger,
            reconciliation,
        }
    }

    fn plan(&self) -> bulk_invoicer::Result<Plan> {
        let assembler = Assembler::new(&self.settings, &self.ledger, &self.reconciliation, day(30));
        Plan::build(&self.settings, &assembler)
    }
}

/// Writes each unit's title; fails or panics on request.
#[derive(Default)]
struct StubRenderer {
    calls: AtomicUsize,
    fail_on: Option<&'static str>,
    panic_on: Option<&'static str>,
}

impl Renderer for StubRenderer {
    fn render(
        &self,
        title: &str,
        documents: &[Document],
        qr: &QrCache,
    ) -> Result<Vec<u8>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(title) {
            return Err(RenderError::Pdf("stub failure".into()));
        }
        if self.panic_on == Some(title) {
            panic!("stub panic");
        }
        for payload in documents.iter().filter_map(Document::qr) {
            qr.get(payload)?;
        }
        Ok(title.as_bytes().to_vec())
    }
}

// === Deadlock Detection Infrastructure ===

fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

// === Planning Tests ===

#[test]
fn combined_output_orders_summary_invoices_receipts() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""all": {{ "type": "combined", "path": "{}", "include-summary": true }}"#,
            out(&dir, "all.pdf")
        )),
        sample_ledger(),
    );

    let plan = fixture.plan().unwrap();
    assert_eq!(plan.len(), 1);
    let unit = &plan.units()[0];
    assert_eq!(unit.key, UnitKey::Combined { output: "all".into() });

    let titles: Vec<String> = unit.documents.iter().map(Document::title).collect();
    assert_eq!(
        titles,
        vec![
            "all",
            "Invoice INV-1",
            "Invoice INV-2",
            "Invoice INV-3",
            "Receipt R-1",
            "Receipt R-2",
            "Receipt R-3",
        ]
    );
}

#[test]
fn clients_output_skips_clients_without_activity() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""statements": {{ "type": "clients", "path": "{}", "include-summary": true }}"#,
            out(&dir, "clients/{CLIENT}.pdf")
        )),
        sample_ledger(),
    );

    let plan = fixture.plan().unwrap();
    let mut paths: Vec<String> = plan
        .units()
        .iter()
        .map(|u| u.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    paths.sort();
    // C4 has neither invoices nor a balance; C3 is pure advance credit
    assert_eq!(paths, vec!["C1.pdf", "C2.pdf", "C3.pdf", "summary.pdf"]);

    let c1 = plan
        .units()
        .iter()
        .find(|u| u.path.ends_with("C1.pdf"))
        .unwrap();
    assert!(matches!(c1.documents[0], Document::ClientSummary(_)));
    assert_eq!(c1.documents.len(), 4);
}

#[test]
fn clients_output_without_summary_skips_empty_statements() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""statements": {{ "type": "clients", "path": "{}", "start-date": "2024-04-06" }}"#,
            out(&dir, "clients/{CLIENT}.pdf")
        )),
        sample_ledger(),
    );

    // C2 and C3 still hold credit at the close but have nothing dated in the period
    let plan = fixture.plan().unwrap();
    assert_eq!(plan.len(), 1);
    let unit = &plan.units()[0];
    assert!(unit.path.ends_with("C1.pdf"));
    let titles: Vec<String> = unit.documents.iter().map(Document::title).collect();
    assert_eq!(titles, vec!["Invoice INV-2"]);
    assert!(plan.units().iter().all(|u| !u.documents.is_empty()));
}

#[test]
fn individual_output_respects_period() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""singles": {{ "type": "individual", "path": "{}", "start-date": "2024-04-03" }}"#,
            out(&dir, "docs/{NUMBER}.pdf")
        )),
        sample_ledger(),
    );

    let plan = fixture.plan().unwrap();
    let keys: Vec<String> = plan.units().iter().map(|u| u.key.to_string()).collect();
    assert_eq!(
        keys,
        vec![
            "singles: invoice INV-2",
            "singles: receipt R-1",
            "singles: receipt R-2",
            "singles: receipt R-3",
        ]
    );
    assert!(plan.units()[0].path.ends_with("docs/INV-2.pdf"));
}

#[test]
fn template_without_placeholder_is_rejected() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""singles": {{ "type": "individual", "path": "{}" }}"#,
            out(&dir, "docs/one.pdf")
        )),
        sample_ledger(),
    );

    assert!(matches!(
        fixture.plan(),
        Err(Error::Plan(PlanError::MissingPlaceholder { placeholder: "{NUMBER}", .. }))
    ));
}

#[test]
fn duplicate_output_path_is_rejected_before_rendering() {
    let dir = TempDir::new().unwrap();
    let path = out(&dir, "all.pdf");
    let fixture = Fixture::new(
        settings(&format!(
            r#""a": {{ "type": "combined", "path": "{path}" }},
               "b": {{ "type": "combined", "path": "{path}" }}"#
        )),
        sample_ledger(),
    );

    match fixture.plan() {
        Err(Error::Plan(PlanError::DuplicateOutput { path: dup, first, second })) => {
            assert_eq!(dup, Path::new(&path));
            assert_eq!(first, "a: combined");
            assert_eq!(second, "b: combined");
        }
        other => panic!("expected duplicate output error, got {other:?}"),
    }
    assert!(!Path::new(&path).exists());
}

// === QR Warm-up Tests ===

#[test]
fn shared_payment_codes_are_generated_once() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""all": {{ "type": "combined", "path": "{}" }},
               "statements": {{ "type": "clients", "path": "{}", "include-summary": true }},
               "singles": {{ "type": "individual", "path": "{}" }}"#,
            out(&dir, "all.pdf"),
            out(&dir, "clients/{CLIENT}.pdf"),
            out(&dir, "docs/{NUMBER}.pdf"),
        )),
        sample_ledger(),
    );

    let plan = fixture.plan().unwrap();
    // INV-1 and INV-2 in three outputs each, plus the C1 statement
    assert_eq!(plan.payloads().count(), 7);

    let cache = warm_qr_cache(&plan);
    assert_eq!(cache.generations(), 3);
    assert_eq!(cache.len(), 3);
}

#[test]
fn unwarmed_cache_fails_only_units_needing_codes() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""singles": {{ "type": "individual", "path": "{}" }}"#,
            out(&dir, "docs/{NUMBER}.pdf")
        )),
        sample_ledger(),
    );

    let renderer = StubRenderer::default();
    let report = Pipeline::new(&renderer, 4).run(fixture.plan().unwrap(), QrCache::new().freeze());

    assert_eq!(report.written.len(), 4);
    let failed: Vec<String> = report.failures.iter().map(|f| f.unit.to_string()).collect();
    assert_eq!(failed, vec!["singles: invoice INV-1", "singles: invoice INV-2"]);
    assert!(
        report
            .failures
            .iter()
            .all(|f| matches!(f.reason, RenderError::QrMissing(_)))
    );
}

// === Fan-out Tests ===

#[test]
fn failing_and_panicking_units_do_not_stop_siblings() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""singles": {{ "type": "individual", "path": "{}" }}"#,
            out(&dir, "docs/{NUMBER}.pdf")
        )),
        sample_ledger(),
    );
    let plan = fixture.plan().unwrap();
    let qr = warm_qr_cache(&plan);

    let renderer = StubRenderer {
        fail_on: Some("Invoice INV-2"),
        panic_on: Some("Receipt R-1"),
        ..Default::default()
    };
    let report = Pipeline::new(&renderer, 3).run(plan, qr);

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 6);
    assert_eq!(report.written.len(), 4);
    assert!(report.written.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        fs::read_to_string(dir.path().join("docs/INV-1.pdf")).unwrap(),
        "Invoice INV-1"
    );
    assert!(!dir.path().join("docs/INV-2.pdf").exists());

    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].reason, RenderError::Pdf("stub failure".into()));
    assert_eq!(report.failures[1].reason, RenderError::Panicked("stub panic".into()));

    let err = report.into_result().unwrap_err();
    assert_eq!(err.to_string(), "2 of 6 units failed to render");
    assert_eq!(err.written.len(), 4);
}

#[test]
fn unwritable_path_is_reported_as_io_failure() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("blocker"), b"file, not a directory").unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""all": {{ "type": "combined", "path": "{}" }},
               "ok": {{ "type": "combined", "path": "{}" }}"#,
            out(&dir, "blocker/all.pdf"),
            out(&dir, "ok.pdf"),
        )),
        sample_ledger(),
    );
    let plan = fixture.plan().unwrap();
    let qr = warm_qr_cache(&plan);

    let renderer = StubRenderer::default();
    let report = Pipeline::new(&renderer, 2).run(plan, qr);

    assert_eq!(report.written, vec![dir.path().join("ok.pdf")]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].reason, RenderError::Io { .. }));
}

#[test]
fn no_deadlock_many_workers_many_units() {
    let detector = start_deadlock_detector();

    const NUM_INVOICES: usize = 300;
    const NUM_WORKERS: usize = 16;

    let clients = (0..10).map(|c| Client::new(format!("C{c}"))).collect();
    let invoices = (0..NUM_INVOICES)
        .map(|i| {
            let date = day(1 + (i % 28) as u32);
            Invoice::new(format!("INV-{i}"), format!("C{}", i % 10), date, item(dec!(100)))
        })
        .collect();
    let receipts = (0..10)
        .map(|c| Receipt::new(format!("R-{c}"), format!("C{c}"), day(15), dec!(1000)))
        .collect();
    let ledger = Ledger::new(clients, invoices, receipts).unwrap();

    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""singles": {{ "type": "individual", "path": "{}" }}"#,
            out(&dir, "docs/{NUMBER}.pdf")
        )),
        ledger,
    );
    let plan = fixture.plan().unwrap();
    let qr = warm_qr_cache(&plan);

    let renderer = StubRenderer::default();
    let report = Pipeline::new(&renderer, NUM_WORKERS).run(plan, qr);

    stop_deadlock_detector(detector);

    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.written.len(), NUM_INVOICES + 10);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), NUM_INVOICES + 10);
}

#[test]
fn workers_are_at_least_one() {
    let renderer = StubRenderer::default();
    assert_eq!(Pipeline::new(&renderer, 0).workers(), 1);
    assert!(Pipeline::default_workers() >= 1);
}

#[test]
fn empty_plan_writes_nothing() {
    let renderer = StubRenderer::default();
    let report = Pipeline::new(&renderer, 4).run(Plan::default(), QrCache::new().freeze());
    assert!(report.is_success());
    assert!(report.written.is_empty());
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
}

// === End-to-end ===

#[test]
fn pdf_renderer_writes_every_output() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new(
        settings(&format!(
            r#""all": {{ "type": "combined", "path": "{}", "include-summary": true }},
               "statements": {{ "type": "clients", "path": "{}", "include-summary": true }}"#,
            out(&dir, "all.pdf"),
            out(&dir, "clients/{CLIENT}.pdf"),
        )),
        sample_ledger(),
    );
    let plan = fixture.plan().unwrap();
    let qr = warm_qr_cache(&plan);

    let renderer = PdfRenderer::new(fixture.settings.clone());
    let written = Pipeline::new(&renderer, 2).run(plan, qr).into_result().unwrap();

    assert_eq!(written.len(), 5);
    for path in &written {
        let bytes = fs::read(path).unwrap();
        assert!(bytes.starts_with(b"%PDF"), "{} is not a PDF", path.display());
    }

    // Every document of the combined file is reachable from the outline
    let combined = fs::read(dir.path().join("all.pdf")).unwrap();
    for entry in ["(Invoice INV-1)", "(Invoice INV-3)", "(Receipt R-1)", "(Receipt R-3)"] {
        assert!(
            combined.windows(entry.len()).any(|w| w == entry.as_bytes()),
            "missing outline entry {entry}"
        );
    }
}
