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

//! Parallel document generation.
//!
//! A run has three phases:
//!
//! 1. **Plan** ([`Plan::build`]): every configured output becomes units of
//!    work, each owning one output path. Paths are claimed in an
//!    [`OutputRegistry`]; a clash aborts the run before anything is written.
//! 2. **Warm** ([`warm_qr_cache`]): every payment code referenced by any unit
//!    is encoded on the calling thread, then the cache is frozen.
//! 3. **Fan out** ([`Pipeline::run`]): a fixed pool of scoped worker threads
//!    pulls units from a channel, renders and writes them. A failing or
//!    panicking unit is recorded in the [`RunReport`] and never stops its
//!    siblings.

use crate::base::{ClientId, InvoiceId, ReceiptId};
use crate::config::{OutputKind, OutputSettings, Settings};
use crate::document::{Assembler, Document};
use crate::error::{PlanError, RenderError, RenderFailure, Result, RunError};
use crate::output_registry::OutputRegistry;
use crate::period::ReportingPeriod;
use crate::qr::{QrCache, QrPayload};
use crate::record::{Invoice, Receipt};
use crate::render::Renderer;
use crate::summary::{self, ClientSummary};
use crossbeam::channel;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

const CLIENT_PLACEHOLDER: &str = "{CLIENT}";
const NUMBER_PLACEHOLDER: &str = "{NUMBER}";
/// Substituted for the placeholder in the path of a summary unit.
const SUMMARY_NAME: &str = "summary";

/// Identity of a unit of work: the output it belongs to plus its subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKey {
    Combined { output: String },
    Summary { output: String },
    Client { output: String, client: ClientId },
    Invoice { output: String, invoice: InvoiceId },
    Receipt { output: String, receipt: ReceiptId },
}

impl UnitKey {
    pub fn output(&self) -> &str {
        match self {
            UnitKey::Combined { output }
            | UnitKey::Summary { output }
            | UnitKey::Client { output, .. }
            | UnitKey::Invoice { output, .. }
            | UnitKey::Receipt { output, .. } => output,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKey::Combined { output } => write!(f, "{output}: combined"),
            UnitKey::Summary { output } => write!(f, "{output}: summary"),
            UnitKey::Client { output, client } => write!(f, "{output}: client {client}"),
            UnitKey::Invoice { output, invoice } => write!(f, "{output}: invoice {invoice}"),
            UnitKey::Receipt { output, receipt } => write!(f, "{output}: receipt {receipt}"),
        }
    }
}

/// Documents rendered together into one output file.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    pub key: UnitKey,
    pub path: PathBuf,
    pub title: String,
    pub documents: Vec<Document>,
}

impl UnitOfWork {
    /// Payment codes the unit's documents need.
    pub fn payloads(&self) -> impl Iterator<Item = &QrPayload> {
        self.documents.iter().filter_map(Document::qr)
    }
}

/// Every unit of a run, in planning order.
#[derive(Debug, Default)]
pub struct Plan {
    units: Vec<UnitOfWork>,
}

impl Plan {
    /// Expands each configured output into units of work.
    ///
    /// # Errors
    ///
    /// [`PlanError`] when a path template lacks its placeholder or two units
    /// would write the same file.
    pub fn build(settings: &Settings, assembler: &Assembler<'_>) -> Result<Self> {
        let registry = OutputRegistry::new();
        let mut plan = Plan::default();

        for (name, output) in &settings.output {
            let period = output.period()?;
            let before = plan.units.len();
            plan.expand(name, output, &period, assembler)?;
            for unit in &plan.units[before..] {
                registry.claim(&unit.path, &unit.key)?;
            }
            debug!(output = %name, units = plan.units.len() - before, "Output planned");
        }

        info!(units = plan.units.len(), "Planned units of work");
        Ok(plan)
    }

    pub fn from_units(units: Vec<UnitOfWork>) -> std::result::Result<Self, PlanError> {
        let registry = OutputRegistry::new();
        for unit in &units {
            registry.claim(&unit.path, &unit.key)?;
        }
        Ok(Self { units })
    }

    pub fn units(&self) -> &[UnitOfWork] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn payloads(&self) -> impl Iterator<Item = &QrPayload> {
        self.units.iter().flat_map(UnitOfWork::payloads)
    }

    fn expand(
        &mut self,
        name: &str,
        output: &OutputSettings,
        period: &ReportingPeriod,
        assembler: &Assembler<'_>,
    ) -> std::result::Result<(), PlanError> {
        let ledger = assembler.ledger();
        let summaries = summary::client_summaries(ledger, period);
        let invoices: Vec<&Invoice> = ledger
            .invoices()
            .iter()
            .filter(|inv| period.contains(inv.date))
            .collect();
        let receipts: Vec<&Receipt> = ledger
            .receipts()
            .iter()
            .filter(|rec| period.contains(rec.date))
            .collect();
        let overall = |title: String| {
            Document::OverallSummary(Box::new(assembler.overall_summary(title, &summaries, period)))
        };

        match output.kind {
            OutputKind::Combined => {
                let mut documents = Vec::with_capacity(invoices.len() + receipts.len() + 1);
                if output.include_summary {
                    documents.push(overall(name.to_string()));
                }
                documents.extend(
                    invoices
                        .iter()
                        .map(|inv| Document::Invoice(Box::new(assembler.invoice(inv)))),
                );
                documents.extend(
                    receipts
                        .iter()
                        .map(|rec| Document::Receipt(Box::new(assembler.receipt(rec)))),
                );
                self.units.push(UnitOfWork {
                    key: UnitKey::Combined { output: name.to_string() },
                    path: PathBuf::from(&output.path),
                    title: name.to_string(),
                    documents,
                });
            }
            OutputKind::Clients => {
                require_placeholder(name, &output.path, CLIENT_PLACEHOLDER)?;
                if output.include_summary {
                    let document = overall("Overall Summary".to_string());
                    self.push_summary(name, output, CLIENT_PLACEHOLDER, document);
                }
                for client in summaries.iter().filter(|s| s.qualifies()) {
                    let unit =
                        client_unit(name, output, client, period, &invoices, &receipts, assembler);
                    match unit {
                        Some(unit) => self.units.push(unit),
                        None => debug!(
                            output = %name,
                            client = %client.client_id(),
                            "Skipping client with nothing to render in period"
                        ),
                    }
                }
            }
            OutputKind::Individual => {
                require_placeholder(name, &output.path, NUMBER_PLACEHOLDER)?;
                if output.include_summary {
                    let document = overall(format!("{name} Overall Summary"));
                    self.push_summary(name, output, NUMBER_PLACEHOLDER, document);
                }
                for inv in &invoices {
                    let doc = Document::Invoice(Box::new(assembler.invoice(inv)));
                    self.units.push(UnitOfWork {
                        key: UnitKey::Invoice {
                            output: name.to_string(),
                            invoice: inv.id.clone(),
                        },
                        path: fill(&output.path, NUMBER_PLACEHOLDER, inv.id.as_str()),
                        title: doc.title(),
                        documents: vec![doc],
                    });
                }
                for rec in &receipts {
                    let doc = Document::Receipt(Box::new(assembler.receipt(rec)));
                    self.units.push(UnitOfWork {
                        key: UnitKey::Receipt {
                            output: name.to_string(),
                            receipt: rec.id.clone(),
                        },
                        path: fill(&output.path, NUMBER_PLACEHOLDER, rec.id.as_str()),
                        title: doc.title(),
                        documents: vec![doc],
                    });
                }
            }
        }
        Ok(())
    }

    fn push_summary(
        &mut self,
        name: &str,
        output: &OutputSettings,
        placeholder: &str,
        document: Document,
    ) {
        self.units.push(UnitOfWork {
            key: UnitKey::Summary { output: name.to_string() },
            path: fill(&output.path, placeholder, SUMMARY_NAME),
            title: document.title(),
            documents: vec![document],
        });
    }
}

/// The client's statement unit, or `None` when it would hold no documents.
fn client_unit(
    name: &str,
    output: &OutputSettings,
    client: &ClientSummary,
    period: &ReportingPeriod,
    invoices: &[&Invoice],
    receipts: &[&Receipt],
    assembler: &Assembler<'_>,
) -> Option<UnitOfWork> {
    let id = client.client_id();
    let mut documents = Vec::new();
    if output.include_summary {
        documents.push(Document::ClientSummary(Box::new(assembler.client_summary(client, period))));
    }
    documents.extend(
        invoices
            .iter()
            .filter(|inv| &inv.client_id == id)
            .map(|inv| Document::Invoice(Box::new(assembler.invoice(inv)))),
    );
    documents.extend(
        receipts
            .iter()
            .filter(|rec| &rec.client_id == id)
            .map(|rec| Document::Receipt(Box::new(assembler.receipt(rec)))),
    );
    if documents.is_empty() {
        return None;
    }
    Some(UnitOfWork {
        key: UnitKey::Client {
            output: name.to_string(),
            client: id.clone(),
        },
        path: fill(&output.path, CLIENT_PLACEHOLDER, id.as_str()),
        title: id.to_string(),
        documents,
    })
}

fn require_placeholder(
    name: &str,
    path: &str,
    placeholder: &'static str,
) -> std::result::Result<(), PlanError> {
    if path.contains(placeholder) {
        Ok(())
    } else {
        Err(PlanError::MissingPlaceholder {
            output: name.to_string(),
            placeholder,
        })
    }
}

fn fill(template: &str, placeholder: &str, value: &str) -> PathBuf {
    PathBuf::from(template.replace(placeholder, value))
}

/// Encodes every payment code of `plan` once and freezes the cache.
pub fn warm_qr_cache(plan: &Plan) -> Arc<QrCache> {
    let mut cache = QrCache::new();
    let generated = cache.warm(plan.payloads());
    info!(generated, "Payment codes generated");
    cache.freeze()
}

/// Outcome of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<RenderFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn sort(&mut self) {
        self.written.sort();
        self.failures.sort_by(|a, b| a.unit.cmp(&b.unit));
    }

    /// # Errors
    ///
    /// [`RunError`] when any unit failed; it still lists the written files.
    pub fn into_result(self) -> std::result::Result<Vec<PathBuf>, RunError> {
        if self.failures.is_empty() {
            Ok(self.written)
        } else {
            Err(RunError {
                written: self.written,
                failures: self.failures,
            })
        }
    }
}

/// Bounded pool of rendering workers.
pub struct Pipeline<'a> {
    renderer: &'a dyn Renderer,
    workers: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(renderer: &'a dyn Renderer, workers: usize) -> Self {
        Self {
            renderer,
            workers: workers.max(1),
        }
    }

    /// One worker per available core.
    pub fn default_workers() -> usize {
        thread::available_parallelism().map_or(1, NonZeroUsize::get)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Renders and writes every unit of `plan`.
    pub fn run(&self, plan: Plan, qr: Arc<QrCache>) -> RunReport {
        let total = plan.units.len();
        let workers = self.workers.min(total.max(1));
        info!(units = total, workers, "Rendering documents");

        let (sender, receiver) = channel::unbounded::<UnitOfWork>();
        for unit in plan.units {
            if let Err(e) = sender.send(unit) {
                error!(unit = %e.0.key, "Work channel closed before planning finished");
            }
        }
        drop(sender);

        let report = Mutex::new(RunReport::default());
        let renderer = self.renderer;
        let cache: &QrCache = &qr;
        let scoped = crossbeam::scope(|scope| {
            for worker in 0..workers {
                let receiver = receiver.clone();
                let report = &report;
                scope.spawn(move |_| {
                    for unit in receiver.iter() {
                        match process_unit(renderer, &unit, cache) {
                            Ok(()) => {
                                debug!(
                                    worker,
                                    unit = %unit.key,
                                    path = %unit.path.display(),
                                    "Written"
                                );
                                report.lock().written.push(unit.path);
                            }
                            Err(reason) => {
                                warn!(worker, unit = %unit.key, error = %reason, "Unit failed");
                                let failure = RenderFailure {
                                    unit: unit.key,
                                    reason,
                                };
                                report.lock().failures.push(failure);
                            }
                        }
                    }
                });
            }
        });
        if scoped.is_err() {
            error!("A rendering worker terminated abnormally");
        }

        let mut report = report.into_inner();
        report.sort();
        info!(
            written = report.written.len(),
            failed = report.failures.len(),
            "Rendering finished"
        );
        report
    }
}

fn process_unit(
    renderer: &dyn Renderer,
    unit: &UnitOfWork,
    qr: &QrCache,
) -> std::result::Result<(), RenderError> {
    let bytes = panic::catch_unwind(AssertUnwindSafe(|| {
        renderer.render(&unit.title, &unit.documents, qr)
    }))
    .map_err(|payload| RenderError::Panicked(panic_message(payload.as_ref())))??;
    write_output(&unit.path, &bytes)
}

fn write_output(path: &Path, bytes: &[u8]) -> std::result::Result<(), RenderError> {
    let io_error = |e: std::io::Error| RenderError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, bytes).map_err(io_error)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
