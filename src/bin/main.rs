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

use bulk_invoicer::error::Error;
use bulk_invoicer::{
    Assembler, PdfRenderer, Pipeline, Plan, Reconciler, Reconciliation, Settings, input,
    warm_qr_cache,
};
use chrono::Local;
use clap::Parser;
use csv::Writer;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Bulk Invoicer - Render invoices, receipts and statements
///
/// Reads clients, invoices and receipts from the CSV files named in the
/// configuration, matches payments to invoices and writes every configured
/// PDF output.
#[derive(Parser, Debug)]
#[command(name = "bulk-invoicer")]
#[command(about = "Renders invoices, receipts and account statements as PDFs", long_about = None)]
struct Args {
    /// Path to the JSON configuration
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,

    /// Rendering threads, overriding the configuration
    #[arg(long, value_name = "N")]
    workers: Option<NonZeroUsize>,

    /// Write client balances as CSV to stdout
    #[arg(long)]
    balances: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    if let Err(e) = run(&args) {
        if let Error::Run(err) = &e {
            for failure in &err.failures {
                error!(unit = %failure.unit, error = %failure.reason, "Unit failed");
            }
        }
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(args: &Args) -> bulk_invoicer::Result<()> {
    let settings = Settings::load(&args.config)?;
    let ledger = input::load_ledger(&settings.input)?;
    let reconciliation = Reconciler::new(&ledger).run()?;

    let assembler = Assembler::new(&settings, &ledger, &reconciliation, Local::now().date_naive());
    let plan = Plan::build(&settings, &assembler)?;
    let qr = warm_qr_cache(&plan);

    let workers = args
        .workers
        .map(NonZeroUsize::get)
        .or(settings.workers)
        .unwrap_or_else(Pipeline::default_workers);
    let renderer = PdfRenderer::new(settings.clone());
    let report = Pipeline::new(&renderer, workers).run(plan, qr);
    let written = report.into_result()?;
    info!(files = written.len(), "All documents written");

    if args.balances {
        write_accounts(&reconciliation, settings.invoice.decimals, std::io::stdout())?;
    }
    Ok(())
}

/// Write client balances to a CSV writer
///
/// # CSV Format
///
/// Columns: `client, invoiced, received, outstanding, credit, balance`.
/// Figures are rounded to `decimals` places, the invoice precision.
///
/// ```csv
/// client,invoiced,received,outstanding,credit,balance
/// C1,1000.00,400.00,600.00,0.00,600.00
/// C2,500.00,800.00,0.00,300.00,-300.00
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_accounts<W: Write>(
    reconciliation: &Reconciliation,
    decimals: u32,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for account in reconciliation.accounts() {
        wtr.serialize(account.rounded(decimals))?;
    }
    wtr.flush()?;
    Ok(())
}
