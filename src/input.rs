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

//! CSV ledger input.
//!
//! Three files feed the [`Ledger`]:
//!
//! ```csv
//! name,display name,address,phone,email
//! C1,Asha Rao,12 MG Road,98450 00000,asha@example.com
//! ```
//!
//! ```csv
//! number,date,due date,client,description,qty,unit,discount,tax
//! INV-1,2024-04-01,2024-04-15,C1,Tuition,2,250,,
//! INV-1,,,,Books,1,100,10,
//! ```
//!
//! ```csv
//! number,date,client,amount,payment mode,reference,note
//! R-1,2024-04-10,C1,300,UPI,UTR123,
//! ```
//!
//! Invoice rows sharing a number form one invoice; rows without a unit price
//! are skipped, as are receipt rows without a date.

use crate::base::{ClientId, InvoiceId, ReceiptId};
use crate::config::InputSettings;
use crate::error::{InputError, Result};
use crate::record::{Client, Invoice, LineItem, Ledger, Receipt};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ClientRow {
    name: String,
    #[serde(rename = "display name", default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceRow {
    number: String,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(rename = "due date", default)]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    client: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    qty: Option<Decimal>,
    #[serde(default)]
    unit: Option<Decimal>,
    #[serde(default)]
    discount: Option<Decimal>,
    #[serde(default)]
    tax: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ReceiptRow {
    number: String,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    client: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(rename = "payment mode", default)]
    payment_mode: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

/// Reads the three ledger files and validates them into a [`Ledger`].
pub fn load_ledger(files: &InputSettings) -> Result<Ledger> {
    let clients = read_clients(open(&files.clients)?, &files.clients)?;
    let invoices = read_invoices(open(&files.invoices)?, &files.invoices)?;
    let receipts = read_receipts(open(&files.receipts)?, &files.receipts)?;
    info!(
        clients = clients.len(),
        invoices = invoices.len(),
        receipts = receipts.len(),
        "Ledger loaded"
    );
    Ok(Ledger::new(clients, invoices, receipts)?)
}

fn open(path: &Path) -> std::result::Result<BufReader<File>, InputError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Deserializes every row, numbering rows from 1 after the header.
fn rows<T, R>(reader: R, path: &Path) -> std::result::Result<Vec<(usize, T)>, InputError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    rdr.deserialize::<T>()
        .enumerate()
        .map(|(idx, result)| {
            result.map(|row| (idx + 1, row)).map_err(|source| InputError::Csv {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

pub fn read_clients<R: Read>(
    reader: R,
    path: &Path,
) -> std::result::Result<Vec<Client>, InputError> {
    let clients = rows::<ClientRow, _>(reader, path)?
        .into_iter()
        .map(|(_, row)| Client {
            id: ClientId::new(row.name),
            display_name: non_empty(row.display_name),
            address: non_empty(row.address),
            phone: non_empty(row.phone),
            email: non_empty(row.email),
        })
        .collect();
    Ok(clients)
}

/// Groups line-item rows into invoices, in order of first appearance.
///
/// An invoice takes the latest date of its rows, the latest due date
/// (falling back to the date) and the first client named.
pub fn read_invoices<R: Read>(
    reader: R,
    path: &Path,
) -> std::result::Result<Vec<Invoice>, InputError> {
    struct Draft {
        first_row: usize,
        date: Option<NaiveDate>,
        due_date: Option<NaiveDate>,
        client: Option<String>,
        items: Vec<LineItem>,
    }

    let mut order: Vec<String> = Vec::new();
    let mut drafts: HashMap<String, Draft> = HashMap::new();

    for (row_no, row) in rows::<InvoiceRow, _>(reader, path)? {
        let Some(unit) = row.unit else {
            debug!(row = row_no, number = %row.number, "Skipping invoice row without unit price");
            continue;
        };
        let quantity = row.qty.ok_or_else(|| row_error(path, row_no, "missing qty"))?;

        let draft = drafts.entry(row.number.clone()).or_insert_with(|| {
            order.push(row.number.clone());
            Draft {
                first_row: row_no,
                date: None,
                due_date: None,
                client: None,
                items: Vec::new(),
            }
        });
        draft.date = draft.date.max(row.date);
        draft.due_date = draft.due_date.max(row.due_date);
        if draft.client.is_none() {
            draft.client = non_empty(row.client);
        }
        draft.items.push(LineItem {
            description: row.description.unwrap_or_default(),
            quantity,
            unit_price: unit,
            discount: row.discount.unwrap_or_default(),
            tax: row.tax.unwrap_or_default(),
        });
    }

    order
        .into_iter()
        .filter_map(|number| drafts.remove(&number).map(|draft| (number, draft)))
        .map(|(number, draft)| {
            let missing = |what: &str| {
                row_error(path, draft.first_row, format!("invoice `{number}` has no {what}"))
            };
            let date = draft.date.ok_or_else(|| missing("date"))?;
            let client = draft.client.ok_or_else(|| missing("client"))?;
            Ok(Invoice {
                id: InvoiceId::new(number),
                client_id: ClientId::new(client),
                date,
                due_date: draft.due_date.unwrap_or(date),
                items: draft.items,
            })
        })
        .collect()
}

pub fn read_receipts<R: Read>(
    reader: R,
    path: &Path,
) -> std::result::Result<Vec<Receipt>, InputError> {
    let mut receipts = Vec::new();
    for (row_no, row) in rows::<ReceiptRow, _>(reader, path)? {
        let Some(date) = row.date else {
            debug!(row = row_no, number = %row.number, "Skipping receipt row without date");
            continue;
        };
        let amount = row.amount.ok_or_else(|| row_error(path, row_no, "missing amount"))?;
        receipts.push(Receipt {
            id: ReceiptId::new(row.number),
            client_id: ClientId::new(row.client),
            date,
            amount,
            payment_mode: non_empty(row.payment_mode),
            reference: non_empty(row.reference),
            note: non_empty(row.note),
        });
    }
    Ok(receipts)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn row_error(path: &Path, row: usize, message: impl Into<String>) -> InputError {
    InputError::Row {
        path: path.to_path_buf(),
        row,
        message: message.into(),
    }
}
