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

//! A4 PDF output using the builtin Helvetica fonts.

use super::Renderer;
use super::format::{check_text, format_currency};
use crate::config::Settings;
use crate::document::{
    ClientSummaryDocument, Document, InvoiceDocument, KeyFigure, OverallSummaryDocument,
    ReceiptDocument,
};
use crate::error::RenderError;
use crate::qr::{QrCache, QrImage, QrPayload};
use crate::summary::MonthlyBalance;
use chrono::NaiveDate;
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    PdfPageIndex, Point, Rect,
};
use rust_decimal::Decimal;
use std::io::BufWriter;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const LEFT: f32 = 15.0;
const RIGHT: f32 = 195.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 25.0;
const QR_SIZE: f32 = 30.0;
const MONTH_FORMAT: &str = "%b %Y";

/// Renders documents as PDF pages.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    settings: Settings,
}

impl PdfRenderer {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn currency(&self, value: Decimal, decimals: u32) -> String {
        format_currency(value, &self.settings.payment.currency, decimals)
    }

    fn summary_amount(&self, value: Decimal) -> String {
        self.currency(value, self.settings.invoice.decimals)
    }

    fn date(&self, date: NaiveDate) -> String {
        date.format(&self.settings.invoice.date_format).to_string()
    }

    fn heading(&self, canvas: &mut Canvas, title: &str) -> Result<(), RenderError> {
        canvas.text(&self.settings.seller.name, 16.0, LEFT, true)?;
        canvas.text_right(title, 20.0, RIGHT, true)?;
        canvas.down(6.0);
        if let Some(tagline) = &self.settings.seller.tagline {
            canvas.text(tagline, 10.0, LEFT, false)?;
        }
        canvas.down(6.0);
        canvas.rule();
        canvas.down(8.0);
        Ok(())
    }

    fn invoice(
        &self,
        canvas: &mut Canvas,
        doc: &InvoiceDocument,
        qr: &QrCache,
    ) -> Result<(), RenderError> {
        let decimals = self.settings.invoice.decimals;
        let date_format = &self.settings.invoice.date_format;
        self.heading(canvas, "INVOICE")?;

        canvas.text("Bill to:", 11.0, LEFT, true)?;
        canvas.text_right(&format!("Invoice No: {}", doc.number), 10.0, RIGHT, true)?;
        canvas.down(5.5);
        canvas.text(doc.client.display_name(), 10.0, LEFT, false)?;
        canvas.text_right(&format!("Date: {}", doc.date.format(date_format)), 10.0, RIGHT, false)?;
        canvas.down(5.0);
        let due = format!("Due: {}", doc.due_date.format(date_format));
        canvas.text_right(&due, 10.0, RIGHT, false)?;
        let mut details = 0;
        for detail in client_details(&doc.client) {
            canvas.text(detail, 10.0, LEFT, false)?;
            canvas.down(5.0);
            details += 1;
        }
        canvas.down(if details == 0 { 11.0 } else { 6.0 });

        let columns = [LEFT, 125.0, 150.0, RIGHT];
        canvas.text("DESCRIPTION", 10.0, columns[0], true)?;
        canvas.text_right("UNIT PRICE", 10.0, columns[1], true)?;
        canvas.text_right("QTY", 10.0, columns[2], true)?;
        canvas.text_right("TOTAL", 10.0, columns[3], true)?;
        canvas.down(2.5);
        canvas.rule();
        canvas.down(6.0);
        for item in &doc.items {
            canvas.ensure(6.0)?;
            canvas.text(&item.description, 10.0, columns[0], false)?;
            canvas.text_right(&self.currency(item.unit_price, decimals), 10.0, columns[1], false)?;
            canvas.text_right(&item.quantity.normalize().to_string(), 10.0, columns[2], false)?;
            canvas.text_right(&self.currency(item.amount(), decimals), 10.0, columns[3], false)?;
            canvas.down(6.0);
        }
        canvas.rule();
        canvas.down(6.0);

        let mut totals: Vec<(&str, Decimal, bool)> = Vec::new();
        if self.settings.invoice.show_subtotal {
            totals.push(("Subtotal", doc.subtotal, true));
        }
        if !doc.discount.is_zero() {
            totals.push(("Discount", -doc.discount, false));
        }
        if !doc.tax.is_zero() {
            totals.push(("Tax", doc.tax, false));
        }
        totals.push(("TOTAL", doc.total, true));
        if !doc.paid.is_zero() {
            totals.push(("Paid", -doc.paid, false));
            totals.push(("Balance Due", doc.outstanding, true));
        }
        for (label, amount, bold) in totals {
            canvas.ensure(6.0)?;
            canvas.text_right(label, 10.0, columns[2], bold)?;
            canvas.text_right(&self.currency(amount, decimals), 10.0, columns[3], bold)?;
            canvas.down(6.0);
        }
        canvas.text_right(&format!("Status: {}", doc.status), 10.0, columns[3], true)?;
        canvas.down(8.0);

        if !doc.payments.is_empty() {
            canvas.ensure(12.0)?;
            canvas.text("Payments received", 11.0, LEFT, true)?;
            canvas.down(6.0);
            for payment in &doc.payments {
                canvas.ensure(5.5)?;
                canvas.text(
                    &format!("Receipt {} on {}", payment.receipt, payment.date.format(date_format)),
                    10.0,
                    LEFT,
                    false,
                )?;
                let amount = self.currency(payment.amount, decimals);
                canvas.text_right(&amount, 10.0, columns[3], false)?;
                canvas.down(5.5);
            }
            canvas.down(6.0);
        }

        self.payment_details(canvas, doc.qr.as_ref(), qr)?;
        self.signature(canvas)
    }

    fn receipt(&self, canvas: &mut Canvas, doc: &ReceiptDocument) -> Result<(), RenderError> {
        let decimals = self.settings.receipt.decimals;
        let date_format = &self.settings.receipt.date_format;
        self.heading(canvas, "RECEIPT")?;

        canvas.text("Received from:", 11.0, LEFT, true)?;
        canvas.text_right(&format!("Receipt No: {}", doc.number), 10.0, RIGHT, true)?;
        canvas.down(5.5);
        canvas.text(doc.client.display_name(), 10.0, LEFT, false)?;
        canvas.text_right(&format!("Date: {}", doc.date.format(date_format)), 10.0, RIGHT, false)?;
        canvas.down(5.0);
        for detail in client_details(&doc.client) {
            canvas.text(detail, 10.0, LEFT, false)?;
            canvas.down(5.0);
        }
        canvas.down(6.0);

        canvas.text("DESCRIPTION", 10.0, LEFT, true)?;
        canvas.text_right("AMOUNT", 10.0, RIGHT, true)?;
        canvas.down(2.5);
        canvas.rule();
        canvas.down(6.0);
        for line in &doc.lines {
            canvas.ensure(6.0)?;
            canvas.text(&line.description(), 10.0, LEFT, false)?;
            canvas.text_right(&self.currency(line.amount, decimals), 10.0, RIGHT, false)?;
            canvas.down(6.0);
        }
        canvas.rule();
        canvas.down(6.0);
        canvas.text_right("TOTAL", 10.0, 150.0, true)?;
        canvas.text_right(&self.currency(doc.amount, decimals), 10.0, RIGHT, true)?;
        canvas.down(12.0);

        let mode = doc.payment_mode.as_deref().unwrap_or("cash").to_uppercase();
        canvas.text(&format!("PAYMENT MODE: {mode}"), 10.0, LEFT, true)?;
        canvas.down(5.5);
        if let Some(reference) = &doc.reference {
            canvas.text(&format!("Reference: {reference}"), 10.0, LEFT, false)?;
            canvas.down(5.5);
        }
        if let Some(note) = &doc.note {
            canvas.text(note, 10.0, LEFT, false)?;
            canvas.down(5.5);
        }
        canvas.down(6.0);
        self.signature(canvas)
    }

    fn client_summary(
        &self,
        canvas: &mut Canvas,
        doc: &ClientSummaryDocument,
        qr: &QrCache,
    ) -> Result<(), RenderError> {
        self.heading(canvas, "Account Statement")?;

        canvas.text(doc.client.display_name(), 12.0, LEFT, true)?;
        if let Some(period) = &doc.period {
            canvas.text_right(period, 10.0, RIGHT, false)?;
        }
        canvas.down(5.5);
        for detail in client_details(&doc.client) {
            canvas.text(detail, 10.0, LEFT, false)?;
            canvas.down(5.0);
        }
        canvas.text_right(&format!("Generated: {}", self.date(doc.generated)), 9.0, RIGHT, false)?;
        canvas.down(10.0);

        self.key_figures(canvas, &doc.key_figures)?;

        if !doc.invoices.is_empty() {
            self.section(canvas, "Invoices")?;
            self.row(canvas, &["Number", "Date", "Total", "Outstanding", "Status"], true)?;
            for inv in &doc.invoices {
                self.row(
                    canvas,
                    &[
                        inv.number.as_str(),
                        &self.date(inv.date),
                        &self.summary_amount(inv.total),
                        &self.summary_amount(inv.outstanding),
                        &inv.status.to_string(),
                    ],
                    false,
                )?;
            }
        }

        if !doc.receipts.is_empty() {
            self.section(canvas, "Receipts")?;
            self.row(canvas, &["Number", "Date", "Amount", "Mode"], true)?;
            for rec in &doc.receipts {
                self.row(
                    canvas,
                    &[
                        rec.number.as_str(),
                        &self.date(rec.date),
                        &self.summary_amount(rec.amount),
                        rec.payment_mode.as_deref().unwrap_or(""),
                    ],
                    false,
                )?;
            }
        }

        let headings = ["Month", "Opening Balance", "Billed", "Paid", "Closing Balance"];
        self.monthly(canvas, &doc.monthly, headings)?;

        if !doc.timeline.is_empty() {
            self.section(canvas, "Transactions")?;
            self.row(canvas, &["Date", "Type", "Reference", "Amount", "Balance"], true)?;
            for entry in &doc.timeline {
                self.row(
                    canvas,
                    &[
                        &self.date(entry.date),
                        &entry.kind.to_string(),
                        &entry.reference,
                        &self.summary_amount(entry.amount),
                        &self.summary_amount(entry.balance),
                    ],
                    false,
                )?;
            }
        }

        if doc.qr.is_some() {
            canvas.down(6.0);
            self.payment_details(canvas, doc.qr.as_ref(), qr)?;
        }
        Ok(())
    }

    fn overall_summary(
        &self,
        canvas: &mut Canvas,
        doc: &OverallSummaryDocument,
    ) -> Result<(), RenderError> {
        self.heading(canvas, "Summary")?;

        canvas.text(&doc.title, 14.0, LEFT, true)?;
        if let Some(period) = &doc.period {
            canvas.text_right(period, 10.0, RIGHT, false)?;
        }
        canvas.down(5.5);
        canvas.text_right(&format!("Generated: {}", self.date(doc.generated)), 9.0, RIGHT, false)?;
        canvas.down(10.0);

        self.key_figures(canvas, &doc.key_figures)?;
        canvas.text("Total Outstanding", 11.0, LEFT, true)?;
        canvas.text_right(&self.summary_amount(doc.totals.total_outstanding), 11.0, 120.0, true)?;
        canvas.text(
            &format!("({} clients)", doc.totals.clients_outstanding),
            10.0,
            125.0,
            false,
        )?;
        canvas.down(8.0);

        if !doc.statuses.is_empty() {
            self.section(canvas, "Status Breakdown")?;
            self.row(canvas, &["Status", "Clients", "Amount"], true)?;
            for status in &doc.statuses {
                self.row(
                    canvas,
                    &[
                        &status.status.to_string(),
                        &status.clients.to_string(),
                        &self.summary_amount(status.amount),
                    ],
                    false,
                )?;
            }
        }

        let headings = ["Month", "Opening Balance", "Invoiced", "Received", "Closing Balance"];
        self.monthly(canvas, &doc.monthly, headings)?;

        if !doc.clients.is_empty() {
            self.section(canvas, "Client Summary")?;
            self.row(canvas, &["Client", "Opening", "Invoiced", "Received", "Closing"], true)?;
            for client in &doc.clients {
                self.row(
                    canvas,
                    &[
                        client.client.display_name(),
                        &self.summary_amount(client.opening_balance),
                        &self.summary_amount(client.invoice_total),
                        &self.summary_amount(client.receipt_total),
                        &self.summary_amount(client.closing_balance),
                    ],
                    false,
                )?;
            }
        }
        Ok(())
    }

    fn key_figures(&self, canvas: &mut Canvas, figures: &[KeyFigure]) -> Result<(), RenderError> {
        self.section(canvas, "Key Figures")?;
        for figure in figures {
            canvas.ensure(7.0)?;
            canvas.text(figure.label, 11.0, LEFT, figure.highlight)?;
            canvas.text_right(&self.summary_amount(figure.amount), 11.0, 120.0, figure.highlight)?;
            canvas.text(&figure.note, 10.0, 125.0, false)?;
            canvas.down(7.0);
        }
        canvas.down(3.0);
        Ok(())
    }

    fn monthly(
        &self,
        canvas: &mut Canvas,
        rows: &[MonthlyBalance],
        headings: [&str; 5],
    ) -> Result<(), RenderError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.section(canvas, "Monthly Summary")?;
        self.row(canvas, &headings, true)?;
        for row in rows {
            self.row(
                canvas,
                &[
                    &row.month.format(MONTH_FORMAT).to_string(),
                    &self.summary_amount(row.open),
                    &self.summary_amount(row.invoiced),
                    &self.summary_amount(row.received),
                    &self.summary_amount(row.balance),
                ],
                false,
            )?;
        }
        Ok(())
    }

    fn section(&self, canvas: &mut Canvas, title: &str) -> Result<(), RenderError> {
        canvas.ensure(20.0)?;
        let bookmark = format!("{}: {title}", canvas.document);
        canvas.mark(&bookmark)?;
        canvas.down(4.0);
        canvas.text(title, 13.0, LEFT, true)?;
        canvas.down(7.0);
        Ok(())
    }

    /// Table row: first cell left-aligned, the rest right-aligned in equal columns.
    fn row(&self, canvas: &mut Canvas, cells: &[&str], bold: bool) -> Result<(), RenderError> {
        canvas.ensure(6.0)?;
        let Some((first, rest)) = cells.split_first() else {
            return Ok(());
        };
        canvas.text(first, 9.5, LEFT, bold)?;
        if !rest.is_empty() {
            let start = LEFT + 45.0;
            let step = (RIGHT - start) / rest.len() as f32;
            for (i, cell) in rest.iter().enumerate() {
                canvas.text_right(cell, 9.5, start + step * (i as f32 + 1.0), bold)?;
            }
        }
        canvas.down(if bold { 2.0 } else { 5.5 });
        if bold {
            canvas.rule();
            canvas.down(4.5);
        }
        Ok(())
    }

    fn payment_details(
        &self,
        canvas: &mut Canvas,
        payload: Option<&QrPayload>,
        qr: &QrCache,
    ) -> Result<(), RenderError> {
        let payment = &self.settings.payment;
        if let Some(text) = &payment.payment_methods_text {
            canvas.ensure(6.0)?;
            canvas.text(&text.to_uppercase(), 10.0, LEFT, true)?;
            canvas.down(6.0);
        }
        let Some(payload) = payload else {
            return Ok(());
        };
        let image = qr.get(payload)?;
        canvas.ensure(QR_SIZE + 10.0)?;
        canvas.qr(image, LEFT, QR_SIZE);
        canvas.down(QR_SIZE + 5.0);
        if let Some(note) = payment.upi.as_ref().and_then(|upi| upi.bottom_note.as_ref()) {
            canvas.text(note, 9.0, LEFT, false)?;
            canvas.down(6.0);
        }
        Ok(())
    }

    fn signature(&self, canvas: &mut Canvas) -> Result<(), RenderError> {
        let Some(signature) = &self.settings.signature else {
            return Ok(());
        };
        canvas.ensure(20.0)?;
        canvas.down(8.0);
        if let Some(prefix) = &signature.prefix {
            canvas.text_right(prefix, 10.0, RIGHT, false)?;
            canvas.down(12.0);
        }
        if let Some(text) = &signature.text {
            canvas.text_right(text, 10.0, RIGHT, true)?;
            canvas.down(6.0);
        }
        Ok(())
    }
}

impl Renderer for PdfRenderer {
    fn render(
        &self,
        title: &str,
        documents: &[Document],
        qr: &QrCache,
    ) -> Result<Vec<u8>, RenderError> {
        let mut canvas = Canvas::new(title, self.settings.footer.text.clone())?;
        for document in documents {
            canvas.begin(&document.title())?;
            match document {
                Document::Invoice(doc) => self.invoice(&mut canvas, doc, qr)?,
                Document::Receipt(doc) => self.receipt(&mut canvas, doc)?,
                Document::ClientSummary(doc) => self.client_summary(&mut canvas, doc, qr)?,
                Document::OverallSummary(doc) => self.overall_summary(&mut canvas, doc)?,
            }
        }
        canvas.finish()
    }
}

fn client_details(client: &crate::record::Client) -> impl Iterator<Item = &str> {
    [&client.address, &client.phone, &client.email]
        .into_iter()
        .filter_map(|detail| detail.as_deref())
        .flat_map(str::lines)
}

/// Page cursor over a PDF document. `y` runs from the top margin down.
///
/// The outline holds at most one entry per page: the first document or
/// section starting on it.
struct Canvas {
    doc: PdfDocumentReference,
    page: PdfPageIndex,
    layer: PdfLayerReference,
    /// Title of the document being drawn.
    document: String,
    marked: bool,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    footer: Option<String>,
    y: f32,
    fresh: bool,
}

impl Canvas {
    fn new(title: &str, footer: Option<String>) -> Result<Self, RenderError> {
        check_text(title)?;
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        Ok(Self {
            doc,
            page,
            layer,
            document: String::new(),
            marked: false,
            regular,
            bold,
            footer,
            y: TOP,
            fresh: true,
        })
    }

    /// Starts `title` on a new page with its own outline entry.
    fn begin(&mut self, title: &str) -> Result<(), RenderError> {
        self.new_page()?;
        self.document = title.to_string();
        self.mark(title)
    }

    /// Adds an outline entry for the current page unless it already has one.
    fn mark(&mut self, name: &str) -> Result<(), RenderError> {
        if !self.marked {
            check_text(name)?;
            self.doc.add_bookmark(name, self.page);
            self.marked = true;
        }
        Ok(())
    }

    /// Starts a page; the document's initial page is used first.
    fn new_page(&mut self) -> Result<(), RenderError> {
        if self.fresh {
            self.fresh = false;
        } else {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.page = page;
            self.marked = false;
        }
        self.y = TOP;
        if let Some(footer) = self.footer.clone() {
            check_text(&footer)?;
            let x = (PAGE_WIDTH - text_width(&footer, 8.0)) / 2.0;
            self.layer.use_text(footer, 8.0, Mm(x), Mm(12.0), &self.regular);
        }
        Ok(())
    }

    /// Breaks to a new page unless `space` millimetres remain.
    fn ensure(&mut self, space: f32) -> Result<(), RenderError> {
        if self.y - space < BOTTOM {
            self.new_page()?;
        }
        Ok(())
    }

    fn down(&mut self, dy: f32) {
        self.y -= dy;
    }

    fn text(&self, text: &str, size: f32, x: f32, bold: bool) -> Result<(), RenderError> {
        check_text(text)?;
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
        Ok(())
    }

    fn text_right(&self, text: &str, size: f32, right: f32, bold: bool) -> Result<(), RenderError> {
        self.text(text, size, right - text_width(text, size), bold)
    }

    fn rule(&self) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(LEFT), Mm(self.y)), false),
                (Point::new(Mm(RIGHT), Mm(self.y)), false),
            ],
            is_closed: false,
        });
    }

    /// Draws `image` with its top-left corner at (`x`, cursor).
    fn qr(&self, image: &QrImage, x: f32, size: f32) {
        let width = image.width();
        if width == 0 {
            return;
        }
        let module = size / width as f32;
        for row in 0..width {
            for col in 0..width {
                if !image.is_dark(col, row) {
                    continue;
                }
                let left = x + col as f32 * module;
                let bottom = self.y - (row as f32 + 1.0) * module;
                let rect = Rect::new(Mm(left), Mm(bottom), Mm(left + module), Mm(bottom + module));
                self.layer.add_rect(rect);
            }
        }
    }

    fn finish(self) -> Result<Vec<u8>, RenderError> {
        let mut writer = BufWriter::new(Vec::<u8>::new());
        self.doc
            .save(&mut writer)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        writer.into_inner().map_err(|e| RenderError::Pdf(e.to_string()))
    }
}

/// Approximate Helvetica advance width in millimetres.
fn text_width(text: &str, size: f32) -> f32 {
    const POINT_MM: f32 = 0.3528;
    text.chars().count() as f32 * size * 0.5 * POINT_MM
}
