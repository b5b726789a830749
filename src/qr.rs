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

//! UPI payment codes.
//!
//! A [`QrPayload`] is a value object; its encoded `upi://` string is the key
//! of the [`QrCache`]. The cache is filled by a single-threaded warm-up pass
//! and then frozen behind an [`Arc`], after which workers only read it.

use crate::config::{PaymentSettings, UpiSettings};
use crate::error::RenderError;
use qrcode::render::svg;
use qrcode::{Color, QrCode};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Placeholder in the transaction note replaced by the document reference.
pub const REFERENCE_PLACEHOLDER: &str = "{INVOICE_NUMBER}";

/// Contents of a UPI payment request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QrPayload {
    pub payee_id: String,
    pub payee_name: String,
    /// Formatted amount; `None` lets the payer enter it.
    pub amount: Option<String>,
    pub currency: String,
    pub note: String,
}

impl QrPayload {
    /// Payment request for `reference` (an invoice number or client id).
    pub fn new(
        upi: &UpiSettings,
        payment: &PaymentSettings,
        seller_name: &str,
        reference: &str,
        amount: Decimal,
        decimals: u32,
    ) -> Self {
        let amount = upi.include_amount.then(|| {
            let mut rounded = amount.round_dp(decimals);
            rounded.rescale(decimals);
            rounded.to_string()
        });
        Self {
            payee_id: upi.upi_id.clone(),
            payee_name: upi.payee_name.clone().unwrap_or_else(|| seller_name.to_string()),
            amount,
            currency: payment.currency.clone(),
            note: upi.transaction_note.replace(REFERENCE_PLACEHOLDER, reference),
        }
    }

    /// The `upi://pay` URI carried by the code.
    pub fn encode(&self) -> String {
        let mut uri = format!(
            "upi://pay?pa={}&pn={}",
            percent_encode(&self.payee_id),
            percent_encode(&self.payee_name)
        );
        if let Some(amount) = &self.amount {
            uri.push_str("&am=");
            uri.push_str(&percent_encode(amount));
        }
        uri.push_str("&cu=");
        uri.push_str(&percent_encode(&self.currency));
        uri.push_str("&tn=");
        uri.push_str(&percent_encode(&self.note));
        uri
    }
}

impl fmt::Display for QrPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'@' => {
                out.push(char::from(byte));
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// An encoded QR symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    width: usize,
    modules: Vec<bool>,
    svg: String,
}

impl QrImage {
    pub fn generate(data: &str) -> Result<Self, RenderError> {
        let code =
            QrCode::new(data.as_bytes()).map_err(|e| RenderError::QrEncoding(e.to_string()))?;
        let svg = code.render::<svg::Color>().min_dimensions(200, 200).build();
        Ok(Self {
            width: code.width(),
            modules: code.to_colors().into_iter().map(|c| c == Color::Dark).collect(),
            svg,
        })
    }

    /// Modules per side.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.modules[y * self.width + x]
    }

    pub fn svg(&self) -> &str {
        &self.svg
    }
}

/// Memoized payload to image map.
#[derive(Debug, Default)]
pub struct QrCache {
    images: HashMap<String, QrImage>,
    failures: HashMap<String, RenderError>,
    generations: usize,
}

impl QrCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes every payload not seen before. Returns the number of new encodings.
    ///
    /// A payload that cannot be encoded is remembered; only the documents
    /// that use it fail later.
    pub fn warm<'a>(&mut self, payloads: impl IntoIterator<Item = &'a QrPayload>) -> usize {
        let before = self.generations;
        for payload in payloads {
            let key = payload.encode();
            if self.images.contains_key(&key) || self.failures.contains_key(&key) {
                continue;
            }
            self.generations += 1;
            match QrImage::generate(&key) {
                Ok(image) => {
                    self.images.insert(key, image);
                }
                Err(e) => {
                    warn!(payload = %key, error = %e, "Cannot encode payment QR");
                    self.failures.insert(key, e);
                }
            }
        }
        let generated = self.generations - before;
        debug!(generated, cached = self.images.len(), "QR cache warmed");
        generated
    }

    /// Makes the cache read-only and shareable across workers.
    pub fn freeze(self) -> Arc<QrCache> {
        Arc::new(self)
    }

    pub fn get(&self, payload: &QrPayload) -> Result<&QrImage, RenderError> {
        let key = payload.encode();
        if let Some(image) = self.images.get(&key) {
            return Ok(image);
        }
        match self.failures.get(&key) {
            Some(e) => Err(e.clone()),
            None => Err(RenderError::QrMissing(key)),
        }
    }

    /// Number of encodings performed.
    pub fn generations(&self) -> usize {
        self.generations
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn upi(include_amount: bool) -> UpiSettings {
        UpiSettings {
            upi_id: "acme@okbank".into(),
            payee_name: None,
            include_amount,
            transaction_note: "Invoice {INVOICE_NUMBER}".into(),
            bottom_note: None,
        }
    }

    fn payload(reference: &str, amount: Decimal) -> QrPayload {
        QrPayload::new(&upi(true), &PaymentSettings::default(), "Acme Tutors", reference, amount, 2)
    }

    #[test]
    fn encodes_upi_uri() {
        let uri = payload("INV-1", dec!(1500)).encode();
        assert_eq!(
            uri,
            "upi://pay?pa=acme@okbank&pn=Acme%20Tutors&am=1500.00&cu=INR&tn=Invoice%20INV-1"
        );
    }

    #[test]
    fn amount_left_out_when_disabled() {
        let p = QrPayload::new(&upi(false), &PaymentSettings::default(), "Acme", "C1", dec!(10), 2);
        assert_eq!(p.amount, None);
        assert_eq!(p.encode(), "upi://pay?pa=acme@okbank&pn=Acme&cu=INR&tn=Invoice%20C1");
    }

    #[test]
    fn amount_rounded_to_decimals() {
        let payment = PaymentSettings::default();
        let p = QrPayload::new(&upi(true), &payment, "Acme", "X", dec!(10.456), 1);
        assert_eq!(p.amount.as_deref(), Some("10.5"));
    }

    #[test]
    fn payee_name_overrides_seller_name() {
        let mut settings = upi(true);
        assert_eq!(payload("X", dec!(1)).payee_name, "Acme Tutors");
        settings.payee_name = Some("Acme Tutors LLP".into());
        let payment = PaymentSettings::default();
        let p = QrPayload::new(&settings, &payment, "Acme Tutors", "X", dec!(1), 2);
        assert_eq!(p.payee_name, "Acme Tutors LLP");
    }

    #[test]
    fn reserved_characters_are_escaped() {
        assert_eq!(percent_encode("a&b=c?d"), "a%26b%3Dc%3Fd");
        assert_eq!(percent_encode("Café"), "Caf%C3%A9");
    }

    #[test]
    fn warm_generates_each_payload_once() {
        let a = payload("INV-1", dec!(100));
        let b = payload("INV-2", dec!(100));
        let mut cache = QrCache::new();
        assert_eq!(cache.warm([&a, &b, &a, &a]), 2);
        assert_eq!(cache.warm([&b]), 0);
        assert_eq!(cache.generations(), 2);

        let frozen = cache.freeze();
        let image = frozen.get(&a).unwrap();
        assert!(image.width() >= 21);
        assert!(image.svg().contains("<svg"));
    }

    #[test]
    fn miss_after_freeze_is_an_error() {
        let frozen = QrCache::new().freeze();
        let missing = payload("INV-9", dec!(1));
        assert_eq!(frozen.get(&missing), Err(RenderError::QrMissing(missing.encode())));
        assert_eq!(frozen.generations(), 0);
    }

    #[test]
    fn finder_pattern_corner_is_dark() {
        let image = QrImage::generate("upi://pay?pa=a@b").unwrap();
        assert!(image.is_dark(0, 0));
        assert!(!image.is_dark(image.width(), 0));
    }
}
