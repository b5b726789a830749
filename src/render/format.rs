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

//! Text formatting for rendered documents.

use crate::error::RenderError;
use rust_decimal::Decimal;

/// `1234567.5` with 2 decimals → `1,234,567.50`.
pub fn format_amount(value: Decimal, decimals: u32) -> String {
    let mut rounded = value.round_dp(decimals);
    rounded.rescale(decimals);
    let text = rounded.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

/// Amount with its currency marker.
///
/// Builtin PDF fonts have no rupee glyph, so INR is written `Rs.`.
pub fn format_currency(value: Decimal, currency: &str, decimals: u32) -> String {
    let amount = format_amount(value, decimals);
    match currency {
        "INR" => format!("Rs. {amount}"),
        "USD" => format!("${amount}"),
        other => format!("{amount} {other}"),
    }
}

/// Fails on characters the builtin (WinAnsi) PDF fonts cannot show.
pub fn check_text(text: &str) -> Result<(), RenderError> {
    match text.chars().find(|&ch| !is_printable(ch)) {
        Some(ch) => Err(RenderError::UnsupportedText {
            text: text.to_string(),
            ch,
        }),
        None => Ok(()),
    }
}

fn is_printable(ch: char) -> bool {
    matches!(ch, ' '..='~' | '\u{a0}'..='\u{ff}')
}
