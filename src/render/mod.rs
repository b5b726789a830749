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

//! Document rendering.
//!
//! A [`Renderer`] turns the documents of one unit of work into the bytes of
//! one output file. Renderers are shared by reference across worker threads
//! and only read the frozen [`QrCache`].

pub mod format;
pub mod pdf;

pub use pdf::PdfRenderer;

use crate::document::Document;
use crate::error::RenderError;
use crate::qr::QrCache;

pub trait Renderer: Send + Sync {
    /// Renders `documents`, in order, into a single file.
    fn render(
        &self,
        title: &str,
        documents: &[Document],
        qr: &QrCache,
    ) -> Result<Vec<u8>, RenderError>;
}
