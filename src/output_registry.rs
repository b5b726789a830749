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

//! Thread-safe output path registry.
//!
//! Guarantees that each output file has exactly one writer.

use crate::error::PlanError;
use crate::pipeline::UnitKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::{Path, PathBuf};

/// Registry of claimed output paths, safe for concurrent access.
#[derive(Debug)]
pub struct OutputRegistry {
    /// Output path to the unit that claimed it.
    owners: DashMap<PathBuf, UnitKey>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self {
            owners: DashMap::new(),
        }
    }

    /// Claims `path` for `unit`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::DuplicateOutput`] naming both units if another
    /// unit already owns the path.
    pub fn claim(&self, path: &Path, unit: &UnitKey) -> Result<(), PlanError> {
        // Entry API: atomic check-and-insert
        match self.owners.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => Err(PlanError::DuplicateOutput {
                path: path.to_path_buf(),
                first: entry.get().to_string(),
                second: unit.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(unit.clone());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::new()
    }
}
