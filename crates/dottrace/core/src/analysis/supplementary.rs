// Dottrace
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::io;
use std::path::{Path, PathBuf};

/// Extension of state-system artifacts.
pub const STATE_SYSTEM_EXTENSION: &str = "ht";
/// Extension of segment-store artifacts.
pub const SEGMENT_STORE_EXTENSION: &str = "dat";

/// Resolver of per-trace supplementary artifact locations.
///
/// Every trace gets its own directory under the configured base; artifact
/// files inside it are named `<analysis id>.<extension>`.
#[derive(Debug, Clone)]
pub struct SupplementaryFiles {
    base: PathBuf,
}

impl SupplementaryFiles {
    /// Creates a resolver rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The supplementary directory of `trace_name`, created on demand.
    pub fn trace_dir(&self, trace_name: &str) -> io::Result<PathBuf> {
        let dir = self.base.join(trace_name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path of the state-system artifact for analysis `id` inside `dir`.
    pub fn state_system_file(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{id}.{STATE_SYSTEM_EXTENSION}"))
    }

    /// Path of the segment-store artifact for analysis `id` inside `dir`.
    pub fn segment_store_file(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{id}.{SEGMENT_STORE_EXTENSION}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_dir_is_created_on_demand() {
        let base = tempfile::tempdir().unwrap();
        let files = SupplementaryFiles::new(base.path());

        let dir = files.trace_dir("kernel-trace").unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with("kernel-trace"));

        // resolving again reuses the directory
        assert_eq!(files.trace_dir("kernel-trace").unwrap(), dir);
    }

    #[test]
    fn test_artifact_names_carry_id_and_extension() {
        let dir = PathBuf::from("/supp/trace");
        assert_eq!(
            SupplementaryFiles::state_system_file(&dir, "statistics"),
            PathBuf::from("/supp/trace/statistics.ht")
        );
        assert_eq!(
            SupplementaryFiles::segment_store_file(&dir, "statistics"),
            PathBuf::from("/supp/trace/statistics.dat")
        );
    }
}
