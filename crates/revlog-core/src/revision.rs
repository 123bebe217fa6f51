//! Revision metadata for one committed revision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the `revision` table together with its startup files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMetadata {
  /// Assigned by the store; strictly increasing and never reused.
  pub revision_no:        i64,
  /// The latest revision when this one was created. Informational only;
  /// reconstruction orders by `revision_no`.
  pub parent_revision_no: Option<i64>,
  /// NULL for revisions written before the working-directory column existed.
  pub working_dir:        Option<String>,
  /// Unix seconds.
  pub timestamp:          i64,
  pub startup_files:      Vec<String>,
}

impl RevisionMetadata {
  pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(self.timestamp, 0)
  }
}
