//! Package statistics over control-plane records.

use crate::control::VersionRecord;
use serde::Serialize;
use std::borrow::Borrow;


/// Summary of one package's versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_versions: usize,
    pub tagged_versions: usize,
    pub untagged_versions: usize,
    pub total_tags: usize,
    /// Earliest `created_at`, empty when there are no versions
    pub oldest: String,
    /// Latest `created_at`, empty when there are no versions
    pub newest: String,
}

impl Stats {
    /// Computes statistics over `records`.
    ///
    /// Timestamps compare as RFC 3339 text, which orders correctly for the
    /// UTC `Z` form the control plane returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::Stats;
    ///
    /// let stats = Stats::compute::<libghcrctl::VersionRecord>(&[]);
    /// assert_eq!(stats.total_versions, 0);
    /// assert!(stats.oldest.is_empty());
    /// ```
    pub fn compute<R: Borrow<VersionRecord>>(records: &[R]) -> Self {
        let mut stats = Stats::default();
        let mut oldest: Option<&str> = None;
        let mut newest: Option<&str> = None;

        for record in records {
            let record = record.borrow();
            stats.total_versions += 1;
            if record.tags.is_empty() {
                stats.untagged_versions += 1;
            } else {
                stats.tagged_versions += 1;
                stats.total_tags += record.tags.len();
            }

            let created = record.created_at.as_str();
            if oldest.is_none_or(|o| created < o) {
                oldest = Some(created);
            }
            if newest.is_none_or(|n| created > n) {
                newest = Some(created);
            }
        }

        stats.oldest = oldest.unwrap_or_default().to_string();
        stats.newest = newest.unwrap_or_default().to_string();
        stats
    }
}
