//! # SABnzbd Environment Contract
//!
//! SABnzbd hands identifying fields to its scripts through `SAB_*`
//! environment variables. The pre-queue and post-process invocations of
//! the same job can disagree on the release name, which is exactly why
//! reconciliation needs a fallback chain.
//!
//! Empty values are treated as absent, since SABnzbd exports empty
//! strings for fields it has no value for.

use std::collections::BTreeMap;

/// The captured SABnzbd environment of one invocation.
#[derive(Debug, Clone, Default)]
pub struct SabEnvironment {
    /// Release name (`SAB_FINAL_NAME`).
    pub final_name: String,
    /// Category (`SAB_CAT`).
    pub category: Option<String>,
    /// Duplicate key (`SAB_DUPLICATE_KEY`).
    pub duplicate_key: Option<String>,
    /// Job id (`SAB_NZO_ID`).
    pub job_id: Option<String>,
    /// Post-process status code (`SAB_PP_STATUS`, `0` = success).
    pub pp_status: Option<String>,
    /// Alternative file name (`SAB_FILENAME`).
    pub filename: Option<String>,
    /// Completion directory (`SAB_COMPLETE_DIR`).
    pub complete_dir: Option<String>,
    /// All `SAB_*` variables, passed through to raw notifications.
    pub all: BTreeMap<String, String>,
}

impl SabEnvironment {
    /// Capture from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from an explicit variable set.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let all: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key.starts_with("SAB_"))
            .collect();
        let get = |key: &str| all.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            final_name: get("SAB_FINAL_NAME").unwrap_or_default(),
            category: get("SAB_CAT"),
            duplicate_key: get("SAB_DUPLICATE_KEY"),
            job_id: get("SAB_NZO_ID"),
            pp_status: get("SAB_PP_STATUS"),
            filename: get("SAB_FILENAME"),
            complete_dir: get("SAB_COMPLETE_DIR"),
            all,
        }
    }

    /// Whether the host reported a successful completion. A missing
    /// status code counts as success, matching SABnzbd's `0` default.
    pub fn completed_ok(&self) -> bool {
        matches!(self.pp_status.as_deref(), None | Some("0"))
    }

    /// The best available release name: the final name, falling back to
    /// the raw file name.
    pub fn best_name(&self) -> &str {
        if !self.final_name.is_empty() {
            &self.final_name
        } else {
            self.filename.as_deref().unwrap_or("")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_capture_and_filtering() {
        let env = SabEnvironment::from_vars(vars(&[
            ("SAB_FINAL_NAME", "Some.Show.S01E02"),
            ("SAB_CAT", "tv"),
            ("SAB_DUPLICATE_KEY", "tv-1234"),
            ("SAB_NZO_ID", "SABnzbd_nzo_x1"),
            ("PATH", "/usr/bin"),
        ]));
        assert_eq!(env.final_name, "Some.Show.S01E02");
        assert_eq!(env.category.as_deref(), Some("tv"));
        assert_eq!(env.job_id.as_deref(), Some("SABnzbd_nzo_x1"));
        assert!(!env.all.contains_key("PATH"));
        assert_eq!(env.all.len(), 4);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let env = SabEnvironment::from_vars(vars(&[
            ("SAB_FINAL_NAME", "X"),
            ("SAB_CAT", ""),
            ("SAB_DUPLICATE_KEY", ""),
        ]));
        assert!(env.category.is_none());
        assert!(env.duplicate_key.is_none());
    }

    #[test]
    fn test_completion_status() {
        let ok = SabEnvironment::from_vars(vars(&[("SAB_PP_STATUS", "0")]));
        assert!(ok.completed_ok());

        let failed = SabEnvironment::from_vars(vars(&[("SAB_PP_STATUS", "2")]));
        assert!(!failed.completed_ok());

        // Missing status defaults to success.
        let missing = SabEnvironment::from_vars(vars(&[]));
        assert!(missing.completed_ok());
    }

    #[test]
    fn test_best_name_falls_back_to_filename() {
        let env = SabEnvironment::from_vars(vars(&[("SAB_FILENAME", "raw-file.nzb")]));
        assert_eq!(env.best_name(), "raw-file.nzb");

        let env = SabEnvironment::from_vars(vars(&[
            ("SAB_FINAL_NAME", "Proper.Name"),
            ("SAB_FILENAME", "raw-file.nzb"),
        ]));
        assert_eq!(env.best_name(), "Proper.Name");
    }
}
