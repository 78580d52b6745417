//! Scheduling engine configuration.
//!
//! # Invariants
//! - Missing fields fall back to `EngineConfig::default()`.

use serde::{Deserialize, Serialize};

/// What arming does while the precise-alarm permission is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeniedPermissionPolicy {
    /// Record the intended trigger only; reconciliation registers it once the
    /// permission is granted.
    #[default]
    RecordOnly,
    /// Register an inexact wake request; upgraded to exact by reconciliation
    /// once the permission is granted.
    ArmInexact,
}

impl DeniedPermissionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecordOnly => "record_only",
            Self::ArmInexact => "arm_inexact",
        }
    }
}

/// Engine-level options supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub denied_permission_policy: DeniedPermissionPolicy,
    /// Run a reconciliation pass right after bootstrap.
    pub reconcile_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            denied_permission_policy: DeniedPermissionPolicy::RecordOnly,
            reconcile_on_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeniedPermissionPolicy, EngineConfig};

    #[test]
    fn partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"denied_permission_policy":"arm_inexact"}"#).unwrap();
        assert_eq!(
            config.denied_permission_policy,
            DeniedPermissionPolicy::ArmInexact
        );
        assert!(config.reconcile_on_start);

        let empty: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, EngineConfig::default());
    }
}
