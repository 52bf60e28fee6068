//! Special-setting audit entries (§4.5): every conditional rectifier mutation is recorded
//! deterministically so the session record (and, post-success, the message-request row)
//! can show exactly what was changed and why.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialSetting {
    CacheTtlOverride,
    Context1m,
    MetadataUserIdInjected,
    ThinkingSignatureStripped,
    ThinkingBudgetRaised,
    ModelRedirect,
    ProviderOverride { field: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialSettingAudit {
    pub setting: SpecialSetting,
    pub detail: String,
}

/// Accumulates the audit entries produced by one rectification pass over a single
/// request body, in the order the rectifier applied them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RectifierAudit {
    entries: Vec<SpecialSettingAudit>,
}

impl RectifierAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, setting: SpecialSetting, detail: impl Into<String>) {
        self.entries.push(SpecialSettingAudit { setting, detail: detail.into() });
    }

    pub fn entries(&self) -> &[SpecialSettingAudit] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
