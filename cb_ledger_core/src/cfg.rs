use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Which target years a banked lot may be applied to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyWindow {
    /// Any year strictly after the lot's origin year.
    #[default]
    LaterYears,
    /// Only the compliance period immediately after the origin year.
    FollowingYear,
}

impl ApplyWindow {
    #[inline]
    pub fn admits(self, origin_year: i32, target_year: i32) -> bool {
        match self {
            ApplyWindow::LaterYears => origin_year < target_year,
            ApplyWindow::FollowingYear => origin_year.checked_add(1) == Some(target_year),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerCfg {
    pub first_regulated_year: i32,
    pub apply_window: ApplyWindow,
    pub lock_timeout_ms: u64,
    /// Pool allocation polls the cancel flag once per this many members.
    pub cancel_check_every: usize,
}

impl Default for LedgerCfg {
    fn default() -> Self {
        Self {
            first_regulated_year: 2024,
            apply_window: ApplyWindow::LaterYears,
            lock_timeout_ms: 250,
            cancel_check_every: 64,
        }
    }
}

impl LedgerCfg {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, LedgerError> {
        let cfg: LedgerCfg = serde_json::from_str(s).map_err(|e| LedgerError::InvalidConfig {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.lock_timeout_ms == 0 {
            return Err(LedgerError::InvalidConfig {
                reason: "lock_timeout_ms must be > 0".into(),
            });
        }
        if self.cancel_check_every == 0 {
            return Err(LedgerError::InvalidConfig {
                reason: "cancel_check_every must be > 0".into(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }
}
