use serde::{Deserialize, Serialize};

use crate::cfg::LedgerCfg;
use crate::error::LedgerError;

/// One vessel's compliance period.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipYear {
    pub ship_id: String,
    pub year: i32,
}

impl ShipYear {
    /// Build a key, rejecting blank ids and years before the first regulated year.
    pub fn new(ship_id: impl Into<String>, year: i32, cfg: &LedgerCfg) -> Result<Self, LedgerError> {
        let ship_id = ship_id.into();
        validate_ship_id(&ship_id, year)?;
        if year < cfg.first_regulated_year {
            return Err(LedgerError::InvalidShipYear {
                ship: ship_id,
                year,
                reason: format!("year precedes first regulated year {}", cfg.first_regulated_year),
            });
        }
        Ok(Self { ship_id, year })
    }
}

impl std::fmt::Display for ShipYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ship_id, self.year)
    }
}

pub(crate) fn validate_ship_id(ship_id: &str, year: i32) -> Result<(), LedgerError> {
    if ship_id.trim().is_empty() || ship_id.trim() != ship_id {
        return Err(LedgerError::InvalidShipYear {
            ship: ship_id.to_string(),
            year,
            reason: "ship id must be non-empty without surrounding whitespace".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_and_early() {
        let cfg = LedgerCfg::default();
        assert!(ShipYear::new("R001", 2024, &cfg).is_ok());
        assert!(matches!(
            ShipYear::new("  ", 2024, &cfg),
            Err(LedgerError::InvalidShipYear { .. })
        ));
        assert!(matches!(
            ShipYear::new("R001", 2019, &cfg),
            Err(LedgerError::InvalidShipYear { .. })
        ));
    }
}
