use serde::{Deserialize, Serialize};

/// Price lines for one booking, all amounts in minor currency units (paise, cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub currency: String,
    pub seats: u32,
    pub unit_price_minor: i64,
    /// Per-seat price times seats.
    pub fare_minor: i64,
    /// Retained by the platform.
    pub platform_fee_minor: i64,
    pub cgst_minor: i64,
    pub sgst_minor: i64,
    /// Amount charged to the passenger.
    pub total_minor: i64,
    /// What the driver receives; tax is a pass-through and never part of it.
    pub driver_net_minor: i64,
}

impl FareBreakdown {
    pub fn tax_minor(&self) -> i64 {
        self.cgst_minor + self.sgst_minor
    }
}
