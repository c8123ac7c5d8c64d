use velo_core::{BookingError, BookingResult, FareBreakdown};

/// Turns a ride's per-seat price into the amounts charged, taxed and paid out.
#[derive(Debug, Clone)]
pub struct FarePolicy {
    pub currency: String,
    pub platform_fee_rate: f64,
    /// Rate of each of the two tax components (CGST and SGST).
    pub tax_component_rate: f64,
}

impl FarePolicy {
    pub fn new(currency: impl Into<String>, platform_fee_rate: f64, tax_component_rate: f64) -> Self {
        Self {
            currency: currency.into(),
            platform_fee_rate,
            tax_component_rate,
        }
    }

    /// Quote the fare for `seats` seats at `unit_price_minor` each.
    ///
    /// Tax is levied on fare plus platform fee; the driver receives the fare less the fee.
    /// Amounts that do not fit in minor units fail with `FareOutOfRange`.
    pub fn quote(&self, unit_price_minor: i64, seats: u32) -> BookingResult<FareBreakdown> {
        let out_of_range = || BookingError::FareOutOfRange {
            unit_price_minor,
            seats,
        };

        let fare = unit_price_minor
            .checked_mul(i64::from(seats))
            .ok_or_else(out_of_range)?;
        let platform_fee = apply_rate(fare, self.platform_fee_rate);
        let taxable = fare.checked_add(platform_fee).ok_or_else(out_of_range)?;
        let tax_component = apply_rate(taxable, self.tax_component_rate);
        let total = taxable
            .checked_add(tax_component)
            .and_then(|t| t.checked_add(tax_component))
            .ok_or_else(out_of_range)?;
        let driver_net = fare.checked_sub(platform_fee).ok_or_else(out_of_range)?;

        Ok(FareBreakdown {
            currency: self.currency.clone(),
            seats,
            unit_price_minor,
            fare_minor: fare,
            platform_fee_minor: platform_fee,
            cgst_minor: tax_component,
            sgst_minor: tax_component,
            total_minor: total,
            driver_net_minor: driver_net,
        })
    }
}

impl Default for FarePolicy {
    fn default() -> Self {
        Self::new("inr", 0.05, 0.018)
    }
}

// Saturates at the i64 bounds; the checked sums above catch the overflow.
fn apply_rate(amount_minor: i64, rate: f64) -> i64 {
    (amount_minor as f64 * rate).round() as i64
}
