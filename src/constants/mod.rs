//! Constants module for ephemeris and frame calculations

// Astronomical distances
/// Astronomical Unit in meters (per IAU 2012 Resolution B2)
pub const AU_M: f64 = 149_597_870_700.0;
/// Astronomical Unit in kilometers
pub const AU_KM: f64 = 149_597_870.700;

// Time constants
/// Seconds in a day
pub const DAY_S: f64 = 86_400.0;
/// J2000.0 epoch as Julian date
pub const J2000: f64 = 2_451_545.0;

// Physics
/// Speed of light in m/s
pub const C: f64 = 299_792_458.0;
/// Speed of light in km/s
pub const C_KM_S: f64 = 299_792.458;

// Conversions
/// Kilometers to meters
pub const KM_TO_M: f64 = 1_000.0;
/// AU^3/day^2 to m^3/s^2 (gravitational parameter conversion)
pub const AU3_DAY2_TO_M3_S2: f64 = (AU_M * AU_M * AU_M) / (DAY_S * DAY_S);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_consistency() {
        assert!((AU_M / KM_TO_M - AU_KM).abs() < 1e-6);
        assert!((C / KM_TO_M - C_KM_S).abs() < 1e-9);
    }
}
