use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Every real-valued quantity inside the tick loop (quality, wear,
/// probabilities, temperatures) uses this type so that two runs from the
/// same seed are bit-identical on every platform.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and observations.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Clamp a value into the unit interval `[0, 1]`.
#[inline]
pub fn clamp_unit(v: Fixed64) -> Fixed64 {
    v.clamp(Fixed64::ZERO, Fixed64::ONE)
}

/// `1 - |actual - optimal| / tolerance`, clamped to `[floor, 1]`.
///
/// Shared by the temperature-sensitive Cooker (tolerance 100, floor 0.5)
/// and the pressure-sensitive Sealer (tolerance 50, floor 0.7).
pub fn closeness_factor(
    actual: Fixed64,
    optimal: Fixed64,
    tolerance: Fixed64,
    floor: Fixed64,
) -> Fixed64 {
    if tolerance <= Fixed64::ZERO {
        return Fixed64::ONE;
    }
    let deviation = (actual - optimal).abs() / tolerance;
    (Fixed64::ONE - deviation).clamp(floor, Fixed64::ONE)
}
