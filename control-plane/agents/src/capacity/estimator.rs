//! Estimation of the free capacity a storage pool can still provide.
//!
//! The reported free space of a thin pool is only a lower bound on what can
//! be provisioned from it: the configured oversubscription ratio scales it
//! up. Reserved capacity, taken by the controller ahead of deployment, is
//! subtracted again. All arithmetic saturates instead of wrapping.

use stor_port::types::v0::transport::{CapacityInfo, StorPoolSpec, UNBOUNDED_CAPACITY};

/// Estimate the usable free capacity of a pool.
///
/// Returns `None` when the pool's free capacity has not been reported yet;
/// callers must treat unknown capacity as exclusionary, never as zero.
pub fn usable_free_capacity(
    default_ratio: f64,
    pool: &StorPoolSpec,
    capacity: &CapacityInfo,
    include_oversubscription: bool,
) -> Option<u64> {
    let free = capacity.free_capacity?;
    let mut usable = free;
    if include_oversubscription && pool.provider.thin() && free != UNBOUNDED_CAPACITY {
        usable = mul_ratio_saturating(free, pool.oversubscription_ratio(default_ratio));
    }
    Some(apply_reservation(usable, capacity.reserved_capacity))
}

/// Scale a capacity by an oversubscription ratio, saturating at the maximum
/// representable value.
fn mul_ratio_saturating(capacity: u64, ratio: f64) -> u64 {
    let ratio = if ratio.is_finite() { ratio.max(0.0) } else { 0.0 };
    let scaled = capacity as f64 * ratio;
    if scaled >= u64::MAX as f64 {
        u64::MAX
    } else {
        scaled as u64
    }
}

/// Subtract the reserved capacity; a negative reservation means capacity was
/// given back. Saturates at zero and at the maximum on either side.
fn apply_reservation(usable: u64, reserved: i64) -> u64 {
    if reserved >= 0 {
        usable.saturating_sub(reserved as u64)
    } else {
        usable.saturating_add(reserved.unsigned_abs())
    }
}
