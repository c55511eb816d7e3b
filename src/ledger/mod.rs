//! Ledger client boundary
//!
//! The orchestrator talks to the ledger only through [`LedgerClient`]:
//! estimate the gas for a method call, then submit it with explicit resource
//! parameters. Encoding, signing and transport are the client's concern.

pub mod ledger_errors;
pub mod simulated;

pub use ledger_errors::{
    classify_estimation_error, classify_submission_error, LedgerError, LedgerErrorCode,
};
pub use simulated::{SimulatedLedger, SubmissionRecord};

use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::types::{ActionArgs, MethodRef, PendingHandle, ResourceParams};

/// Wei per gwei
pub const GWEI: u128 = 1_000_000_000;

/// Asynchronous ledger client
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Estimate the gas a method call would consume
    async fn estimate_cost(&self, method: MethodRef, args: &ActionArgs) -> Result<u64, LedgerError>;

    /// Sign and broadcast a method call; resolves once the client has a hash
    async fn submit(
        &self,
        method: MethodRef,
        args: &ActionArgs,
        params: ResourceParams,
    ) -> Result<PendingHandle, LedgerError>;
}

/// Pad a raw estimate by the buffer factor, truncating toward zero
///
/// The factor goes through `Decimal` so `100 * 1.15` pads to 115, not 114.
/// Saturates at `u64::MAX`; a non-finite factor leaves the estimate unpadded.
pub fn pad_estimate(raw: u64, factor: f64) -> u64 {
    let Some(factor) = Decimal::from_f64(factor) else {
        return raw;
    };
    Decimal::from(raw)
        .checked_mul(factor)
        .and_then(|padded| padded.trunc().to_u64())
        .unwrap_or(u64::MAX)
}

/// Convert a gwei gas price to wei
///
/// Sub-wei fractions are truncated; negative or oversized prices yield `None`.
pub fn gwei_to_wei(gwei: Decimal) -> Option<u128> {
    if gwei.is_sign_negative() && !gwei.is_zero() {
        return None;
    }
    gwei.checked_mul(Decimal::from(GWEI as u64))?.trunc().to_u128()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_pad_estimate() {
        assert_eq!(pad_estimate(21_000, 1.2), 25_200);
        assert_eq!(pad_estimate(10, 1.25), 12);
        assert_eq!(pad_estimate(7, 1.0), 7);
        assert_eq!(pad_estimate(0, 1.2), 0);
    }

    #[test]
    fn test_pad_estimate_is_exact_for_decimal_factors() {
        assert_eq!(pad_estimate(100, 1.15), 115);
        assert_eq!(pad_estimate(1_000, 1.1), 1_100);
        assert_eq!(pad_estimate(200_000, 1.3), 260_000);
        assert_eq!(pad_estimate(u64::MAX, 2.0), u64::MAX);
        assert_eq!(pad_estimate(500, f64::NAN), 500);
    }

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei(Decimal::ONE), Some(1_000_000_000));
        assert_eq!(gwei_to_wei(Decimal::from_str("1.5").unwrap()), Some(1_500_000_000));
        assert_eq!(gwei_to_wei(Decimal::ZERO), Some(0));
        assert_eq!(gwei_to_wei(Decimal::from(-1)), None);
    }
}
