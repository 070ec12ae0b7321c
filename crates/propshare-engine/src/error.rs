//! Typed failures for every engine operation
//!
//! Each variant names one precondition or external failure; `kind()` groups
//! them into the four classes hosts branch on. Every error aborts its
//! operation with no partial effect.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure class, for host-side policy (logging, retry decisions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller lacks the required privilege
    Authorization,
    /// Operation is invalid for the current lifecycle state
    StateConflict,
    /// A numeric or logical precondition failed
    ConstraintViolation,
    /// The settlement asset refused a transfer
    ExternalFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Authorization => write!(f, "Authorization"),
            ErrorKind::StateConflict => write!(f, "StateConflict"),
            ErrorKind::ConstraintViolation => write!(f, "ConstraintViolation"),
            ErrorKind::ExternalFailure => write!(f, "ExternalFailure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    // ========================================================================
    // Authorization
    // ========================================================================
    #[error("caller is not the asset issuer")]
    NotIssuer,
    #[error("caller is not the owner")]
    NotOwner,
    #[error("caller is not the pending owner")]
    NotPendingOwner,
    #[error("caller is not the order seller")]
    NotSeller,
    #[error("caller is not an approved operator for the holder")]
    NotOperator,

    // ========================================================================
    // State conflicts
    // ========================================================================
    #[error("asset id is already provisioned")]
    AlreadyProvisioned,
    #[error("asset id does not resolve to a ledger")]
    InvalidLedger,
    #[error("offering is not active")]
    NotActive,
    #[error("offering is fully funded")]
    OfferingFunded,
    #[error("order id does not exist")]
    UnknownOrder,
    #[error("order is no longer active")]
    OrderInactive,
    #[error("no ownership transfer is pending")]
    OwnershipTransferNotPending,

    // ========================================================================
    // Constraint violations
    // ========================================================================
    #[error("amount must be positive")]
    ZeroAmount,
    #[error("price must be positive")]
    ZeroPrice,
    #[error("share cap must be positive")]
    InvalidCap,
    #[error("mint would exceed the share cap")]
    CapExceeded,
    #[error("burn exceeds minted shares")]
    InsufficientMinted,
    #[error("balance does not cover the amount")]
    InsufficientBalance,
    #[error("order remaining does not cover the amount")]
    InsufficientRemaining,
    #[error("buyer and seller are the same account")]
    SelfTrade,
    #[error("the zero account is not allowed here")]
    ZeroAddress,
    #[error("fee exceeds the maximum basis points")]
    FeeTooHigh,
    #[error("asset has no share supply")]
    NoSupply,
    #[error("no rent to claim")]
    NothingToClaim,
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    // ========================================================================
    // External failures
    // ========================================================================
    #[error("settlement transfer failed during {0}")]
    SettlementTransferFailed(&'static str),
}

impl EngineError {
    /// Failure class this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotIssuer
            | EngineError::NotOwner
            | EngineError::NotPendingOwner
            | EngineError::NotSeller
            | EngineError::NotOperator => ErrorKind::Authorization,

            EngineError::AlreadyProvisioned
            | EngineError::InvalidLedger
            | EngineError::NotActive
            | EngineError::OfferingFunded
            | EngineError::UnknownOrder
            | EngineError::OrderInactive
            | EngineError::OwnershipTransferNotPending => ErrorKind::StateConflict,

            EngineError::ZeroAmount
            | EngineError::ZeroPrice
            | EngineError::InvalidCap
            | EngineError::CapExceeded
            | EngineError::InsufficientMinted
            | EngineError::InsufficientBalance
            | EngineError::InsufficientRemaining
            | EngineError::SelfTrade
            | EngineError::ZeroAddress
            | EngineError::FeeTooHigh
            | EngineError::NoSupply
            | EngineError::NothingToClaim
            | EngineError::Overflow(_) => ErrorKind::ConstraintViolation,

            EngineError::SettlementTransferFailed(_) => ErrorKind::ExternalFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_grouping() {
        assert_eq!(EngineError::NotIssuer.kind(), ErrorKind::Authorization);
        assert_eq!(EngineError::NotSeller.kind(), ErrorKind::Authorization);
        assert_eq!(EngineError::AlreadyProvisioned.kind(), ErrorKind::StateConflict);
        assert_eq!(EngineError::OrderInactive.kind(), ErrorKind::StateConflict);
        assert_eq!(EngineError::CapExceeded.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(
            EngineError::Overflow("order total").kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(
            EngineError::SettlementTransferFailed("rent payout").kind(),
            ErrorKind::ExternalFailure
        );
    }

    #[test]
    fn test_display_carries_context() {
        assert_eq!(
            EngineError::SettlementTransferFailed("buyer charge").to_string(),
            "settlement transfer failed during buyer charge"
        );
        assert_eq!(
            EngineError::Overflow("rent delta").to_string(),
            "arithmetic overflow in rent delta"
        );
        assert_eq!(ErrorKind::ExternalFailure.to_string(), "ExternalFailure");
    }
}
