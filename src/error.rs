//! Shared error-code contract.
//!
//! Every error enum in the crate implements [`ErrorCode`] so callers (and
//! the side-table server) can branch on a stable machine code instead of the
//! human-readable message.

pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
