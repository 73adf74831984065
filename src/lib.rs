//! Identity-verification handshake and result reconciliation for the
//! provider popup flow.

pub mod common;
pub mod test_utils;
