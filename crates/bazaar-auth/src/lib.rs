//! # bazaar-auth
//!
//! Token verification for the chat gateway.
//!
//! - `jwt`: JWT creation and validation
//! - `verifier`: the [`TokenVerifier`] contract the gateway authenticates against

pub mod jwt;
pub mod verifier;

pub use jwt::{Claims, JwtDecoder, JwtEncoder};
pub use verifier::TokenVerifier;
