//! Authentication module for chathub.
//!
//! Connections authenticate once, at establishment, with a bearer token.

mod token;

pub use token::{issue_token, AuthError, TokenClaims, TokenValidator};
