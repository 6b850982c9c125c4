//! Router Module Index
//!
//! Routes are split by access level so authentication is applied once, as a
//! layer, to the whole authenticated module.

/// Routes open to anonymous clients (health, register, login).
pub mod public;

/// Routes behind the bearer-token extractor. Role and ownership checks happen
/// inside the handlers through the access policy.
pub mod authenticated;
