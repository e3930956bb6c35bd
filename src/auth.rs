//! Credential model: JWT claims, access/refresh pairs, and the clock used for expiry checks.

pub mod clock;
pub mod jwt;
pub mod secret;
pub mod token;

pub use clock::*;
pub use jwt::*;
pub use secret::*;
pub use token::*;
