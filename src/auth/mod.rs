//! Authentication: tokens, password hashing and account verification.

pub mod jwt;
pub mod password;
pub mod verification;

pub use jwt::{Claims, JwtConfig, KeyError, RefreshClaims};
pub use password::{PasswordPolicy, PasswordService};
