//! Authentication and authorization
//!
//! Provides:
//! - JWT bearer token verification
//! - The per-request [`Principal`]
//! - Permission names and the route permission table

pub mod jwt;
pub mod permissions;
pub mod principal;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use permissions::{get_required_permission, parse_permissions, Permission};
pub use principal::{Principal, Role};
