//! Bearer-token authentication.
//!
//! - `bearer` - `Authorization` header parsing
//! - `jwks` - signing-key cache with TTL and single-flight refresh
//! - `gate` - the admission decision
//! - `claims` - claims of admitted tokens

pub mod bearer;
pub mod claims;
pub mod gate;
pub mod jwks;

pub use bearer::{extract_from_header, extract_token, BearerToken};
pub use claims::{Audience, Claims};
pub use gate::TokenAdmissionGate;
pub use jwks::{JwksClient, JwksFetchError, KeySetState};
