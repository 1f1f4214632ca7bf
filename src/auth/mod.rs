//! Identity and authorization.
//!
//! # Data Flow
//! ```text
//! Authorization header
//!     → authenticator.rs (bearer parsing, credential lookup)
//!     → Principal (attached once to the request)
//!     → gate.rs (authenticated → activated → permitted)
//!     → handler
//! ```

pub mod authenticator;
pub mod gate;
pub mod permissions;
pub mod principal;
pub mod token;

pub use authenticator::{CredentialStore, TokenAuthenticator};
pub use gate::{Gate, GateChain, GateChainBuilder};
pub use permissions::{PermissionGrants, PermissionResolver, Permissions};
pub use principal::{Principal, UserId};
pub use token::{Credential, Scope};
