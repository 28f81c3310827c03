//! streamlink-identity: provisioning against the identity provider.
//!
//! Once Keycloak is running, the control plane creates its realm and the
//! OAuth clients its own UI and Kafbat UI log in with. [`IdentityAdmin`] is
//! the seam the orchestrator's hooks use; [`KeycloakAdmin`] talks to the
//! Keycloak admin REST API with a fresh `admin-cli` password-grant token per
//! operation. The API layer uses the same seam to verify user tokens once
//! authentication is enabled.

pub mod admin;
pub mod error;
pub mod keycloak;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use admin::{AdminEndpoint, IdentityAdmin, OAuthCredentials, TokenClaims};
pub use error::{IdentityError, IdentityResult};
pub use keycloak::KeycloakAdmin;
