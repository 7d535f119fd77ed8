//! Registered-service access-control evaluation for single-sign-on servers.
//!
//! A registered service bundles the policies that decide whether a client
//! application may use SSO, whether a principal may access it, whether an
//! existing session may be reused, and how its identifier is matched against
//! incoming request URLs.
//!
//! The evaluation flow:
//! 1. Look the service up in a [`registry::ServiceRegistry`] using each
//!    definition's [`matching::MatchingStrategy`], lowest evaluation order first
//! 2. Ask the [`access::AccessStrategy`] whether the service is enabled
//! 3. Check the expiration policy
//! 4. Authorize the principal (possibly consulting an external engine)
//! 5. For session reuse, consult the SSO flags and the
//!    [`sso::SsoParticipationPolicy`]
//!
//! [`authz`] ties these together and raises typed [`authz::AccessError`]s.

pub mod access;
pub mod activation;
pub mod attributes;
pub mod authz;
pub mod chain;
pub mod config;
pub mod datetime;
pub mod delegated;
pub mod expression;
pub mod matching;
#[cfg(feature = "cli")]
pub mod observability;
pub mod registry;
pub mod script;
pub mod sso;
pub mod ticket;
pub mod username;

pub use access::{AccessStrategy, AccessStrategyRequest, RegisteredServiceAccessStrategy};
pub use authz::{AccessError, AccessStrategyEnforcer};
pub use registry::{InMemoryServiceRegistry, RegisteredService, Service, ServiceRegistry};
