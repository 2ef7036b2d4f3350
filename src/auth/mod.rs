//! Authentication module
//!
//! Supports: no authentication, HTTP Basic, Bearer token, API key, a login
//! handshake and the OAuth 2.0 client credentials grant.
//!
//! `AuthMethodBuilder` turns a configured type name and its parameters into
//! an `Authenticator`. Login based methods call their endpoint once in
//! `Authenticator::login` and inject values from the response afterwards.

mod authenticator;
mod builder;
mod strategies;
mod types;

pub use authenticator::Authenticator;
pub use builder::AuthMethodBuilder;
pub use strategies::{
    lookup_path, ApiKey, AuthMethod, BasicHttp, BearerToken, Login, LoginRequest,
    OAuth20ClientCredentials,
};
pub use types::{AuthSpec, ClientAuthType, Location, MethodParameters, ParameterSpec, SECRET_PREFIX};

#[cfg(test)]
mod tests;
