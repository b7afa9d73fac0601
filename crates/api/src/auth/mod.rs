//! Bearer-token verification for tokens issued by the identity provider.

pub mod jwt;
