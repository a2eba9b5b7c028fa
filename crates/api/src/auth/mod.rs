//! Authentication for the compliance API: a single shared-secret bearer
//! token gating every GDPR route (see [`operator`]).

pub mod operator;

pub use operator::{require_operator, AuthError, OperatorIdentity};
