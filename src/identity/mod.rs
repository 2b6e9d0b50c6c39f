//! Identity client — who is navigating, and when that changes.

pub mod http;
pub mod session;

pub use http::{HttpIdentityClient, HttpIdentityService, bearer_token};
pub use session::{
    AuthEvent, AuthEventKind, IdentityClient, IdentityConnector, IdentityId, Session, SessionEvents,
};
