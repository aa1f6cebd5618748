//! Value types persisted by the oauthdb OAuth client store.
//!
//! These are the records the protocol layer hands to the store: established
//! sessions, pending authorization contexts, and the server metadata both of
//! them carry. The store treats them as opaque serde values; the only field it
//! interprets is the token expiry on [`Session`].

pub mod server;
pub mod session;

pub use server::{AuthorizationServerMetadata, DpopKey};
pub use session::{PendingAuthorization, Session, SessionInfo, TokenSet};
