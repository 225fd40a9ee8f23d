//! Domain services shared by the HTTP handlers

pub mod badges;
pub mod oauth_state;

pub use badges::BadgeAwarder;
pub use oauth_state::{OAuthStateRegistry, PendingAuthorization};
