//! vl_logo — Best-effort service logo resolution for VaultLock
//!
//! Logos are cosmetic: every path in this crate is allowed to fail
//! without consequence for the credential store. Resolution is
//! synchronous against local state only (memory, disk cache); network
//! fetches run on background tasks and announce completion over an
//! [`tokio::sync::mpsc`] channel so a UI can swap initials for a logo
//! when one arrives.

pub mod cache;
pub mod domain;
pub mod fetch;

pub use cache::{LogoCache, LogoEvent};
pub use domain::resolve_domain;
