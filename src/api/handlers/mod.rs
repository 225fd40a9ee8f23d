pub mod access;
pub mod activity;
pub mod badges;
pub mod referral;
pub mod signals;
pub mod social;
pub mod spikes;
pub mod system;

pub use access::*;
pub use activity::*;
pub use badges::*;
pub use referral::*;
pub use signals::*;
pub use social::*;
pub use spikes::*;
pub use system::*;

use crate::api::error::ApiResult;
use crate::domain::normalize_address;

/// Validate and lowercase a wallet address from a path or body
pub(crate) fn parse_address(raw: &str) -> ApiResult<String> {
    Ok(normalize_address(raw)?)
}
