pub mod activity;
pub mod address;
pub mod badge;
pub mod feed;
pub mod market;
pub mod referral;
pub mod signal;
pub mod social;

pub use activity::*;
pub use address::*;
pub use badge::*;
pub use feed::*;
pub use market::*;
pub use referral::*;
pub use signal::*;
pub use social::*;
