pub mod identity;
pub mod types;
pub mod wheel;

pub use identity::{identity_for_wallet, short_address, Identity, IDENTITY_CATALOG};
pub use types::{DistributionStatus, DrawStage, PayoutCategory, RoundStatus};
pub use wheel::{winner_index, WheelError};
