pub mod channel_update;
pub mod config;
pub mod error;
pub mod features;
pub mod types;

pub use channel_update::ChannelUpdate;
pub use config::{PathFindingConfig, SessionConfig};
pub use error::CoreError;
pub use features::{FeatureBit, FeatureVector};
pub use types::{CustomRecords, MilliSatoshi, PaymentAddr, Satoshi, Vertex};
