pub mod bootstrap;
pub mod config;
pub mod decode;
pub mod normalize;
pub mod relay;
pub mod source;
pub mod timestamp;

pub use bootstrap::*;
pub use config::*;
pub use decode::*;
pub use normalize::*;
pub use relay::*;
pub use source::*;
pub use timestamp::*;
