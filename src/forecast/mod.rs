pub mod baseline;
pub mod features;
pub mod metrics;
pub mod residual;
pub mod rollout;

pub use baseline::*;
pub use features::*;
pub use residual::*;
pub use rollout::*;
