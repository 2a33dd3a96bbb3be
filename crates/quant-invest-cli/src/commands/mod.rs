pub mod metrics;
pub mod optimize;
pub mod pipeline;
pub mod screen;
