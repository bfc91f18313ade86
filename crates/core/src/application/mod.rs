// Application Layer - Use Cases and Coordination

pub mod constants;
pub mod exit_signal;
pub mod sampler;
pub mod transcript;

// Re-exports
pub use exit_signal::{exit_channel, ExitNotifier, ExitWatch};
pub use sampler::{ResourceSampler, SamplerStop};
pub use transcript::{spawn_flusher, Appended, FlushRequests, LogAggregator, LogSink};
