pub mod builtin;
pub mod engine;
pub mod graph;
pub mod matrix;
pub mod stats;

pub use builtin::Builtin;
pub use engine::Engine;
pub use graph::Sampler;
pub use matrix::MatrixOp;
pub use stats::{summarize, Summary};
