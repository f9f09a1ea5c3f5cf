pub mod config;
pub mod error;
pub mod spec;

pub use error::{EngineError, EngineResult};
pub use spec::{CipherAlgorithm, CipherSpec, KdfAlgorithm, KdfSpec, MacAlgorithm, MacSpec};
