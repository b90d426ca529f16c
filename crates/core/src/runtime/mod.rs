mod engine;

pub use engine::{Engine, EngineEvent};
