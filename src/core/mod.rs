pub mod discovery;
pub mod encode;
pub mod export;
pub mod family;
pub mod flatten;
pub mod ids;
pub mod loader;
pub mod pipeline;
pub mod repair;
pub mod spawn;
pub mod synth;
pub mod template;
pub mod validate;
