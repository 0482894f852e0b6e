pub mod config;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod script;
pub mod services;
pub mod synth;
