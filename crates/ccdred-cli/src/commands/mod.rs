pub mod calibrate;
pub mod config;
pub mod pipeline;
pub mod sort;
