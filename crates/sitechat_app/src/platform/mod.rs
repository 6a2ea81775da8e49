pub mod app;
pub mod logging;
mod persistence;
mod render;
