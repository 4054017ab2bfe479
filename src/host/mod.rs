mod engine;
mod task;

pub use task::{HostHandle, spawn};
