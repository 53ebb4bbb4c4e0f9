// src/analyser/mod.rs

//! The task analyser: single consumer of the request queue.
//!
//! All task graph and data registry mutation happens here, on one thread,
//! which removes the need for any locking on that state.
//!
//! The pure, synchronous state machine lives in [`core`]; the per-request
//! logic in [`handlers`]; the async IO shell that reads the queue and talks
//! to the dispatcher in [`runtime`].

pub mod core;
pub mod handlers;
pub mod runtime;

pub use self::core::AnalyserCore;
pub use handlers::CoreStep;
pub use runtime::Analyser;

/// Options shared by the core and the shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Capacity of the bounded request queue.
    pub queue_capacity: usize,
    /// Stop the analyser once every application has ended.
    pub stop_when_apps_ended: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            stop_when_apps_ended: false,
        }
    }
}
