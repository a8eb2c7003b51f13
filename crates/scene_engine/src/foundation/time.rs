//! Time management utilities

use std::time::{Duration, Instant};

/// Frame time handed to systems and behaviours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationTime {
    /// Time since the previous simulation frame in seconds
    pub delta: f32,

    /// Accumulated simulation time in seconds
    pub total: f32,

    /// Number of simulated frames so far
    pub frame: u64,
}

impl SimulationTime {
    /// Create a frame time
    pub fn new(delta: f32, total: f32, frame: u64) -> Self {
        Self { delta, total, frame }
    }

    /// Advance to the next frame by `delta` seconds
    pub fn advance(&self, delta: f32) -> Self {
        Self {
            delta,
            total: self.total + delta,
            frame: self.frame + 1,
        }
    }
}

impl Default for SimulationTime {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0)
    }
}

/// Time box for work queues that are processed a bit every frame
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
        }
    }

    /// Whether the budget is used up
    pub fn expired(&self) -> bool {
        Instant::now() >= self.end
    }
}
