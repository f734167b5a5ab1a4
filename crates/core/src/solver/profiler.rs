//! Wall-clock timing of solver passes.
//!
//! A [`ProfilerScope`] is opened at the start of a pass and logs its elapsed
//! time, and the cell throughput when a cell count is attached, when it goes
//! out of scope.

use std::time::Instant;
use tracing::debug;

/// Times a solver pass until dropped.
pub struct ProfilerScope {
    start: Instant,
    name: &'static str,
    cells: Option<usize>,
}

impl ProfilerScope {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            cells: None,
        }
    }

    /// Attach the number of grid cells the pass touches.
    pub fn with_cells(mut self, cells: usize) -> Self {
        self.cells = Some(cells);
        self
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Million cells per second, if a cell count is attached.
    pub fn throughput(&self) -> Option<f64> {
        let seconds = self.start.elapsed().as_secs_f64();
        self.cells
            .filter(|_| seconds > 0.0)
            .map(|cells| cells as f64 / seconds / 1e6)
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        match self.throughput() {
            Some(mcells) => debug!(
                pass = self.name,
                elapsed_ms,
                "{} took {:.3} ms ({:.2} Mcell/s)",
                self.name,
                elapsed_ms,
                mcells
            ),
            None => debug!(pass = self.name, elapsed_ms, "{} took {:.3} ms", self.name, elapsed_ms),
        }
    }
}
