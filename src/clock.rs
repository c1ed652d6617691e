//! Sub-step scheduling for the host frame loop.

/// Converts elapsed frame time into whole physics sub-steps.
///
/// The clock keeps the total elapsed time and a ledger of sub-steps already
/// issued; each frame issues however many whole sub-steps fit into the gap
/// between the two. Deriving the count from absolute time instead of a
/// carried fractional remainder keeps long runs drift-free, and a per-frame
/// cap stops a stalled frame from queueing an unbounded burst of dispatches.
pub struct SubStepClock {
    /// Duration of one sub-step in seconds.
    time_step: f32,
    /// Total frame time fed to the clock, in seconds.
    elapsed: f64,
    /// Sub-steps handed out so far.
    issued: u64,
    /// Upper bound on sub-steps issued by a single `advance` call.
    max_steps_per_frame: u32,
}

impl SubStepClock {
    pub fn new(time_step: f32, max_steps_per_frame: u32) -> Self {
        Self {
            time_step,
            elapsed: 0.0,
            issued: 0,
            max_steps_per_frame: max_steps_per_frame.max(1),
        }
    }

    /// Account for `frame_dt` seconds of frame time and return how many
    /// sub-steps to run now. Steps beyond the per-frame cap stay owed and
    /// drain over the following frames.
    pub fn advance(&mut self, frame_dt: f32) -> u32 {
        self.elapsed += f64::from(frame_dt.max(0.0));
        let due = (self.elapsed / f64::from(self.time_step)) as u64;
        let steps = due
            .saturating_sub(self.issued)
            .min(u64::from(self.max_steps_per_frame)) as u32;
        self.issued += u64::from(steps);
        steps
    }

    /// Simulation time covered by the issued sub-steps.
    pub fn simulated_time(&self) -> f32 {
        self.issued as f32 * self.time_step
    }

    pub fn sub_steps_issued(&self) -> u64 {
        self.issued
    }
}
