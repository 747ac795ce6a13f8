//! Step-length controllers
//!
//! A controller decides how far the particles move along the descent vector
//! in each iteration. It can run several trial moves through a
//! [`Workspace`] before settling on one; the engine then swaps the accepted
//! trial into place and hands the [`Outcome`] back via
//! [`StepController::accept`].

use tracing::{debug, info, trace};

use crate::config::{LayoutConfig, StepMode};
use crate::layout::backend::{BackendResult, ComputeBackend, ComputeParams, Reduction};
use crate::layout::particle::{LinkTable, StateBuffers};

/// Step change per unit of manual delta for additive controllers
pub const MANUAL_STEP_INCREMENT: f64 = 0.01;

/// Initial step length of the line search
pub const LINE_SEARCH_INITIAL_STEP: f64 = 0.01;

/// Bounds of the adaptive line-search increment
pub const MIN_STEP_RATE: f64 = 1e-9;
pub const MAX_STEP_RATE: f64 = 0.1;

/// Multiplicative step change of the adaptive controller
pub const ADAPTIVE_STEP_FACTOR: f64 = 1.01;

/// Improving iterations tolerated before the adaptive controller grows the step
pub const MAX_PROGRESS: u32 = 5;

/// Kernel access for one iteration: the buffers, the links and a backend.
///
/// The current buffer always holds evaluated forces and energies.
pub struct Workspace<'a> {
    backend: &'a dyn ComputeBackend,
    buffers: &'a mut StateBuffers,
    links: &'a LinkTable,
    partials: &'a mut Vec<Reduction>,
    params: ComputeParams,
    trials: u32,
}

impl<'a> Workspace<'a> {
    pub fn new(
        backend: &'a dyn ComputeBackend,
        buffers: &'a mut StateBuffers,
        links: &'a LinkTable,
        partials: &'a mut Vec<Reduction>,
        params: ComputeParams,
    ) -> Self {
        Self {
            backend,
            buffers,
            links,
            partials,
            params,
            trials: 0,
        }
    }

    /// Energy of the current state and `-|F|^2` along its descent vector
    pub fn measure_current(&mut self) -> BackendResult<Reduction> {
        let current = &self.buffers.current;
        self.backend
            .reduce_energy_and_dot(current, current, self.partials, &self.params)
    }

    /// Move the current state by `step` into the next buffer, evaluate it and
    /// reduce it against the current one.
    ///
    /// On error the next buffer holds no usable state.
    pub fn trial(&mut self, step: f64) -> BackendResult<Reduction> {
        self.trials += 1;
        let params = ComputeParams {
            step_length: step as f32,
            ..self.params
        };
        let StateBuffers { current, next } = &mut *self.buffers;
        self.backend.integrate(current, next, &params)?;
        self.backend
            .evaluate_forces_and_energy(next, self.links, &params)?;
        let reduction = self
            .backend
            .reduce_energy_and_dot(current, next, self.partials, &params)?;
        trace!(
            step,
            energy = reduction.energy,
            dot = reduction.dot,
            "trial"
        );
        Ok(reduction)
    }

    /// Trial moves run so far
    pub fn trials(&self) -> u32 {
        self.trials
    }
}

/// The trial a controller settled on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Step length the accepted trial used
    pub step: f64,
    /// Energy before the move
    pub previous_energy: f64,
    /// Energy after the move
    pub energy: f64,
    /// Trial moves run in this iteration
    pub trials: u32,
}

impl Outcome {
    pub fn delta_energy(&self) -> f64 {
        self.energy - self.previous_energy
    }
}

/// Constant step; every trial is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedStep {
    initial_step: f64,
    step: f64,
    energy: f64,
}

impl FixedStep {
    pub fn new(step: f64) -> Self {
        Self {
            initial_step: step,
            step,
            energy: 0.0,
        }
    }

    fn search(&mut self, ws: &mut Workspace<'_>) -> BackendResult<Outcome> {
        let trial = ws.trial(self.step)?;
        Ok(Outcome {
            step: self.step,
            previous_energy: self.energy,
            energy: trial.energy,
            trials: ws.trials(),
        })
    }
}

/// Line search on the Wolfe conditions that freezes once the step settles.
#[derive(Debug, Clone, PartialEq)]
pub struct WolfeLineSearch {
    c1: f64,
    c2: f64,
    search_iterations: u32,
    switch_to_manual_after: u32,
    alpha: f64,
    /// Step length accepted by the previous iteration
    alpha_before: f64,
    energy: f64,
    initial_energy: f64,
    delta_energy_bound: f64,
    stability: u32,
    frozen: bool,
}

impl WolfeLineSearch {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            c1: config.c1,
            c2: config.c2,
            search_iterations: config.search_iterations.max(1),
            switch_to_manual_after: config.switch_to_manual_after,
            alpha: LINE_SEARCH_INITIAL_STEP,
            alpha_before: LINE_SEARCH_INITIAL_STEP,
            energy: 0.0,
            initial_energy: 0.0,
            delta_energy_bound: 0.0,
            stability: 0,
            frozen: false,
        }
    }

    /// Smallest-magnitude energy change accepted so far
    pub fn delta_energy_bound(&self) -> f64 {
        self.delta_energy_bound
    }

    /// Whether the step has been frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Consecutive iterations without a step change
    pub fn stability(&self) -> u32 {
        self.stability
    }

    /// Increment applied to `alpha` after a failed trial
    fn rate(&self) -> f64 {
        let rate = (self.delta_energy_bound.abs() / self.initial_energy).sqrt() * 10.0;
        if rate.is_finite() {
            rate.clamp(MIN_STEP_RATE, MAX_STEP_RATE)
        } else {
            MAX_STEP_RATE
        }
    }

    fn search(&mut self, ws: &mut Workspace<'_>) -> BackendResult<Outcome> {
        if self.frozen {
            let trial = ws.trial(self.alpha)?;
            return Ok(Outcome {
                step: self.alpha,
                previous_energy: self.energy,
                energy: trial.energy,
                trials: ws.trials(),
            });
        }

        let Reduction {
            energy: e_k,
            dot: g_k,
            ..
        } = ws.measure_current()?;
        let rate = self.rate();

        loop {
            let step = self.alpha;
            let trial = ws.trial(step)?;
            let sufficient_decrease = trial.energy - e_k <= step * self.c1 * g_k;
            let curvature = trial.dot >= self.c2 * g_k;

            let outcome = Outcome {
                step,
                previous_energy: e_k,
                energy: trial.energy,
                trials: ws.trials(),
            };
            match (sufficient_decrease, curvature) {
                (true, true) => return Ok(outcome),
                (false, true) => self.alpha -= rate,
                _ => self.alpha += rate,
            }
            if ws.trials() >= self.search_iterations {
                debug!(
                    trials = ws.trials(),
                    step,
                    next_step = self.alpha,
                    "line search exhausted, accepting last trial"
                );
                return Ok(outcome);
            }
        }
    }

    /// A manual nudge since the previous iteration counts as a step change.
    fn accept(&mut self, outcome: &Outcome) {
        if self.alpha == self.alpha_before {
            self.stability += 1;
        } else {
            self.stability = 0;
        }
        self.alpha_before = self.alpha;

        let delta = outcome.delta_energy();
        if delta.abs() < self.delta_energy_bound.abs() {
            self.delta_energy_bound = delta;
        }

        if !self.frozen && self.stability >= self.switch_to_manual_after {
            self.frozen = true;
            info!(
                step = self.alpha,
                stability = self.stability,
                "step length settled, switching to fixed step"
            );
        }
    }
}

/// Multiplicative step adaptation driven by consecutive improvements.
#[derive(Debug, Clone, PartialEq)]
pub struct WolframAdaptive {
    initial_step: f64,
    step: f64,
    /// Step every trial of the current frame moves by
    frame_step: f64,
    energy: f64,
    progress: u32,
}

impl WolframAdaptive {
    pub fn new(step: f64) -> Self {
        Self {
            initial_step: step,
            step,
            frame_step: step,
            energy: 0.0,
            progress: 0,
        }
    }

    /// Consecutive improving iterations since the last step change
    pub fn progress(&self) -> u32 {
        self.progress
    }

    /// Update the step from one energy transition.
    pub fn observe(&mut self, previous: f64, next: f64) {
        if next < previous {
            self.progress += 1;
        } else {
            self.progress = 0;
            self.step /= ADAPTIVE_STEP_FACTOR;
        }
        if self.progress > MAX_PROGRESS {
            self.progress = 0;
            self.step *= ADAPTIVE_STEP_FACTOR;
        }
    }

    fn search(&mut self, ws: &mut Workspace<'_>) -> BackendResult<Outcome> {
        let trial = ws.trial(self.frame_step)?;
        Ok(Outcome {
            step: self.frame_step,
            previous_energy: self.energy,
            energy: trial.energy,
            trials: ws.trials(),
        })
    }
}

/// The step strategy driving a layout.
#[derive(Debug, Clone, PartialEq)]
pub enum StepController {
    Fixed(FixedStep),
    WolfeLineSearch(WolfeLineSearch),
    WolframAdaptive(WolframAdaptive),
}

impl StepController {
    /// Build the controller selected by `config.step_mode`
    pub fn from_config(config: &LayoutConfig) -> Self {
        let step = config.step_size as f64;
        match config.step_mode {
            StepMode::Fixed => Self::Fixed(FixedStep::new(step)),
            StepMode::Auto => Self::WolfeLineSearch(WolfeLineSearch::new(config)),
            StepMode::Wolfram => Self::WolframAdaptive(WolframAdaptive::new(step)),
        }
    }

    pub fn mode(&self) -> StepMode {
        match self {
            Self::Fixed(_) => StepMode::Fixed,
            Self::WolfeLineSearch(_) => StepMode::Auto,
            Self::WolframAdaptive(_) => StepMode::Wolfram,
        }
    }

    /// Current step length
    pub fn step_length(&self) -> f64 {
        match self {
            Self::Fixed(c) => c.step,
            Self::WolfeLineSearch(c) => c.alpha,
            Self::WolframAdaptive(c) => c.step,
        }
    }

    /// Energy of the last accepted state
    pub fn energy(&self) -> f64 {
        match self {
            Self::Fixed(c) => c.energy,
            Self::WolfeLineSearch(c) => c.energy,
            Self::WolframAdaptive(c) => c.energy,
        }
    }

    /// Return to the freshly constructed state
    pub fn reset(&mut self) {
        match self {
            Self::Fixed(c) => *c = FixedStep::new(c.initial_step),
            Self::WolfeLineSearch(c) => {
                c.alpha = LINE_SEARCH_INITIAL_STEP;
                c.alpha_before = LINE_SEARCH_INITIAL_STEP;
                c.energy = 0.0;
                c.initial_energy = 0.0;
                c.delta_energy_bound = 0.0;
                c.stability = 0;
                c.frozen = false;
            }
            Self::WolframAdaptive(c) => *c = WolframAdaptive::new(c.initial_step),
        }
    }

    /// Record the baseline energy of the current state.
    ///
    /// The current buffer must already hold evaluated forces.
    pub fn initialize(&mut self, ws: &mut Workspace<'_>) -> BackendResult<()> {
        let baseline = ws.measure_current()?.energy;
        match self {
            Self::Fixed(c) => c.energy = baseline,
            Self::WolfeLineSearch(c) => {
                c.energy = baseline;
                c.initial_energy = baseline;
                c.delta_energy_bound = baseline;
            }
            Self::WolframAdaptive(c) => c.energy = baseline,
        }
        Ok(())
    }

    /// Nudge the step length by `delta` manual units
    pub fn apply_manual_delta(&mut self, delta: i32) {
        if delta == 0 {
            return;
        }
        match self {
            Self::Fixed(c) => c.step += MANUAL_STEP_INCREMENT * delta as f64,
            Self::WolfeLineSearch(c) => c.alpha += MANUAL_STEP_INCREMENT * delta as f64,
            Self::WolframAdaptive(c) => c.step *= ADAPTIVE_STEP_FACTOR.powi(delta),
        }
    }

    /// Start a tick. The adaptive controller fixes the step its trials use
    /// until the next frame.
    pub fn begin_frame(&mut self) {
        if let Self::WolframAdaptive(c) = self {
            c.frame_step = c.step;
        }
    }

    /// Run trial moves until one is acceptable.
    ///
    /// The accepted trial is left in the next buffer.
    pub fn search(&mut self, ws: &mut Workspace<'_>) -> BackendResult<Outcome> {
        match self {
            Self::Fixed(c) => c.search(ws),
            Self::WolfeLineSearch(c) => c.search(ws),
            Self::WolframAdaptive(c) => c.search(ws),
        }
    }

    /// Update internal state once the trial has been swapped in
    pub fn accept(&mut self, outcome: &Outcome) {
        match self {
            Self::Fixed(_) => {}
            Self::WolfeLineSearch(c) => c.accept(outcome),
            Self::WolframAdaptive(c) => c.observe(c.energy, outcome.energy),
        }
        match self {
            Self::Fixed(c) => c.energy = outcome.energy,
            Self::WolfeLineSearch(c) => c.energy = outcome.energy,
            Self::WolframAdaptive(c) => c.energy = outcome.energy,
        }
    }
}
