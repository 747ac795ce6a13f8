//! The layout engine
//!
//! Owns the two particle buffers and the link table, and advances the layout
//! by a fixed number of optimization iterations per tick. Each iteration asks
//! the step controller for an acceptable trial, swaps it in and records the
//! result.

use tracing::{debug, info};

use crate::config::LayoutConfig;
use crate::graph::Graph;
use crate::layout::backend::{BackendResult, ComputeBackend, ComputeParams, Reduction};
use crate::layout::particle::{LinkTable, Particle, StateBuffers};
use crate::layout::pool::ParticlePool;
use crate::layout::step::{Outcome, StepController, Workspace};
use crate::node::Node;

/// Whether ticks advance the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Running,
    Paused,
}

/// Whether the controller has a baseline for the loaded state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Uninitialized,
    Ready,
}

/// Progress counters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutStats {
    /// Accepted iterations since the last load
    pub iterations: u64,
    /// Trial moves since the last load
    pub trials: u64,
    /// Energy of the current state
    pub energy: f64,
    /// Energy change of the last accepted iteration
    pub delta_energy: f64,
    /// Step length the controller will try next
    pub step_length: f64,
}

/// Force-directed layout over a particle pool.
pub struct LayoutEngine<'a> {
    backend: &'a dyn ComputeBackend,
    config: &'a LayoutConfig,
    buffers: StateBuffers,
    links: LinkTable,
    controller: StepController,
    partials: Vec<Reduction>,
    run_state: RunState,
    phase: Phase,
    stats: LayoutStats,
}

impl<'a> LayoutEngine<'a> {
    /// Create an empty engine; call [`load`](Self::load) to give it a graph.
    pub fn new(backend: &'a dyn ComputeBackend, config: &'a LayoutConfig) -> Self {
        let controller = StepController::from_config(config);
        let stats = LayoutStats {
            step_length: controller.step_length(),
            ..LayoutStats::default()
        };
        Self {
            backend,
            config,
            buffers: StateBuffers::default(),
            links: LinkTable::default(),
            controller,
            partials: Vec::new(),
            run_state: RunState::default(),
            phase: Phase::default(),
            stats,
        }
    }

    /// Replace the layout state with a fresh pool built from `graph`, then
    /// reset and initialize the controller.
    pub fn load(&mut self, graph: &Graph) -> BackendResult<()> {
        let pool = ParticlePool::from_graph(graph, self.config);
        self.buffers = StateBuffers::new(pool.particles);
        self.links = pool.links;
        self.reset();
        self.initialize()?;
        info!(
            particles = self.buffers.len(),
            links = self.links.len(),
            backend = self.backend.name(),
            mode = ?self.controller.mode(),
            energy = self.stats.energy,
            "layout loaded"
        );
        Ok(())
    }

    /// Zero the counters and return the controller to its initial state.
    pub fn reset(&mut self) {
        self.controller.reset();
        self.phase = Phase::Uninitialized;
        self.stats = LayoutStats {
            step_length: self.controller.step_length(),
            ..LayoutStats::default()
        };
    }

    /// Evaluate the current state and give the controller its baseline.
    ///
    /// Does nothing for an empty pool, which stays uninitialized. The phase
    /// is left unchanged when a kernel fails.
    pub fn initialize(&mut self) -> BackendResult<()> {
        if self.buffers.is_empty() {
            return Ok(());
        }
        let params = self.params();
        self.backend
            .evaluate_forces_and_energy(&mut self.buffers.current, &self.links, &params)?;
        let mut ws = Workspace::new(
            self.backend,
            &mut self.buffers,
            &self.links,
            &mut self.partials,
            params,
        );
        self.controller.initialize(&mut ws)?;
        self.stats.energy = self.controller.energy();
        self.phase = Phase::Ready;
        Ok(())
    }

    /// Advance the layout by up to `iterations_per_frame` iterations.
    ///
    /// `manual_step_delta` nudges the step length first, even while paused.
    /// Returns the number of iterations run. A kernel failure aborts the
    /// tick before its trial is swapped in, so the current state stays the
    /// last accepted one.
    pub fn tick(&mut self, manual_step_delta: i32) -> BackendResult<u32> {
        if manual_step_delta != 0 {
            self.controller.apply_manual_delta(manual_step_delta);
            self.stats.step_length = self.controller.step_length();
            debug!(
                delta = manual_step_delta,
                step = self.stats.step_length,
                "manual step change"
            );
        }
        if self.run_state == RunState::Paused
            || self.phase == Phase::Uninitialized
            || self.buffers.is_empty()
        {
            return Ok(0);
        }

        let params = self.params();
        self.controller.begin_frame();
        for _ in 0..self.config.iterations_per_frame {
            let outcome = {
                let mut ws = Workspace::new(
                    self.backend,
                    &mut self.buffers,
                    &self.links,
                    &mut self.partials,
                    params,
                );
                self.controller.search(&mut ws)?
            };
            self.buffers.swap();
            self.controller.accept(&outcome);
            self.record(&outcome);
        }
        debug!(
            iterations = self.stats.iterations,
            energy = self.stats.energy,
            delta_energy = self.stats.delta_energy,
            step = self.stats.step_length,
            "tick"
        );
        Ok(self.config.iterations_per_frame)
    }

    fn record(&mut self, outcome: &Outcome) {
        self.stats.iterations += 1;
        self.stats.trials += outcome.trials as u64;
        self.stats.energy = outcome.energy;
        self.stats.delta_energy = outcome.delta_energy();
        self.stats.step_length = self.controller.step_length();
    }

    fn params(&self) -> ComputeParams {
        ComputeParams {
            particle_count: self.buffers.len() as u32,
            step_length: self.controller.step_length() as f32,
            spring_tension: self.config.spring_tension,
            link_rest_length_scale: self.config.link_rest_length_scale,
        }
    }

    /// Toggle between running and paused
    pub fn pause(&mut self) {
        self.run_state = match self.run_state {
            RunState::Running => RunState::Paused,
            RunState::Paused => RunState::Running,
        };
    }

    pub fn set_running(&mut self, running: bool) {
        self.run_state = if running {
            RunState::Running
        } else {
            RunState::Paused
        };
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The most recently accepted particle state
    pub fn current(&self) -> &[Particle] {
        &self.buffers.current
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn stats(&self) -> LayoutStats {
        self.stats
    }

    pub fn controller(&self) -> &StepController {
        &self.controller
    }

    /// Graph of the current state: one positioned node per particle and one
    /// edge per link.
    pub fn snapshot(&self) -> Graph {
        let mut graph = Graph::new();
        for particle in &self.buffers.current {
            graph.add_node(
                Node::new()
                    .with_position(particle.position)
                    .with_size(particle.size)
                    .with_color(particle.color),
            );
        }
        for link in &self.links.links {
            graph.add_edge(link.end_a as usize, link.end_b as usize);
        }
        graph
    }
}
