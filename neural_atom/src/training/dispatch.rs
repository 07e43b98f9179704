//! Periodic side effects of the training loop.
//!
//! Every effect is described by a [`Trigger`] in one table; the loop asks the
//! [`Dispatcher`] which effects are due after each optimizer step and runs
//! them in table order. Effects are independent of one another.

use std::fmt;

use serde::{Deserialize, Serialize};

use atom_core::global_step;

use crate::config::TrainingConfig;

/// A side effect run between optimizer steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SideEffect {
    /// Emit scalar summaries and the console loss line.
    Summary,
    /// Decay the stage learning rate.
    LearningRateDecay,
    /// Render the feedback view.
    Feedback,
    /// Score the held-out images.
    Evaluation,
    /// Save a model snapshot.
    Checkpoint,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SideEffect::Summary => "summary",
            SideEffect::LearningRateDecay => "lr_decay",
            SideEffect::Feedback => "feedback",
            SideEffect::Evaluation => "evaluation",
            SideEffect::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}

/// Which counter a period is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// Global step, `1..=num_stages * iterations_per_stage`.
    Global,
    /// Iteration within the current stage, `1..=iterations_per_stage`.
    Stage,
}

/// When an effect fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    /// Counter the period applies to.
    pub clock: Clock,
    /// Fire when the counter is a multiple of this. 0 disables.
    pub period: usize,
    /// Also fire on the first iteration of every stage.
    pub on_first: bool,
    /// Also fire on the last iteration of every stage.
    pub on_last: bool,
}

impl Trigger {
    /// Periodic trigger on the global step.
    pub const fn global(period: usize) -> Self {
        Self {
            clock: Clock::Global,
            period,
            on_first: false,
            on_last: false,
        }
    }

    /// Periodic trigger on the stage iteration.
    pub const fn stage(period: usize) -> Self {
        Self {
            clock: Clock::Stage,
            period,
            on_first: false,
            on_last: false,
        }
    }

    /// Also fire on the first iteration of a stage.
    pub const fn and_first(mut self) -> Self {
        self.on_first = true;
        self
    }

    /// Also fire on the last iteration of a stage.
    pub const fn and_last(mut self) -> Self {
        self.on_last = true;
        self
    }

    /// Whether this trigger fires at `tick`.
    pub fn fires(&self, tick: &StepTick) -> bool {
        let counter = match self.clock {
            Clock::Global => tick.global_step,
            Clock::Stage => tick.stage_iteration,
        };
        let periodic = self.period > 0 && counter % self.period == 0;
        periodic || (self.on_first && tick.is_first()) || (self.on_last && tick.is_last())
    }
}

/// Position of the loop after one optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTick {
    /// 1-based stage.
    pub stage: usize,
    /// 1-based iteration within the stage.
    pub stage_iteration: usize,
    /// 1-based global step.
    pub global_step: usize,
    /// Iterations in every stage.
    pub iterations_per_stage: usize,
}

impl StepTick {
    /// Tick for iteration `stage_iteration` of `stage`.
    pub fn new(stage: usize, stage_iteration: usize, iterations_per_stage: usize) -> Self {
        Self {
            stage,
            stage_iteration,
            global_step: global_step(stage, stage_iteration, iterations_per_stage),
            iterations_per_stage,
        }
    }

    /// First iteration of the current stage.
    pub fn is_first(&self) -> bool {
        self.stage_iteration == 1
    }

    /// Last iteration of the current stage.
    pub fn is_last(&self) -> bool {
        self.stage_iteration == self.iterations_per_stage
    }
}

/// The table of side effects and their triggers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: Vec<(SideEffect, Trigger)>,
}

impl Dispatcher {
    /// Build the table for a run.
    ///
    /// Evaluation is only scheduled when held-out data exists and fast
    /// debug mode is off.
    pub fn from_config(config: &TrainingConfig, has_test_data: bool) -> Self {
        let mut table = vec![
            (SideEffect::Summary, Trigger::global(config.summary_freq).and_first().and_last()),
            (SideEffect::LearningRateDecay, Trigger::stage(config.lr_decay_steps_per_stage)),
            (SideEffect::Feedback, Trigger::global(config.feedback_freq).and_first().and_last()),
        ];
        if has_test_data && !config.fast_debug_mode {
            table.push((SideEffect::Evaluation, Trigger::global(config.test_freq).and_last()));
        }
        table.push((SideEffect::Checkpoint, Trigger::global(config.save_freq).and_first().and_last()));
        Self { table }
    }

    /// The full table, in dispatch order.
    pub fn table(&self) -> &[(SideEffect, Trigger)] {
        &self.table
    }

    /// Effects due at `tick`, in dispatch order.
    pub fn due(&self, tick: &StepTick) -> Vec<SideEffect> {
        self.table
            .iter()
            .filter(|(_, trigger)| trigger.fires(tick))
            .map(|(effect, _)| *effect)
            .collect()
    }
}
