//! Target selection and stage scheduling.
//!
//! The pipeline holds the registered stages sorted by phase and runs them
//! one after another. However stages are selected, they run in phase order,
//! so a later stage always sees what an earlier one produced. A stage that aborts (for example because its converter
//! is missing) does not stop the stages after it.

use crate::clean::{CleanReport, clean};
use crate::context::BuildContext;
use crate::stages::{Stage, StageKind, StageReport, run_stage, standard_stages};
use tracing::info;

/// What one command-line selector asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    All,
    Stage(StageKind),
    Clean,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::All => "all",
            Target::Stage(kind) => kind.as_str(),
            Target::Clean => "clean",
        }
    }
}

impl TryFrom<&str> for Target {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "all" => Ok(Target::All),
            "clean" => Ok(Target::Clean),
            // The schema stage answers to both names.
            "schema" => Ok(Target::Stage(StageKind::Flatbuffers)),
            other => StageKind::try_from(other).map(Target::Stage),
        }
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Every built-in stage.
    pub fn standard() -> Self {
        let mut pipeline = Self::new();
        for stage in standard_stages() {
            pipeline.register(stage);
        }
        pipeline
    }

    /// Add a stage; stages stay sorted by phase, registration order within
    /// a phase.
    pub fn register(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
        self.stages.sort_by_key(|stage| stage.kind().phase());
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|stage| stage.kind()).collect()
    }

    fn selected(&self, kinds: Option<&[StageKind]>) -> Vec<&dyn Stage> {
        self.stages
            .iter()
            .map(|stage| stage.as_ref())
            .filter(|stage| kinds.is_none_or(|kinds| kinds.contains(&stage.kind())))
            .collect()
    }

    pub fn run(&self, ctx: &BuildContext, target: Target) -> PipelineReport {
        match target {
            Target::Clean => PipelineReport {
                clean: Some(clean(ctx, &self.selected(None))),
                ..PipelineReport::default()
            },
            Target::All => run_selected(ctx, self.selected(None)),
            Target::Stage(kind) => self.run_stages(ctx, &[kind]),
        }
    }

    /// Run every stage whose kind is in `kinds` in one pass, in phase order
    /// regardless of the order `kinds` lists them.
    pub fn run_stages(&self, ctx: &BuildContext, kinds: &[StageKind]) -> PipelineReport {
        run_selected(ctx, self.selected(Some(kinds)))
    }
}

fn run_selected(ctx: &BuildContext, stages: Vec<&dyn Stage>) -> PipelineReport {
    let mut report = PipelineReport::default();
    for stage in stages {
        info!(stage = stage.kind().as_str(), "running");
        report.stages.push(run_stage(stage, ctx));
    }
    report
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    pub clean: Option<CleanReport>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(StageReport::succeeded)
            && self.clean.as_ref().is_none_or(CleanReport::succeeded)
    }
}
