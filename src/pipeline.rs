//! Pipeline composition and execution.
//!
//! A [`Pipeline`] is a small tree: leaves are [`Step`]s, inner nodes run their
//! children either one after another or side by side. One executor interprets
//! every tree the same way:
//!
//! - **Sequential**: each child starts after the previous one returned. The
//!   first failure stops the group.
//! - **Parallel**: children run on the rayon pool. Every child runs to the
//!   end; the group fails if any child failed, and the error lists all of
//!   the failing steps.
//!
//! The two standing pipelines are:
//!
//! ```text
//! compile = parallel { style, script, page }
//! release = sequential [ clean,
//!                        parallel { sequential [ compile, rewrite ],
//!                                   image, font, extra } ]
//! ```

use crate::clean::Clean;
use crate::config::{Layout, ProjectConfig};
use crate::rewrite::ReferenceRewriter;
use crate::stage::{BuildContext, Stage, StageError, Step, StepReport};
use crate::transform::{ImageTransform, PageTransform, ScriptTransform, StyleTransform, Verbatim};
use crate::types::{AssetKind, Destination};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

/// One failed leaf of a pipeline run.
#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: StageError,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{} failed: {}", describe_count(.failures.len()), describe_failures(.failures))]
    Failed { failures: Vec<StepFailure> },
}

fn describe_count(n: usize) -> String {
    if n == 1 {
        "1 step".to_string()
    } else {
        format!("{n} steps")
    }
}

fn describe_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.step, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PipelineError {
    pub fn failures(&self) -> &[StepFailure] {
        match self {
            PipelineError::Failed { failures } => failures,
        }
    }

    pub fn failed_steps(&self) -> Vec<&str> {
        self.failures().iter().map(|f| f.step.as_str()).collect()
    }
}

/// Successful steps of a pipeline run, in completion order.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub steps: Vec<(String, StepReport)>,
}

impl PipelineReport {
    pub fn files_written(&self) -> usize {
        self.steps.iter().map(|(_, r)| r.files.len()).sum()
    }
}

pub enum Pipeline {
    Step(Arc<dyn Step>),
    Parallel(Vec<Pipeline>),
    Sequential(Vec<Pipeline>),
}

impl Pipeline {
    pub fn step<S: Step + 'static>(step: &Arc<S>) -> Self {
        Pipeline::Step(step.clone())
    }

    /// Names of every leaf, depth first.
    pub fn step_names(&self) -> Vec<String> {
        match self {
            Pipeline::Step(step) => vec![step.name().to_string()],
            Pipeline::Parallel(children) | Pipeline::Sequential(children) => {
                children.iter().flat_map(Pipeline::step_names).collect()
            }
        }
    }

    pub fn run(&self, ctx: &BuildContext) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();
        match self.execute(ctx, &mut report) {
            Ok(()) => Ok(report),
            Err(failures) => Err(PipelineError::Failed { failures }),
        }
    }

    fn execute(
        &self,
        ctx: &BuildContext,
        report: &mut PipelineReport,
    ) -> Result<(), Vec<StepFailure>> {
        match self {
            Pipeline::Step(step) => match step.run(ctx) {
                Ok(step_report) => {
                    report.steps.push((step.name().to_string(), step_report));
                    Ok(())
                }
                Err(error) => {
                    tracing::debug!(step = step.name(), %error, "step failed");
                    Err(vec![StepFailure {
                        step: step.name().to_string(),
                        error,
                    }])
                }
            },
            Pipeline::Sequential(children) => {
                for child in children {
                    child.execute(ctx, report)?;
                }
                Ok(())
            }
            Pipeline::Parallel(children) => {
                let outcomes: Vec<_> = children
                    .par_iter()
                    .map(|child| {
                        let mut branch = PipelineReport::default();
                        let outcome = child.execute(ctx, &mut branch);
                        (branch, outcome)
                    })
                    .collect();

                let mut failures = Vec::new();
                for (branch, outcome) in outcomes {
                    report.steps.extend(branch.steps);
                    if let Err(mut f) = outcome {
                        failures.append(&mut f);
                    }
                }
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(failures)
                }
            }
        }
    }
}

/// `parallel { style, script, page }`
pub fn compile_pipeline(style: Pipeline, script: Pipeline, page: Pipeline) -> Pipeline {
    Pipeline::Parallel(vec![style, script, page])
}

/// `sequential [ clean, parallel { sequential [compile, rewrite], image, font, extra } ]`
pub fn release_pipeline(
    clean: Pipeline,
    compile: Pipeline,
    rewrite: Pipeline,
    image: Pipeline,
    font: Pipeline,
    extra: Pipeline,
) -> Pipeline {
    Pipeline::Sequential(vec![
        clean,
        Pipeline::Parallel(vec![
            Pipeline::Sequential(vec![compile, rewrite]),
            image,
            font,
            extra,
        ]),
    ])
}

/// Every step of a project, built once from the effective configuration.
pub struct StageSet {
    pub style: Arc<Stage>,
    pub script: Arc<Stage>,
    pub page: Arc<Stage>,
    pub image: Arc<Stage>,
    pub font: Arc<Stage>,
    pub extra: Arc<Stage>,
    pub rewrite: Arc<ReferenceRewriter>,
    pub clean: Arc<Clean>,
}

impl StageSet {
    pub fn new(config: &ProjectConfig, layout: &Layout) -> Self {
        let paths = &config.build.paths;
        let dest = |kind: AssetKind| match kind.destination() {
            Destination::Temp => layout.temp.clone(),
            Destination::Dist => layout.dist.clone(),
        };
        let stage = |kind: AssetKind, pattern: &str, transform: Arc<dyn crate::transform::Transform>| {
            Arc::new(Stage::new(kind, &layout.src, pattern, dest(kind), transform))
        };
        let image_transform = Arc::new(ImageTransform);

        Self {
            style: stage(AssetKind::Styles, &paths.styles, Arc::new(StyleTransform)),
            script: stage(AssetKind::Scripts, &paths.scripts, Arc::new(ScriptTransform)),
            page: stage(
                AssetKind::Pages,
                &paths.pages,
                Arc::new(PageTransform::from_config(config, layout)),
            ),
            image: stage(AssetKind::Images, &paths.images, image_transform.clone()),
            font: stage(AssetKind::Fonts, &paths.fonts, image_transform),
            extra: Arc::new(Stage::new(
                AssetKind::Extra,
                &layout.public,
                "**",
                dest(AssetKind::Extra),
                Arc::new(Verbatim),
            )),
            rewrite: Arc::new(ReferenceRewriter::new(
                &layout.root,
                &layout.temp,
                &layout.dist,
                paths.pages.clone(),
            )),
            clean: Arc::new(Clean::new(layout)),
        }
    }

    pub fn compile(&self) -> Pipeline {
        compile_pipeline(
            Pipeline::step(&self.style),
            Pipeline::step(&self.script),
            Pipeline::step(&self.page),
        )
    }

    pub fn release(&self) -> Pipeline {
        release_pipeline(
            Pipeline::step(&self.clean),
            self.compile(),
            Pipeline::step(&self.rewrite),
            Pipeline::step(&self.image),
            Pipeline::step(&self.font),
            Pipeline::step(&self.extra),
        )
    }
}

/// Run the full release build, writing through `ctx`.
pub fn build(
    config: &ProjectConfig,
    layout: &Layout,
    ctx: &BuildContext,
) -> Result<PipelineReport, PipelineError> {
    StageSet::new(config, layout).release().run(ctx)
}
