use crate::condition::DependencyAnalyzer;
use crate::plan::Plan;
use crate::prepone::{PreponeStats, SelectPreponer};
use log::{debug, info};
use std::time::Instant;

#[derive(Clone, Debug)]
pub struct OptimizerInfo {
    pub print_plan: bool,  // Log the plan before and after, at debug level
    pub debug_times: bool, // Log how long the pass took
    pub prepone: bool,     // If false, the plan is left as is
}

impl Default for OptimizerInfo {
    fn default() -> Self {
        Self {
            print_plan: false,
            debug_times: false,
            prepone: true,
        }
    }
}

/// Runs the condition placement pass over a plan whose joins and access paths are already fixed.
pub struct Optimizer<'a> {
    analyzer: &'a dyn DependencyAnalyzer,
    info: OptimizerInfo,
}

impl<'a> Optimizer<'a> {
    pub fn new(analyzer: &'a dyn DependencyAnalyzer) -> Self {
        Self {
            analyzer,
            info: OptimizerInfo::default(),
        }
    }

    pub fn with_info(analyzer: &'a dyn DependencyAnalyzer, info: OptimizerInfo) -> Self {
        Self { analyzer, info }
    }

    pub fn with_print_plan(&mut self, print_plan: bool) -> &mut Self {
        self.info.print_plan = print_plan;
        self
    }

    pub fn with_debug_times(&mut self, debug_times: bool) -> &mut Self {
        self.info.debug_times = debug_times;
        self
    }

    pub fn with_prepone(&mut self, prepone: bool) -> &mut Self {
        self.info.prepone = prepone;
        self
    }

    pub fn info(&self) -> &OptimizerInfo {
        &self.info
    }

    pub fn optimize(&self, plan: &mut Plan) -> PreponeStats {
        if self.info.print_plan {
            debug!("Plan before prepone:\n{}", plan);
        }

        let now = Instant::now();
        let stats = if self.info.prepone {
            SelectPreponer::new(self.analyzer).apply(plan)
        } else {
            PreponeStats::default()
        };
        if self.info.debug_times {
            info!("Prepone time: {} us", now.elapsed().as_micros());
        }

        if self.info.print_plan {
            debug!("Plan after prepone:\n{}", plan);
        }
        stats
    }
}
