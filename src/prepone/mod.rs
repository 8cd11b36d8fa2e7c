//! Moves conditions from a `Select` down the plan to just after the earliest node where all the
//! tables they refer to are bound. This is done by walking downstream from every origin and
//! recording what has been bound so far in a `Loop`.
//!
//! A `Select` that sits above a `MapJoin` or `Product` can be fed by several loops. Conditions
//! that cannot be placed while walking a single loop are resolved once all origins are done,
//! using every loop seen on the way.
mod loops;
mod origins;
mod select;

use crate::condition::DependencyAnalyzer;
use crate::plan::{JoinType, NodeId, NodeKind, Plan};
use log::debug;
use loops::{Loop, SharedLoop};
use origins::find_origins;
use rustc_hash::FxHashMap;
use select::SelectConditions;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

#[derive(Default, Clone, Debug, Serialize)]
pub struct PreponeStats {
    pub num_origins: usize,
    pub num_moved: usize,
    pub num_to_index: usize,  // Moved to right after an index scan
    pub num_to_lookup: usize, // Moved to right after a table lookup
    pub num_to_join: usize,   // Moved to right after a flatten or product
    pub num_new_selects: usize,
    pub num_deferred: usize, // Selects resolved after all origins were walked
    pub prepone_time_us: u128,
}

pub struct SelectPreponer<'a> {
    analyzer: &'a dyn DependencyAnalyzer,
}

struct Preponer<'a> {
    analyzer: &'a dyn DependencyAnalyzer,
    /// The loop that first reached each `Product`. Later loops through it are merged in.
    products: FxHashMap<NodeId, SharedLoop>,
    /// Selects that need another look once every origin has been walked.
    selects: BTreeMap<NodeId, SelectConditions>,
    stats: PreponeStats,
}

/// What the walk from an origin has passed through so far.
#[derive(Default)]
struct Path {
    new_loop: bool,
    has_maps: bool,
    has_products: bool,
}

impl<'a> SelectPreponer<'a> {
    pub fn new(analyzer: &'a dyn DependencyAnalyzer) -> Self {
        Self { analyzer }
    }

    pub fn apply(&self, plan: &mut Plan) -> PreponeStats {
        let now = Instant::now();
        let mut preponer = Preponer::new(self.analyzer);
        for origin in find_origins(plan) {
            preponer.add_origin(plan, origin);
        }
        preponer.resolve_deferred(plan);

        let mut stats = preponer.stats;
        stats.prepone_time_us = now.elapsed().as_micros();
        debug!(
            "Moved {} conditions from {} origins",
            stats.num_moved, stats.num_origins
        );
        stats
    }
}

impl<'a> Preponer<'a> {
    fn new(analyzer: &'a dyn DependencyAnalyzer) -> Self {
        Self {
            analyzer,
            products: FxHashMap::default(),
            selects: BTreeMap::new(),
            stats: PreponeStats::default(),
        }
    }

    /// Walks downstream from an origin, moving conditions of any `Select` reached as far toward
    /// the origin as possible.
    fn add_origin(&mut self, plan: &mut Plan, origin: NodeId) {
        self.stats.num_origins += 1;

        let mut lp = Rc::new(RefCell::new(Loop::new()));
        let mut node = origin;
        let mut prev = None;

        if let NodeKind::IndexScan { columns, .. } = plan.kind(node) {
            lp.borrow_mut().set_index(node, columns);
            prev = Some(node);
            node = match plan.output(node) {
                Some(next) => next,
                None => return,
            };
        }
        while let NodeKind::TableLookup { tables } = plan.kind(node) {
            lp.borrow_mut().add_lookup(node, tables);
            prev = Some(node);
            node = match plan.output(node) {
                Some(next) => next,
                None => return,
            };
        }

        let mut path = Path {
            new_loop: true,
            ..Default::default()
        };
        loop {
            let kind = plan.kind(node);
            match kind {
                NodeKind::Flatten { .. } => {
                    lp.borrow_mut().add_flatten(
                        node,
                        &kind.inner_joined_tables(),
                        &kind.optional_tables(),
                    );
                }
                NodeKind::Product => {
                    if path.new_loop {
                        lp.borrow_mut().add_join_point(node);
                        if let Some(seen) = self.products.get(&node).cloned() {
                            // Reached through another input: the loops come together here.
                            seen.borrow_mut().merge(&lp.borrow(), node);
                            lp = seen;
                            path.new_loop = false;
                        } else {
                            self.products.insert(node, lp.clone());
                        }
                    }
                    path.has_products = true;
                }
                NodeKind::MapJoin { join_type, inner } => {
                    match join_type {
                        JoinType::Inner => (),
                        JoinType::Left | JoinType::Semi => {
                            if prev == Some(*inner) {
                                // Conditions from above would filter rows that need to be null
                                // extended (or tested for existence) instead.
                                debug!("Stopping at {} join {} from its inner side", join_type, node);
                                return;
                            }
                        }
                        _ => {
                            debug!("Stopping at {} join {}", join_type, node);
                            return;
                        }
                    }
                    path.has_maps = true;
                }
                NodeKind::Select { conditions } if !conditions.is_empty() => {
                    self.visit_select(plan, node, &lp, &path);
                }
                NodeKind::Select { .. } => (),
                _ => return,
            }
            prev = Some(node);
            node = match plan.output(node) {
                Some(next) => next,
                None => return,
            };
        }
    }

    fn visit_select(&mut self, plan: &mut Plan, select: NodeId, lp: &SharedLoop, path: &Path) {
        let (mut conditions, is_new) = match self.selects.remove(&select) {
            Some(conditions) => (conditions, false),
            None => (SelectConditions::new(select), true),
        };

        if !lp.borrow().is_empty() {
            conditions.move_conditions(plan, Some(&lp.borrow()), self.analyzer, &mut self.stats);
        }
        if plan.conditions(select).is_empty() {
            // Nothing left to resolve later.
            return;
        }

        if path.has_maps && path.new_loop {
            conditions.add_branch(lp.clone());
        }
        if path.has_products || path.has_maps || !is_new {
            if is_new {
                debug!("Deferring select {}", select);
            }
            self.selects.insert(select, conditions);
        }
    }

    /// Places whatever is left now that all the loops feeding each `Select` are known.
    fn resolve_deferred(&mut self, plan: &mut Plan) {
        for (select, mut conditions) in std::mem::take(&mut self.selects) {
            debug!("Resolving deferred select {}", select);
            conditions.move_conditions(plan, None, self.analyzer, &mut self.stats);
            self.stats.num_deferred += 1;
        }
    }
}
