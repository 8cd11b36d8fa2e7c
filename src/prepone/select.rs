use super::loops::{Loop, SharedLoop};
use super::PreponeStats;
use crate::condition::{Condition, ConditionDeps, ConditionId, DependencyAnalyzer};
use crate::plan::{NodeId, NodeKind, Plan};
use crate::table::{TableSource, TableSourceSet};
use crate::utils::IteratorAllEqExt;
use log::debug;
use rustc_hash::FxHashMap;
use std::cell::Ref;
use std::rc::Rc;

/// Holds what is known about the inputs to a `Select`, which may come from several `MapJoin`
/// loops.
pub(super) struct SelectConditions {
    select: NodeId,
    deps: FxHashMap<ConditionId, Rc<ConditionDeps>>,
    // The loops that are joined up to feed the Select, added in traversal order, meaning that
    // tables from an earlier loop are available as bound variables to later (deeper) ones.
    branches: Vec<SharedLoop>,
}

impl SelectConditions {
    pub fn new(select: NodeId) -> Self {
        Self {
            select,
            deps: FxHashMap::default(),
            branches: vec![],
        }
    }

    pub fn add_branch(&mut self, lp: SharedLoop) {
        self.branches.push(lp);
    }

    fn dependencies(
        &mut self,
        condition: &Condition,
        analyzer: &dyn DependencyAnalyzer,
    ) -> Rc<ConditionDeps> {
        self.deps
            .entry(condition.id())
            .or_insert_with(|| Rc::new(analyzer.dependencies(condition)))
            .clone()
    }

    /// Tries to move conditions out of the `Select`. If `lp` is given, there is a straight path
    /// from it to the conditions; otherwise the recorded branches are searched.
    pub fn move_conditions(
        &mut self,
        plan: &mut Plan,
        lp: Option<&Loop>,
        analyzer: &dyn DependencyAnalyzer,
        stats: &mut PreponeStats,
    ) {
        let branches = self.branches.clone();
        let branches: Vec<Ref<Loop>> = branches.iter().map(|branch| branch.borrow()).collect();

        let mut idx = 0;
        while idx < plan.conditions(self.select).len() {
            let condition = plan.conditions(self.select)[idx].clone();
            let deps = self.dependencies(&condition, analyzer);
            match can_move(lp, &branches, &deps) {
                Some(target) if Some(target) != plan.input(self.select) => {
                    let condition = plan.take_condition(self.select, idx);
                    debug!(
                        "Moving {} from select {} to after {}",
                        condition, self.select, target
                    );
                    move_condition(plan, condition, target, stats);
                }
                _ => idx += 1,
            }
        }
    }
}

/// Returns where the condition can move, if anywhere.
fn can_move(lp: Option<&Loop>, branches: &[Ref<Loop>], deps: &ConditionDeps) -> Option<NodeId> {
    let mut outer_tables = None;
    let lp = match lp {
        Some(lp) => lp,
        None => {
            // A single table condition is wherever that table is; no need to consider outer
            // bindings.
            if deps.single_table.is_none() {
                outer_tables = Some(TableSourceSet::new());
            }
            // Several joined loops: find the shallowest one that has everything.
            find_loop(branches, deps, &mut outer_tables)?
        }
    };

    if !lp.index_columns.is_empty() {
        // Can check index columns before they are used for the lookup.
        let outer = if lp.is_index_only() {
            outer_tables.as_ref()
        } else {
            None
        };
        if let Some(index) = single_index(lp, deps, outer) {
            return Some(index);
        }
    }

    let mut all_tables = deps.tables.clone();
    let mut single_table = deps.single_table.clone();
    if let (None, Some(outer_tables)) = (&single_table, &outer_tables) {
        // Might still narrow down to a single table within this loop.
        all_tables.retain(|table| !outer_tables.contains(table));
        if all_tables.len() == 1 {
            single_table = all_tables.iter().next().cloned();
        }
    }

    if let Some(table) = single_table {
        lp.lookup_for(&table)
    } else if !all_tables.is_empty() {
        lp.join_point_for(&all_tables)
    } else {
        None
    }
}

/// Finds the first branch that has enough to evaluate the condition. Tables of the branches
/// passed over are added to `outer_tables`, when given, since they are bound for deeper ones.
fn find_loop<'b>(
    branches: &'b [Ref<Loop>],
    deps: &ConditionDeps,
    outer_tables: &mut Option<TableSourceSet>,
) -> Option<&'b Loop> {
    for lp in branches.iter().map(|lp| &**lp) {
        let is_outer = |table: &Rc<TableSource>| {
            outer_tables
                .as_ref()
                .map(|outer_tables| outer_tables.contains(table))
                .unwrap_or(false)
        };
        if lp.is_index_only() {
            // The branch is just an index, so look at individual columns. Even though the index
            // only has some columns, whole tables can be excluded for deeper loops.
            let mut found_tables = TableSourceSet::new();
            let mut all_found = true;
            for col in deps.columns.iter().filter(|col| !is_outer(col.table())) {
                if lp.index_columns.contains_key(col) {
                    found_tables.insert(col.table().clone());
                } else {
                    all_found = false;
                }
            }
            if all_found {
                return Some(lp);
            }
            if let Some(outer_tables) = outer_tables {
                outer_tables.extend(found_tables);
            }
        } else {
            let all_found = deps
                .tables
                .iter()
                .all(|table| is_outer(table) || lp.lookups.contains_key(table));
            if all_found {
                return Some(lp);
            }
            if let Some(outer_tables) = outer_tables {
                // Not moving to this loop; its tables are then available.
                outer_tables.extend(lp.lookups.keys().cloned());
            }
        }
    }
    None
}

/// If all the referenced columns come from the same index, returns it. Columns of tables in
/// `outer_tables` are bound already and are skipped.
fn single_index(
    lp: &Loop,
    deps: &ConditionDeps,
    outer_tables: Option<&TableSourceSet>,
) -> Option<NodeId> {
    let indexes = deps
        .columns
        .iter()
        .filter(|col| {
            outer_tables
                .map(|outer_tables| !outer_tables.contains(col.table()))
                .unwrap_or(true)
        })
        .map(|col| lp.index_columns.get(col).copied())
        .collect::<Option<Vec<_>>>()?;
    if indexes.iter().all_eq(|&index| index) {
        indexes.first().copied()
    } else {
        None
    }
}

/// Moves the condition to a `Select` right after `before`, creating one if there isn't one.
fn move_condition(plan: &mut Plan, condition: Condition, before: NodeId, stats: &mut PreponeStats) {
    match plan.kind(before) {
        NodeKind::IndexScan { .. } => stats.num_to_index += 1,
        NodeKind::TableLookup { .. } => stats.num_to_lookup += 1,
        _ => stats.num_to_join += 1,
    }
    stats.num_moved += 1;

    match plan.output(before) {
        Some(after) if plan.is_select(after) => plan.push_condition(after, condition),
        _ => {
            let select = plan.insert_select(before, vec![condition]);
            debug!("Inserted select {} after {}", select, before);
            stats.num_new_selects += 1;
        }
    }
}
