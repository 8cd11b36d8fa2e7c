use crate::plan::NodeId;
use crate::table::{ColumnRef, TableSource, TableSourceSet};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A loop as recorded at a `Product` and as a branch of a `Select`. Streams reaching the same
/// `Product` later are merged into it, so every holder sees all of them.
pub(super) type SharedLoop = Rc<RefCell<Loop>>;

/// A `Flatten` or `Product` seen along a loop, with the tables bound when it was reached.
#[derive(Clone, Debug)]
pub(super) struct JoinPoint {
    pub node: NodeId,
    pub tables: TableSourceSet,
}

/// Holds the state of a single side of a loop, which usually means a group: what has been bound
/// by the time the traversal from an origin reaches a given point.
#[derive(Clone, Default, Debug)]
pub(super) struct Loop {
    /// Lookup node that bound each table.
    pub lookups: BTreeMap<Rc<TableSource>, NodeId>,
    /// Index scan that supplies each individual column before any lookup.
    pub index_columns: BTreeMap<ColumnRef, NodeId>,
    /// Flatten and Product nodes that do in-group joins, deepest first.
    pub join_points: Vec<JoinPoint>,
}

impl Loop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_index(&mut self, index: NodeId, columns: &[Option<ColumnRef>]) {
        self.index_columns = columns
            .iter()
            .flatten()
            .map(|col| (col.clone(), index))
            .collect();
    }

    pub fn add_lookup(&mut self, lookup: NodeId, tables: &[Rc<TableSource>]) {
        for table in tables {
            self.lookups.insert(table.clone(), lookup);
        }
    }

    /// Drops the tables on the optional side of the flatten's outer join, then records it as a
    /// join point for the bound tables it actually joins.
    ///
    /// A `Flatten` joins a single parent/child pair, so tables bound by the lookup but joined in by
    /// a later flatten are still bound here, just not part of this join point.
    pub fn add_flatten(
        &mut self,
        flatten: NodeId,
        inner_joined: &TableSourceSet,
        optional: &TableSourceSet,
    ) {
        self.lookups.retain(|table, _| !optional.contains(table));
        self.index_columns
            .retain(|col, _| !optional.contains(col.table()));
        let tables = self
            .lookups
            .keys()
            .filter(|table| inner_joined.contains(*table))
            .cloned()
            .collect();
        self.join_points.push(JoinPoint {
            node: flatten,
            tables,
        });
    }

    /// Records a join point without dropping any tables. Used for `Product`, which is always an
    /// inner join at this stage.
    pub fn add_join_point(&mut self, node: NodeId) {
        let tables = self.lookups.keys().cloned().collect();
        self.join_points.push(JoinPoint { node, tables });
    }

    fn join_point_pos(&self, node: NodeId) -> Option<usize> {
        self.join_points.iter().position(|jp| jp.node == node)
    }

    /// Merges in another stream arriving at the same `Product`. Although a `Product` starts with
    /// separate lookups, it is a single loop for purposes of nesting.
    ///
    /// The other stream's join points that precede `before` are placed ahead of it, and join
    /// points known to both end up with the union of their tables.
    pub fn merge(&mut self, other: &Loop, before: NodeId) {
        for (table, &lookup) in &other.lookups {
            self.lookups.insert(table.clone(), lookup);
        }
        for (col, &index) in &other.index_columns {
            self.index_columns.insert(col.clone(), index);
        }

        let mut at = self
            .join_point_pos(before)
            .unwrap_or(self.join_points.len());
        for jp in other.join_points.iter().take_while(|jp| jp.node != before) {
            if self.join_point_pos(jp.node).is_none() {
                self.join_points.insert(at, jp.clone());
                at += 1;
            }
        }
        for jp in &other.join_points {
            if let Some(pos) = self.join_point_pos(jp.node) {
                self.join_points[pos]
                    .tables
                    .extend(jp.tables.iter().cloned());
            }
        }
    }

    /// Does this loop have any interesting state?
    pub fn is_empty(&self) -> bool {
        self.join_points.is_empty() && self.lookups.is_empty() && self.index_columns.is_empty()
    }

    /// Does this loop consist solely of an index?
    pub fn is_index_only(&self) -> bool {
        self.lookups.is_empty() && !self.index_columns.is_empty()
    }

    pub fn lookup_for(&self, table: &Rc<TableSource>) -> Option<NodeId> {
        self.lookups.get(table).copied()
    }

    /// The first (deepest) join point at which all of the given tables are bound.
    pub fn join_point_for(&self, tables: &TableSourceSet) -> Option<NodeId> {
        self.join_points
            .iter()
            .find(|jp| tables.is_subset(&jp.tables))
            .map(|jp| jp.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{JoinType, Plan};
    use crate::test_utils::TestSchema;

    #[test]
    fn test_flatten_restricts_tables() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let address = schema.source("address");

        let mut plan = Plan::new();
        let index = plan.index_scan(
            "address_city",
            vec![Some(address.col("city")), Some(customer.col("id")), None],
        );
        let lookup = plan
            .table_lookup(Some(index), vec![customer.clone(), address.clone()])
            .unwrap();
        let flatten = plan
            .flatten(lookup, vec![customer.clone()], JoinType::Left, vec![address.clone()])
            .unwrap();

        let mut lp = Loop::new();
        assert!(lp.is_empty());
        lp.set_index(index, &[Some(address.col("city")), Some(customer.col("id")), None]);
        assert!(lp.is_index_only());
        assert!(!lp.is_empty());

        lp.add_lookup(lookup, &[customer.clone(), address.clone()]);
        assert!(!lp.is_index_only());
        assert_eq!(lp.lookup_for(&address), Some(lookup));

        let kind = plan.kind(flatten);
        lp.add_flatten(flatten, &kind.inner_joined_tables(), &kind.optional_tables());
        assert_eq!(lp.lookup_for(&customer), Some(lookup));
        assert_eq!(lp.lookup_for(&address), None);
        assert_eq!(
            lp.index_columns.keys().cloned().collect::<Vec<_>>(),
            vec![customer.col("id")]
        );
        assert_eq!(
            lp.join_point_for(&TableSourceSet::from([customer.clone()])),
            Some(flatten)
        );
        assert_eq!(lp.join_point_for(&TableSourceSet::from([address])), None);
    }

    #[test]
    fn test_merge() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let orders = schema.source("orders");
        let item = schema.source("item");

        let mut plan = Plan::new();
        let left = plan
            .table_lookup(None, vec![customer.clone(), orders.clone()])
            .unwrap();
        let left_flatten = plan
            .flatten(left, vec![customer.clone()], JoinType::Inner, vec![orders.clone()])
            .unwrap();
        let right = plan.table_lookup(None, vec![item.clone()]).unwrap();
        let product = plan.product(vec![left_flatten, right]).unwrap();

        let mut left_loop = Loop::new();
        left_loop.add_lookup(left, &[customer.clone(), orders.clone()]);
        let kind = plan.kind(left_flatten);
        left_loop.add_flatten(
            left_flatten,
            &kind.inner_joined_tables(),
            &kind.optional_tables(),
        );
        left_loop.add_join_point(product);

        let mut right_loop = Loop::new();
        right_loop.add_lookup(right, &[item.clone()]);
        right_loop.add_join_point(product);

        right_loop.merge(&left_loop, product);
        assert_eq!(
            right_loop
                .join_points
                .iter()
                .map(|jp| jp.node)
                .collect::<Vec<_>>(),
            vec![left_flatten, product]
        );
        assert_eq!(
            right_loop.join_points[1].tables,
            TableSourceSet::from([customer.clone(), orders.clone(), item.clone()])
        );
        assert_eq!(right_loop.lookup_for(&customer), Some(left));
        assert_eq!(right_loop.lookup_for(&item), Some(right));

        // Merging the same stream again changes nothing.
        let merged = right_loop.clone();
        right_loop.merge(&left_loop, product);
        assert_eq!(right_loop.join_points.len(), merged.join_points.len());
        assert_eq!(
            right_loop.join_point_for(&TableSourceSet::from([customer.clone(), orders.clone()])),
            Some(left_flatten)
        );
        assert_eq!(
            right_loop.join_point_for(&TableSourceSet::from([orders, item])),
            Some(product)
        );
    }
}
