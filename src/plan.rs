//! The physical plan graph. Nodes live in an arena owned by `Plan` and are addressed by `NodeId`.
//! Every node has any number of inputs and at most one output, so the graph is a tree when seen
//! from any one root, but a `Product` or `Flatten` is reachable from several origins.
use crate::condition::Condition;
use crate::table::{ColumnRef, TableSource, TableSourceSet};
use itertools::Itertools;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

pub enum NodeKind {
    /// Scans an index, making the listed columns available before any table is looked up.
    /// Entries are `None` for index columns that are not usable as column values.
    IndexScan {
        index: String,
        columns: Vec<Option<ColumnRef>>,
    },
    /// Looks up rows of one or more tables (a whole branch of the group in the latter case).
    TableLookup { tables: Vec<Rc<TableSource>> },
    /// Joins a parent table to its physically clustered child within a single row stream.
    Flatten {
        parent: Vec<Rc<TableSource>>,
        child: Vec<Rc<TableSource>>,
        join_type: JoinType,
    },
    /// Combines several independently driven streams that share an outer binding.
    Product,
    /// Nested loop join: `inner` is executed once per row of the other input.
    MapJoin { join_type: JoinType, inner: NodeId },
    Select { conditions: Vec<Condition> },
    Other { name: String },
}

struct PlanNode {
    kind: NodeKind,
    inputs: Vec<NodeId>,
    output: Option<NodeId>,
}

#[derive(Default)]
pub struct Plan {
    nodes: Vec<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Each node can feed only one output.
    OutputTaken { input: NodeId, output: NodeId },
    UnknownNode(NodeId),
}

pub type Result<T> = std::result::Result<T, PlanError>;

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, kind: NodeKind, inputs: Vec<NodeId>) -> Result<NodeId> {
        for &input in &inputs {
            let node = self.nodes.get(input.0).ok_or(PlanError::UnknownNode(input))?;
            if let Some(output) = node.output {
                return Err(PlanError::OutputTaken { input, output });
            }
        }
        let id = NodeId(self.nodes.len());
        for &input in &inputs {
            self.nodes[input.0].output = Some(id);
        }
        self.nodes.push(PlanNode {
            kind,
            inputs,
            output: None,
        });
        Ok(id)
    }

    pub fn index_scan(&mut self, index: &str, columns: Vec<Option<ColumnRef>>) -> NodeId {
        let kind = NodeKind::IndexScan {
            index: index.to_string(),
            columns,
        };
        self.add_node(kind, vec![])
            .unwrap_or_else(|err| panic!("Index scan has no inputs: {}", err))
    }

    pub fn table_lookup(
        &mut self,
        input: Option<NodeId>,
        tables: Vec<Rc<TableSource>>,
    ) -> Result<NodeId> {
        self.add_node(NodeKind::TableLookup { tables }, input.into_iter().collect())
    }

    pub fn flatten(
        &mut self,
        input: NodeId,
        parent: Vec<Rc<TableSource>>,
        join_type: JoinType,
        child: Vec<Rc<TableSource>>,
    ) -> Result<NodeId> {
        let kind = NodeKind::Flatten {
            parent,
            child,
            join_type,
        };
        self.add_node(kind, vec![input])
    }

    pub fn product(&mut self, inputs: Vec<NodeId>) -> Result<NodeId> {
        self.add_node(NodeKind::Product, inputs)
    }

    pub fn map_join(&mut self, outer: NodeId, inner: NodeId, join_type: JoinType) -> Result<NodeId> {
        self.add_node(NodeKind::MapJoin { join_type, inner }, vec![outer, inner])
    }

    pub fn select(&mut self, input: NodeId, conditions: Vec<Condition>) -> Result<NodeId> {
        self.add_node(NodeKind::Select { conditions }, vec![input])
    }

    pub fn other(&mut self, name: &str, inputs: Vec<NodeId>) -> Result<NodeId> {
        self.add_node(
            NodeKind::Other {
                name: name.to_string(),
            },
            inputs,
        )
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].inputs
    }

    /// The first input, for nodes that take a single stream.
    pub fn input(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].inputs.first().copied()
    }

    pub fn output(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].output
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Nodes without an output. A well formed plan has exactly one.
    pub fn roots(&self) -> Vec<NodeId> {
        self.iter_ids()
            .filter(|&id| self.output(id).is_none())
            .collect()
    }

    pub fn is_select(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Select { .. })
    }

    /// The conditions of a `Select`. Empty for any other kind of node.
    pub fn conditions(&self, id: NodeId) -> &[Condition] {
        match self.kind(id) {
            NodeKind::Select { conditions } => conditions,
            _ => &[],
        }
    }

    fn conditions_mut(&mut self, id: NodeId) -> &mut Vec<Condition> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Select { conditions } => conditions,
            _ => panic!("Plan node {} is not a select", id),
        }
    }

    /// Removes and returns the condition at position `idx` of a `Select`, preserving the order of
    /// the remaining conditions.
    pub fn take_condition(&mut self, select: NodeId, idx: usize) -> Condition {
        self.conditions_mut(select).remove(idx)
    }

    pub fn push_condition(&mut self, select: NodeId, condition: Condition) {
        self.conditions_mut(select).push(condition);
    }

    /// Makes `new` an input of `after` in place of `old`.
    pub fn replace_input(&mut self, after: NodeId, old: NodeId, new: NodeId) {
        let node = &mut self.nodes[after.0];
        for input in node.inputs.iter_mut().filter(|input| **input == old) {
            *input = new;
        }
        if let NodeKind::MapJoin { inner, .. } = &mut node.kind {
            if *inner == old {
                *inner = new;
            }
        }
        self.nodes[new.0].output = Some(after);
    }

    /// Splices a new `Select` holding `conditions` between `before` and its output.
    pub fn insert_select(&mut self, before: NodeId, conditions: Vec<Condition>) -> NodeId {
        let after = self.output(before);
        let id = NodeId(self.nodes.len());
        self.nodes.push(PlanNode {
            kind: NodeKind::Select { conditions },
            inputs: vec![before],
            output: None,
        });
        self.nodes[before.0].output = Some(id);
        if let Some(after) = after {
            self.replace_input(after, before, id);
        }
        id
    }

    /// Finds the `Select` currently holding the given condition.
    pub fn find_condition(&self, condition: &Condition) -> Option<NodeId> {
        self.iter_ids()
            .find(|&id| self.conditions(id).contains(condition))
    }

    /// The node right after which the given condition is evaluated.
    pub fn condition_site(&self, condition: &Condition) -> Option<NodeId> {
        self.find_condition(condition)
            .and_then(|select| self.input(select))
    }

    pub fn all_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.iter_ids().flat_map(|id| self.conditions(id).iter())
    }

    fn tree(&self, id: NodeId) -> termtree::Tree<String> {
        termtree::Tree::new(self.label(id))
            .with_leaves(self.inputs(id).iter().map(|&input| self.tree(input)))
    }

    fn label(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::IndexScan { index, columns } => format!(
                "IndexScan({}, [{}])",
                index,
                columns
                    .iter()
                    .map(|col| col
                        .as_ref()
                        .map(|col| col.to_string())
                        .unwrap_or_else(|| "_".to_string()))
                    .join(", ")
            ),
            NodeKind::TableLookup { tables } => format!("Lookup({})", tables.iter().join(", ")),
            NodeKind::Flatten {
                parent,
                child,
                join_type,
            } => format!(
                "Flatten({} {} {})",
                parent.iter().join(", "),
                join_type,
                child.iter().join(", ")
            ),
            NodeKind::Product => "Product".to_string(),
            NodeKind::MapJoin { join_type, .. } => format!("MapJoin({})", join_type),
            NodeKind::Select { conditions } => format!("Select({})", conditions.iter().join(", ")),
            NodeKind::Other { name } => name.clone(),
        }
    }
}

impl NodeKind {
    /// Tables that survive a `Flatten`: those that are inner joined, plus those on the preserved
    /// side of an outer join. Empty for other kinds of node.
    pub fn inner_joined_tables(&self) -> TableSourceSet {
        match self {
            NodeKind::Flatten {
                parent,
                child,
                join_type,
            } => match join_type {
                JoinType::Inner => parent.iter().chain(child.iter()).cloned().collect(),
                JoinType::Left | JoinType::Semi | JoinType::Anti => {
                    parent.iter().cloned().collect()
                }
                JoinType::Right => child.iter().cloned().collect(),
                JoinType::Full => TableSourceSet::new(),
            },
            _ => TableSourceSet::new(),
        }
    }

    /// Tables that a `Flatten` null extends or filters away, so that they are no longer bound
    /// after it.
    pub fn optional_tables(&self) -> TableSourceSet {
        match self {
            NodeKind::Flatten { parent, child, .. } => {
                let inner = self.inner_joined_tables();
                parent
                    .iter()
                    .chain(child.iter())
                    .filter(|table| !inner.contains(*table))
                    .cloned()
                    .collect()
            }
            _ => TableSourceSet::new(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputTaken { input, output } => {
                write!(f, "Plan node {} already feeds {}", input, output)
            }
            Self::UnknownNode(id) => write!(f, "No plan node {}", id),
        }
    }
}

impl std::error::Error for PlanError {}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in self.roots() {
            write!(f, "{}", self.tree(root))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestSchema;

    #[test]
    fn test_build_and_display() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let address = schema.source("address");

        let mut plan = Plan::new();
        let lookup = plan
            .table_lookup(None, vec![customer.clone(), address.clone()])
            .unwrap();
        let flatten = plan
            .flatten(lookup, vec![customer.clone()], JoinType::Left, vec![address.clone()])
            .unwrap();
        let cond = schema.condition([&address], "address.city = 'NYC'");
        let select = plan.select(flatten, vec![cond.clone()]).unwrap();

        assert_eq!(plan.roots(), vec![select]);
        assert_eq!(plan.output(lookup), Some(flatten));
        assert_eq!(plan.condition_site(&cond), Some(flatten));
        pretty_assertions::assert_eq!(
            plan.to_string(),
            "Select('NYC' = address.city)\n\
             └── Flatten(customer left address)\n    \
                 └── Lookup(customer, address)\n"
        );
        assert_eq!(
            plan.kind(flatten).inner_joined_tables(),
            TableSourceSet::from([customer])
        );
        assert_eq!(
            plan.kind(flatten).optional_tables(),
            TableSourceSet::from([address])
        );
    }

    #[test]
    fn test_single_output() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");

        let mut plan = Plan::new();
        let lookup = plan.table_lookup(None, vec![customer]).unwrap();
        let first = plan.other("Project", vec![lookup]).unwrap();
        assert_eq!(
            plan.other("Sort", vec![lookup]),
            Err(PlanError::OutputTaken {
                input: lookup,
                output: first
            })
        );
    }

    #[test]
    fn test_insert_select() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let orders = schema.source("orders");

        let mut plan = Plan::new();
        let outer = plan.table_lookup(None, vec![customer.clone()]).unwrap();
        let inner = plan.table_lookup(None, vec![orders.clone()]).unwrap();
        let join = plan.map_join(outer, inner, JoinType::Left).unwrap();

        let cond = schema.condition([&orders], "orders.total > 100");
        let select = plan.insert_select(inner, vec![cond.clone()]);

        assert_eq!(plan.inputs(join), &[outer, select]);
        assert!(matches!(plan.kind(join), NodeKind::MapJoin { inner, .. } if *inner == select));
        assert_eq!(plan.output(select), Some(join));
        assert_eq!(plan.output(inner), Some(select));
        assert_eq!(plan.find_condition(&cond), Some(select));

        let other = schema.condition([&orders], "orders.total < 500");
        plan.push_condition(select, other.clone());
        assert_eq!(plan.conditions(select), &[cond.clone(), other]);
        assert_eq!(plan.take_condition(select, 0), cond);
        assert_eq!(plan.conditions(select).len(), 1);

        // Inserting above a root makes the new select the root.
        let top = plan.insert_select(join, vec![]);
        assert_eq!(plan.roots(), vec![top]);
    }
}
