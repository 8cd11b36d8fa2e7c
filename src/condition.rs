//! Conditions are the individual predicates held by a `Select` node. The optimizer treats them as
//! opaque and learns what they depend on only through a `DependencyAnalyzer`.
//!
//! Equality and hashing of `Condition`s are based on their id, so that a condition can be tracked
//! as it is moved between `Select` nodes.
use crate::expr::Expr;
use crate::table::{ColumnRefSet, TableSource, TableSourceSet};
use snowflake::ProcessUniqueId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub type ConditionId = ProcessUniqueId;

#[derive(Clone)]
pub struct Condition {
    id: ConditionId,
    expr: Rc<Expr>,
}

/// Everything the optimizer needs to know about what a condition refers to.
#[derive(Clone, Debug)]
pub struct ConditionDeps {
    /// The only table referenced, if exactly one is.
    pub single_table: Option<Rc<TableSource>>,
    pub tables: TableSourceSet,
    pub columns: ColumnRefSet,
}

pub trait DependencyAnalyzer {
    /// Returns the single table source referenced by the condition, or `None` if it references
    /// zero or several.
    fn analyze(&self, condition: &Condition) -> Option<Rc<TableSource>>;

    fn referenced_tables(&self, condition: &Condition) -> TableSourceSet;

    fn referenced_columns(&self, condition: &Condition) -> ColumnRefSet;

    fn dependencies(&self, condition: &Condition) -> ConditionDeps {
        ConditionDeps {
            single_table: self.analyze(condition),
            tables: self.referenced_tables(condition),
            columns: self.referenced_columns(condition),
        }
    }
}

/// Computes dependencies directly from the column references in the expression tree.
#[derive(Default, Clone, Copy)]
pub struct ColumnDependencies;

impl Condition {
    pub fn new(expr: Expr) -> Self {
        Self {
            id: ConditionId::new(),
            expr: Rc::new(expr),
        }
    }

    pub fn id(&self) -> ConditionId {
        self.id
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Condition {}

impl Hash for Condition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl DependencyAnalyzer for ColumnDependencies {
    fn analyze(&self, condition: &Condition) -> Option<Rc<TableSource>> {
        let mut tables = condition.expr().table_sources().into_iter();
        match (tables.next(), tables.next()) {
            (Some(table), None) => Some(table),
            _ => None,
        }
    }

    fn referenced_tables(&self, condition: &Condition) -> TableSourceSet {
        condition.expr().table_sources()
    }

    fn referenced_columns(&self, condition: &Condition) -> ColumnRefSet {
        condition.expr().col_refs()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestSchema;

    #[test]
    fn test_column_dependencies() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let orders = schema.source("orders");
        let cond = |sql: &str| schema.condition([&customer, &orders], sql);

        let single = cond("customer.name = 'Bob' OR customer.city = 'NYC'");
        let deps = ColumnDependencies.dependencies(&single);
        assert_eq!(deps.single_table, Some(customer.clone()));
        assert_eq!(deps.tables.len(), 1);
        assert_eq!(deps.columns.len(), 2);

        let multi = cond("customer.id = orders.cid");
        let deps = ColumnDependencies.dependencies(&multi);
        assert_eq!(deps.single_table, None);
        assert_eq!(
            deps.tables,
            TableSourceSet::from([customer.clone(), orders.clone()])
        );

        let constant = cond("1 = 1");
        let deps = ColumnDependencies.dependencies(&constant);
        assert_eq!(deps.single_table, None);
        assert!(deps.tables.is_empty());
    }

    #[test]
    fn test_condition_identity() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let first = schema.condition([&customer], "customer.id = 1");
        let second = schema.condition([&customer], "customer.id = 1");

        assert_ne!(first, second);
        assert_eq!(first, first.clone());
        assert_eq!(first.to_string(), second.to_string());
    }
}
