mod condition;
mod expr;
mod optimizer;
mod parse;
mod plan;
mod prepone;
mod table;
pub mod test_utils;
mod utils;

pub use condition::{ColumnDependencies, Condition, ConditionDeps, ConditionId, DependencyAnalyzer};
pub use expr::{BinaryOperator, Expr, UnaryOperator, Value};
pub use optimizer::{Optimizer, OptimizerInfo};
pub use parse::{ParseContext, ParseError, Parser};
pub use plan::{JoinType, NodeId, NodeKind, Plan, PlanError};
pub use prepone::{PreponeStats, SelectPreponer};
pub use table::{Catalog, ColumnRef, ColumnRefSet, Table, TableSource, TableSourceSet};
