use crate::condition::Condition;
use crate::expr::Expr;
use crate::table::{ColumnRef, TableSource};
use itertools::Itertools;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::{Parser as RawParser, ParserError as RawParseError};
use std::fmt;
use std::rc::Rc;

/// The table sources that expressions may refer to.
pub struct ParseContext {
    pub sources: Vec<Rc<TableSource>>,
}

#[derive(Debug)]
pub enum ParseError {
    Raw(RawParseError),
    NoTable(String),
    NoColumn(String),
    AmbiguousColumn(String),
    Expr(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

pub struct Parser<'a> {
    context: &'a ParseContext,
}

impl ParseContext {
    pub fn new(sources: impl IntoIterator<Item = Rc<TableSource>>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
        }
    }

    /// Resolves a column name, optionally qualified by a table name or alias. Aliases take
    /// precedence over table names.
    pub fn find_col(&self, col_name: &str, table_name: Option<&str>) -> Result<ColumnRef> {
        match table_name {
            Some(table_name) => {
                let source = self
                    .sources
                    .iter()
                    .find(|source| {
                        source
                            .alias
                            .as_ref()
                            .map(|alias| alias.eq_ignore_ascii_case(table_name))
                            .unwrap_or(false)
                    })
                    .or_else(|| {
                        self.sources.iter().find(|source| {
                            source.alias.is_none()
                                && source.table.name().eq_ignore_ascii_case(table_name)
                        })
                    })
                    .ok_or_else(|| ParseError::NoTable(table_name.to_string()))?;
                source
                    .table
                    .find_col(col_name)
                    .map(|name| ColumnRef::new(source.clone(), name))
                    .ok_or_else(|| ParseError::NoColumn(format!("{}.{}", table_name, col_name)))
            }
            None => {
                let mut matches = self.sources.iter().filter_map(|source| {
                    source
                        .table
                        .find_col(col_name)
                        .map(|name| ColumnRef::new(source.clone(), name))
                });
                let col = matches
                    .next()
                    .ok_or_else(|| ParseError::NoColumn(col_name.to_string()))?;
                if matches.next().is_some() {
                    Err(ParseError::AmbiguousColumn(col_name.to_string()))
                } else {
                    Ok(col)
                }
            }
        }
    }
}

impl<'a> Parser<'a> {
    pub fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }

    pub fn parse_expr(&self, sql: &str) -> Result<Expr> {
        let ast_expr = RawParser::new(&PostgreSqlDialect {})
            .try_with_sql(sql)
            .and_then(|mut parser| parser.parse_expr())
            .map_err(ParseError::Raw)?;
        Expr::new(&ast_expr, self.context)
    }

    /// Parses a WHERE-style predicate into the list of conditions a `Select` holds, one per
    /// top-level conjunct.
    pub fn parse_conditions(&self, sql: &str) -> Result<Vec<Condition>> {
        Ok(self
            .parse_expr(sql)?
            .split_and()
            .into_iter()
            .map(Condition::new)
            .collect())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(err) => write!(f, "{}", err),
            Self::NoTable(name) => write!(f, "No table named {}", name),
            Self::NoColumn(name) => write!(f, "No column named {}", name),
            Self::AmbiguousColumn(name) => write!(f, "Column {} is ambiguous", name),
            Self::Expr(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.sources.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestSchema;

    #[test]
    fn test_find_col() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let orders = schema.source("orders");
        let aliased = schema.catalog.source("customer", Some("c2")).unwrap();
        let context = schema.context([&customer, &orders, &aliased]);

        let col = context.find_col("total", None).unwrap();
        assert_eq!(col.table(), &orders);
        let col = context.find_col("name", Some("c2")).unwrap();
        assert_eq!(col.table(), &aliased);
        let col = context.find_col("name", Some("customer")).unwrap();
        assert_eq!(col.table(), &customer);

        assert!(matches!(
            context.find_col("name", None),
            Err(ParseError::AmbiguousColumn(_))
        ));
        assert!(matches!(
            context.find_col("qty", None),
            Err(ParseError::NoColumn(_))
        ));
        assert!(matches!(
            context.find_col("id", Some("item")),
            Err(ParseError::NoTable(_))
        ));
    }

    #[test]
    fn test_parse_conditions() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let orders = schema.source("orders");
        let context = schema.context([&customer, &orders]);
        let parser = Parser::new(&context);

        let conditions = parser
            .parse_conditions("customer.name = 'Bob' AND orders.total > 100 AND orders.cid = customer.id")
            .unwrap();
        let strs: Vec<_> = conditions.iter().map(|cond| cond.to_string()).collect();
        pretty_assertions::assert_eq!(
            strs.into_iter().sorted().collect::<Vec<_>>(),
            vec![
                "'Bob' = customer.name",
                "100 < orders.total",
                "customer.id = orders.cid",
            ]
        );

        // A disjunction stays a single condition.
        let conditions = parser
            .parse_conditions("customer.name = 'Bob' OR orders.total > 100")
            .unwrap();
        assert_eq!(conditions.len(), 1);

        assert!(matches!(
            parser.parse_conditions("customer.name = "),
            Err(ParseError::Raw(_))
        ));
        assert!(matches!(
            parser.parse_conditions("item.qty = 1"),
            Err(ParseError::NoTable(_))
        ));
    }
}
