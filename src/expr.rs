use crate::parse::{self, ParseContext, ParseError};
use crate::table::{ColumnRef, ColumnRefSet, TableSourceSet};
use auto_enums::auto_enum;
use itertools::Itertools;
use sqlparser::ast;
use std::fmt;
use traversal::DftPre;

#[derive(Clone, PartialEq)]
pub enum Value {
    Long(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    Null,
}

/// A scalar expression. The optimizer never evaluates these; it only needs to know which columns
/// (and therefore which table sources) an expression depends on.
#[derive(Clone, PartialEq)]
pub enum Expr {
    ColRef(ColumnRef),
    Value(Value),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    BinaryOp {
        left: Box<Expr>,
        right: Box<Expr>,
        op: BinaryOperator,
    },
    UnaryOp {
        expr: Box<Expr>,
        op: UnaryOperator,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
}

#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub enum BinaryOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Lt,
    LtEq,
    Eq,
    NotEq,
    And,
    Or,
}

#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Not,
}

macro_rules! convert_binary_op {
    ($expr:expr, ($($op:ident),*)) => {
        match $expr {
            $(
                ast::BinaryOperator::$op => Ok(BinaryOperator::$op)
            ),*,
            _ => Err(ParseError::Expr(format!("Unexpected op {}", $expr))),
        }
    };
}

impl Expr {
    pub fn new(ast_expr: &ast::Expr, context: &ParseContext) -> parse::Result<Self> {
        // XXX: When constructing a new Expr, a certain structure will always be preferred. This
        // makes comparing Expr's easier later. For example, all x > y expressions will be turned
        // into y < x expressions.
        match ast_expr {
            ast::Expr::Identifier(ast::Ident { value, .. }) => {
                context.find_col(value, None).map(Self::ColRef)
            }
            ast::Expr::CompoundIdentifier(idents) => {
                if idents.len() != 2 {
                    return Err(ParseError::Expr(format!(
                        "Expected table.column, got {}",
                        idents.iter().join(".")
                    )));
                }
                context
                    .find_col(&idents[1].value, Some(&idents[0].value))
                    .map(Self::ColRef)
            }
            ast::Expr::Value(val) => match val {
                ast::Value::Number(val, _) => val
                    .parse::<i64>()
                    .map(|val| Self::Value(Value::Long(val)))
                    .or_else(|_| val.parse::<f64>().map(|val| Self::Value(Value::Double(val))))
                    .or(Err(ParseError::Expr(format!(
                        "Could not parse value: {}",
                        val
                    )))),
                ast::Value::SingleQuotedString(s) => Ok(Self::Value(Value::Str(s.clone()))),
                ast::Value::Boolean(b) => Ok(Self::Value(Value::Bool(*b))),
                ast::Value::Null => Ok(Self::Value(Value::Null)),
                _ => Err(ParseError::Expr(format!("Unsupported value {}", val))),
            },
            ast::Expr::BinaryOp { left, right, op } => {
                let left = Box::new(Expr::new(left, context)?);
                let right = Box::new(Expr::new(right, context)?);
                match op {
                    // Commutative operations. AND is left alone, since the order of conjuncts is
                    // the order conditions are evaluated in.
                    ast::BinaryOperator::Plus
                    | ast::BinaryOperator::Multiply
                    | ast::BinaryOperator::Eq
                    | ast::BinaryOperator::NotEq
                    | ast::BinaryOperator::Or => {
                        let op = convert_binary_op!(op, (Plus, Multiply, Eq, NotEq, Or))?;
                        if left.to_string() <= right.to_string() {
                            Ok(Self::BinaryOp { left, right, op })
                        } else {
                            Ok(Self::BinaryOp {
                                left: right,
                                right: left,
                                op,
                            })
                        }
                    }
                    // Operations which can be flipped
                    ast::BinaryOperator::Gt => Ok(Self::BinaryOp {
                        left: right,
                        right: left,
                        op: BinaryOperator::Lt,
                    }),
                    ast::BinaryOperator::GtEq => Ok(Self::BinaryOp {
                        left: right,
                        right: left,
                        op: BinaryOperator::LtEq,
                    }),
                    // Remaining operations
                    _ => {
                        let op = convert_binary_op!(op, (Minus, Divide, Modulo, Lt, LtEq, And))?;
                        Ok(Self::BinaryOp { left, right, op })
                    }
                }
            }
            ast::Expr::UnaryOp { expr, op } => {
                let expr = Expr::new(expr, context)?;
                let op = match op {
                    ast::UnaryOperator::Plus => {
                        return Ok(expr);
                    }
                    ast::UnaryOperator::Minus => UnaryOperator::Minus,
                    ast::UnaryOperator::Not => UnaryOperator::Not,
                    _ => {
                        return Err(ParseError::Expr(format!("Unsupported operator {}", op)));
                    }
                };
                Ok(Self::UnaryOp {
                    expr: Box::new(expr),
                    op,
                })
            }
            ast::Expr::Nested(expr) => Expr::new(expr, context),
            ast::Expr::Function(ast::Function { name, args, .. }) => {
                let name = name.to_string().to_lowercase();
                let args = args
                    .iter()
                    .map(|arg| {
                        if let ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(arg)) = arg {
                            Expr::new(arg, context)
                        } else {
                            Err(ParseError::Expr(format!(
                                "Do not yet support named or wildcard function arguments: {}",
                                arg
                            )))
                        }
                    })
                    .collect::<parse::Result<_>>()?;

                Ok(Expr::Function { name, args })
            }
            ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let between = Expr::Between {
                    expr: Box::new(Expr::new(expr, context)?),
                    low: Box::new(Expr::new(low, context)?),
                    high: Box::new(Expr::new(high, context)?),
                };
                if *negated {
                    Ok(Expr::UnaryOp {
                        expr: Box::new(between),
                        op: UnaryOperator::Not,
                    })
                } else {
                    Ok(between)
                }
            }
            ast::Expr::IsNull(expr) => Ok(Expr::IsNull {
                expr: Box::new(Expr::new(expr, context)?),
                negated: false,
            }),
            ast::Expr::IsNotNull(expr) => Ok(Expr::IsNull {
                expr: Box::new(Expr::new(expr, context)?),
                negated: true,
            }),
            ast::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
            } => {
                if escape_char.is_some() {
                    return Err(ParseError::Expr(
                        "Don't support LIKE with an escape char".to_string(),
                    ));
                }
                let expr = Box::new(Expr::new(expr, context)?);
                let pattern = match Expr::new(pattern, context)? {
                    Expr::Value(Value::Str(s)) => s,
                    pattern => {
                        return Err(ParseError::Expr(format!("Unexpected pattern {}", pattern)))
                    }
                };
                Ok(Expr::Like {
                    expr,
                    pattern,
                    negated: *negated,
                })
            }
            ast::Expr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = Box::new(Expr::new(expr, context)?);
                let list = list
                    .iter()
                    .map(|expr| Expr::new(expr, context))
                    .collect::<parse::Result<_>>()?;
                Ok(Expr::InList {
                    expr,
                    list,
                    negated: *negated,
                })
            }
            _ => Err(ParseError::Expr(format!(
                "Expression not supported {}",
                ast_expr
            ))),
        }
    }

    /// Iterates over the children of an expression.
    #[auto_enum(Iterator)]
    fn iter_children<'a>(&'a self) -> impl Iterator<Item = &'a Self> {
        match self {
            Self::ColRef(_) | Self::Value(_) => std::iter::empty(),
            Self::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()].into_iter(),
            Self::UnaryOp { expr, .. } | Self::IsNull { expr, .. } | Self::Like { expr, .. } => {
                std::iter::once(expr.as_ref())
            }
            Self::Function { args, .. } => args.iter(),
            Self::Between { expr, low, high } => {
                vec![expr.as_ref(), low.as_ref(), high.as_ref()].into_iter()
            }
            Self::InList { expr, list, .. } => std::iter::once(expr.as_ref()).chain(list.iter()),
        }
    }

    /// Iterates over the expression tree in dft order.
    fn iter_tree<'a>(&'a self) -> impl Iterator<Item = &'a Self> {
        DftPre::new(self, |expr| expr.iter_children()).map(|(_, expr)| expr)
    }

    /// Iterates over all columns referred to by this expression.
    pub fn iter_col_refs<'a>(&'a self) -> impl Iterator<Item = &'a ColumnRef> {
        self.iter_tree().filter_map(|expr| match expr {
            Self::ColRef(col) => Some(col),
            _ => None,
        })
    }

    pub fn col_refs(&self) -> ColumnRefSet {
        self.iter_col_refs().cloned().collect()
    }

    pub fn table_sources(&self) -> TableSourceSet {
        self.iter_col_refs().map(|col| col.table().clone()).collect()
    }

    /// Splits a conjunction into its conjuncts. Anything that is not an `And` is returned as is.
    pub fn split_and(self) -> Vec<Expr> {
        match self {
            Self::BinaryOp {
                left,
                right,
                op: BinaryOperator::And,
            } => {
                let mut conjuncts = left.split_and();
                conjuncts.extend(right.split_and());
                conjuncts
            }
            expr => vec![expr],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long(val) => write!(f, "{}", val),
            Self::Double(val) => write!(f, "{}", val),
            Self::Str(val) => write!(f, "'{}'", val),
            Self::Bool(val) => write!(f, "{}", val),
            Self::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColRef(col) => write!(f, "{}", col),
            Self::BinaryOp { left, right, op } => {
                let op_str = match op {
                    BinaryOperator::Plus => "+",
                    BinaryOperator::Minus => "-",
                    BinaryOperator::Multiply => "*",
                    BinaryOperator::Divide => "/",
                    BinaryOperator::Modulo => "%",
                    BinaryOperator::Lt => "<",
                    BinaryOperator::LtEq => "<=",
                    BinaryOperator::Eq => "=",
                    BinaryOperator::NotEq => "!=",
                    BinaryOperator::And => "and",
                    BinaryOperator::Or => "or",
                };
                if let BinaryOperator::And | BinaryOperator::Or = op {
                    write!(f, "({} {} {})", left, op_str, right)
                } else {
                    write!(f, "{} {} {}", left, op_str, right)
                }
            }
            Self::UnaryOp { expr, op } => {
                let op = match op {
                    UnaryOperator::Minus => "-",
                    UnaryOperator::Not => "NOT ",
                };
                write!(f, "{}{}", op, expr)
            }
            Self::Value(val) => write!(f, "{}", val),
            Self::Function { name, args } => write!(f, "{}({})", name, args.iter().join(", ")),
            Self::Between { expr, low, high } => {
                write!(f, "{} BETWEEN {} AND {}", expr, low, high)
            }
            Self::Like {
                expr,
                pattern,
                negated,
            } => {
                write!(
                    f,
                    "{} {}LIKE '{}'",
                    expr,
                    if *negated { "NOT " } else { "" },
                    pattern
                )
            }
            Self::InList {
                expr,
                list,
                negated,
            } => {
                write!(
                    f,
                    "{} {}IN ({})",
                    expr,
                    if *negated { "NOT " } else { "" },
                    list.iter().join(", ")
                )
            }
            Self::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use crate::parse::Parser;
    use crate::test_utils::TestSchema;

    #[test]
    fn test_canonical_form() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let orders = schema.source("orders");
        let context = schema.context([&customer, &orders]);
        let parser = Parser::new(&context);

        let expr = parser.parse_expr("orders.total > 100").unwrap();
        assert_eq!(expr.to_string(), "100 < orders.total");

        let expr = parser.parse_expr("orders.cid = customer.id").unwrap();
        assert_eq!(expr.to_string(), "customer.id = orders.cid");

        let expr = parser
            .parse_expr("name LIKE 'B%' AND total NOT IN (1, 2)")
            .unwrap();
        assert_eq!(
            expr.to_string(),
            "(customer.name LIKE 'B%' and orders.total NOT IN (1, 2))"
        );
    }

    #[test]
    fn test_col_refs() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let orders = schema.source("orders");
        let context = schema.context([&customer, &orders]);
        let parser = Parser::new(&context);

        let expr = parser
            .parse_expr("coalesce(orders.total, 0) BETWEEN customer.id AND 10 OR name IS NULL")
            .unwrap();
        let cols: Vec<_> = expr.col_refs().into_iter().map(|col| col.to_string()).collect();
        assert_eq!(cols, vec!["customer.id", "customer.name", "orders.total"]);
        assert_eq!(expr.table_sources().len(), 2);

        let expr = parser.parse_expr("1 = 1").unwrap();
        assert!(expr.col_refs().is_empty());
    }

    #[test]
    fn test_split_and() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let context = schema.context([&customer]);
        let parser = Parser::new(&context);

        let conjuncts = parser
            .parse_expr("id = 1 AND (name = 'Bob' AND (city = 'NYC' OR city = 'LA'))")
            .unwrap()
            .split_and();
        let strs: Vec<_> = conjuncts.iter().map(|expr| expr.to_string()).collect();
        assert_eq!(
            strs,
            vec![
                "1 = customer.id",
                "'Bob' = customer.name",
                "('LA' = customer.city or 'NYC' = customer.city)",
            ]
        );
    }
}
