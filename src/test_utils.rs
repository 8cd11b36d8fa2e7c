//! Utility module useful for testing: a small schema to build plans over, plus helpers to parse
//! conditions against it.
use crate::condition::Condition;
use crate::parse::{ParseContext, Parser};
use crate::table::{Catalog, Table, TableSource};
use crate::utils::convert_to_one;
use std::rc::Rc;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Sends log output to stderr at debug level. Safe to call from every test.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{}][{}] {}",
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .level(log::LevelFilter::Debug)
            .level_for("sqlparser", log::LevelFilter::Warn)
            .chain(std::io::stderr())
            .apply()
            .ok();
    });
}

/// Tables customer, orders, item and address, where orders belong to a customer and items to an
/// order.
pub struct TestSchema {
    pub catalog: Catalog,
}

impl TestSchema {
    pub fn new() -> Self {
        let mut catalog = Catalog::new();
        catalog.add_table(Table::new("customer", ["id", "name", "city"]));
        catalog.add_table(Table::new("orders", ["id", "cid", "total", "placed"]));
        catalog.add_table(Table::new("item", ["id", "oid", "sku", "qty"]));
        catalog.add_table(Table::new("address", ["id", "cid", "city"]));
        Self { catalog }
    }

    /// A new unaliased occurrence of the named table.
    pub fn source(&self, name: &str) -> Rc<TableSource> {
        self.catalog
            .source(name, None)
            .unwrap_or_else(|| panic!("No test table {}", name))
    }

    pub fn context<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a Rc<TableSource>>,
    ) -> ParseContext {
        ParseContext::new(sources.into_iter().cloned())
    }

    /// Parses a single condition.
    pub fn condition<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a Rc<TableSource>>,
        sql: &str,
    ) -> Condition {
        convert_to_one(self.conditions(sources, sql))
    }

    /// Parses a conjunction into its conditions, in order.
    pub fn conditions<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a Rc<TableSource>>,
        sql: &str,
    ) -> Vec<Condition> {
        let context = self.context(sources);
        Parser::new(&context)
            .parse_conditions(sql)
            .unwrap_or_else(|err| panic!("Could not parse {}: {}", sql, err))
    }
}

impl Default for TestSchema {
    fn default() -> Self {
        Self::new()
    }
}
