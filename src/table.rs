use snowflake::ProcessUniqueId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

type TableId = ProcessUniqueId;
type SourceId = ProcessUniqueId;

pub type TableSourceSet = BTreeSet<Rc<TableSource>>;
pub type ColumnRefSet = BTreeSet<ColumnRef>;

/// A schema-level table. Plans never refer to a `Table` directly, only to `TableSource`s.
pub struct Table {
    id: TableId,
    name: String,
    cols: Vec<String>,
}

/// One occurrence of a `Table` within a plan. We need to distinguish between occurrences in the
/// case that a table is present more than once (self-joins, or the same table reached through
/// different branches of the group hierarchy).
pub struct TableSource {
    pub table: Rc<Table>,
    pub alias: Option<String>,
    id: SourceId,
}

/// A column of a particular `TableSource`.
#[derive(Clone)]
pub struct ColumnRef {
    source: Rc<TableSource>,
    name: String,
}

/// Registry of the tables that can be referred to by name.
#[derive(Default)]
pub struct Catalog {
    tables: HashMap<String, Rc<Table>>,
}

impl Table {
    pub fn new<S: Into<String>>(name: &str, cols: impl IntoIterator<Item = S>) -> Rc<Self> {
        Rc::new(Self {
            id: TableId::new(),
            name: name.to_string(),
            cols: cols.into_iter().map(|col| col.into()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find_col(&self, col_name: &str) -> Option<&str> {
        self.cols
            .iter()
            .find(|col| col.eq_ignore_ascii_case(col_name))
            .map(|col| col.as_str())
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Table {}

impl Hash for Table {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl TableSource {
    pub fn new(table: Rc<Table>, alias: Option<String>) -> Rc<Self> {
        Rc::new(Self {
            table,
            alias,
            id: SourceId::new(),
        })
    }

    /// The name used to refer to this source in expressions: the alias if it has one.
    pub fn ref_name(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.table.name())
    }

    /// Makes a reference to one of this source's columns. Panics if the table has no such column.
    pub fn col(self: &Rc<Self>, col_name: &str) -> ColumnRef {
        let name = self.table.find_col(col_name).unwrap_or_else(|| {
            panic!("Table {} has no column {}", self.table.name(), col_name)
        });
        ColumnRef::new(self.clone(), name)
    }
}

impl PartialEq for TableSource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TableSource {}

impl Hash for TableSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TableSource {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableSource {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl ColumnRef {
    pub fn new(source: Rc<TableSource>, name: &str) -> Self {
        Self {
            source,
            name: name.to_string(),
        }
    }

    pub fn table(&self) -> &Rc<TableSource> {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.name == other.name
    }
}

impl Eq for ColumnRef {}

impl Hash for ColumnRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for ColumnRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ColumnRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.source, &self.name).cmp(&(&other.source, &other.name))
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Rc<Table>) {
        self.tables.insert(table.name().to_lowercase(), table);
    }

    pub fn get_table(&self, name: &str) -> Option<&Rc<Table>> {
        self.tables.get(&name.to_lowercase())
    }

    /// Creates a new occurrence of the named table.
    pub fn source(&self, name: &str, alias: Option<&str>) -> Option<Rc<TableSource>> {
        self.get_table(name)
            .map(|table| TableSource::new(table.clone(), alias.map(|alias| alias.to_string())))
    }
}

impl fmt::Display for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ref_name())
    }
}

impl fmt::Debug for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source, self.name)
    }
}

impl fmt::Debug for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_identity() {
        let table = Table::new("customer", ["id", "name"]);
        let first = TableSource::new(table.clone(), None);
        let second = TableSource::new(table.clone(), Some("c2".to_string()));

        assert_ne!(first, second);
        assert!(first.table == second.table);
        assert_eq!(first.to_string(), "customer");
        assert_eq!(second.to_string(), "c2");

        let set: TableSourceSet = [first.clone(), second.clone(), first.clone()]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_column_refs() {
        let table = Table::new("customer", ["id", "name"]);
        let first = TableSource::new(table.clone(), None);
        let second = TableSource::new(table, None);

        assert_eq!(first.col("NAME"), first.col("name"));
        assert_ne!(first.col("name"), second.col("name"));
        assert_eq!(first.col("id").table(), &first);
        assert_eq!(first.col("id").to_string(), "customer.id");
    }

    #[test]
    fn test_catalog() {
        let mut catalog = Catalog::new();
        catalog.add_table(Table::new("Orders", ["id", "cid"]));

        assert!(catalog.get_table("orders").is_some());
        assert!(catalog.get_table("customer").is_none());
        let source = catalog.source("orders", Some("o")).unwrap();
        assert_eq!(source.ref_name(), "o");
        assert_eq!(source.table.name(), "Orders");
    }
}
