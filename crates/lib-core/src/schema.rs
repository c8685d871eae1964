use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::helpers::IndexMap;

/// Identifier-folding rule of the active dialect, applied when names are
/// compared. The declared spelling is what ends up in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierFolding {
    #[default]
    Preserve,
    Upper,
    Lower,
}

impl IdentifierFolding {
    fn fold(self, name: &str) -> SmolStr {
        match self {
            IdentifierFolding::Preserve => name.into(),
            IdentifierFolding::Upper => name.to_uppercase().into(),
            IdentifierFolding::Lower => name.to_lowercase().into(),
        }
    }
}

/// Canonical identity of one table. Resolved once per registry, so
/// `Rc::ptr_eq` comparisons suffice everywhere else.
pub struct TableMeta {
    name: SmolStr,
    folding: IdentifierFolding,
    columns: RefCell<IndexMap<SmolStr, ColumnRef>>,
}

pub type TableRef = Rc<TableMeta>;

impl TableMeta {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonicalizes a (table, column) pair; unknown columns are created on
    /// first resolve.
    pub fn resolve_column(&self, name: &str) -> ColumnRef {
        let folded = self.folding.fold(name);
        let mut columns = self.columns.borrow_mut();
        if let Some(column) = columns.get(&folded) {
            return Rc::clone(column);
        }
        let column = Rc::new(ColumnMeta {
            table: self.name.clone(),
            name: name.into(),
        });
        columns.insert(folded, Rc::clone(&column));
        column
    }
}

impl fmt::Debug for TableMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableMeta({})", self.name)
    }
}

/// Canonical identity of one column within its table.
#[derive(Debug)]
pub struct ColumnMeta {
    table: SmolStr,
    name: SmolStr,
}

pub type ColumnRef = Rc<ColumnMeta>;

impl ColumnMeta {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Interns table identities by (folded) name.
#[derive(Debug, Default)]
pub struct TableRegistry {
    folding: IdentifierFolding,
    tables: IndexMap<SmolStr, TableRef>,
}

impl TableRegistry {
    pub fn new(folding: IdentifierFolding) -> Self {
        TableRegistry {
            folding,
            tables: IndexMap::default(),
        }
    }

    pub fn resolve_table(&mut self, name: &str) -> TableRef {
        let folded = self.folding.fold(name);
        if let Some(table) = self.tables.get(&folded) {
            return Rc::clone(table);
        }
        let table = Rc::new(TableMeta {
            name: name.into(),
            folding: self.folding,
            columns: RefCell::new(IndexMap::default()),
        });
        self.tables.insert(folded, Rc::clone(&table));
        table
    }
}
