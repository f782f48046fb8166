//! Fixed-length ordered sequences of value cells
//!
//! A multifield is shared by reference counting and copied on the first
//! mutation through a shared handle, so a fact holding a multifield never sees
//! later writes made through another handle. Indices on the accessor API are
//! 1-based; [`Multifield::get`] and iteration are zero-based.

use crate::error::{ClaspError, ClaspResult};
use crate::value::{Value, ValueCell};
use clasp_types::ValueKind;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MultifieldData {
    length: usize,
    cells: Vec<ValueCell>,
}

/// Ordered, fixed-length sequence of single-field values
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Multifield {
    data: Arc<MultifieldData>,
}

impl Multifield {
    /// Multifield with no fields
    pub fn empty() -> Self {
        Self::from_cells(Vec::new())
    }

    /// Multifield of `length` unset cells, to be filled with [`Multifield::set_value`]
    pub fn with_length(length: usize) -> Self {
        Self::from_cells(vec![ValueCell::default(); length])
    }

    /// Build from values, splicing nested multifields in place
    ///
    /// Unset cells of a nested multifield are kept as unset cells, so the
    /// result is incomplete rather than shorter.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut cells = Vec::new();
        for value in values {
            match value {
                Value::Multifield(inner) => {
                    cells.extend(inner.cells().iter().cloned());
                }
                single => cells.push(ValueCell::from(single)),
            }
        }
        Self::from_cells(cells)
    }

    fn from_cells(cells: Vec<ValueCell>) -> Self {
        Self { data: Arc::new(MultifieldData { length: cells.len(), cells }) }
    }

    pub fn len(&self) -> usize {
        self.data.length
    }

    pub fn is_empty(&self) -> bool {
        self.data.length == 0
    }

    /// Kind of the field at a 1-based index
    pub fn get_type(&self, index: i64) -> ClaspResult<ValueKind> {
        let position = self.position(index)?;
        Ok(self.data.cells[position].get_type())
    }

    /// Set the kind of the field at a 1-based index, returning the previous kind
    pub fn set_type(&mut self, index: i64, kind: ValueKind) -> ClaspResult<ValueKind> {
        let position = self.position(index)?;
        if kind == ValueKind::Multifield {
            return Err(ClaspError::kind_mismatch("single-field kind", kind));
        }
        Ok(self.make_mut().cells[position].set_type(kind))
    }

    /// Payload at a 1-based index; `None` if the field is unset
    pub fn get_value(&self, index: i64) -> ClaspResult<Option<&Value>> {
        let position = self.position(index)?;
        Ok(self.data.cells[position].get_value())
    }

    /// Store a single-field value at a 1-based index, returning the previous payload
    pub fn set_value(&mut self, index: i64, value: Value) -> ClaspResult<Option<Value>> {
        let position = self.position(index)?;
        if let Value::Multifield(_) = value {
            return Err(ClaspError::kind_mismatch("single-field value", ValueKind::Multifield));
        }
        Ok(self.make_mut().cells[position].set_value(value))
    }

    /// Payload at a zero-based position
    pub fn get(&self, position: usize) -> Option<&Value> {
        self.data.cells.get(position).and_then(ValueCell::get_value)
    }

    pub fn cells(&self) -> &[ValueCell] {
        &self.data.cells
    }

    /// Set payloads in order; unset cells are skipped
    pub fn iter(&self) -> impl Iterator<Item = &Value> + '_ {
        self.data.cells.iter().filter_map(ValueCell::get_value)
    }

    /// Whether every cell holds a payload
    pub fn is_complete(&self) -> bool {
        self.data.cells.iter().all(ValueCell::is_set)
    }

    /// Copy of the inclusive zero-based range `begin..=end`, clamped to the fields
    pub fn slice(&self, begin: usize, end: usize) -> Multifield {
        if begin > end || begin >= self.len() {
            return Self::empty();
        }
        let end = end.min(self.len() - 1);
        Self::from_cells(self.data.cells[begin..=end].to_vec())
    }

    /// Whether another handle shares the underlying storage
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// Identity pointer of the underlying storage
    pub fn as_ptr(&self) -> *const () {
        Arc::as_ptr(&self.data).cast()
    }

    fn position(&self, index: i64) -> ClaspResult<usize> {
        let length = self.len();
        if index < 1 || index > length as i64 {
            return Err(ClaspError::IndexOutOfRange { index, length });
        }
        Ok((index - 1) as usize)
    }

    fn make_mut(&mut self) -> &mut MultifieldData {
        if self.is_shared() {
            trace!(length = self.len(), "Copying shared multifield before write");
        }
        Arc::make_mut(&mut self.data)
    }
}

impl Default for Multifield {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Value> for Multifield {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

impl<'a> IntoIterator for &'a Multifield {
    type Item = &'a Value;
    type IntoIter = Box<dyn Iterator<Item = &'a Value> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl fmt::Display for Multifield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (position, cell) in self.data.cells.iter().enumerate() {
            if position > 0 {
                f.write_str(" ")?;
            }
            match cell.get_value() {
                Some(value) => write!(f, "{value}")?,
                None => f.write_str("?")?,
            }
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Multifield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multifield{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol_table::SymbolTable;

    #[test]
    fn test_one_based_accessors() {
        let table = SymbolTable::new();
        let mf: Multifield = [table.integer(1), table.float(2.3), table.string("4"), table.symbol("five")]
            .into_iter()
            .collect();

        assert_eq!(mf.len(), 4);
        assert_eq!(mf.get_type(1).unwrap(), ValueKind::Integer);
        assert_eq!(mf.get_type(4).unwrap(), ValueKind::Symbol);
        assert_eq!(mf.get_value(3).unwrap(), Some(&table.string("4")));
        assert_eq!(mf.get(1), Some(&table.float(2.3)));
    }

    #[test]
    fn test_index_bounds() {
        let table = SymbolTable::new();
        let mut mf = Multifield::with_length(2);

        assert_eq!(mf.get_type(0), Err(ClaspError::IndexOutOfRange { index: 0, length: 2 }));
        assert_eq!(mf.get_value(3).unwrap_err(), ClaspError::IndexOutOfRange { index: 3, length: 2 });
        assert!(mf.set_value(-1, table.integer(1)).is_err());
        assert_eq!(mf.len(), 2);
    }

    #[test]
    fn test_fill_unset_cells() {
        let table = SymbolTable::new();
        let mut mf = Multifield::with_length(2);
        assert!(!mf.is_complete());
        assert_eq!(mf.get_value(1).unwrap(), None);

        mf.set_value(1, table.symbol("a")).unwrap();
        mf.set_value(2, table.integer(2)).unwrap();
        assert!(mf.is_complete());
        assert_eq!(mf.to_string(), "(a 2)");
    }

    #[test]
    fn test_nested_values_flatten_on_construction() {
        let table = SymbolTable::new();
        let inner: Multifield = [table.integer(2), table.integer(3)].into_iter().collect();
        let outer = Multifield::from_values([table.integer(1), Value::Multifield(inner), table.integer(4)]);

        let ints: Vec<i64> = outer.iter().filter_map(Value::as_integer).collect();
        assert_eq!(ints, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_nested_unset_cells_are_kept() {
        let table = SymbolTable::new();
        let outer = Multifield::from_values([table.integer(1), Value::Multifield(Multifield::with_length(2))]);

        assert_eq!(outer.len(), 3);
        assert!(!outer.is_complete());
        assert_eq!(outer.get_value(2).unwrap(), None);
    }

    #[test]
    fn test_nested_set_is_rejected() {
        let table = SymbolTable::new();
        let mut mf = Multifield::with_length(1);
        let nested = Value::Multifield(Multifield::empty());

        assert!(matches!(mf.set_value(1, nested), Err(ClaspError::KindMismatch { .. })));
        assert!(matches!(mf.set_type(1, ValueKind::Multifield), Err(ClaspError::KindMismatch { .. })));
        assert!(mf.set_value(1, table.integer(0)).unwrap().is_none());
    }

    #[test]
    fn test_copy_on_write() {
        let table = SymbolTable::new();
        let original: Multifield = [table.integer(1), table.integer(2)].into_iter().collect();
        let mut copy = original.clone();
        assert!(original.is_shared());

        copy.set_value(1, table.integer(99)).unwrap();
        assert_eq!(original.get(0), Some(&table.integer(1)));
        assert_eq!(copy.get(0), Some(&table.integer(99)));
        assert!(!original.is_shared());
    }

    #[test]
    fn test_slice_clamps() {
        let table = SymbolTable::new();
        let mf: Multifield = (1..=5).map(|i| table.integer(i)).collect();

        assert_eq!(mf.slice(1, 3).to_string(), "(2 3 4)");
        assert_eq!(mf.slice(3, 10).to_string(), "(4 5)");
        assert!(mf.slice(5, 6).is_empty());
        assert!(mf.slice(3, 1).is_empty());
    }
}
