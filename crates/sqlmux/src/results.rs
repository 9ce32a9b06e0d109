//! Result demultiplexer
//!
//! Wraps the ordered result sets of one executed batch with typed,
//! positional, descriptor-keyed, and sequential accessors. Built once
//! after execution and immutable apart from the sequential cursor.

use crate::compiler::SlotInfo;
use parking_lot::Mutex;
use sqlmux_core::{QueryResult, Result, Row, SqlmuxError};
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Decode one result row into a typed value
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

/// Raw access when no typed mapping is wanted
impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

/// One result slot: the registration's type information plus its data
#[derive(Debug)]
pub(crate) struct ResultSlot {
    pub(crate) info: SlotInfo,
    pub(crate) data: QueryResult,
}

/// The ordered, typed result sets of one executed batch
#[derive(Debug)]
pub struct BatchResults {
    slots: Vec<ResultSlot>,
    by_result: HashMap<TypeId, Vec<usize>>,
    by_descriptor: HashMap<TypeId, usize>,
    cursor: Mutex<usize>,
}

impl BatchResults {
    pub(crate) fn new(infos: Vec<SlotInfo>, sets: Vec<QueryResult>) -> Self {
        debug_assert_eq!(infos.len(), sets.len());
        let slots: Vec<ResultSlot> = infos
            .into_iter()
            .zip(sets)
            .map(|(info, data)| ResultSlot { info, data })
            .collect();

        let mut by_result: HashMap<TypeId, Vec<usize>> = HashMap::new();
        let mut by_descriptor: HashMap<TypeId, usize> = HashMap::new();
        for (position, slot) in slots.iter().enumerate() {
            by_result
                .entry(slot.info.result_type)
                .or_default()
                .push(position);
            // Unique key: the first registration of a descriptor type owns
            // the entry; repeats are reached positionally or sequentially.
            by_descriptor
                .entry(slot.info.descriptor_type)
                .or_insert(position);
        }

        Self {
            slots,
            by_result,
            by_descriptor,
            cursor: Mutex::new(0),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Number of result slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the batch produced no result sets
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// First slot registered with result type `T`, or `None`
    pub fn set<T: FromRow + 'static>(&self) -> Option<TypedRows<'_, T>> {
        self.by_result
            .get(&TypeId::of::<T>())
            .and_then(|positions| positions.first())
            .map(|&position| TypedRows::over(&self.slots[position]))
    }

    /// Slot at `position`; errors on out-of-range and on result-type mismatch
    pub fn at<T: FromRow + 'static>(&self, position: usize) -> Result<TypedRows<'_, T>> {
        let slot = self
            .slots
            .get(position)
            .ok_or(SqlmuxError::PositionOutOfRange {
                position,
                len: self.slots.len(),
            })?;
        Self::typed(slot)
    }

    /// Slot registered for descriptor type `D`; the first registration
    /// wins when the same descriptor type was registered more than once
    pub fn for_descriptor<D: 'static, T: FromRow + 'static>(&self) -> Result<TypedRows<'_, T>> {
        let position = *self
            .by_descriptor
            .get(&TypeId::of::<D>())
            .ok_or_else(|| SqlmuxError::NotRegistered(std::any::type_name::<D>().to_string()))?;
        Self::typed(&self.slots[position])
    }

    /// Next slot in registration order; the cursor advances once per call
    /// and errors once exhausted
    pub fn next<T: FromRow + 'static>(&self) -> Result<TypedRows<'_, T>> {
        let mut cursor = self.cursor.lock();
        let position = *cursor;
        if position >= self.slots.len() {
            return Err(SqlmuxError::ResultsExhausted {
                len: self.slots.len(),
            });
        }
        *cursor += 1;
        Self::typed(&self.slots[position])
    }

    fn typed<T: FromRow + 'static>(slot: &ResultSlot) -> Result<TypedRows<'_, T>> {
        if slot.info.result_type != TypeId::of::<T>() {
            return Err(SqlmuxError::ResultTypeMismatch {
                requested: std::any::type_name::<T>().to_string(),
                actual: slot.info.result_name.to_string(),
            });
        }
        Ok(TypedRows::over(slot))
    }
}

/// Typed view over one result slot's rows
#[derive(Debug)]
pub struct TypedRows<'a, T> {
    rows: &'a [Row],
    _marker: PhantomData<T>,
}

impl<'a, T: FromRow> TypedRows<'a, T> {
    fn over(slot: &'a ResultSlot) -> Self {
        Self {
            rows: &slot.data.rows,
            _marker: PhantomData,
        }
    }

    /// Number of rows in this result set
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether this result set has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The undecoded rows
    pub fn rows(&self) -> &'a [Row] {
        self.rows
    }

    /// Decode every row
    pub fn all(&self) -> Result<Vec<T>> {
        self.rows.iter().map(T::from_row).collect()
    }

    /// Exactly one row; errors on zero and on more than one
    pub fn single(&self) -> Result<T> {
        match self.rows {
            [row] => T::from_row(row),
            rows => Err(SqlmuxError::RowCount {
                expected: "exactly one",
                actual: rows.len(),
            }),
        }
    }

    /// Exactly one row or none; still errors on more than one
    pub fn single_or_none(&self) -> Result<Option<T>> {
        match self.rows {
            [] => Ok(None),
            [row] => T::from_row(row).map(Some),
            rows => Err(SqlmuxError::RowCount {
                expected: "at most one",
                actual: rows.len(),
            }),
        }
    }

    /// First row; errors on an empty result set
    pub fn first(&self) -> Result<T> {
        match self.rows.first() {
            Some(row) => T::from_row(row),
            None => Err(SqlmuxError::RowCount {
                expected: "at least one",
                actual: 0,
            }),
        }
    }

    /// First row, or none on an empty result set
    pub fn first_or_none(&self) -> Result<Option<T>> {
        self.rows.first().map(T::from_row).transpose()
    }
}
