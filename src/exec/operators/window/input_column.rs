// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Expression inputs of a window executor.
//!
//! [`WindowInputExpr`] evaluates one expression per batch with a scalar fast
//! path: constant expressions are computed once as a single row and every
//! read maps to row 0. [`WindowInputColumn`] additionally materializes the
//! expression across the whole hash group for random positional access
//! (RANGE binary search reads it out of row order).

use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::compute::concat;
use arrow::datatypes::DataType;

use crate::common::error::{EngineError, Result};
use crate::exec::chunk::Chunk;
use crate::exec::expr::agg::IntView;
use crate::exec::expr::{ExprArena, ExprId};

pub(crate) struct WindowInputExpr {
    arena: Arc<ExprArena>,
    expr: Option<ExprId>,
    scalar: bool,
    current: Option<ArrayRef>,
}

impl WindowInputExpr {
    pub(crate) fn new(expr: Option<ExprId>, arena: Arc<ExprArena>) -> Self {
        let scalar = expr.map(|e| arena.is_scalar(e)).unwrap_or(true);
        Self {
            arena,
            expr,
            scalar,
            current: None,
        }
    }

    pub(crate) fn is_present(&self) -> bool {
        self.expr.is_some()
    }

    pub(crate) fn is_scalar(&self) -> bool {
        self.scalar
    }

    /// Refresh the value for a new batch. Scalar expressions are evaluated
    /// exactly once for the executor's lifetime.
    pub(crate) fn execute(&mut self, chunk: &Chunk) -> Result<()> {
        let Some(expr) = self.expr else {
            return Ok(());
        };
        if self.scalar && self.current.is_some() {
            return Ok(());
        }
        let len = if self.scalar { 1 } else { chunk.len() };
        self.current = Some(self.arena.eval_rows(expr, chunk, len)?);
        Ok(())
    }

    fn array(&self) -> Result<&ArrayRef> {
        self.current
            .as_ref()
            .ok_or_else(|| EngineError::internal("window input expression read before execute"))
    }

    #[inline]
    fn row(&self, i: usize) -> usize {
        if self.scalar { 0 } else { i }
    }

    pub(crate) fn is_null(&self, i: usize) -> Result<bool> {
        let array = self.array()?;
        Ok(array.is_null(self.row(i)))
    }

    pub(crate) fn value_i64(&self, i: usize) -> Result<i64> {
        let array = self.array()?;
        let view = IntView::new(array)?;
        Ok(view.value(self.row(i)))
    }

    pub(crate) fn value_array(&self) -> Result<ArrayRef> {
        self.array().cloned()
    }

    /// The evaluated array plus the physical row for logical row `i`
    /// (row 0 under the scalar fast path).
    pub(crate) fn raw(&self, i: usize) -> Result<(&ArrayRef, usize)> {
        let array = self.array()?;
        Ok((array, self.row(i)))
    }
}

pub(crate) struct WindowInputColumn {
    expr: WindowInputExpr,
    parts: Vec<ArrayRef>,
    finalized: Option<ArrayRef>,
    count: usize,
    capacity: usize,
}

impl WindowInputColumn {
    pub(crate) fn new(expr: Option<ExprId>, arena: Arc<ExprArena>, capacity: usize) -> Self {
        Self {
            expr: WindowInputExpr::new(expr, arena),
            parts: Vec::new(),
            finalized: None,
            count: 0,
            capacity,
        }
    }

    pub(crate) fn is_present(&self) -> bool {
        self.expr.is_present()
    }

    /// Append one batch; returns the batch's evaluated column so callers can
    /// inspect its validity without re-evaluating.
    pub(crate) fn append(&mut self, chunk: &Chunk) -> Result<Option<ArrayRef>> {
        if !self.expr.is_present() {
            return Ok(None);
        }
        debug_assert!(self.count + chunk.len() <= self.capacity);
        let appended;
        if self.expr.is_scalar() {
            // One evaluation covers the whole group.
            if self.finalized.is_none() {
                self.expr.execute(chunk)?;
                self.finalized = Some(self.expr.value_array()?);
            }
            appended = self.finalized.clone();
        } else {
            self.expr.execute(chunk)?;
            let part = self.expr.value_array()?;
            self.parts.push(part.clone());
            appended = Some(part);
        }
        self.count += chunk.len();
        Ok(appended)
    }

    /// Flatten the appended batches into one contiguous column.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if !self.expr.is_present() || self.expr.is_scalar() || self.finalized.is_some() {
            return Ok(());
        }
        if self.parts.is_empty() {
            return Ok(());
        }
        let refs: Vec<&dyn Array> = self.parts.iter().map(|a| a.as_ref()).collect();
        self.finalized = Some(concat(&refs)?);
        self.parts.clear();
        Ok(())
    }

    pub(crate) fn array(&self) -> Result<&ArrayRef> {
        self.finalized
            .as_ref()
            .ok_or_else(|| EngineError::internal("window input column read before finish"))
    }

    pub(crate) fn data_type(&self) -> Result<&DataType> {
        Ok(self.array()?.data_type())
    }

    #[inline]
    fn row(&self, i: usize) -> usize {
        debug_assert!(i < self.count);
        if self.expr.is_scalar() { 0 } else { i }
    }

    pub(crate) fn is_null(&self, i: usize) -> Result<bool> {
        let array = self.array()?;
        Ok(array.is_null(self.row(i)))
    }

    pub(crate) fn value_i64(&self, i: usize) -> Result<i64> {
        let array = self.array()?;
        let view = IntView::new(array)?;
        Ok(view.value(self.row(i)))
    }

    /// Map a group-absolute row index onto the stored column, folding the
    /// scalar fast path.
    pub(crate) fn resolve_row(&self, i: usize) -> usize {
        self.row(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SlotId;
    use crate::exec::chunk::field_with_slot_id;
    use crate::exec::expr::{ExprNode, LiteralValue};
    use arrow::array::Int64Array;
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;

    fn chunk_of(values: Vec<Option<i64>>) -> Chunk {
        let field = field_with_slot_id(Field::new("x", DataType::Int64, true), SlotId::new(1));
        let schema = Arc::new(Schema::new(vec![field]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap();
        Chunk::new(batch)
    }

    #[test]
    fn scalar_expression_evaluates_once_and_broadcasts() {
        let mut arena = ExprArena::default();
        let lit = arena.push_typed(ExprNode::Literal(LiteralValue::Int64(7)), DataType::Int64);
        let arena = Arc::new(arena);
        let mut expr = WindowInputExpr::new(Some(lit), Arc::clone(&arena));
        expr.execute(&chunk_of(vec![Some(1), Some(2)])).unwrap();
        assert_eq!(expr.value_i64(0).unwrap(), 7);
        assert_eq!(expr.value_i64(1).unwrap(), 7);
    }

    #[test]
    fn column_cache_concatenates_batches() {
        let mut arena = ExprArena::default();
        let slot = arena.push_typed(ExprNode::SlotRef(SlotId::new(1)), DataType::Int64);
        let arena = Arc::new(arena);
        let mut col = WindowInputColumn::new(Some(slot), Arc::clone(&arena), 5);
        let _ = col.append(&chunk_of(vec![Some(1), None])).unwrap();
        let _ = col.append(&chunk_of(vec![Some(3), Some(4), Some(5)])).unwrap();
        col.finish().unwrap();
        assert!(!col.is_null(0).unwrap());
        assert!(col.is_null(1).unwrap());
        let array = col.array().unwrap();
        let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(array.value(4), 5);
    }
}
