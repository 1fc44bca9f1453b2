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
//! Arena-based scalar expression evaluator.
//!
//! Window operators evaluate partition keys, order keys, function arguments,
//! frame boundary offsets, FILTER predicates and lead/lag defaults through
//! this arena. The node set is intentionally small; anything richer is bound
//! by the planner before it reaches execution.
pub mod agg;
mod arithmetic;
mod comparison;
mod literal;
mod slot;

use arrow::array::{ArrayRef, new_null_array};
use arrow::datatypes::DataType;

use crate::common::error::{EngineError, Result};
use crate::common::ids::SlotId;
use crate::exec::chunk::Chunk;

pub use literal::LiteralValue;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Debug)]
pub enum ExprNode {
    Literal(LiteralValue),
    SlotRef(SlotId),
    Add(ExprId, ExprId),
    Sub(ExprId, ExprId),
    Mul(ExprId, ExprId),
    Eq(ExprId, ExprId),
    Ne(ExprId, ExprId),
    Lt(ExprId, ExprId),
    Le(ExprId, ExprId),
    Gt(ExprId, ExprId),
    Ge(ExprId, ExprId),
    And(ExprId, ExprId),
    Or(ExprId, ExprId),
    Not(ExprId),
    IsNull(ExprId),
    IsNotNull(ExprId),
}

#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    types: Vec<DataType>,
}

impl ExprArena {
    pub fn push(&mut self, node: ExprNode) -> ExprId {
        self.push_typed(node, DataType::Null)
    }

    pub fn push_typed(&mut self, node: ExprNode, data_type: DataType) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(node);
        self.types.push(data_type);
        id
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn data_type(&self, id: ExprId) -> Option<&DataType> {
        self.types.get(id.0)
    }

    /// True when the expression does not read any input column, so its value
    /// is identical for every row of every batch.
    pub fn is_scalar(&self, id: ExprId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        match node {
            ExprNode::Literal(_) => true,
            ExprNode::SlotRef(_) => false,
            ExprNode::Add(a, b)
            | ExprNode::Sub(a, b)
            | ExprNode::Mul(a, b)
            | ExprNode::Eq(a, b)
            | ExprNode::Ne(a, b)
            | ExprNode::Lt(a, b)
            | ExprNode::Le(a, b)
            | ExprNode::Gt(a, b)
            | ExprNode::Ge(a, b)
            | ExprNode::And(a, b)
            | ExprNode::Or(a, b) => self.is_scalar(*a) && self.is_scalar(*b),
            ExprNode::Not(c) | ExprNode::IsNull(c) | ExprNode::IsNotNull(c) => self.is_scalar(*c),
        }
    }

    pub fn eval(&self, id: ExprId, chunk: &Chunk) -> Result<ArrayRef> {
        self.eval_rows(id, chunk, chunk.len())
    }

    /// Evaluate producing `len` rows; used by the scalar fast path which
    /// evaluates constant expressions once with `len == 1`.
    pub fn eval_rows(&self, id: ExprId, chunk: &Chunk, len: usize) -> Result<ArrayRef> {
        let node = self
            .nodes
            .get(id.0)
            .ok_or_else(|| EngineError::internal("invalid ExprId"))?;
        match node {
            ExprNode::Literal(v) => {
                if matches!(v, LiteralValue::Null) {
                    let target = self.data_type(id).cloned().unwrap_or(DataType::Null);
                    if !matches!(target, DataType::Null) {
                        // Typed NULL literals keep the declared type so later
                        // concatenation does not mix Null with typed columns.
                        return Ok(new_null_array(&target, len));
                    }
                }
                literal::eval(v, len)
            }
            ExprNode::SlotRef(slot_id) => slot::eval_slot_ref(*slot_id, chunk),
            ExprNode::Add(a, b) => arithmetic::eval_add(self, *a, *b, chunk, len),
            ExprNode::Sub(a, b) => arithmetic::eval_sub(self, *a, *b, chunk, len),
            ExprNode::Mul(a, b) => arithmetic::eval_mul(self, *a, *b, chunk, len),
            ExprNode::Eq(a, b) => comparison::eval_cmp(self, *a, *b, chunk, len, comparison::CmpOp::Eq),
            ExprNode::Ne(a, b) => comparison::eval_cmp(self, *a, *b, chunk, len, comparison::CmpOp::Ne),
            ExprNode::Lt(a, b) => comparison::eval_cmp(self, *a, *b, chunk, len, comparison::CmpOp::Lt),
            ExprNode::Le(a, b) => comparison::eval_cmp(self, *a, *b, chunk, len, comparison::CmpOp::Le),
            ExprNode::Gt(a, b) => comparison::eval_cmp(self, *a, *b, chunk, len, comparison::CmpOp::Gt),
            ExprNode::Ge(a, b) => comparison::eval_cmp(self, *a, *b, chunk, len, comparison::CmpOp::Ge),
            ExprNode::And(a, b) => comparison::eval_and(self, *a, *b, chunk, len),
            ExprNode::Or(a, b) => comparison::eval_or(self, *a, *b, chunk, len),
            ExprNode::Not(c) => comparison::eval_not(self, *c, chunk, len),
            ExprNode::IsNull(c) => comparison::eval_is_null(self, *c, chunk, len),
            ExprNode::IsNotNull(c) => comparison::eval_is_not_null(self, *c, chunk, len),
        }
    }
}

/// Cast helper shared by arithmetic and comparison: unify two arrays onto a
/// common type, preferring Float64 when either side is floating point.
pub(crate) fn unify_numeric_types(l: ArrayRef, r: ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    use arrow::compute::cast;
    if l.data_type() == r.data_type() {
        return Ok((l, r));
    }
    let is_float =
        |dt: &DataType| matches!(dt, DataType::Float32 | DataType::Float64);
    let target = if is_float(l.data_type()) || is_float(r.data_type()) {
        DataType::Float64
    } else {
        DataType::Int64
    };
    let l = if l.data_type() == &target {
        l
    } else {
        cast(&l, &target)?
    };
    let r = if r.data_type() == &target {
        r
    } else {
        cast(&r, &target)?
    };
    Ok((l, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::chunk::field_with_slot_id;
    use std::sync::Arc;
    use arrow::array::{Array, BooleanArray, Int64Array};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;

    fn test_chunk() -> Chunk {
        let field = field_with_slot_id(Field::new("x", DataType::Int64, true), SlotId::new(1));
        let schema = Arc::new(Schema::new(vec![field]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![Some(1), None, Some(3)]))],
        )
        .unwrap();
        Chunk::new(batch)
    }

    #[test]
    fn typed_null_literal_uses_declared_type() {
        let mut arena = ExprArena::default();
        let expr = arena.push_typed(ExprNode::Literal(LiteralValue::Null), DataType::Utf8);
        let arr = arena.eval(expr, &test_chunk()).unwrap();
        assert_eq!(arr.data_type(), &DataType::Utf8);
        assert_eq!(arr.len(), 3);
        assert!(arr.is_null(0));
    }

    #[test]
    fn slot_plus_literal() {
        let mut arena = ExprArena::default();
        let x = arena.push_typed(ExprNode::SlotRef(SlotId::new(1)), DataType::Int64);
        let one = arena.push_typed(ExprNode::Literal(LiteralValue::Int64(1)), DataType::Int64);
        let sum = arena.push_typed(ExprNode::Add(x, one), DataType::Int64);
        assert!(!arena.is_scalar(sum));
        let arr = arena.eval(sum, &test_chunk()).unwrap();
        let arr = arr.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(arr.value(0), 2);
        assert!(arr.is_null(1));
        assert_eq!(arr.value(2), 4);
    }

    #[test]
    fn comparison_yields_boolean() {
        let mut arena = ExprArena::default();
        let x = arena.push_typed(ExprNode::SlotRef(SlotId::new(1)), DataType::Int64);
        let two = arena.push_typed(ExprNode::Literal(LiteralValue::Int64(2)), DataType::Int64);
        let pred = arena.push_typed(ExprNode::Ge(x, two), DataType::Boolean);
        let arr = arena.eval(pred, &test_chunk()).unwrap();
        let arr = arr.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(!arr.value(0));
        assert!(arr.is_null(1));
        assert!(arr.value(2));
    }

    #[test]
    fn scalar_fast_path_evaluates_single_row() {
        let mut arena = ExprArena::default();
        let two = arena.push_typed(ExprNode::Literal(LiteralValue::Int64(2)), DataType::Int64);
        let four = arena.push_typed(ExprNode::Mul(two, two), DataType::Int64);
        assert!(arena.is_scalar(four));
        let arr = arena.eval_rows(four, &test_chunk(), 1).unwrap();
        assert_eq!(arr.len(), 1);
        let arr = arr.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(arr.value(0), 4);
    }
}
