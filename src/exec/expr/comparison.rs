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
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::kernels::boolean::{and_kleene, not, or_kleene};
use arrow::compute::kernels::cmp::{eq, gt, gt_eq, lt, lt_eq, neq};
use arrow::compute::{is_not_null, is_null};

use crate::common::error::{EngineError, Result};
use crate::exec::chunk::Chunk;
use crate::exec::expr::{ExprArena, ExprId, unify_numeric_types};

#[derive(Copy, Clone, Debug)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

pub fn eval_cmp(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
    len: usize,
    op: CmpOp,
) -> Result<ArrayRef> {
    let l = arena.eval_rows(left, chunk, len)?;
    let r = arena.eval_rows(right, chunk, len)?;
    let (l, r) = if l.data_type() == r.data_type() {
        (l, r)
    } else {
        unify_numeric_types(l, r)?
    };
    let out = match op {
        CmpOp::Eq => eq(&l, &r)?,
        CmpOp::Ne => neq(&l, &r)?,
        CmpOp::Lt => lt(&l, &r)?,
        CmpOp::Le => lt_eq(&l, &r)?,
        CmpOp::Gt => gt(&l, &r)?,
        CmpOp::Ge => gt_eq(&l, &r)?,
    };
    Ok(Arc::new(out))
}

fn as_boolean(array: &ArrayRef, what: &str) -> Result<BooleanArray> {
    array
        .as_any()
        .downcast_ref::<BooleanArray>()
        .cloned()
        .ok_or_else(|| {
            EngineError::internal(format!(
                "{} operand must be boolean, got {:?}",
                what,
                array.data_type()
            ))
        })
}

// Kleene kernels implement SQL three-valued logic:
// FALSE AND NULL = FALSE, TRUE OR NULL = TRUE.
pub fn eval_and(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
    len: usize,
) -> Result<ArrayRef> {
    let l = arena.eval_rows(left, chunk, len)?;
    let r = arena.eval_rows(right, chunk, len)?;
    let out = and_kleene(&as_boolean(&l, "AND")?, &as_boolean(&r, "AND")?)?;
    Ok(Arc::new(out))
}

pub fn eval_or(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
    len: usize,
) -> Result<ArrayRef> {
    let l = arena.eval_rows(left, chunk, len)?;
    let r = arena.eval_rows(right, chunk, len)?;
    let out = or_kleene(&as_boolean(&l, "OR")?, &as_boolean(&r, "OR")?)?;
    Ok(Arc::new(out))
}

pub fn eval_not(arena: &ExprArena, child: ExprId, chunk: &Chunk, len: usize) -> Result<ArrayRef> {
    let c = arena.eval_rows(child, chunk, len)?;
    let out = not(&as_boolean(&c, "NOT")?)?;
    Ok(Arc::new(out))
}

pub fn eval_is_null(
    arena: &ExprArena,
    child: ExprId,
    chunk: &Chunk,
    len: usize,
) -> Result<ArrayRef> {
    let c = arena.eval_rows(child, chunk, len)?;
    Ok(Arc::new(is_null(c.as_ref())?))
}

pub fn eval_is_not_null(
    arena: &ExprArena,
    child: ExprId,
    chunk: &Chunk,
    len: usize,
) -> Result<ArrayRef> {
    let c = arena.eval_rows(child, chunk, len)?;
    Ok(Arc::new(is_not_null(c.as_ref())?))
}
