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
use arrow::array::ArrayRef;
use arrow::compute::kernels::numeric::{add, mul, sub};

use crate::common::error::Result;
use crate::exec::chunk::Chunk;
use crate::exec::expr::{ExprArena, ExprId, unify_numeric_types};

pub fn eval_add(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
    len: usize,
) -> Result<ArrayRef> {
    let l = arena.eval_rows(left, chunk, len)?;
    let r = arena.eval_rows(right, chunk, len)?;
    let (l, r) = unify_numeric_types(l, r)?;
    Ok(add(&l, &r)?)
}

pub fn eval_sub(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
    len: usize,
) -> Result<ArrayRef> {
    let l = arena.eval_rows(left, chunk, len)?;
    let r = arena.eval_rows(right, chunk, len)?;
    let (l, r) = unify_numeric_types(l, r)?;
    Ok(sub(&l, &r)?)
}

pub fn eval_mul(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
    len: usize,
) -> Result<ArrayRef> {
    let l = arena.eval_rows(left, chunk, len)?;
    let r = arena.eval_rows(right, chunk, len)?;
    let (l, r) = unify_numeric_types(l, r)?;
    Ok(mul(&l, &r)?)
}
