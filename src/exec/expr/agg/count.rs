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

use arrow::array::{Array, ArrayRef, Int64Array};

use crate::common::error::Result;

use super::{AggStatePtr, require_values, state_mut, state_ref};

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct CountState {
    pub(super) count: i64,
}

pub(super) fn init(state: AggStatePtr) {
    *unsafe { state_mut::<CountState>(state) } = CountState::default();
}

pub(super) fn update_all_range(state: AggStatePtr, begin: usize, end: usize) -> Result<()> {
    let s = unsafe { state_mut::<CountState>(state) };
    s.count += (end - begin) as i64;
    Ok(())
}

pub(super) fn update_all_rows(state: AggStatePtr, rows: &[usize]) -> Result<()> {
    let s = unsafe { state_mut::<CountState>(state) };
    s.count += rows.len() as i64;
    Ok(())
}

pub(super) fn update_non_null_range(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    begin: usize,
    end: usize,
) -> Result<()> {
    let values = require_values(values, "count")?;
    let s = unsafe { state_mut::<CountState>(state) };
    for i in begin..end {
        if !values.is_null(i) {
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn update_non_null_rows(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    rows: &[usize],
) -> Result<()> {
    let values = require_values(values, "count")?;
    let s = unsafe { state_mut::<CountState>(state) };
    for &i in rows {
        if !values.is_null(i) {
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn combine(dst: AggStatePtr, src: AggStatePtr) {
    let src_count = unsafe { state_ref::<CountState>(src) }.count;
    let d = unsafe { state_mut::<CountState>(dst) };
    d.count += src_count;
}

pub(super) fn finalize(states: &[AggStatePtr]) -> Result<ArrayRef> {
    let mut out = Vec::with_capacity(states.len());
    for &state in states {
        out.push(unsafe { state_ref::<CountState>(state) }.count);
    }
    Ok(Arc::new(Int64Array::from(out)))
}

pub(super) fn window_all(state: AggStatePtr, begin: usize, end: usize) -> Result<()> {
    update_all_range(state, begin, end)
}

pub(super) fn window_non_null(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    begin: usize,
    end: usize,
) -> Result<()> {
    let values = require_values(values, "count")?;
    let len = end - begin;
    // The sliced validity buffer knows its null count; no per-row scan.
    let nulls = values.slice(begin, len).logical_null_count();
    let s = unsafe { state_mut::<CountState>(state) };
    s.count += (len - nulls) as i64;
    Ok(())
}
