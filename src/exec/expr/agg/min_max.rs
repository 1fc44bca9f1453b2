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

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;

use crate::common::error::Result;

use super::{AggStatePtr, FloatView, IntView, require_values, state_mut, state_ref};

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct MinMaxIntState {
    pub(super) value: i64,
    pub(super) has_value: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct MinMaxFloatState {
    pub(super) value: f64,
    pub(super) has_value: bool,
}

pub(super) fn init_int(state: AggStatePtr) {
    *unsafe { state_mut::<MinMaxIntState>(state) } = MinMaxIntState::default();
}

pub(super) fn init_float(state: AggStatePtr) {
    *unsafe { state_mut::<MinMaxFloatState>(state) } = MinMaxFloatState::default();
}

fn keep_int(s: &mut MinMaxIntState, v: i64, is_min: bool) {
    if !s.has_value || (is_min && v < s.value) || (!is_min && v > s.value) {
        s.value = v;
        s.has_value = true;
    }
}

fn keep_float(s: &mut MinMaxFloatState, v: f64, is_min: bool) {
    if !s.has_value || (is_min && v < s.value) || (!is_min && v > s.value) {
        s.value = v;
        s.has_value = true;
    }
}

pub(super) fn update_int_range(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    begin: usize,
    end: usize,
    is_min: bool,
) -> Result<()> {
    let view = IntView::new(require_values(values, "min/max")?)?;
    let s = unsafe { state_mut::<MinMaxIntState>(state) };
    for i in begin..end {
        if !view.is_null(i) {
            keep_int(s, view.value(i), is_min);
        }
    }
    Ok(())
}

pub(super) fn update_int_rows(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    rows: &[usize],
    is_min: bool,
) -> Result<()> {
    let view = IntView::new(require_values(values, "min/max")?)?;
    let s = unsafe { state_mut::<MinMaxIntState>(state) };
    for &i in rows {
        if !view.is_null(i) {
            keep_int(s, view.value(i), is_min);
        }
    }
    Ok(())
}

pub(super) fn update_float_range(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    begin: usize,
    end: usize,
    is_min: bool,
) -> Result<()> {
    let view = FloatView::new(require_values(values, "min/max")?)?;
    let s = unsafe { state_mut::<MinMaxFloatState>(state) };
    for i in begin..end {
        if !view.is_null(i) {
            keep_float(s, view.value(i), is_min);
        }
    }
    Ok(())
}

pub(super) fn update_float_rows(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    rows: &[usize],
    is_min: bool,
) -> Result<()> {
    let view = FloatView::new(require_values(values, "min/max")?)?;
    let s = unsafe { state_mut::<MinMaxFloatState>(state) };
    for &i in rows {
        if !view.is_null(i) {
            keep_float(s, view.value(i), is_min);
        }
    }
    Ok(())
}

pub(super) fn combine_int(dst: AggStatePtr, src: AggStatePtr, is_min: bool) {
    let src_state = *unsafe { state_ref::<MinMaxIntState>(src) };
    if src_state.has_value {
        let d = unsafe { state_mut::<MinMaxIntState>(dst) };
        keep_int(d, src_state.value, is_min);
    }
}

pub(super) fn combine_float(dst: AggStatePtr, src: AggStatePtr, is_min: bool) {
    let src_state = *unsafe { state_ref::<MinMaxFloatState>(src) };
    if src_state.has_value {
        let d = unsafe { state_mut::<MinMaxFloatState>(dst) };
        keep_float(d, src_state.value, is_min);
    }
}

pub(super) fn finalize_int(states: &[AggStatePtr], output_type: &DataType) -> Result<ArrayRef> {
    let mut out: Vec<Option<i64>> = Vec::with_capacity(states.len());
    for &state in states {
        let s = unsafe { state_ref::<MinMaxIntState>(state) };
        out.push(s.has_value.then_some(s.value));
    }
    let array: ArrayRef = Arc::new(Int64Array::from(out));
    if array.data_type() == output_type {
        return Ok(array);
    }
    Ok(cast(&array, output_type)?)
}

pub(super) fn finalize_float(states: &[AggStatePtr], output_type: &DataType) -> Result<ArrayRef> {
    let mut out: Vec<Option<f64>> = Vec::with_capacity(states.len());
    for &state in states {
        let s = unsafe { state_ref::<MinMaxFloatState>(state) };
        out.push(s.has_value.then_some(s.value));
    }
    let array: ArrayRef = Arc::new(Float64Array::from(out));
    if array.data_type() == output_type {
        return Ok(array);
    }
    Ok(cast(&array, output_type)?)
}
