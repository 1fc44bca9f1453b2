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

use arrow::array::{ArrayRef, Float64Array};

use crate::common::error::Result;

use super::{AggStatePtr, FloatView, require_values, state_mut, state_ref};

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct AvgState {
    pub(super) sum: f64,
    pub(super) count: i64,
}

pub(super) fn init(state: AggStatePtr) {
    *unsafe { state_mut::<AvgState>(state) } = AvgState::default();
}

pub(super) fn update_range(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    begin: usize,
    end: usize,
) -> Result<()> {
    let view = FloatView::new(require_values(values, "avg")?)?;
    let s = unsafe { state_mut::<AvgState>(state) };
    for i in begin..end {
        if !view.is_null(i) {
            s.sum += view.value(i);
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn update_rows(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    rows: &[usize],
) -> Result<()> {
    let view = FloatView::new(require_values(values, "avg")?)?;
    let s = unsafe { state_mut::<AvgState>(state) };
    for &i in rows {
        if !view.is_null(i) {
            s.sum += view.value(i);
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn combine(dst: AggStatePtr, src: AggStatePtr) {
    let src_state = *unsafe { state_ref::<AvgState>(src) };
    let d = unsafe { state_mut::<AvgState>(dst) };
    d.sum += src_state.sum;
    d.count += src_state.count;
}

pub(super) fn finalize(states: &[AggStatePtr]) -> Result<ArrayRef> {
    let mut out: Vec<Option<f64>> = Vec::with_capacity(states.len());
    for &state in states {
        let s = unsafe { state_ref::<AvgState>(state) };
        out.push((s.count > 0).then(|| s.sum / s.count as f64));
    }
    Ok(Arc::new(Float64Array::from(out)))
}
