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

use arrow::array::{ArrayRef, Decimal128Array, Float64Array, Int64Array};
use arrow::datatypes::DataType;

use crate::common::error::{EngineError, Result};

use super::{AggStatePtr, DecimalView, FloatView, IntView, require_values, state_mut, state_ref};

/// Integer sums accumulate in i128 so intermediate overflow cannot occur;
/// the result is range-checked once at finalize. Decimal128 shares the
/// layout.
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct SumIntState {
    pub(super) sum: i128,
    pub(super) count: i64,
}

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct SumFloatState {
    pub(super) sum: f64,
    pub(super) count: i64,
}

pub(super) fn init_int(state: AggStatePtr) {
    *unsafe { state_mut::<SumIntState>(state) } = SumIntState::default();
}

pub(super) fn init_float(state: AggStatePtr) {
    *unsafe { state_mut::<SumFloatState>(state) } = SumFloatState::default();
}

pub(super) fn update_int_range(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    begin: usize,
    end: usize,
) -> Result<()> {
    let view = IntView::new(require_values(values, "sum")?)?;
    let s = unsafe { state_mut::<SumIntState>(state) };
    for i in begin..end {
        if !view.is_null(i) {
            s.sum += view.value(i) as i128;
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn update_int_rows(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    rows: &[usize],
) -> Result<()> {
    let view = IntView::new(require_values(values, "sum")?)?;
    let s = unsafe { state_mut::<SumIntState>(state) };
    for &i in rows {
        if !view.is_null(i) {
            s.sum += view.value(i) as i128;
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn update_float_range(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    begin: usize,
    end: usize,
) -> Result<()> {
    let view = FloatView::new(require_values(values, "sum")?)?;
    let s = unsafe { state_mut::<SumFloatState>(state) };
    for i in begin..end {
        if !view.is_null(i) {
            s.sum += view.value(i);
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn update_float_rows(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    rows: &[usize],
) -> Result<()> {
    let view = FloatView::new(require_values(values, "sum")?)?;
    let s = unsafe { state_mut::<SumFloatState>(state) };
    for &i in rows {
        if !view.is_null(i) {
            s.sum += view.value(i);
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn update_decimal_range(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    begin: usize,
    end: usize,
) -> Result<()> {
    let view = DecimalView::new(require_values(values, "sum")?)?;
    let s = unsafe { state_mut::<SumIntState>(state) };
    for i in begin..end {
        if !view.is_null(i) {
            s.sum += view.value(i);
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn update_decimal_rows(
    state: AggStatePtr,
    values: Option<&ArrayRef>,
    rows: &[usize],
) -> Result<()> {
    let view = DecimalView::new(require_values(values, "sum")?)?;
    let s = unsafe { state_mut::<SumIntState>(state) };
    for &i in rows {
        if !view.is_null(i) {
            s.sum += view.value(i);
            s.count += 1;
        }
    }
    Ok(())
}

pub(super) fn combine_int(dst: AggStatePtr, src: AggStatePtr) {
    let src_state = *unsafe { state_ref::<SumIntState>(src) };
    let d = unsafe { state_mut::<SumIntState>(dst) };
    d.sum += src_state.sum;
    d.count += src_state.count;
}

pub(super) fn combine_float(dst: AggStatePtr, src: AggStatePtr) {
    let src_state = *unsafe { state_ref::<SumFloatState>(src) };
    let d = unsafe { state_mut::<SumFloatState>(dst) };
    d.sum += src_state.sum;
    d.count += src_state.count;
}

pub(super) fn finalize_int(states: &[AggStatePtr]) -> Result<ArrayRef> {
    let mut out: Vec<Option<i64>> = Vec::with_capacity(states.len());
    for &state in states {
        let s = unsafe { state_ref::<SumIntState>(state) };
        if s.count == 0 {
            out.push(None);
        } else {
            let v = i64::try_from(s.sum)
                .map_err(|_| EngineError::out_of_range("Overflow in SUM aggregate"))?;
            out.push(Some(v));
        }
    }
    Ok(Arc::new(Int64Array::from(out)))
}

pub(super) fn finalize_float(states: &[AggStatePtr]) -> Result<ArrayRef> {
    let mut out: Vec<Option<f64>> = Vec::with_capacity(states.len());
    for &state in states {
        let s = unsafe { state_ref::<SumFloatState>(state) };
        out.push((s.count > 0).then_some(s.sum));
    }
    Ok(Arc::new(Float64Array::from(out)))
}

pub(super) fn finalize_decimal(states: &[AggStatePtr], output_type: &DataType) -> Result<ArrayRef> {
    let DataType::Decimal128(precision, scale) = output_type else {
        return Err(EngineError::internal(format!(
            "decimal sum output type is not Decimal128: {:?}",
            output_type
        )));
    };
    let mut out: Vec<Option<i128>> = Vec::with_capacity(states.len());
    for &state in states {
        let s = unsafe { state_ref::<SumIntState>(state) };
        out.push((s.count > 0).then_some(s.sum));
    }
    let array = Decimal128Array::from(out).with_precision_and_scale(*precision, *scale)?;
    Ok(Arc::new(array))
}
