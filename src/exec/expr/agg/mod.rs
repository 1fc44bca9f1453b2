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
//! Aggregate function objects consumed by the window operator.
//!
//! An aggregate is a capability set, not a type hierarchy: a tagged
//! [`AggKind`] dispatches `init / update / combine / finalize` over POD
//! states allocated from an [`AggStateArena`] and addressed by raw pointer.
//! Kernels that can compute a whole frame in better than per-row time also
//! expose the optional `window_frame` capability.

mod arena;
mod avg;
mod count;
mod min_max;
mod sum;
mod views;

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;

use crate::common::error::{EngineError, Result};

pub use arena::AggStateArena;
pub(crate) use views::{DecimalView, FloatView, IntView};

/// Raw pointer to a kernel state inside an [`AggStateArena`] block.
pub type AggStatePtr = usize;

/// Planner-facing aggregate function names supported over window frames.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AggFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Resolved kernel tag: function specialized on the input type class.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AggKind {
    CountAll,
    CountNonNull,
    SumInt,
    SumFloat,
    SumDecimal128,
    AvgNumeric,
    MinInt,
    MaxInt,
    MinFloat,
    MaxFloat,
}

#[derive(Clone, Debug)]
pub struct AggSpec {
    pub kind: AggKind,
    pub output_type: DataType,
}

/// One resolved aggregate kernel: the tag plus its state layout.
#[derive(Clone, Debug)]
pub struct AggKernel {
    spec: AggSpec,
    state_size: usize,
    state_align: usize,
}

pub(crate) unsafe fn state_mut<'a, T>(ptr: AggStatePtr) -> &'a mut T {
    unsafe { &mut *(ptr as *mut T) }
}

pub(crate) unsafe fn state_ref<'a, T>(ptr: AggStatePtr) -> &'a T {
    unsafe { &*(ptr as *const T) }
}

fn is_int_class(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Date32
            | DataType::Timestamp(_, _)
    )
}

fn is_float_class(dt: &DataType) -> bool {
    matches!(dt, DataType::Float32 | DataType::Float64)
}

impl AggKernel {
    /// Resolve a kernel from the function name and the payload type. `None`
    /// input means the zero-argument form (`COUNT(*)`).
    pub fn resolve(func: AggFunction, input_type: Option<&DataType>) -> Result<AggKernel> {
        let spec = match (func, input_type) {
            (AggFunction::Count, None) => AggSpec {
                kind: AggKind::CountAll,
                output_type: DataType::Int64,
            },
            (AggFunction::Count, Some(_)) => AggSpec {
                kind: AggKind::CountNonNull,
                output_type: DataType::Int64,
            },
            (AggFunction::Sum, Some(dt)) if is_int_class(dt) => AggSpec {
                kind: AggKind::SumInt,
                output_type: DataType::Int64,
            },
            (AggFunction::Sum, Some(dt)) if is_float_class(dt) => AggSpec {
                kind: AggKind::SumFloat,
                output_type: DataType::Float64,
            },
            (AggFunction::Sum, Some(DataType::Decimal128(_, scale))) => AggSpec {
                kind: AggKind::SumDecimal128,
                output_type: DataType::Decimal128(38, *scale),
            },
            (AggFunction::Avg, Some(dt)) if is_int_class(dt) || is_float_class(dt) => AggSpec {
                kind: AggKind::AvgNumeric,
                output_type: DataType::Float64,
            },
            (AggFunction::Min, Some(dt)) if is_int_class(dt) => AggSpec {
                kind: AggKind::MinInt,
                output_type: dt.clone(),
            },
            (AggFunction::Max, Some(dt)) if is_int_class(dt) => AggSpec {
                kind: AggKind::MaxInt,
                output_type: dt.clone(),
            },
            (AggFunction::Min, Some(dt)) if is_float_class(dt) => AggSpec {
                kind: AggKind::MinFloat,
                output_type: dt.clone(),
            },
            (AggFunction::Max, Some(dt)) if is_float_class(dt) => AggSpec {
                kind: AggKind::MaxFloat,
                output_type: dt.clone(),
            },
            (func, input) => {
                return Err(EngineError::internal(format!(
                    "no aggregate kernel for {:?} over {:?}",
                    func, input
                )));
            }
        };
        let (state_size, state_align) = state_layout_for_kind(&spec.kind);
        Ok(AggKernel {
            spec,
            state_size,
            state_align,
        })
    }

    pub fn kind(&self) -> AggKind {
        self.spec.kind
    }

    pub fn output_type(&self) -> &DataType {
        &self.spec.output_type
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn state_align(&self) -> usize {
        self.state_align
    }

    pub fn init_state(&self, state: AggStatePtr) {
        match self.spec.kind {
            AggKind::CountAll | AggKind::CountNonNull => count::init(state),
            AggKind::SumInt | AggKind::SumDecimal128 => sum::init_int(state),
            AggKind::SumFloat => sum::init_float(state),
            AggKind::AvgNumeric => avg::init(state),
            AggKind::MinInt | AggKind::MaxInt => min_max::init_int(state),
            AggKind::MinFloat | AggKind::MaxFloat => min_max::init_float(state),
        }
    }

    /// Fold rows `[begin, end)` of `values` into the state.
    pub fn update_range(
        &self,
        state: AggStatePtr,
        values: Option<&ArrayRef>,
        begin: usize,
        end: usize,
    ) -> Result<()> {
        match self.spec.kind {
            AggKind::CountAll => count::update_all_range(state, begin, end),
            AggKind::CountNonNull => count::update_non_null_range(state, values, begin, end),
            AggKind::SumInt => sum::update_int_range(state, values, begin, end),
            AggKind::SumFloat => sum::update_float_range(state, values, begin, end),
            AggKind::SumDecimal128 => sum::update_decimal_range(state, values, begin, end),
            AggKind::AvgNumeric => avg::update_range(state, values, begin, end),
            AggKind::MinInt => min_max::update_int_range(state, values, begin, end, true),
            AggKind::MaxInt => min_max::update_int_range(state, values, begin, end, false),
            AggKind::MinFloat => min_max::update_float_range(state, values, begin, end, true),
            AggKind::MaxFloat => min_max::update_float_range(state, values, begin, end, false),
        }
    }

    /// Fold an explicit row selection into the state (FILTER clause path).
    pub fn update_rows(
        &self,
        state: AggStatePtr,
        values: Option<&ArrayRef>,
        rows: &[usize],
    ) -> Result<()> {
        match self.spec.kind {
            AggKind::CountAll => count::update_all_rows(state, rows),
            AggKind::CountNonNull => count::update_non_null_rows(state, values, rows),
            AggKind::SumInt => sum::update_int_rows(state, values, rows),
            AggKind::SumFloat => sum::update_float_rows(state, values, rows),
            AggKind::SumDecimal128 => sum::update_decimal_rows(state, values, rows),
            AggKind::AvgNumeric => avg::update_rows(state, values, rows),
            AggKind::MinInt => min_max::update_int_rows(state, values, rows, true),
            AggKind::MaxInt => min_max::update_int_rows(state, values, rows, false),
            AggKind::MinFloat => min_max::update_float_rows(state, values, rows, true),
            AggKind::MaxFloat => min_max::update_float_rows(state, values, rows, false),
        }
    }

    /// Merge `src` into `dst`; `src` is left untouched.
    pub fn combine(&self, dst: AggStatePtr, src: AggStatePtr) {
        match self.spec.kind {
            AggKind::CountAll | AggKind::CountNonNull => count::combine(dst, src),
            AggKind::SumInt | AggKind::SumDecimal128 => sum::combine_int(dst, src),
            AggKind::SumFloat => sum::combine_float(dst, src),
            AggKind::AvgNumeric => avg::combine(dst, src),
            AggKind::MinInt => min_max::combine_int(dst, src, true),
            AggKind::MaxInt => min_max::combine_int(dst, src, false),
            AggKind::MinFloat => min_max::combine_float(dst, src, true),
            AggKind::MaxFloat => min_max::combine_float(dst, src, false),
        }
    }

    /// Materialize one output row per state, typed as `output_type`.
    pub fn finalize_into(&self, states: &[AggStatePtr]) -> Result<ArrayRef> {
        match self.spec.kind {
            AggKind::CountAll | AggKind::CountNonNull => count::finalize(states),
            AggKind::SumInt => sum::finalize_int(states),
            AggKind::SumFloat => sum::finalize_float(states),
            AggKind::SumDecimal128 => sum::finalize_decimal(states, &self.spec.output_type),
            AggKind::AvgNumeric => avg::finalize(states),
            AggKind::MinInt | AggKind::MaxInt => min_max::finalize_int(states, &self.spec.output_type),
            AggKind::MinFloat | AggKind::MaxFloat => {
                min_max::finalize_float(states, &self.spec.output_type)
            }
        }
    }

    /// Whether this kernel can fold a whole frame in O(1)-ish time.
    pub fn has_window_frame(&self) -> bool {
        matches!(self.spec.kind, AggKind::CountAll | AggKind::CountNonNull)
    }

    /// Fold the frame `[begin, end)` into the state without per-row work.
    pub fn window_frame(
        &self,
        state: AggStatePtr,
        values: Option<&ArrayRef>,
        begin: usize,
        end: usize,
    ) -> Result<()> {
        match self.spec.kind {
            AggKind::CountAll => count::window_all(state, begin, end),
            AggKind::CountNonNull => count::window_non_null(state, values, begin, end),
            other => Err(EngineError::internal(format!(
                "aggregate kernel {:?} has no window callback",
                other
            ))),
        }
    }
}

fn state_layout_for_kind(kind: &AggKind) -> (usize, usize) {
    match kind {
        AggKind::CountAll | AggKind::CountNonNull => (
            std::mem::size_of::<count::CountState>(),
            std::mem::align_of::<count::CountState>(),
        ),
        AggKind::SumInt | AggKind::SumDecimal128 => (
            std::mem::size_of::<sum::SumIntState>(),
            std::mem::align_of::<sum::SumIntState>(),
        ),
        AggKind::SumFloat => (
            std::mem::size_of::<sum::SumFloatState>(),
            std::mem::align_of::<sum::SumFloatState>(),
        ),
        AggKind::AvgNumeric => (
            std::mem::size_of::<avg::AvgState>(),
            std::mem::align_of::<avg::AvgState>(),
        ),
        AggKind::MinInt | AggKind::MaxInt => (
            std::mem::size_of::<min_max::MinMaxIntState>(),
            std::mem::align_of::<min_max::MinMaxIntState>(),
        ),
        AggKind::MinFloat | AggKind::MaxFloat => (
            std::mem::size_of::<min_max::MinMaxFloatState>(),
            std::mem::align_of::<min_max::MinMaxFloatState>(),
        ),
    }
}

pub(crate) fn require_values<'a>(values: Option<&'a ArrayRef>, what: &str) -> Result<&'a ArrayRef> {
    values.ok_or_else(|| EngineError::internal(format!("{} aggregate input missing", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int64Array};
    use std::sync::Arc;

    fn alloc_state(arena: &mut AggStateArena, kernel: &AggKernel) -> AggStatePtr {
        let ptr = arena.alloc(kernel.state_size(), kernel.state_align());
        kernel.init_state(ptr);
        ptr
    }

    #[test]
    fn sum_int_update_combine_finalize() {
        let input: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None, Some(3), Some(5)]));
        let kernel = AggKernel::resolve(AggFunction::Sum, Some(&DataType::Int64)).unwrap();
        let mut arena = AggStateArena::new(1024);
        let a = alloc_state(&mut arena, &kernel);
        let b = alloc_state(&mut arena, &kernel);
        kernel.update_range(a, Some(&input), 0, 2).unwrap();
        kernel.update_range(b, Some(&input), 2, 4).unwrap();
        kernel.combine(a, b);
        let out = kernel.finalize_into(&[a]).unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(out.value(0), 9);
    }

    #[test]
    fn sum_over_empty_or_all_null_frame_is_null() {
        let input: ArrayRef = Arc::new(Int64Array::from(vec![None::<i64>, None]));
        let kernel = AggKernel::resolve(AggFunction::Sum, Some(&DataType::Int64)).unwrap();
        let mut arena = AggStateArena::new(1024);
        let s = alloc_state(&mut arena, &kernel);
        kernel.update_range(s, Some(&input), 0, 2).unwrap();
        let out = kernel.finalize_into(&[s]).unwrap();
        assert!(out.is_null(0));
    }

    #[test]
    fn count_all_window_frame_counts_rows() {
        let kernel = AggKernel::resolve(AggFunction::Count, None).unwrap();
        assert!(kernel.has_window_frame());
        let mut arena = AggStateArena::new(64);
        let s = alloc_state(&mut arena, &kernel);
        kernel.window_frame(s, None, 3, 11).unwrap();
        let out = kernel.finalize_into(&[s]).unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(out.value(0), 8);
    }

    #[test]
    fn avg_ignores_nulls_and_divides_by_valid_count() {
        let input: ArrayRef = Arc::new(Float64Array::from(vec![Some(1.0), None, Some(4.0)]));
        let kernel = AggKernel::resolve(AggFunction::Avg, Some(&DataType::Float64)).unwrap();
        let mut arena = AggStateArena::new(64);
        let s = alloc_state(&mut arena, &kernel);
        kernel.update_range(s, Some(&input), 0, 3).unwrap();
        let out = kernel.finalize_into(&[s]).unwrap();
        let out = out.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(out.value(0), 2.5);
    }

    #[test]
    fn min_max_track_selected_rows_only() {
        let input: ArrayRef = Arc::new(Int64Array::from(vec![5, 1, 9, 3]));
        let min = AggKernel::resolve(AggFunction::Min, Some(&DataType::Int64)).unwrap();
        let max = AggKernel::resolve(AggFunction::Max, Some(&DataType::Int64)).unwrap();
        let mut arena = AggStateArena::new(128);
        let s_min = alloc_state(&mut arena, &min);
        let s_max = alloc_state(&mut arena, &max);
        min.update_rows(s_min, Some(&input), &[0, 2]).unwrap();
        max.update_rows(s_max, Some(&input), &[1, 3]).unwrap();
        let min_out = min.finalize_into(&[s_min]).unwrap();
        let max_out = max.finalize_into(&[s_max]).unwrap();
        let min_out = min_out.as_any().downcast_ref::<Int64Array>().unwrap();
        let max_out = max_out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(min_out.value(0), 5);
        assert_eq!(max_out.value(0), 3);
    }
}
