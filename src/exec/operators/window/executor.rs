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
//! Per-window-expression execution over one sorted hash group.
//!
//! Lifecycle: construct once the group size is known, `sink` every batch of
//! the first pass, `finalize`, then `evaluate` batch by batch in the second
//! pass. Ranking state persists across evaluate calls and resets at
//! partition starts.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, UInt32Builder, new_null_array,
};
use arrow::compute::kernels::zip::zip;
use arrow::compute::{cast, take};
use arrow::datatypes::DataType;

use crate::common::config::{self, WindowAggregationMode};
use crate::common::error::{EngineError, Result};
use crate::exec::chunk::Chunk;
use crate::exec::expr::{ExprArena, ExprId};
use crate::exec::expr::agg::AggKernel;
use crate::exec::node::analytic::{
    AnalyticNode, FrameBoundary, FrameKind, WindowExpr, WindowFunctionKind,
};

use super::boundary_mask::BoundaryMask;
use super::bounds::{BoundsBuffer, RangeSense, WindowBoundsState};
use super::input_column::{WindowInputColumn, WindowInputExpr};
use super::segment_tree::{
    WindowAggregator, WindowConstantAggregate, WindowCustomAggregate, WindowSegmentTree,
};

pub(crate) struct WindowExecutor {
    kind: WindowFunctionKind,
    arena: Arc<ExprArena>,
    result_type: DataType,

    state: WindowBoundsState,
    bounds: BoundsBuffer,
    dense_rank: u64,
    rank_equal: u64,
    rank: u64,

    /// Materialized payload columns for positional functions (navigation,
    /// NTILE, NTH_VALUE). Aggregate payloads go to the aggregator instead.
    payload_cols: Vec<WindowInputColumn>,
    aggregator: Option<Box<dyn WindowAggregator>>,
    /// Aggregate argument expression, evaluated fresh per sink batch.
    agg_arg: Option<ExprId>,

    filter_expr: Option<ExprId>,
    filter_sel: Vec<u32>,

    leadlag_offset: WindowInputExpr,
    leadlag_default: Option<ExprId>,

    boundary_start: WindowInputExpr,
    boundary_end: WindowInputExpr,

    /// Ordering column cache for RANGE frames.
    range: WindowInputColumn,

    ignore_nulls: BoundaryMask,
    check_nulls: bool,
}

fn is_unbounded_frame(wexpr: &WindowExpr, order_count: usize) -> bool {
    let start_ok = match wexpr.frame.start {
        FrameBoundary::UnboundedPreceding => true,
        FrameBoundary::CurrentRowRange => order_count == 0,
        _ => false,
    };
    let end_ok = match wexpr.frame.end {
        FrameBoundary::UnboundedFollowing => true,
        FrameBoundary::CurrentRowRange => order_count == 0,
        _ => false,
    };
    start_ok && end_ok
}

impl WindowExecutor {
    pub(crate) fn new(
        wexpr: &WindowExpr,
        node: &AnalyticNode,
        arena: Arc<ExprArena>,
        partition_mask: &BoundaryMask,
        count: usize,
    ) -> Result<Self> {
        if matches!(wexpr.frame.kind, FrameKind::Groups) {
            return Err(EngineError::invalid_input(
                "GROUPS window frames are not implemented",
            ));
        }

        let partition_count = node.partition_exprs.len();
        let order_count = node.order_by.len();
        let range_sense = node.order_by.first().map(|o| {
            if o.asc {
                RangeSense::Ascending
            } else {
                RangeSense::Descending
            }
        });

        let state = WindowBoundsState::new(wexpr, partition_count, order_count, range_sense, count);

        let arg_type = |idx: usize| -> Result<DataType> {
            let expr = wexpr.args.get(idx).copied().ok_or_else(|| {
                EngineError::internal(format!("{} missing argument {}", wexpr.kind.name(), idx))
            })?;
            arena
                .data_type(expr)
                .cloned()
                .ok_or_else(|| EngineError::internal("window argument has no type"))
        };

        let mode = config::window_aggregation_mode();
        let mut aggregator: Option<Box<dyn WindowAggregator>> = None;
        let mut payload_cols = Vec::new();
        let result_type;

        match &wexpr.kind {
            WindowFunctionKind::Aggregate(func) => {
                let input_type = if wexpr.args.is_empty() {
                    None
                } else {
                    Some(arg_type(0)?)
                };
                let kernel = AggKernel::resolve(*func, input_type.as_ref())?;
                result_type = kernel.output_type().clone();

                let is_constant = !wexpr.args.is_empty() && is_unbounded_frame(wexpr, order_count);
                let is_custom = kernel.has_window_frame()
                    && mode == WindowAggregationMode::Window
                    && wexpr.filter.is_none();
                aggregator = Some(if is_constant {
                    Box::new(WindowConstantAggregate::new(kernel, partition_mask, count))
                } else if is_custom {
                    Box::new(WindowCustomAggregate::new(kernel, count))
                } else {
                    Box::new(WindowSegmentTree::new(
                        kernel,
                        wexpr.filter.is_some(),
                        count,
                        mode != WindowAggregationMode::Separate,
                    ))
                });
            }
            WindowFunctionKind::RowNumber
            | WindowFunctionKind::Rank
            | WindowFunctionKind::DenseRank => {
                result_type = DataType::Int64;
            }
            WindowFunctionKind::PercentRank | WindowFunctionKind::CumeDist => {
                result_type = DataType::Float64;
            }
            WindowFunctionKind::Ntile => {
                result_type = DataType::Int64;
                payload_cols.push(WindowInputColumn::new(
                    wexpr.args.first().copied(),
                    Arc::clone(&arena),
                    count,
                ));
            }
            WindowFunctionKind::Lead { .. }
            | WindowFunctionKind::Lag { .. }
            | WindowFunctionKind::FirstValue { .. }
            | WindowFunctionKind::LastValue { .. } => {
                result_type = arg_type(0)?;
                payload_cols.push(WindowInputColumn::new(
                    wexpr.args.first().copied(),
                    Arc::clone(&arena),
                    count,
                ));
            }
            WindowFunctionKind::NthValue { .. } => {
                result_type = arg_type(0)?;
                payload_cols.push(WindowInputColumn::new(
                    wexpr.args.first().copied(),
                    Arc::clone(&arena),
                    count,
                ));
                payload_cols.push(WindowInputColumn::new(
                    wexpr.args.get(1).copied(),
                    Arc::clone(&arena),
                    count,
                ));
            }
        }

        let range_expr = state
            .uses_range_column()
            .then(|| node.order_by.first().map(|o| o.expr))
            .flatten();

        let agg_arg = match &wexpr.kind {
            WindowFunctionKind::Aggregate(_) => wexpr.args.first().copied(),
            _ => None,
        };

        Ok(Self {
            kind: wexpr.kind.clone(),
            result_type,
            bounds: BoundsBuffer::with_capacity(config::vector_size()),
            dense_rank: 1,
            rank_equal: 0,
            rank: 1,
            payload_cols,
            aggregator,
            agg_arg,
            filter_expr: wexpr.filter,
            filter_sel: Vec::new(),
            leadlag_offset: WindowInputExpr::new(wexpr.offset, Arc::clone(&arena)),
            leadlag_default: wexpr.default,
            boundary_start: WindowInputExpr::new(wexpr.frame.start.offset_expr(), Arc::clone(&arena)),
            boundary_end: WindowInputExpr::new(wexpr.frame.end.offset_expr(), Arc::clone(&arena)),
            range: WindowInputColumn::new(range_expr, Arc::clone(&arena), count),
            ignore_nulls: BoundaryMask::new_all_set(count),
            check_nulls: wexpr.kind.ignore_nulls(),
            state,
            arena,
        })
    }

    pub(crate) fn result_type(&self) -> &DataType {
        &self.result_type
    }

    /// First pass: fold one batch of the sorted group, rows
    /// `[input_idx, input_idx + batch len)`.
    pub(crate) fn sink(&mut self, chunk: &Chunk, input_idx: usize) -> Result<()> {
        let count = chunk.len();

        let filtering = if let Some(filter) = self.filter_expr {
            let predicate = self.arena.eval(filter, chunk)?;
            let predicate = predicate
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| EngineError::internal("FILTER clause is not boolean"))?;
            self.filter_sel.clear();
            for i in 0..count {
                if predicate.is_valid(i) && predicate.value(i) {
                    self.filter_sel.push(i as u32);
                }
            }
            true
        } else {
            false
        };

        let mut first_payload: Option<ArrayRef> = None;
        if self.aggregator.is_some() {
            let payload = match self.agg_arg {
                Some(expr) => Some(self.arena.eval(expr, chunk)?),
                None => None,
            };
            let aggregator = self.aggregator.as_mut().expect("aggregator checked above");
            aggregator.sink(
                payload.as_ref(),
                count,
                input_idx,
                filtering.then_some(self.filter_sel.as_slice()),
            )?;
        } else {
            for col in self.payload_cols.iter_mut() {
                let appended = col.append(chunk)?;
                if first_payload.is_none() {
                    first_payload = appended;
                }
            }
        }

        // IGNORE NULLS: lazily overlay the payload validity into a
        // group-wide mask; batches without NULLs leave it untouched.
        if self.check_nulls {
            if let Some(payload) = first_payload.as_ref() {
                if let Some(nulls) = payload.logical_nulls() {
                    if nulls.null_count() > 0 {
                        self.ignore_nulls.copy_from_validity(input_idx, &nulls, count);
                    }
                }
            }
        }

        let _ = self.range.append(chunk)?;
        Ok(())
    }

    pub(crate) fn finalize(&mut self) -> Result<()> {
        for col in self.payload_cols.iter_mut() {
            col.finish()?;
        }
        self.range.finish()?;
        if let Some(aggregator) = self.aggregator.as_mut() {
            aggregator.finish()?;
        }
        Ok(())
    }

    /// Second pass: produce the window column for one output batch starting
    /// at group-absolute `row_idx`.
    pub(crate) fn evaluate(
        &mut self,
        row_idx: usize,
        chunk: &Chunk,
        partition_mask: &BoundaryMask,
        order_mask: &BoundaryMask,
    ) -> Result<ArrayRef> {
        self.boundary_start.execute(chunk)?;
        self.boundary_end.execute(chunk)?;
        self.leadlag_offset.execute(chunk)?;

        let count = chunk.len();
        let range = self.range.is_present().then_some(&self.range);
        self.state.bounds(
            &mut self.bounds,
            row_idx,
            range,
            count,
            &self.boundary_start,
            &self.boundary_end,
            partition_mask,
            order_mask,
        )?;

        match &self.kind {
            WindowFunctionKind::Aggregate(_) => {
                let aggregator = self
                    .aggregator
                    .as_mut()
                    .ok_or_else(|| EngineError::internal("aggregate executor without aggregator"))?;
                aggregator.evaluate(&self.bounds, count)
            }
            WindowFunctionKind::RowNumber => self.row_number(row_idx, count),
            WindowFunctionKind::Rank => self.rank_values(row_idx, count, false),
            WindowFunctionKind::DenseRank => self.rank_values(row_idx, count, true),
            WindowFunctionKind::PercentRank => self.percent_rank(row_idx, count),
            WindowFunctionKind::CumeDist => self.cume_dist(row_idx, count),
            WindowFunctionKind::Ntile => self.ntile(row_idx, count),
            WindowFunctionKind::Lead { .. } => self.lead_lag(row_idx, count, chunk, false),
            WindowFunctionKind::Lag { .. } => self.lead_lag(row_idx, count, chunk, true),
            WindowFunctionKind::FirstValue { .. } => self.first_last(count, true),
            WindowFunctionKind::LastValue { .. } => self.first_last(count, false),
            WindowFunctionKind::NthValue { .. } => self.nth_value(row_idx, count),
        }
    }

    fn next_rank(&mut self, partition_begin: usize, peer_begin: usize, row_idx: usize) {
        if partition_begin == row_idx {
            self.dense_rank = 1;
            self.rank = 1;
            self.rank_equal = 0;
        } else if peer_begin == row_idx {
            self.dense_rank += 1;
            self.rank += self.rank_equal;
            self.rank_equal = 0;
        }
        self.rank_equal += 1;
    }

    fn row_number(&self, row_idx: usize, count: usize) -> Result<ArrayRef> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push((row_idx + i - self.bounds.partition_begin[i]) as i64 + 1);
        }
        Ok(Arc::new(Int64Array::from(out)))
    }

    fn rank_values(&mut self, row_idx: usize, count: usize, dense: bool) -> Result<ArrayRef> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            self.next_rank(
                self.bounds.partition_begin[i],
                self.bounds.peer_begin[i],
                row_idx + i,
            );
            out.push(if dense {
                self.dense_rank as i64
            } else {
                self.rank as i64
            });
        }
        Ok(Arc::new(Int64Array::from(out)))
    }

    fn percent_rank(&mut self, row_idx: usize, count: usize) -> Result<ArrayRef> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            self.next_rank(
                self.bounds.partition_begin[i],
                self.bounds.peer_begin[i],
                row_idx + i,
            );
            let denom =
                self.bounds.partition_end[i] as i64 - self.bounds.partition_begin[i] as i64 - 1;
            let value = if denom > 0 {
                (self.rank as f64 - 1.0) / denom as f64
            } else {
                0.0
            };
            out.push(value);
        }
        Ok(Arc::new(Float64Array::from(out)))
    }

    fn cume_dist(&mut self, row_idx: usize, count: usize) -> Result<ArrayRef> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            self.next_rank(
                self.bounds.partition_begin[i],
                self.bounds.peer_begin[i],
                row_idx + i,
            );
            let denom =
                self.bounds.partition_end[i] as i64 - self.bounds.partition_begin[i] as i64;
            let value = if denom > 0 {
                (self.bounds.peer_end[i] - self.bounds.partition_begin[i]) as f64 / denom as f64
            } else {
                0.0
            };
            out.push(value);
        }
        Ok(Arc::new(Float64Array::from(out)))
    }

    fn ntile(&self, row_idx: usize, count: usize) -> Result<ArrayRef> {
        let buckets_col = self
            .payload_cols
            .first()
            .ok_or_else(|| EngineError::internal("ntile bucket argument missing"))?;
        let mut out: Vec<Option<i64>> = Vec::with_capacity(count);
        for i in 0..count {
            let row = row_idx + i;
            if buckets_col.is_null(row)? {
                out.push(None);
                continue;
            }
            let mut n_param = buckets_col.value_i64(row)?;
            if n_param < 1 {
                return Err(EngineError::invalid_input(
                    "Argument for ntile must be greater than zero",
                ));
            }
            let n_total =
                self.bounds.partition_end[i] as i64 - self.bounds.partition_begin[i] as i64;
            if n_param > n_total {
                // More buckets than rows: every row its own bucket.
                n_param = n_total;
            }
            let n_size = n_total / n_param;
            let adjusted_row_idx = row as i64 - self.bounds.partition_begin[i] as i64;
            let n_large = n_total - n_param * n_size;
            let i_small = n_large * (n_size + 1);
            debug_assert_eq!(n_large * (n_size + 1) + (n_param - n_large) * n_size, n_total);

            let result = if adjusted_row_idx < i_small {
                1 + adjusted_row_idx / (n_size + 1)
            } else {
                1 + n_large + (adjusted_row_idx - i_small) / n_size
            };
            debug_assert!(result >= 1 && result <= n_param);
            out.push(Some(result));
        }
        Ok(Arc::new(Int64Array::from(out)))
    }

    fn payload_take(
        &self,
        indices: UInt32Builder,
        use_default: Option<(BooleanArray, &ArrayRef)>,
    ) -> Result<ArrayRef> {
        let col = self
            .payload_cols
            .first()
            .ok_or_else(|| EngineError::internal("navigation payload missing"))?;
        let array = col.array()?;
        let mut indices = indices;
        let indices = indices.finish();
        let taken = take(array.as_ref(), &indices, None)?;
        if let Some((mask, default)) = use_default {
            return Ok(zip(&mask, default, &taken)?);
        }
        Ok(taken)
    }

    fn lead_lag(
        &mut self,
        row_idx: usize,
        count: usize,
        chunk: &Chunk,
        is_lag: bool,
    ) -> Result<ArrayRef> {
        let payload_type = self
            .payload_cols
            .first()
            .ok_or_else(|| EngineError::internal("lead/lag payload missing"))?
            .data_type()?
            .clone();
        let default_array = match self.leadlag_default {
            Some(expr) => {
                let array = self.arena.eval(expr, chunk)?;
                let array = if array.data_type() == &payload_type {
                    array
                } else if matches!(array.data_type(), DataType::Null) {
                    new_null_array(&payload_type, array.len())
                } else {
                    cast(&array, &payload_type)?
                };
                Some(array)
            }
            None => None,
        };

        let payload_col = self.payload_cols.first().expect("payload checked above");
        let mut indices = UInt32Builder::with_capacity(count);
        let mut use_default = Vec::with_capacity(count);

        for i in 0..count {
            let row = row_idx + i;
            let offset = if self.leadlag_offset.is_present() {
                if self.leadlag_offset.is_null(i)? {
                    indices.append_null();
                    use_default.push(false);
                    continue;
                }
                self.leadlag_offset.value_i64(i)?
            } else {
                1
            };

            let mut val_idx = row as i64;
            if is_lag {
                val_idx -= offset;
            } else {
                val_idx += offset;
            }

            let mut delta = 0usize;
            let target = if val_idx < row as i64 {
                delta = (row as i64 - val_idx) as usize;
                self.ignore_nulls
                    .find_prev_start(self.bounds.partition_begin[i], row, &mut delta)
            } else if val_idx > row as i64 {
                delta = (val_idx - row as i64) as usize;
                self.ignore_nulls
                    .find_next_start(row + 1, self.bounds.partition_end[i], &mut delta)
            } else {
                row
            };

            if delta == 0 {
                indices.append_value(payload_col.resolve_row(target) as u32);
                use_default.push(false);
            } else {
                indices.append_null();
                use_default.push(default_array.is_some());
            }
        }

        match default_array.as_ref() {
            Some(default) => {
                let mask = BooleanArray::from(use_default);
                self.payload_take(indices, Some((mask, default)))
            }
            None => self.payload_take(indices, None),
        }
    }

    fn first_last(&self, count: usize, is_first: bool) -> Result<ArrayRef> {
        let payload_col = self
            .payload_cols
            .first()
            .ok_or_else(|| EngineError::internal("first/last payload missing"))?;
        let mut indices = UInt32Builder::with_capacity(count);
        for i in 0..count {
            let begin = self.bounds.window_begin[i];
            let end = self.bounds.window_end[i];
            if begin >= end {
                indices.append_null();
                continue;
            }
            let mut n = 1usize;
            let idx = if is_first {
                self.ignore_nulls.find_next_start(begin, end, &mut n)
            } else {
                self.ignore_nulls.find_prev_start(begin, end, &mut n)
            };
            if n == 0 {
                indices.append_value(payload_col.resolve_row(idx) as u32);
            } else {
                indices.append_null();
            }
        }
        self.payload_take(indices, None)
    }

    fn nth_value(&self, row_idx: usize, count: usize) -> Result<ArrayRef> {
        let n_col = self
            .payload_cols
            .get(1)
            .ok_or_else(|| EngineError::internal("nth_value index argument missing"))?;
        let payload_col = self.payload_cols.first().expect("payload checked above");
        let mut indices = UInt32Builder::with_capacity(count);
        for i in 0..count {
            let begin = self.bounds.window_begin[i];
            let end = self.bounds.window_end[i];
            if begin >= end {
                indices.append_null();
                continue;
            }
            let row = row_idx + i;
            if n_col.is_null(row)? {
                indices.append_null();
                continue;
            }
            let n_param = n_col.value_i64(row)?;
            if n_param < 1 {
                indices.append_null();
                continue;
            }
            let mut n = n_param as usize;
            let idx = self.ignore_nulls.find_next_start(begin, end, &mut n);
            if n == 0 {
                indices.append_value(payload_col.resolve_row(idx) as u32);
            } else {
                indices.append_null();
            }
        }
        self.payload_take(indices, None)
    }
}
