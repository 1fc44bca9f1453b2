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
//! Per-row frame boundary computation.
//!
//! For every input row this produces six indices: partition begin/end, peer
//! begin/end and window begin/end. The state is carried across rows of a
//! hash group so partition ends, RANGE NULL exclusions and binary-search
//! hints are only recomputed when the partition or peer group changes.

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;

use crate::common::error::{EngineError, Result};
use crate::exec::expr::agg::{DecimalView, FloatView, IntView};
use crate::exec::node::analytic::{FrameBoundary, WindowExpr, WindowFunctionKind};

use super::boundary_mask::BoundaryMask;
use super::input_column::{WindowInputColumn, WindowInputExpr};

/// Column-major buffer of the six per-row boundary indices for one batch.
#[derive(Debug, Default)]
pub(crate) struct BoundsBuffer {
    pub partition_begin: Vec<usize>,
    pub partition_end: Vec<usize>,
    pub peer_begin: Vec<usize>,
    pub peer_end: Vec<usize>,
    pub window_begin: Vec<usize>,
    pub window_end: Vec<usize>,
}

impl BoundsBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            partition_begin: Vec::with_capacity(capacity),
            partition_end: Vec::with_capacity(capacity),
            peer_begin: Vec::with_capacity(capacity),
            peer_end: Vec::with_capacity(capacity),
            window_begin: Vec::with_capacity(capacity),
            window_end: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.partition_begin.clear();
        self.partition_end.clear();
        self.peer_begin.clear();
        self.peer_end.clear();
        self.window_begin.clear();
        self.window_end.clear();
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum RangeSense {
    Ascending,
    Descending,
}

/// Ordering value widened to a comparable scalar.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub(crate) enum RangeValue {
    Int(i128),
    Float(f64),
}

impl RangeValue {
    /// "Comes strictly before" under the given sense.
    fn before(self, other: RangeValue, sense: RangeSense) -> bool {
        let ord = match (self, other) {
            (RangeValue::Int(a), RangeValue::Int(b)) => a < b,
            (RangeValue::Float(a), RangeValue::Float(b)) => a < b,
            _ => false,
        };
        match sense {
            RangeSense::Ascending => ord,
            RangeSense::Descending => match (self, other) {
                (RangeValue::Int(a), RangeValue::Int(b)) => a > b,
                (RangeValue::Float(a), RangeValue::Float(b)) => a > b,
                _ => false,
            },
        }
    }
}

/// Typed random-access view over the materialized ordering column.
pub(crate) enum RangeColumn<'a> {
    Int(IntView<'a>),
    Decimal(DecimalView<'a>),
    Float(FloatView<'a>),
}

impl<'a> RangeColumn<'a> {
    pub(crate) fn new(array: &'a ArrayRef) -> Result<Self> {
        match array.data_type() {
            DataType::Float32 | DataType::Float64 => Ok(RangeColumn::Float(FloatView::new(array)?)),
            DataType::Decimal128(_, _) => Ok(RangeColumn::Decimal(DecimalView::new(array)?)),
            DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Date32
            | DataType::Timestamp(_, _) => Ok(RangeColumn::Int(IntView::new(array)?)),
            other => Err(EngineError::internal(format!(
                "unsupported ordering column type for RANGE: {:?}",
                other
            ))),
        }
    }

    pub(crate) fn is_null(&self, i: usize) -> bool {
        match self {
            RangeColumn::Int(v) => v.is_null(i),
            RangeColumn::Decimal(v) => v.is_null(i),
            RangeColumn::Float(v) => v.is_null(i),
        }
    }

    pub(crate) fn value(&self, i: usize) -> RangeValue {
        match self {
            RangeColumn::Int(v) => RangeValue::Int(v.value(i) as i128),
            RangeColumn::Decimal(v) => RangeValue::Int(v.value(i)),
            RangeColumn::Float(v) => RangeValue::Float(v.value(i)),
        }
    }

    /// Read the boundary offset expression in this column's value class.
    fn boundary_value(&self, expr: &WindowInputExpr, chunk_idx: usize) -> Result<RangeValue> {
        let (array, row) = expr.raw(chunk_idx)?;
        match self {
            RangeColumn::Float(_) => {
                let view = FloatView::new(array)?;
                Ok(RangeValue::Float(view.value(row)))
            }
            RangeColumn::Decimal(_) => {
                if matches!(array.data_type(), DataType::Decimal128(_, _)) {
                    let view = DecimalView::new(array)?;
                    Ok(RangeValue::Int(view.value(row)))
                } else {
                    let view = IntView::new(array)?;
                    Ok(RangeValue::Int(view.value(row) as i128))
                }
            }
            RangeColumn::Int(_) => {
                let view = IntView::new(array)?;
                Ok(RangeValue::Int(view.value(row) as i128))
            }
        }
    }
}

fn offset_value(
    base: RangeValue,
    offset: RangeValue,
    preceding: bool,
    sense: RangeSense,
    what: &str,
) -> Result<RangeValue> {
    // PRECEDING moves against the sort direction, FOLLOWING along it.
    let subtract = match sense {
        RangeSense::Ascending => preceding,
        RangeSense::Descending => !preceding,
    };
    match (base, offset) {
        (RangeValue::Int(b), RangeValue::Int(o)) => {
            let v = if subtract {
                b.checked_sub(o)
            } else {
                b.checked_add(o)
            };
            v.map(RangeValue::Int)
                .ok_or_else(|| EngineError::out_of_range(format!("Overflow computing {}", what)))
        }
        (RangeValue::Float(b), RangeValue::Float(o)) => {
            Ok(RangeValue::Float(if subtract { b - o } else { b + o }))
        }
        _ => Err(EngineError::internal(
            "RANGE offset type does not match ordering column",
        )),
    }
}

/// First index in `[begin, end)` whose value does not come before `target`.
fn lower_bound(
    over: &RangeColumn,
    mut begin: usize,
    mut end: usize,
    target: RangeValue,
    sense: RangeSense,
) -> usize {
    while begin < end {
        let mid = begin + (end - begin) / 2;
        if over.value(mid).before(target, sense) {
            begin = mid + 1;
        } else {
            end = mid;
        }
    }
    begin
}

/// First index in `[begin, end)` whose value comes after `target`.
fn upper_bound(
    over: &RangeColumn,
    mut begin: usize,
    mut end: usize,
    target: RangeValue,
    sense: RangeSense,
) -> usize {
    while begin < end {
        let mid = begin + (end - begin) / 2;
        if target.before(over.value(mid), sense) {
            end = mid;
        } else {
            begin = mid + 1;
        }
    }
    begin
}

/// Binary search for a RANGE bound, seeded by the previous row's frame. Both
/// frame edges move monotonically within a partition, so the previous hit
/// usually pins one side of the search.
fn find_range_bound(
    over: &RangeColumn,
    order_begin: usize,
    order_end: usize,
    target: RangeValue,
    sense: RangeSense,
    from: bool,
    prev: (usize, usize),
) -> usize {
    let mut begin = order_begin;
    let mut end = order_end;
    if order_begin < prev.0 && prev.0 < order_end {
        // prev.first is not past the target, so the bound cannot be earlier.
        if !target.before(over.value(prev.0), sense) {
            begin = prev.0;
        }
    }
    if order_begin <= prev.1 && prev.1 < order_end {
        // target is not past prev.second, so the bound cannot be later.
        if !over.value(prev.1).before(target, sense) {
            end = prev.1 + 1;
        }
    }
    if from {
        lower_bound(over, begin, end, target, sense)
    } else {
        upper_bound(over, begin, end, target, sense)
    }
}

/// Stateful boundary engine for one window expression over one hash group.
pub(crate) struct WindowBoundsState {
    start_boundary: FrameBoundary,
    end_boundary: FrameBoundary,
    partition_count: usize,
    order_count: usize,
    range_sense: Option<RangeSense>,
    has_preceding_range: bool,
    has_following_range: bool,
    needs_peer: bool,
    input_size: usize,

    partition_start: usize,
    partition_end: usize,
    peer_start: usize,
    peer_end: usize,
    valid_start: usize,
    valid_end: usize,
    prev: (usize, usize),
}

fn is_preceding_range(b: &FrameBoundary) -> bool {
    matches!(b, FrameBoundary::PrecedingRange(_))
}

fn is_following_range(b: &FrameBoundary) -> bool {
    matches!(b, FrameBoundary::FollowingRange(_))
}

impl WindowBoundsState {
    pub(crate) fn new(
        wexpr: &WindowExpr,
        partition_count: usize,
        order_count: usize,
        range_sense: Option<RangeSense>,
        input_size: usize,
    ) -> Self {
        let start = wexpr.frame.start;
        let end = wexpr.frame.end;
        Self {
            start_boundary: start,
            end_boundary: end,
            partition_count,
            order_count,
            range_sense,
            has_preceding_range: is_preceding_range(&start) || is_preceding_range(&end),
            has_following_range: is_following_range(&start) || is_following_range(&end),
            needs_peer: end.needs_peer()
                || matches!(wexpr.kind, WindowFunctionKind::CumeDist),
            input_size,
            partition_start: 0,
            partition_end: 0,
            peer_start: 0,
            peer_end: 0,
            valid_start: 0,
            valid_end: 0,
            prev: (0, 0),
        }
    }

    pub(crate) fn uses_range_column(&self) -> bool {
        self.has_preceding_range || self.has_following_range
    }

    fn range_sense(&self) -> Result<RangeSense> {
        self.range_sense.ok_or_else(|| {
            EngineError::internal("RANGE frame requires exactly one ORDER BY key")
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn update(
        &mut self,
        row_idx: usize,
        range_col: Option<&RangeColumn>,
        chunk_idx: usize,
        boundary_start: &WindowInputExpr,
        boundary_end: &WindowInputExpr,
        partition_mask: &BoundaryMask,
        order_mask: &BoundaryMask,
    ) -> Result<(i64, i64)> {
        if self.partition_count + self.order_count > 0 {
            let is_same_partition = !partition_mask.is_set(row_idx);
            let is_peer = !order_mask.is_set(row_idx);

            if !is_same_partition {
                self.partition_start = row_idx;
                self.peer_start = row_idx;

                self.partition_end = self.input_size;
                if self.partition_count > 0 {
                    let mut n = 1;
                    self.partition_end =
                        partition_mask.find_next_start(row_idx + 1, self.input_size, &mut n);
                }

                // Valid ordering bounds exclude NULL order keys from RANGE
                // searches; leading NULLs for a preceding bound, trailing for
                // a following one.
                self.valid_start = self.partition_start;
                self.valid_end = self.partition_end;

                if self.valid_start < self.valid_end && self.has_preceding_range {
                    let range = range_col
                        .ok_or_else(|| EngineError::internal("RANGE frame without order column"))?;
                    if range.is_null(self.valid_start) {
                        let mut n = 1;
                        self.valid_start =
                            order_mask.find_next_start(self.valid_start + 1, self.valid_end, &mut n);
                    }
                }

                if self.valid_start < self.valid_end && self.has_following_range {
                    let range = range_col
                        .ok_or_else(|| EngineError::internal("RANGE frame without order column"))?;
                    if range.is_null(self.valid_end - 1) {
                        let mut n = 1;
                        self.valid_end =
                            order_mask.find_prev_start(self.valid_start, self.valid_end, &mut n);
                    }
                    self.prev = (self.valid_start, self.valid_end);
                }
            } else if !is_peer {
                self.peer_start = row_idx;
            }

            if self.needs_peer {
                self.peer_end = self.partition_end;
                if self.order_count > 0 {
                    let mut n = 1;
                    self.peer_end =
                        order_mask.find_next_start(self.peer_start + 1, self.partition_end, &mut n);
                }
            }
        } else {
            // OVER (): one partition covering everything, all rows peers.
            self.partition_end = self.input_size;
            self.peer_end = self.partition_end;
        }

        let mut window_start: i64 = -1;
        let mut window_end: i64 = -1;

        match self.start_boundary {
            FrameBoundary::UnboundedPreceding => {
                window_start = self.partition_start as i64;
            }
            FrameBoundary::CurrentRowRows => {
                window_start = row_idx as i64;
            }
            FrameBoundary::CurrentRowRange => {
                window_start = self.peer_start as i64;
            }
            FrameBoundary::PrecedingRows(_) => {
                window_start = (row_idx as i64)
                    .checked_sub(rows_offset(boundary_start, chunk_idx)?)
                    .ok_or_else(|| {
                        EngineError::out_of_range("Overflow computing ROWS PRECEDING start")
                    })?;
            }
            FrameBoundary::FollowingRows(_) => {
                window_start = (row_idx as i64)
                    .checked_add(rows_offset(boundary_start, chunk_idx)?)
                    .ok_or_else(|| {
                        EngineError::out_of_range("Overflow computing ROWS FOLLOWING start")
                    })?;
            }
            FrameBoundary::PrecedingRange(_) => {
                if boundary_start.is_null(chunk_idx)? {
                    window_start = self.peer_start as i64;
                } else {
                    let range = range_col
                        .ok_or_else(|| EngineError::internal("RANGE frame without order column"))?;
                    let sense = self.range_sense()?;
                    let target = offset_value(
                        range.value(row_idx),
                        range.boundary_value(boundary_start, chunk_idx)?,
                        true,
                        sense,
                        "RANGE PRECEDING start",
                    )?;
                    self.prev.0 = find_range_bound(
                        range,
                        self.valid_start,
                        row_idx,
                        target,
                        sense,
                        true,
                        self.prev,
                    );
                    window_start = self.prev.0 as i64;
                }
            }
            FrameBoundary::FollowingRange(_) => {
                if boundary_start.is_null(chunk_idx)? {
                    window_start = self.peer_start as i64;
                } else {
                    let range = range_col
                        .ok_or_else(|| EngineError::internal("RANGE frame without order column"))?;
                    let sense = self.range_sense()?;
                    let target = offset_value(
                        range.value(row_idx),
                        range.boundary_value(boundary_start, chunk_idx)?,
                        false,
                        sense,
                        "RANGE FOLLOWING start",
                    )?;
                    self.prev.0 = find_range_bound(
                        range,
                        row_idx,
                        self.valid_end,
                        target,
                        sense,
                        true,
                        self.prev,
                    );
                    window_start = self.prev.0 as i64;
                }
            }
            FrameBoundary::UnboundedFollowing => {
                return Err(EngineError::internal("Unsupported window start boundary"));
            }
        }

        match self.end_boundary {
            FrameBoundary::CurrentRowRows => {
                window_end = row_idx as i64 + 1;
            }
            FrameBoundary::CurrentRowRange => {
                window_end = self.peer_end as i64;
            }
            FrameBoundary::UnboundedFollowing => {
                window_end = self.partition_end as i64;
            }
            FrameBoundary::PrecedingRows(_) => {
                window_end = (row_idx as i64 + 1)
                    .checked_sub(rows_offset(boundary_end, chunk_idx)?)
                    .ok_or_else(|| {
                        EngineError::out_of_range("Overflow computing ROWS PRECEDING end")
                    })?;
            }
            FrameBoundary::FollowingRows(_) => {
                window_end = (row_idx as i64 + 1)
                    .checked_add(rows_offset(boundary_end, chunk_idx)?)
                    .ok_or_else(|| {
                        EngineError::out_of_range("Overflow computing ROWS FOLLOWING end")
                    })?;
            }
            FrameBoundary::PrecedingRange(_) => {
                if boundary_end.is_null(chunk_idx)? {
                    window_end = self.peer_end as i64;
                } else {
                    let range = range_col
                        .ok_or_else(|| EngineError::internal("RANGE frame without order column"))?;
                    let sense = self.range_sense()?;
                    let target = offset_value(
                        range.value(row_idx),
                        range.boundary_value(boundary_end, chunk_idx)?,
                        true,
                        sense,
                        "RANGE PRECEDING end",
                    )?;
                    self.prev.1 = find_range_bound(
                        range,
                        self.valid_start,
                        row_idx,
                        target,
                        sense,
                        false,
                        self.prev,
                    );
                    window_end = self.prev.1 as i64;
                }
            }
            FrameBoundary::FollowingRange(_) => {
                if boundary_end.is_null(chunk_idx)? {
                    window_end = self.peer_end as i64;
                } else {
                    let range = range_col
                        .ok_or_else(|| EngineError::internal("RANGE frame without order column"))?;
                    let sense = self.range_sense()?;
                    let target = offset_value(
                        range.value(row_idx),
                        range.boundary_value(boundary_end, chunk_idx)?,
                        false,
                        sense,
                        "RANGE FOLLOWING end",
                    )?;
                    self.prev.1 = find_range_bound(
                        range,
                        row_idx,
                        self.valid_end,
                        target,
                        sense,
                        false,
                        self.prev,
                    );
                    window_end = self.prev.1 as i64;
                }
            }
            FrameBoundary::UnboundedPreceding => {
                return Err(EngineError::internal("Unsupported window end boundary"));
            }
        }

        // Clamp to the partition; an offset larger than the partition
        // silently pins the bound at the partition edge.
        window_start = window_start.clamp(self.partition_start as i64, self.partition_end as i64);
        window_end = window_end.clamp(self.partition_start as i64, self.partition_end as i64);

        if window_start < 0 || window_end < 0 {
            return Err(EngineError::internal("Failed to compute window boundaries"));
        }

        Ok((window_start, window_end))
    }

    /// Fill `out` with boundaries for `count` rows starting at `row_idx`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn bounds(
        &mut self,
        out: &mut BoundsBuffer,
        mut row_idx: usize,
        range_collection: Option<&WindowInputColumn>,
        count: usize,
        boundary_start: &WindowInputExpr,
        boundary_end: &WindowInputExpr,
        partition_mask: &BoundaryMask,
        order_mask: &BoundaryMask,
    ) -> Result<()> {
        out.clear();
        let range_array = match range_collection {
            Some(col) if self.uses_range_column() => Some(col.array()?.clone()),
            _ => None,
        };
        let range_col = range_array.as_ref().map(RangeColumn::new).transpose()?;
        for chunk_idx in 0..count {
            let (window_start, window_end) = self.update(
                row_idx,
                range_col.as_ref(),
                chunk_idx,
                boundary_start,
                boundary_end,
                partition_mask,
                order_mask,
            )?;
            out.partition_begin.push(self.partition_start);
            out.partition_end.push(self.partition_end);
            out.peer_begin.push(self.peer_start);
            out.peer_end.push(self.peer_end);
            out.window_begin.push(window_start as usize);
            out.window_end.push(window_end as usize);
            row_idx += 1;
        }
        Ok(())
    }
}

fn rows_offset(expr: &WindowInputExpr, chunk_idx: usize) -> Result<i64> {
    if expr.is_null(chunk_idx)? {
        return Err(EngineError::invalid_input("ROWS offset must not be NULL"));
    }
    expr.value_i64(chunk_idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SlotId;
    use crate::exec::chunk::{Chunk, field_with_slot_id};
    use crate::exec::expr::{ExprArena, ExprNode, LiteralValue};
    use crate::exec::node::analytic::{AggFunction, WindowFrame};
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn order_chunk(values: Vec<Option<i64>>) -> Chunk {
        let field = field_with_slot_id(Field::new("o", DataType::Int64, true), SlotId::new(1));
        let schema = Arc::new(Schema::new(vec![field]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap();
        Chunk::new(batch)
    }

    struct Fixture {
        arena: Arc<ExprArena>,
        start_expr: Option<crate::exec::expr::ExprId>,
        end_expr: Option<crate::exec::expr::ExprId>,
    }

    fn fixture(start_offset: Option<i64>, end_offset: Option<i64>) -> Fixture {
        let mut arena = ExprArena::default();
        let start_expr = start_offset
            .map(|v| arena.push_typed(ExprNode::Literal(LiteralValue::Int64(v)), DataType::Int64));
        let end_expr = end_offset
            .map(|v| arena.push_typed(ExprNode::Literal(LiteralValue::Int64(v)), DataType::Int64));
        Fixture {
            arena: Arc::new(arena),
            start_expr,
            end_expr,
        }
    }

    fn window_expr(frame: WindowFrame) -> WindowExpr {
        WindowExpr {
            kind: WindowFunctionKind::Aggregate(AggFunction::Sum),
            args: vec![],
            offset: None,
            default: None,
            filter: None,
            frame,
            return_type: DataType::Int64,
            output_slot: SlotId::new(100),
        }
    }

    fn run_bounds(
        frame: WindowFrame,
        fix: &Fixture,
        order_values: Vec<Option<i64>>,
        partition_starts: &[usize],
        peer_starts: &[usize],
        order_count: usize,
    ) -> BoundsBuffer {
        let count = order_values.len();
        let chunk = order_chunk(order_values);
        let mut pmask = BoundaryMask::new_zeroed(count);
        for &i in partition_starts {
            pmask.set_bit(i);
        }
        let mut omask = BoundaryMask::new_zeroed(count);
        for &i in peer_starts {
            omask.set_bit(i);
        }

        let wexpr = window_expr(frame);
        let mut state = WindowBoundsState::new(
            &wexpr,
            if partition_starts.len() > 1 { 1 } else { 0 },
            order_count,
            Some(RangeSense::Ascending),
            count,
        );

        let mut bstart = WindowInputExpr::new(fix.start_expr, Arc::clone(&fix.arena));
        let mut bend = WindowInputExpr::new(fix.end_expr, Arc::clone(&fix.arena));
        bstart.execute(&chunk).unwrap();
        bend.execute(&chunk).unwrap();

        let mut out = BoundsBuffer::with_capacity(count);
        state
            .bounds(&mut out, 0, None, count, &bstart, &bend, &pmask, &omask)
            .unwrap();
        out
    }

    #[test]
    fn rows_one_preceding_one_following() {
        let fix = fixture(Some(1), Some(1));
        let frame = WindowFrame::rows(
            FrameBoundary::PrecedingRows(fix.start_expr.unwrap()),
            FrameBoundary::FollowingRows(fix.end_expr.unwrap()),
        );
        let out = run_bounds(
            frame,
            &fix,
            vec![Some(1), Some(2), Some(3), Some(4)],
            &[0],
            &[0, 1, 2, 3],
            1,
        );
        assert_eq!(out.window_begin, vec![0, 0, 1, 2]);
        assert_eq!(out.window_end, vec![2, 3, 4, 4]);
    }

    #[test]
    fn unbounded_frame_covers_partition() {
        let fix = fixture(None, None);
        let frame = WindowFrame::rows(
            FrameBoundary::UnboundedPreceding,
            FrameBoundary::UnboundedFollowing,
        );
        let out = run_bounds(
            frame,
            &fix,
            vec![Some(1), Some(2), Some(3), Some(4)],
            &[0, 2],
            &[0, 1, 2, 3],
            1,
        );
        assert_eq!(out.partition_begin, vec![0, 0, 2, 2]);
        assert_eq!(out.partition_end, vec![2, 2, 4, 4]);
        assert_eq!(out.window_begin, vec![0, 0, 2, 2]);
        assert_eq!(out.window_end, vec![2, 2, 4, 4]);
    }

    #[test]
    fn oversized_rows_offset_clamps_to_partition() {
        let fix = fixture(Some(100), Some(100));
        let frame = WindowFrame::rows(
            FrameBoundary::PrecedingRows(fix.start_expr.unwrap()),
            FrameBoundary::FollowingRows(fix.end_expr.unwrap()),
        );
        let out = run_bounds(
            frame,
            &fix,
            vec![Some(1), Some(2), Some(3)],
            &[0],
            &[0, 1, 2],
            1,
        );
        assert_eq!(out.window_begin, vec![0, 0, 0]);
        assert_eq!(out.window_end, vec![3, 3, 3]);
    }

    #[test]
    fn current_row_range_spans_peer_group() {
        let fix = fixture(None, None);
        let frame = WindowFrame::range(
            FrameBoundary::UnboundedPreceding,
            FrameBoundary::CurrentRowRange,
        );
        // o = [10, 20, 20, 30]: rows 1 and 2 are peers.
        let out = run_bounds(
            frame,
            &fix,
            vec![Some(10), Some(20), Some(20), Some(30)],
            &[0],
            &[0, 1, 3],
            1,
        );
        assert_eq!(out.peer_begin, vec![0, 1, 1, 3]);
        assert_eq!(out.peer_end, vec![1, 3, 3, 4]);
        assert_eq!(out.window_end, vec![1, 3, 3, 4]);
    }

    #[test]
    fn range_preceding_counts_value_distance() {
        let mut arena = ExprArena::default();
        let slot = arena.push_typed(ExprNode::SlotRef(SlotId::new(1)), DataType::Int64);
        let ten = arena.push_typed(ExprNode::Literal(LiteralValue::Int64(10)), DataType::Int64);
        let arena = Arc::new(arena);
        let chunk = order_chunk(vec![Some(1), Some(5), Some(12), Some(30)]);
        let mut col = WindowInputColumn::new(Some(slot), Arc::clone(&arena), 4);
        let _ = col.append(&chunk).unwrap();
        col.finish().unwrap();

        let frame = WindowFrame::range(
            FrameBoundary::PrecedingRange(ten),
            FrameBoundary::CurrentRowRange,
        );
        let wexpr = window_expr(frame);
        let mut state = WindowBoundsState::new(&wexpr, 0, 1, Some(RangeSense::Ascending), 4);
        let mut pmask = BoundaryMask::new_zeroed(4);
        pmask.set_bit(0);
        let mut omask = BoundaryMask::new_zeroed(4);
        for i in 0..4 {
            omask.set_bit(i);
        }
        let mut bstart = WindowInputExpr::new(Some(ten), Arc::clone(&arena));
        let mut bend = WindowInputExpr::new(None, Arc::clone(&arena));
        bstart.execute(&chunk).unwrap();
        bend.execute(&chunk).unwrap();

        let mut out = BoundsBuffer::with_capacity(4);
        state
            .bounds(&mut out, 0, Some(&col), 4, &bstart, &bend, &pmask, &omask)
            .unwrap();
        assert_eq!(out.window_begin, vec![0, 0, 1, 3]);
        assert_eq!(out.window_end, vec![1, 2, 3, 4]);
    }

    #[test]
    fn range_bounds_invariant_window_inside_partition() {
        let fix = fixture(None, None);
        let frame = WindowFrame::rows(
            FrameBoundary::CurrentRowRows,
            FrameBoundary::UnboundedFollowing,
        );
        let out = run_bounds(
            frame,
            &fix,
            vec![Some(1), Some(2), Some(3), Some(4), Some(5)],
            &[0, 3],
            &[0, 1, 2, 3, 4],
            1,
        );
        for i in 0..5 {
            assert!(out.partition_begin[i] <= out.window_begin[i]);
            assert!(out.window_begin[i] <= out.window_end[i]);
            assert!(out.window_end[i] <= out.partition_end[i]);
        }
    }
}
