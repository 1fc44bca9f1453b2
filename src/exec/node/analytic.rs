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
//! Plan-time model of the analytic (window) operator.

use arrow::datatypes::DataType;

use crate::common::ids::SlotId;
use crate::exec::expr::ExprId;
use crate::exec::node::sort::SortExpression;

/// How frame boundary offsets are counted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameKind {
    Rows,
    Range,
    /// Recognized by the binder but not executed; the executor rejects it.
    Groups,
}

/// One end of a window frame. The expression ids reference the boundary
/// offset expression, evaluated lazily per batch.
#[derive(Copy, Clone, Debug)]
pub enum FrameBoundary {
    UnboundedPreceding,
    UnboundedFollowing,
    CurrentRowRows,
    CurrentRowRange,
    PrecedingRows(ExprId),
    FollowingRows(ExprId),
    PrecedingRange(ExprId),
    FollowingRange(ExprId),
}

impl FrameBoundary {
    /// RANGE-style ends need the current row's peer group resolved.
    pub fn needs_peer(&self) -> bool {
        matches!(
            self,
            FrameBoundary::CurrentRowRange
                | FrameBoundary::PrecedingRange(_)
                | FrameBoundary::FollowingRange(_)
        )
    }

    pub fn offset_expr(&self) -> Option<ExprId> {
        match self {
            FrameBoundary::PrecedingRows(e)
            | FrameBoundary::FollowingRows(e)
            | FrameBoundary::PrecedingRange(e)
            | FrameBoundary::FollowingRange(e) => Some(*e),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct WindowFrame {
    pub kind: FrameKind,
    pub start: FrameBoundary,
    pub end: FrameBoundary,
}

impl WindowFrame {
    /// The SQL default: RANGE BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW.
    pub fn default_frame() -> Self {
        Self {
            kind: FrameKind::Range,
            start: FrameBoundary::UnboundedPreceding,
            end: FrameBoundary::CurrentRowRange,
        }
    }

    pub fn rows(start: FrameBoundary, end: FrameBoundary) -> Self {
        Self {
            kind: FrameKind::Rows,
            start,
            end,
        }
    }

    pub fn range(start: FrameBoundary, end: FrameBoundary) -> Self {
        Self {
            kind: FrameKind::Range,
            start,
            end,
        }
    }
}

pub use crate::exec::expr::agg::AggFunction;

#[derive(Clone, Debug)]
pub enum WindowFunctionKind {
    Aggregate(AggFunction),
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    Ntile,
    Lead { ignore_nulls: bool },
    Lag { ignore_nulls: bool },
    FirstValue { ignore_nulls: bool },
    LastValue { ignore_nulls: bool },
    NthValue { ignore_nulls: bool },
}

impl WindowFunctionKind {
    pub fn name(&self) -> &'static str {
        match self {
            WindowFunctionKind::Aggregate(AggFunction::Count) => "count",
            WindowFunctionKind::Aggregate(AggFunction::Sum) => "sum",
            WindowFunctionKind::Aggregate(AggFunction::Avg) => "avg",
            WindowFunctionKind::Aggregate(AggFunction::Min) => "min",
            WindowFunctionKind::Aggregate(AggFunction::Max) => "max",
            WindowFunctionKind::RowNumber => "row_number",
            WindowFunctionKind::Rank => "rank",
            WindowFunctionKind::DenseRank => "dense_rank",
            WindowFunctionKind::PercentRank => "percent_rank",
            WindowFunctionKind::CumeDist => "cume_dist",
            WindowFunctionKind::Ntile => "ntile",
            WindowFunctionKind::Lead { .. } => "lead",
            WindowFunctionKind::Lag { .. } => "lag",
            WindowFunctionKind::FirstValue { .. } => "first_value",
            WindowFunctionKind::LastValue { .. } => "last_value",
            WindowFunctionKind::NthValue { .. } => "nth_value",
        }
    }

    pub fn ignore_nulls(&self) -> bool {
        matches!(
            self,
            WindowFunctionKind::Lead { ignore_nulls: true }
                | WindowFunctionKind::Lag { ignore_nulls: true }
                | WindowFunctionKind::FirstValue { ignore_nulls: true }
                | WindowFunctionKind::LastValue { ignore_nulls: true }
                | WindowFunctionKind::NthValue { ignore_nulls: true }
        )
    }
}

/// One bound window function expression.
#[derive(Clone, Debug)]
pub struct WindowExpr {
    pub kind: WindowFunctionKind,
    /// Payload children (the aggregated value, NTILE bucket count, NTH_VALUE
    /// index, ...).
    pub args: Vec<ExprId>,
    /// LEAD/LAG jump distance; absent means 1.
    pub offset: Option<ExprId>,
    /// LEAD/LAG replacement when the target falls outside the partition.
    pub default: Option<ExprId>,
    /// FILTER clause over aggregate input.
    pub filter: Option<ExprId>,
    pub frame: WindowFrame,
    pub return_type: DataType,
    pub output_slot: SlotId,
}

/// The analytic operator node: all window expressions of one OVER clause
/// group, sharing PARTITION BY and ORDER BY.
#[derive(Clone, Debug)]
pub struct AnalyticNode {
    pub node_id: i32,
    pub partition_exprs: Vec<ExprId>,
    pub order_by: Vec<SortExpression>,
    pub window_exprs: Vec<WindowExpr>,
    pub estimated_rows: Option<usize>,
}

impl AnalyticNode {
    /// Without PARTITION BY and ORDER BY the operator must see input in
    /// arrival order, which pins upstream exchange behavior.
    pub fn is_order_dependent(&self) -> bool {
        self.partition_exprs.is_empty() && self.order_by.is_empty()
    }

    /// Explain text: one line per window expression.
    pub fn params_to_string(&self) -> String {
        self.window_exprs
            .iter()
            .map(|w| w.kind.name())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
