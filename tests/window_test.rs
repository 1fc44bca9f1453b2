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
//! Integration tests for the window operator, driven end to end through the
//! sink/source operator contract.

use std::sync::Arc;

use arrow::array::{Array, Float64Array, Int64Array};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use quartzite::common::ids::SlotId;
use quartzite::exec::chunk::{Chunk, field_with_slot_id};
use quartzite::exec::expr::{ExprArena, ExprId, ExprNode, LiteralValue};
use quartzite::exec::node::analytic::{
    AggFunction, AnalyticNode, FrameBoundary, FrameKind, WindowExpr, WindowFrame,
    WindowFunctionKind,
};
use quartzite::exec::node::sort::SortExpression;
use quartzite::exec::operators::window::{
    WindowSharedState, WindowSinkFactory, WindowSourceFactory,
};
use quartzite::exec::pipeline::operator::Operator;
use quartzite::exec::pipeline::operator_factory::OperatorFactory;
use quartzite::runtime::runtime_state::RuntimeState;
use quartzite::{EngineError, Result};

const P_SLOT: SlotId = SlotId(1);
const O_SLOT: SlotId = SlotId(2);
const X_SLOT: SlotId = SlotId(3);

fn input_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        field_with_slot_id(Field::new("p", DataType::Int64, true), P_SLOT),
        field_with_slot_id(Field::new("o", DataType::Int64, true), O_SLOT),
        field_with_slot_id(Field::new("x", DataType::Int64, true), X_SLOT),
    ]))
}

fn make_chunk(p: Vec<Option<i64>>, o: Vec<Option<i64>>, x: Vec<Option<i64>>) -> Chunk {
    let batch = RecordBatch::try_new(
        input_schema(),
        vec![
            Arc::new(Int64Array::from(p)),
            Arc::new(Int64Array::from(o)),
            Arc::new(Int64Array::from(x)),
        ],
    )
    .unwrap();
    Chunk::new(batch)
}

struct NodeBuilder {
    arena: ExprArena,
    p: ExprId,
    o: ExprId,
    x: ExprId,
}

impl NodeBuilder {
    fn new() -> Self {
        let mut arena = ExprArena::default();
        let p = arena.push_typed(ExprNode::SlotRef(P_SLOT), DataType::Int64);
        let o = arena.push_typed(ExprNode::SlotRef(O_SLOT), DataType::Int64);
        let x = arena.push_typed(ExprNode::SlotRef(X_SLOT), DataType::Int64);
        Self { arena, p, o, x }
    }

    fn int_lit(&mut self, v: i64) -> ExprId {
        self.arena
            .push_typed(ExprNode::Literal(LiteralValue::Int64(v)), DataType::Int64)
    }

    fn null_lit(&mut self) -> ExprId {
        self.arena
            .push_typed(ExprNode::Literal(LiteralValue::Null), DataType::Int64)
    }

    fn node(
        self,
        partitioned: bool,
        ordered: bool,
        window_exprs: Vec<WindowExpr>,
    ) -> (AnalyticNode, ExprArena) {
        let node = AnalyticNode {
            node_id: 1,
            partition_exprs: if partitioned { vec![self.p] } else { vec![] },
            order_by: if ordered {
                vec![SortExpression::asc(self.o)]
            } else {
                vec![]
            },
            window_exprs,
            estimated_rows: Some(1 << 16),
        };
        (node, self.arena)
    }
}

fn wexpr(kind: WindowFunctionKind, args: Vec<ExprId>, frame: WindowFrame, slot: u32) -> WindowExpr {
    WindowExpr {
        kind,
        args,
        offset: None,
        default: None,
        filter: None,
        frame,
        return_type: DataType::Int64,
        output_slot: SlotId(slot),
    }
}

fn rows_frame(start: FrameBoundary, end: FrameBoundary) -> WindowFrame {
    WindowFrame::rows(start, end)
}

/// Drive the sink/source pair with the given worker counts and return the
/// concatenated output.
fn drive(
    node: AnalyticNode,
    arena: ExprArena,
    inputs: Vec<Chunk>,
    sink_threads: usize,
    source_threads: usize,
) -> Result<Chunk> {
    let shared = WindowSharedState::new(node, arena)?;
    let sink_factory = WindowSinkFactory::new(shared.clone());
    let source_factory = WindowSourceFactory::new(shared);
    let state = Arc::new(RuntimeState::new());

    let mut shares: Vec<Vec<Chunk>> = (0..sink_threads).map(|_| Vec::new()).collect();
    for (i, chunk) in inputs.into_iter().enumerate() {
        shares[i % sink_threads].push(chunk);
    }

    // All sink operators must exist before any of them finishes, mirroring
    // how a pipeline creates one operator per driver up front.
    let sink_ops: Vec<Box<dyn Operator>> = (0..sink_threads)
        .map(|i| sink_factory.create(sink_threads as i32, i as i32))
        .collect();

    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::new();
        for (op, chunks) in sink_ops.into_iter().zip(shares.into_iter()) {
            let state = Arc::clone(&state);
            handles.push(scope.spawn(move || -> Result<()> {
                let mut op = op;
                let processor = op.as_processor_mut().expect("sink processor");
                for chunk in chunks {
                    processor.push_chunk(&state, chunk)?;
                }
                processor.set_finishing(&state)
            }));
        }
        for handle in handles {
            handle.join().expect("sink thread")?;
        }
        Ok(())
    })?;

    let outputs = std::sync::Mutex::new(Vec::<Chunk>::new());
    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::new();
        for i in 0..source_threads {
            let state = Arc::clone(&state);
            let op = source_factory.create(source_threads as i32, i as i32);
            let outputs = &outputs;
            handles.push(scope.spawn(move || -> Result<()> {
                let mut op = op;
                let processor = op.as_processor_mut().expect("source processor");
                while let Some(chunk) = processor.pull_chunk(&state)? {
                    outputs.lock().unwrap().push(chunk);
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle.join().expect("source thread")?;
        }
        Ok(())
    })?;

    let outputs = outputs.into_inner().unwrap();
    if outputs.is_empty() {
        return Ok(Chunk::default());
    }
    let schema = outputs[0].schema();
    let batches: Vec<RecordBatch> = outputs.iter().map(|c| c.batch.clone()).collect();
    Ok(Chunk::new(concat_batches(&schema, &batches)?))
}

fn i64_column(chunk: &Chunk, slot: SlotId) -> Vec<Option<i64>> {
    let array = chunk.column_by_slot_id(slot).unwrap();
    let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i)))
        .collect()
}

fn f64_column(chunk: &Chunk, slot: SlotId) -> Vec<Option<f64>> {
    let array = chunk.column_by_slot_id(slot).unwrap();
    let array = array.as_any().downcast_ref::<Float64Array>().unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i)))
        .collect()
}

#[test]
fn row_number_partition_by_order_by() {
    let builder = NodeBuilder::new();
    let (node, arena) = builder.node(
        true,
        true,
        vec![wexpr(
            WindowFunctionKind::RowNumber,
            vec![],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let input = make_chunk(
        vec![Some(1), Some(1), Some(1), Some(2)],
        vec![Some(1), Some(2), Some(2), Some(1)],
        vec![Some(0), Some(0), Some(0), Some(0)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(out.len(), 4);

    let mut rows: Vec<(Option<i64>, Option<i64>, Option<i64>)> = i64_column(&out, P_SLOT)
        .into_iter()
        .zip(i64_column(&out, O_SLOT))
        .zip(i64_column(&out, SlotId(100)))
        .map(|((p, o), w)| (p, o, w))
        .collect();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            (Some(1), Some(1), Some(1)),
            (Some(1), Some(2), Some(2)),
            (Some(1), Some(2), Some(3)),
            (Some(2), Some(1), Some(1)),
        ]
    );
}

#[test]
fn rank_and_dense_rank_share_peer_groups() {
    let builder = NodeBuilder::new();
    let (node, arena) = builder.node(
        false,
        true,
        vec![
            wexpr(
                WindowFunctionKind::Rank,
                vec![],
                WindowFrame::default_frame(),
                100,
            ),
            wexpr(
                WindowFunctionKind::DenseRank,
                vec![],
                WindowFrame::default_frame(),
                101,
            ),
        ],
    );
    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(10), Some(20), Some(20), Some(30)],
        vec![Some(0); 4],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(1), Some(2), Some(2), Some(4)]
    );
    assert_eq!(
        i64_column(&out, SlotId(101)),
        vec![Some(1), Some(2), Some(2), Some(3)]
    );
}

#[test]
fn percent_rank_and_cume_dist() {
    let builder = NodeBuilder::new();
    let (node, arena) = builder.node(
        false,
        true,
        vec![
            wexpr(
                WindowFunctionKind::PercentRank,
                vec![],
                WindowFrame::default_frame(),
                100,
            ),
            wexpr(
                WindowFunctionKind::CumeDist,
                vec![],
                WindowFrame::default_frame(),
                101,
            ),
        ],
    );
    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(10), Some(20), Some(20), Some(30)],
        vec![Some(0); 4],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    let pr = f64_column(&out, SlotId(100));
    let cd = f64_column(&out, SlotId(101));
    let third = 1.0 / 3.0;
    assert_eq!(pr, vec![Some(0.0), Some(third), Some(third), Some(1.0)]);
    assert_eq!(cd, vec![Some(0.25), Some(0.75), Some(0.75), Some(1.0)]);
}

#[test]
fn ntile_bucket_distribution() {
    let mut builder = NodeBuilder::new();
    let three = builder.int_lit(3);
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::Ntile,
            vec![three],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let input = make_chunk(
        vec![Some(0); 10],
        (0..10).map(|i| Some(i as i64)).collect(),
        vec![Some(0); 10],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    let buckets = i64_column(&out, SlotId(100));
    assert_eq!(
        buckets,
        vec![1, 1, 1, 1, 2, 2, 2, 3, 3, 3]
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>()
    );
}

#[test]
fn ntile_rejects_non_positive_argument() {
    let mut builder = NodeBuilder::new();
    let zero = builder.int_lit(0);
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::Ntile,
            vec![zero],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let input = make_chunk(vec![Some(0)], vec![Some(1)], vec![Some(0)]);
    let err = drive(node, arena, vec![input], 1, 1).expect_err("ntile(0) must fail");
    assert!(matches!(err, EngineError::InvalidInput(_)), "err={err}");
    assert!(err.to_string().contains("ntile"), "err={err}");
}

#[test]
fn ntile_null_argument_yields_null() {
    let mut builder = NodeBuilder::new();
    let null = builder.null_lit();
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::Ntile,
            vec![null],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let input = make_chunk(vec![Some(0); 2], vec![Some(1), Some(2)], vec![Some(0); 2]);
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(i64_column(&out, SlotId(100)), vec![None, None]);
}

#[test]
fn sliding_sum_rows_frame() {
    let mut builder = NodeBuilder::new();
    let one_a = builder.int_lit(1);
    let one_b = builder.int_lit(1);
    let x = builder.x;
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::Aggregate(AggFunction::Sum),
            vec![x],
            rows_frame(
                FrameBoundary::PrecedingRows(one_a),
                FrameBoundary::FollowingRows(one_b),
            ),
            100,
        )],
    );
    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(2), Some(3), Some(4)],
        vec![Some(1), Some(2), Some(3), Some(4)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(3), Some(6), Some(9), Some(7)]
    );
}

#[test]
fn running_sum_at_partition_end_equals_total() {
    let mut builder = NodeBuilder::new();
    let x = builder.x;
    let running = wexpr(
        WindowFunctionKind::Aggregate(AggFunction::Sum),
        vec![x],
        rows_frame(
            FrameBoundary::UnboundedPreceding,
            FrameBoundary::CurrentRowRows,
        ),
        100,
    );
    let total = wexpr(
        WindowFunctionKind::Aggregate(AggFunction::Sum),
        vec![x],
        rows_frame(
            FrameBoundary::UnboundedPreceding,
            FrameBoundary::UnboundedFollowing,
        ),
        101,
    );
    let (node, arena) = builder.node(true, true, vec![running, total]);

    let input = make_chunk(
        vec![Some(1), Some(1), Some(1), Some(2), Some(2)],
        vec![Some(1), Some(2), Some(3), Some(1), Some(2)],
        vec![Some(5), Some(7), Some(11), Some(2), Some(3)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();

    let p = i64_column(&out, P_SLOT);
    let o = i64_column(&out, O_SLOT);
    let running = i64_column(&out, SlotId(100));
    let total = i64_column(&out, SlotId(101));

    // At the last row of each partition the running sum equals the total.
    for i in 0..out.len() {
        let is_last = (0..out.len())
            .filter(|&j| p[j] == p[i])
            .all(|j| o[j] <= o[i]);
        if is_last {
            assert_eq!(running[i], total[i], "row {}", i);
        }
    }
}

#[test]
fn lag_with_offset_and_default() {
    let mut builder = NodeBuilder::new();
    let two = builder.int_lit(2);
    let neg_one = builder.int_lit(-1);
    let x = builder.x;
    let mut lag = wexpr(
        WindowFunctionKind::Lag {
            ignore_nulls: false,
        },
        vec![x],
        WindowFrame::default_frame(),
        100,
    );
    lag.offset = Some(two);
    lag.default = Some(neg_one);
    let (node, arena) = builder.node(false, true, vec![lag]);

    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(2), Some(3), Some(4)],
        vec![Some(10), Some(20), Some(30), Some(40)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(-1), Some(-1), Some(10), Some(20)]
    );
}

#[test]
fn lead_k_equals_lag_minus_k() {
    let mut builder = NodeBuilder::new();
    let two = builder.int_lit(2);
    let neg_two = builder.int_lit(-2);
    let x = builder.x;
    let mut lead = wexpr(
        WindowFunctionKind::Lead {
            ignore_nulls: false,
        },
        vec![x],
        WindowFrame::default_frame(),
        100,
    );
    lead.offset = Some(two);
    let mut lag = wexpr(
        WindowFunctionKind::Lag {
            ignore_nulls: false,
        },
        vec![x],
        WindowFrame::default_frame(),
        101,
    );
    lag.offset = Some(neg_two);
    let (node, arena) = builder.node(false, true, vec![lead, lag]);

    let input = make_chunk(
        vec![Some(0); 5],
        (0..5).map(|i| Some(i as i64)).collect(),
        vec![Some(1), Some(4), Some(9), Some(16), Some(25)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(i64_column(&out, SlotId(100)), i64_column(&out, SlotId(101)));
}

#[test]
fn first_value_ignore_nulls_running_frame() {
    let mut builder = NodeBuilder::new();
    let x = builder.x;
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::FirstValue { ignore_nulls: true },
            vec![x],
            rows_frame(
                FrameBoundary::UnboundedPreceding,
                FrameBoundary::CurrentRowRows,
            ),
            100,
        )],
    );
    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(2), Some(3), Some(4)],
        vec![None, None, Some(7), Some(8)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![None, None, Some(7), Some(7)]
    );
}

#[test]
fn last_and_nth_value_over_sliding_frame() {
    let mut builder = NodeBuilder::new();
    let one_a = builder.int_lit(1);
    let one_b = builder.int_lit(1);
    let two = builder.int_lit(2);
    let x = builder.x;
    let last = wexpr(
        WindowFunctionKind::LastValue {
            ignore_nulls: false,
        },
        vec![x],
        rows_frame(
            FrameBoundary::PrecedingRows(one_a),
            FrameBoundary::FollowingRows(one_b),
        ),
        100,
    );
    let nth = wexpr(
        WindowFunctionKind::NthValue {
            ignore_nulls: false,
        },
        vec![x, two],
        rows_frame(
            FrameBoundary::UnboundedPreceding,
            FrameBoundary::CurrentRowRows,
        ),
        101,
    );
    let (node, arena) = builder.node(false, true, vec![last, nth]);

    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(2), Some(3), Some(4)],
        vec![Some(10), Some(20), Some(30), Some(40)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(20), Some(30), Some(40), Some(40)]
    );
    // NTH_VALUE(x, 2): null until the frame holds two rows.
    assert_eq!(
        i64_column(&out, SlotId(101)),
        vec![None, Some(20), Some(20), Some(20)]
    );
}

#[test]
fn frame_fully_after_partition_is_empty() {
    let mut builder = NodeBuilder::new();
    let five = builder.int_lit(5);
    let ten = builder.int_lit(10);
    let x = builder.x;
    let first = wexpr(
        WindowFunctionKind::FirstValue {
            ignore_nulls: false,
        },
        vec![x],
        rows_frame(
            FrameBoundary::FollowingRows(five),
            FrameBoundary::FollowingRows(ten),
        ),
        100,
    );
    let mut sum = wexpr(
        WindowFunctionKind::Aggregate(AggFunction::Sum),
        vec![x],
        rows_frame(
            FrameBoundary::FollowingRows(five),
            FrameBoundary::FollowingRows(ten),
        ),
        101,
    );
    sum.return_type = DataType::Int64;
    let (node, arena) = builder.node(false, true, vec![first, sum]);

    let input = make_chunk(
        vec![Some(0); 3],
        vec![Some(1), Some(2), Some(3)],
        vec![Some(10), Some(20), Some(30)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(i64_column(&out, SlotId(100)), vec![None, None, None]);
    assert_eq!(i64_column(&out, SlotId(101)), vec![None, None, None]);
}

#[test]
fn range_frame_counts_value_distance() {
    let mut builder = NodeBuilder::new();
    let ten = builder.int_lit(10);
    let x = builder.x;
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::Aggregate(AggFunction::Sum),
            vec![x],
            WindowFrame::range(
                FrameBoundary::PrecedingRange(ten),
                FrameBoundary::CurrentRowRange,
            ),
            100,
        )],
    );
    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(5), Some(12), Some(30)],
        vec![Some(1), Some(1), Some(1), Some(1)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(1), Some(2), Some(2), Some(1)]
    );
}

#[test]
fn range_frame_follows_descending_order() {
    let mut builder = NodeBuilder::new();
    let ten = builder.int_lit(10);
    let x = builder.x;
    let o = builder.o;
    let node = AnalyticNode {
        node_id: 1,
        partition_exprs: vec![],
        order_by: vec![SortExpression::desc(o)],
        window_exprs: vec![wexpr(
            WindowFunctionKind::Aggregate(AggFunction::Sum),
            vec![x],
            WindowFrame::range(
                FrameBoundary::PrecedingRange(ten),
                FrameBoundary::CurrentRowRange,
            ),
            100,
        )],
        estimated_rows: Some(1 << 16),
    };
    let arena = builder.arena;
    // Sorted descending: o = [30, 12, 5, 1]; under DESC, "10 PRECEDING"
    // reaches rows with ordering value at most o + 10.
    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(5), Some(12), Some(30)],
        vec![Some(1), Some(1), Some(1), Some(1)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, O_SLOT),
        vec![Some(30), Some(12), Some(5), Some(1)]
    );
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(1), Some(1), Some(2), Some(2)]
    );
}

#[test]
fn range_frame_with_null_ordering_values() {
    let mut builder = NodeBuilder::new();
    let ten = builder.int_lit(10);
    let x = builder.x;
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::Aggregate(AggFunction::Sum),
            vec![x],
            WindowFrame::range(
                FrameBoundary::PrecedingRange(ten),
                FrameBoundary::CurrentRowRange,
            ),
            100,
        )],
    );
    // NULL ordering keys sort first and are excluded from the RANGE search:
    // the NULL-ordered rows see an empty search interval, so the aggregate
    // returns its identity (NULL).
    let input = make_chunk(
        vec![Some(0); 4],
        vec![None, None, Some(5), Some(12)],
        vec![Some(100), Some(200), Some(1), Some(2)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![None, None, Some(1), Some(3)]
    );
}

#[test]
fn count_star_and_filtered_sum() {
    let mut builder = NodeBuilder::new();
    let x = builder.x;
    let two = builder.int_lit(2);
    let filter = builder
        .arena
        .push_typed(ExprNode::Ge(builder.x, two), DataType::Boolean);
    let count_star = wexpr(
        WindowFunctionKind::Aggregate(AggFunction::Count),
        vec![],
        rows_frame(
            FrameBoundary::UnboundedPreceding,
            FrameBoundary::CurrentRowRows,
        ),
        100,
    );
    let mut filtered_sum = wexpr(
        WindowFunctionKind::Aggregate(AggFunction::Sum),
        vec![x],
        rows_frame(
            FrameBoundary::UnboundedPreceding,
            FrameBoundary::CurrentRowRows,
        ),
        101,
    );
    filtered_sum.filter = Some(filter);
    let (node, arena) = builder.node(false, true, vec![count_star, filtered_sum]);

    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(2), Some(3), Some(4)],
        vec![Some(1), Some(2), Some(3), Some(4)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(1), Some(2), Some(3), Some(4)]
    );
    // FILTER (x >= 2): row 0 contributes nothing -> NULL sum.
    assert_eq!(
        i64_column(&out, SlotId(101)),
        vec![None, Some(2), Some(5), Some(9)]
    );
}

#[test]
fn constant_aggregate_over_unordered_partition() {
    let mut builder = NodeBuilder::new();
    let x = builder.x;
    let (node, arena) = builder.node(
        true,
        false,
        vec![wexpr(
            WindowFunctionKind::Aggregate(AggFunction::Sum),
            vec![x],
            rows_frame(
                FrameBoundary::UnboundedPreceding,
                FrameBoundary::UnboundedFollowing,
            ),
            100,
        )],
    );
    let input = make_chunk(
        vec![Some(1), Some(2), Some(1), Some(2), Some(1)],
        vec![Some(0); 5],
        vec![Some(1), Some(10), Some(2), Some(20), Some(3)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    let mut rows: Vec<(Option<i64>, Option<i64>)> = i64_column(&out, P_SLOT)
        .into_iter()
        .zip(i64_column(&out, SlotId(100)))
        .collect();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            (Some(1), Some(6)),
            (Some(1), Some(6)),
            (Some(1), Some(6)),
            (Some(2), Some(30)),
            (Some(2), Some(30)),
        ]
    );
}

#[test]
fn min_max_avg_over_sliding_frames() {
    let mut builder = NodeBuilder::new();
    let one_a = builder.int_lit(1);
    let one_b = builder.int_lit(1);
    let x = builder.x;
    let frame = rows_frame(
        FrameBoundary::PrecedingRows(one_a),
        FrameBoundary::FollowingRows(one_b),
    );
    let min = wexpr(
        WindowFunctionKind::Aggregate(AggFunction::Min),
        vec![x],
        frame,
        100,
    );
    let max = wexpr(
        WindowFunctionKind::Aggregate(AggFunction::Max),
        vec![x],
        frame,
        101,
    );
    let avg = wexpr(
        WindowFunctionKind::Aggregate(AggFunction::Avg),
        vec![x],
        frame,
        102,
    );
    let (node, arena) = builder.node(false, true, vec![min, max, avg]);

    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(2), Some(3), Some(4)],
        vec![Some(4), Some(1), Some(3), Some(2)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(1), Some(1), Some(1), Some(2)]
    );
    assert_eq!(
        i64_column(&out, SlotId(101)),
        vec![Some(4), Some(4), Some(3), Some(3)]
    );
    assert_eq!(
        f64_column(&out, SlotId(102)),
        vec![Some(2.5), Some(8.0 / 3.0), Some(2.0), Some(2.5)]
    );
}

#[test]
fn over_without_partition_or_order_sees_whole_input() {
    let mut builder = NodeBuilder::new();
    let x = builder.x;
    let (node, arena) = builder.node(
        false,
        false,
        vec![wexpr(
            WindowFunctionKind::Aggregate(AggFunction::Sum),
            vec![x],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let input = make_chunk(
        vec![Some(0); 4],
        vec![Some(1), Some(2), Some(3), Some(4)],
        vec![Some(1), Some(2), Some(3), Some(4)],
    );
    let out = drive(node, arena, vec![input], 2, 1).unwrap();
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(10), Some(10), Some(10), Some(10)]
    );
}

#[test]
fn empty_input_emits_no_rows() {
    let builder = NodeBuilder::new();
    let (node, arena) = builder.node(
        true,
        true,
        vec![wexpr(
            WindowFunctionKind::RowNumber,
            vec![],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let out = drive(node, arena, vec![], 2, 2).unwrap();
    assert_eq!(out.len(), 0);
}

#[test]
fn single_row_partition_values() {
    let mut builder = NodeBuilder::new();
    let two = builder.int_lit(2);
    let rank = wexpr(
        WindowFunctionKind::Rank,
        vec![],
        WindowFrame::default_frame(),
        100,
    );
    let pr = wexpr(
        WindowFunctionKind::PercentRank,
        vec![],
        WindowFrame::default_frame(),
        101,
    );
    let cd = wexpr(
        WindowFunctionKind::CumeDist,
        vec![],
        WindowFrame::default_frame(),
        102,
    );
    let ntile = wexpr(
        WindowFunctionKind::Ntile,
        vec![two],
        WindowFrame::default_frame(),
        103,
    );
    let (node, arena) = builder.node(false, true, vec![rank, pr, cd, ntile]);

    let input = make_chunk(vec![Some(9)], vec![Some(1)], vec![Some(42)]);
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    assert_eq!(i64_column(&out, SlotId(100)), vec![Some(1)]);
    assert_eq!(f64_column(&out, SlotId(101)), vec![Some(0.0)]);
    assert_eq!(f64_column(&out, SlotId(102)), vec![Some(1.0)]);
    assert_eq!(i64_column(&out, SlotId(103)), vec![Some(1)]);
}

#[test]
fn rows_following_offset_overflow_errors() {
    let mut builder = NodeBuilder::new();
    let huge = builder.int_lit(i64::MAX);
    let x = builder.x;
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::Aggregate(AggFunction::Sum),
            vec![x],
            rows_frame(FrameBoundary::CurrentRowRows, FrameBoundary::FollowingRows(huge)),
            100,
        )],
    );
    let input = make_chunk(vec![Some(0)], vec![Some(1)], vec![Some(1)]);
    let err = drive(node, arena, vec![input], 1, 1).expect_err("overflow must fail");
    assert!(matches!(err, EngineError::OutOfRange(_)), "err={err}");
    assert!(
        err.to_string().contains("Overflow computing ROWS FOLLOWING end"),
        "err={err}"
    );
}

#[test]
fn groups_frames_are_rejected() {
    let builder = NodeBuilder::new();
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::RowNumber,
            vec![],
            WindowFrame {
                kind: FrameKind::Groups,
                start: FrameBoundary::UnboundedPreceding,
                end: FrameBoundary::CurrentRowRange,
            },
            100,
        )],
    );
    let err = WindowSharedState::new(node, arena).expect_err("GROUPS must be rejected");
    assert!(matches!(err, EngineError::InvalidInput(_)), "err={err}");
}

fn multi_partition_fixture() -> (Vec<Chunk>, usize) {
    // 8 partitions x 37 rows, values chosen so every partition differs.
    let mut p = Vec::new();
    let mut o = Vec::new();
    let mut x = Vec::new();
    for part in 0..8i64 {
        for row in 0..37i64 {
            p.push(Some(part));
            o.push(Some((row * 7) % 37));
            x.push(Some((part * 31 + row * 13) % 97));
        }
    }
    let total = p.len();
    // Split into uneven chunks to exercise batching.
    let chunk_rows = [100, 50, 96, 50];
    let mut chunks = Vec::new();
    let mut offset = 0usize;
    for rows in chunk_rows {
        let end = (offset + rows).min(total);
        chunks.push(make_chunk(
            p[offset..end].to_vec(),
            o[offset..end].to_vec(),
            x[offset..end].to_vec(),
        ));
        offset = end;
    }
    (chunks, total)
}

fn collect_sorted_rows(out: &Chunk) -> Vec<(Option<i64>, Option<i64>, Option<i64>, Option<i64>)> {
    let p = i64_column(out, P_SLOT);
    let o = i64_column(out, O_SLOT);
    let x = i64_column(out, X_SLOT);
    let w = i64_column(out, SlotId(100));
    let mut rows: Vec<_> = (0..out.len()).map(|i| (p[i], o[i], x[i], w[i])).collect();
    rows.sort();
    rows
}

#[test]
fn output_is_independent_of_worker_counts() {
    let make_node = || {
        let mut builder = NodeBuilder::new();
        let one_a = builder.int_lit(1);
        let one_b = builder.int_lit(1);
        let x = builder.x;
        builder.node(
            true,
            true,
            vec![wexpr(
                WindowFunctionKind::Aggregate(AggFunction::Sum),
                vec![x],
                rows_frame(
                    FrameBoundary::PrecedingRows(one_a),
                    FrameBoundary::FollowingRows(one_b),
                ),
                100,
            )],
        )
    };

    let (chunks, total) = multi_partition_fixture();
    let (node, arena) = make_node();
    let serial = drive(node, arena, chunks.clone(), 1, 1).unwrap();
    assert_eq!(serial.len(), total);

    let (node, arena) = make_node();
    let parallel = drive(node, arena, chunks, 3, 4).unwrap();
    assert_eq!(parallel.len(), total);

    assert_eq!(collect_sorted_rows(&serial), collect_sorted_rows(&parallel));
}

#[test]
fn running_the_operator_twice_is_deterministic() {
    let make_node = || {
        let builder = NodeBuilder::new();
        builder.node(
            true,
            true,
            vec![wexpr(
                WindowFunctionKind::RowNumber,
                vec![],
                WindowFrame::default_frame(),
                100,
            )],
        )
    };
    let (chunks, _) = multi_partition_fixture();
    let (node, arena) = make_node();
    let first = drive(node, arena, chunks.clone(), 2, 2).unwrap();
    let (node, arena) = make_node();
    let second = drive(node, arena, chunks, 2, 2).unwrap();
    assert_eq!(collect_sorted_rows(&first), collect_sorted_rows(&second));
}

#[test]
fn row_number_is_permutation_within_each_partition() {
    let builder = NodeBuilder::new();
    let (node, arena) = builder.node(
        true,
        true,
        vec![wexpr(
            WindowFunctionKind::RowNumber,
            vec![],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let (chunks, _) = multi_partition_fixture();
    let out = drive(node, arena, chunks, 2, 3).unwrap();

    let p = i64_column(&out, P_SLOT);
    let w = i64_column(&out, SlotId(100));
    for part in 0..8i64 {
        let mut numbers: Vec<i64> = (0..out.len())
            .filter(|&i| p[i] == Some(part))
            .map(|i| w[i].unwrap())
            .collect();
        numbers.sort();
        assert_eq!(numbers, (1..=37).collect::<Vec<i64>>());
    }
}

#[test]
fn ntile_bucket_sizes_balance_within_partitions() {
    let mut builder = NodeBuilder::new();
    let five = builder.int_lit(5);
    let (node, arena) = builder.node(
        true,
        true,
        vec![wexpr(
            WindowFunctionKind::Ntile,
            vec![five],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let (chunks, _) = multi_partition_fixture();
    let out = drive(node, arena, chunks, 1, 2).unwrap();

    let p = i64_column(&out, P_SLOT);
    let w = i64_column(&out, SlotId(100));
    for part in 0..8i64 {
        let mut sizes = std::collections::HashMap::new();
        for i in 0..out.len() {
            if p[i] == Some(part) {
                *sizes.entry(w[i].unwrap()).or_insert(0usize) += 1;
            }
        }
        let total: usize = sizes.values().sum();
        assert_eq!(total, 37);
        let max = sizes.values().max().unwrap();
        let min = sizes.values().min().unwrap();
        assert!(max - min <= 1, "sizes={sizes:?}");
        assert_eq!(sizes.len(), 5);
    }
}

#[test]
fn lead_ignore_nulls_skips_null_payloads() {
    let mut builder = NodeBuilder::new();
    let x = builder.x;
    let (node, arena) = builder.node(
        false,
        true,
        vec![wexpr(
            WindowFunctionKind::Lead { ignore_nulls: true },
            vec![x],
            WindowFrame::default_frame(),
            100,
        )],
    );
    let input = make_chunk(
        vec![Some(0); 5],
        (0..5).map(|i| Some(i as i64)).collect(),
        vec![Some(1), None, None, Some(4), Some(5)],
    );
    let out = drive(node, arena, vec![input], 1, 1).unwrap();
    // LEAD(x) IGNORE NULLS: next non-null payload after each row.
    assert_eq!(
        i64_column(&out, SlotId(100)),
        vec![Some(4), Some(4), Some(4), Some(5), None]
    );
}
