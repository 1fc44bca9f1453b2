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
//! Per-worker source side of the window operator.
//!
//! Workers claim hash bins through a shared atomic cursor. For each claimed
//! bin: build the partition/peer masks, run the executors' first pass over
//! the sorted rows, finalize, then stream output batches that reference the
//! input columns and append one window column per expression.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::common::config;
use crate::common::error::Result;
use crate::exec::chunk::{Chunk, field_with_slot_id};
use crate::exec::expr::ExprArena;
use crate::exec::node::analytic::AnalyticNode;
use crate::quartzite_logging::debug;
use crate::runtime::runtime_state::RuntimeState;

use super::boundary_mask::BoundaryMask;
use super::executor::WindowExecutor;
use super::partition_state::{WindowGlobalSinkState, WindowHashGroup};

/// The only cross-thread mutable state of the source phase.
#[derive(Debug)]
pub(crate) struct WindowSourceShared {
    next_bin: AtomicUsize,
}

impl WindowSourceShared {
    pub(crate) fn new() -> Self {
        Self {
            next_bin: AtomicUsize::new(0),
        }
    }
}

/// One claimed bin mid-drain.
struct BinScan {
    chunk: Chunk,
    count: usize,
    partition_mask: BoundaryMask,
    order_mask: BoundaryMask,
    executors: Vec<WindowExecutor>,
    output_schema: SchemaRef,
    pos: usize,
}

/// Per-worker source state.
pub(crate) struct WindowSourceState {
    node: Arc<AnalyticNode>,
    arena: Arc<ExprArena>,
    global: Arc<WindowGlobalSinkState>,
    shared: Arc<WindowSourceShared>,
    current: Option<BinScan>,
    done: bool,
}

impl WindowSourceState {
    pub(crate) fn new(
        node: Arc<AnalyticNode>,
        arena: Arc<ExprArena>,
        global: Arc<WindowGlobalSinkState>,
        shared: Arc<WindowSourceShared>,
    ) -> Self {
        Self {
            node,
            arena,
            global,
            shared,
            current: None,
            done: false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    fn generate_partition(&self, bin: usize, group: WindowHashGroup) -> Result<BinScan> {
        let count = group.count;
        debug!("window source claims bin {} ({} rows)", bin, count);

        let mut partition_mask = BoundaryMask::new_zeroed(count);
        let mut order_mask = BoundaryMask::new_zeroed(count);
        let partition_keys = self
            .node
            .partition_exprs
            .iter()
            .map(|&e| self.arena.eval(e, &group.chunk))
            .collect::<Result<Vec<_>>>()?;
        let order_keys = self
            .node
            .order_by
            .iter()
            .map(|o| self.arena.eval(o.expr, &group.chunk))
            .collect::<Result<Vec<_>>>()?;
        group.compute_masks(&mut partition_mask, &mut order_mask, &partition_keys, &order_keys)?;

        let mut executors = Vec::with_capacity(self.node.window_exprs.len());
        for wexpr in &self.node.window_exprs {
            executors.push(WindowExecutor::new(
                wexpr,
                &self.node,
                Arc::clone(&self.arena),
                &partition_mask,
                count,
            )?);
        }

        // First pass: fold the sorted rows into every executor.
        let step = config::vector_size();
        let mut input_idx = 0usize;
        while input_idx < count {
            let len = step.min(count - input_idx);
            let slice = group.chunk.slice(input_idx, len);
            for executor in executors.iter_mut() {
                executor.sink(&slice, input_idx)?;
            }
            input_idx += len;
        }
        for executor in executors.iter_mut() {
            executor.finalize()?;
        }

        // Output schema: input columns as-is, then one field per window
        // expression in declaration order.
        let mut fields: Vec<Field> = group
            .chunk
            .schema()
            .fields()
            .iter()
            .map(|f| (**f).clone())
            .collect();
        for (idx, (wexpr, executor)) in
            self.node.window_exprs.iter().zip(executors.iter()).enumerate()
        {
            let field = Field::new(
                format!("window_{}", idx),
                executor.result_type().clone(),
                true,
            );
            fields.push(field_with_slot_id(field, wexpr.output_slot));
        }
        let output_schema = Arc::new(Schema::new(fields));

        Ok(BinScan {
            chunk: group.chunk,
            count,
            partition_mask,
            order_mask,
            executors,
            output_schema,
            pos: 0,
        })
    }

    /// Pull the next output batch; every batch comes from exactly one bin.
    pub(crate) fn next_chunk(&mut self, state: &RuntimeState) -> Result<Option<Chunk>> {
        loop {
            if self.done || state.is_cancelled() {
                self.done = true;
                return Ok(None);
            }

            if self.current.as_ref().is_some_and(|s| s.pos >= s.count) {
                self.current = None;
            }

            if let Some(scan) = self.current.as_mut() {
                let len = state.batch_size().min(scan.count - scan.pos);
                let input = scan.chunk.slice(scan.pos, len);
                let mut columns = input.columns().to_vec();
                for executor in scan.executors.iter_mut() {
                    columns.push(executor.evaluate(
                        scan.pos,
                        &input,
                        &scan.partition_mask,
                        &scan.order_mask,
                    )?);
                }
                let batch = RecordBatch::try_new(Arc::clone(&scan.output_schema), columns)?;
                scan.pos += len;
                return Ok(Some(Chunk::try_new(batch)?));
            }

            // Claim the next non-empty bin.
            let bin = self.shared.next_bin.fetch_add(1, Ordering::AcqRel);
            if bin >= self.global.num_bins() {
                self.done = true;
                return Ok(None);
            }
            if let Some(group) = self.global.take_group(bin) {
                self.current = Some(self.generate_partition(bin, group)?);
            }
        }
    }
}
