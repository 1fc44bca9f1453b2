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
//! Windowed analytic operator, split into a partition/sort sink and a
//! per-bin parallel source.
//!
//! Wiring: build one [`WindowSharedState`] per plan node, hand it to a
//! [`WindowSinkFactory`] and a [`WindowSourceFactory`]. Sink workers push
//! batches and combine on finishing; the last sink to finish sorts the hash
//! groups; source workers then claim bins through an atomic cursor and emit
//! output batches of input columns plus one window column per expression.

mod boundary_mask;
mod bounds;
mod executor;
mod input_column;
mod partition_state;
mod segment_tree;
mod source;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::common::config;
use crate::common::error::{EngineError, Result};
use crate::exec::chunk::Chunk;
use crate::exec::expr::ExprArena;
use crate::exec::node::analytic::{AnalyticNode, FrameKind};
use crate::exec::pipeline::operator::{Operator, ProcessorOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::runtime::runtime_state::RuntimeState;

use partition_state::{WindowGlobalSinkState, WindowLocalSinkState};
use source::{WindowSourceShared, WindowSourceState};

/// Shared state connecting the sink and source factories of one window node.
#[derive(Clone, Debug)]
pub struct WindowSharedState {
    node: Arc<AnalyticNode>,
    arena: Arc<ExprArena>,
    global: Arc<WindowGlobalSinkState>,
    source: Arc<WindowSourceShared>,
    pending_sinks: Arc<AtomicUsize>,
}

impl WindowSharedState {
    pub fn new(node: AnalyticNode, arena: ExprArena) -> Result<Self> {
        for wexpr in &node.window_exprs {
            if matches!(wexpr.frame.kind, FrameKind::Groups) {
                return Err(EngineError::invalid_input(
                    "GROUPS window frames are not implemented",
                ));
            }
            let has_range_offset = wexpr.frame.start.offset_expr().is_some()
                && wexpr.frame.start.needs_peer()
                || wexpr.frame.end.offset_expr().is_some() && wexpr.frame.end.needs_peer();
            if has_range_offset && node.order_by.len() != 1 {
                return Err(EngineError::invalid_input(
                    "RANGE frames require exactly one ORDER BY expression",
                ));
            }
        }
        let node = Arc::new(node);
        let arena = Arc::new(arena);
        let global = Arc::new(WindowGlobalSinkState::new(
            Arc::clone(&node),
            Arc::clone(&arena),
        ));
        Ok(Self {
            node,
            arena,
            global,
            source: Arc::new(WindowSourceShared::new()),
            pending_sinks: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn node(&self) -> &AnalyticNode {
        &self.node
    }
}

/// Builds sink operators that route and buffer input batches.
pub struct WindowSinkFactory {
    name: String,
    shared: WindowSharedState,
}

impl WindowSinkFactory {
    pub fn new(shared: WindowSharedState) -> Self {
        Self {
            name: "WindowSink".to_string(),
            shared,
        }
    }
}

impl OperatorFactory for WindowSinkFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, _driver_id: i32) -> Box<dyn Operator> {
        self.shared.pending_sinks.fetch_add(1, Ordering::AcqRel);
        Box::new(WindowSinkOperator {
            name: self.name.clone(),
            shared: self.shared.clone(),
            local: Some(self.shared.global.local()),
            finished: false,
        })
    }

    fn is_sink(&self) -> bool {
        true
    }
}

struct WindowSinkOperator {
    name: String,
    shared: WindowSharedState,
    local: Option<WindowLocalSinkState>,
    finished: bool,
}

impl Operator for WindowSinkOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        Some(self)
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        Some(self)
    }
}

impl ProcessorOperator for WindowSinkOperator {
    fn need_input(&self) -> bool {
        !self.finished
    }

    fn has_output(&self) -> bool {
        false
    }

    fn push_chunk(&mut self, state: &RuntimeState, chunk: Chunk) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let local = self
            .local
            .as_mut()
            .ok_or_else(|| EngineError::internal("window sink already combined"))?;
        local.sink(state, chunk)
    }

    fn pull_chunk(&mut self, _state: &RuntimeState) -> Result<Option<Chunk>> {
        Ok(None)
    }

    /// Combine this worker's buffers into the global state; the last sink
    /// standing sorts the hash groups.
    fn set_finishing(&mut self, state: &RuntimeState) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if let Some(local) = self.local.take() {
            self.shared.global.combine(local);
        }
        if self.shared.pending_sinks.fetch_sub(1, Ordering::AcqRel) == 1 {
            WindowGlobalSinkState::finalize(&self.shared.global, state)?;
        }
        self.finished = true;
        Ok(())
    }
}

/// Builds source operators that drain sorted bins in parallel.
pub struct WindowSourceFactory {
    name: String,
    shared: WindowSharedState,
}

impl WindowSourceFactory {
    pub fn new(shared: WindowSharedState) -> Self {
        Self {
            name: "WindowSource".to_string(),
            shared,
        }
    }
}

impl OperatorFactory for WindowSourceFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, _driver_id: i32) -> Box<dyn Operator> {
        Box::new(WindowSourceOperator {
            name: self.name.clone(),
            shared: self.shared.clone(),
            state: WindowSourceState::new(
                Arc::clone(&self.shared.node),
                Arc::clone(&self.shared.arena),
                Arc::clone(&self.shared.global),
                Arc::clone(&self.shared.source),
            ),
        })
    }

    fn is_source(&self) -> bool {
        true
    }

    /// One thread per hash group pays off only past a row threshold.
    fn max_threads(&self) -> usize {
        if self.shared.global.row_count() >= config::window_source_parallel_row_threshold() {
            self.shared.global.num_bins().max(1)
        } else {
            1
        }
    }
}

struct WindowSourceOperator {
    name: String,
    shared: WindowSharedState,
    state: WindowSourceState,
}

impl Operator for WindowSourceOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_finished(&self) -> bool {
        self.state.is_done()
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        Some(self)
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        Some(self)
    }
}

impl ProcessorOperator for WindowSourceOperator {
    fn need_input(&self) -> bool {
        false
    }

    fn has_output(&self) -> bool {
        self.shared.global.is_sorted() && !self.state.is_done()
    }

    fn push_chunk(&mut self, _state: &RuntimeState, _chunk: Chunk) -> Result<()> {
        Err(EngineError::internal(
            "window source operator does not accept input",
        ))
    }

    fn pull_chunk(&mut self, state: &RuntimeState) -> Result<Option<Chunk>> {
        if !self.shared.global.is_sorted() {
            return Ok(None);
        }
        self.state.next_chunk(state)
    }

    fn set_finishing(&mut self, _state: &RuntimeState) -> Result<()> {
        Ok(())
    }
}
