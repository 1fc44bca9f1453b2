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
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::config;
use crate::runtime::mem_tracker::MemTracker;

/// Per-query execution context shared by every operator of a pipeline.
///
/// Carries the batch size, the cooperative cancellation flag (checked between
/// batches, never mid-batch) and the first error reported by any worker.
#[derive(Debug, Default)]
pub struct RuntimeState {
    batch_size: Option<usize>,
    cancelled: AtomicBool,
    error_state: Mutex<Option<String>>,
    mem_tracker: Option<Arc<MemTracker>>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mem_tracker(mut self, tracker: Arc<MemTracker>) -> Self {
        self.mem_tracker = Some(tracker);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or_else(config::vector_size)
    }

    pub fn mem_tracker(&self) -> Option<Arc<MemTracker>> {
        self.mem_tracker.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Latch the first error; later errors are dropped.
    pub fn set_error(&self, err: String) {
        let mut guard = self.error_state.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(err);
        }
    }

    pub fn error(&self) -> Option<String> {
        self.error_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
