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
//! Typed error conditions for the execution engine.
//!
//! Errors carry free-text messages only; there are no numeric codes. A
//! failing row aborts the current operator invocation and the error
//! propagates up the pipeline unchanged.

use arrow::error::ArrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Checked arithmetic left the representable range (e.g. ROWS offsets).
    #[error("Out of Range Error: {0}")]
    OutOfRange(String),

    /// Malformed user-supplied argument (e.g. NTILE with a non-positive count).
    #[error("Invalid Input Error: {0}")]
    InvalidInput(String),

    /// Broken invariant; the planner should have made this unreachable.
    #[error("Internal Error: {0}")]
    Internal(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        EngineError::OutOfRange(msg.into())
    }
}
