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

//! Overflow-safe vectorized SUM accumulation kernels for columnar
//! execution.
//!
//! The crate provides the numeric core of SUM-family aggregates: folding
//! batches of native values into one running total per group, with
//! integer overflow escalated into a software-emulated 128-bit total
//! ([`WideInt`]) instead of wrapping, and constant runs folded in O(1)
//! via an adaptive cost model.
//!
//! Three layers compose at compile time:
//!
//! - [`WideInt`]: two 64-bit limbs with explicit carry/borrow arithmetic
//! - add policies [`RegularAdd`] / [`WideAdd`] and state policies
//!   [`SeenValues`] / [`ValueCount`], bound together by the generic
//!   driver [`SumOperation`]
//! - the batch surface: [`Accumulator`] implementations driven over
//!   arrow `PrimitiveArray`s, created via [`create_sum_accumulator`]
//!
//! ```
//! use std::sync::Arc;
//! use arrow::array::{ArrayRef, Int64Array};
//! use arrow::datatypes::DataType;
//! use sumfold::{create_sum_accumulator, SumScalar};
//!
//! # fn main() -> sumfold::Result<()> {
//! let mut acc = create_sum_accumulator(&DataType::Int64)?;
//! let batch: ArrayRef = Arc::new(Int64Array::from(vec![Some(i64::MAX), None, Some(1)]));
//! acc.update_batch(&batch)?;
//! match acc.evaluate() {
//!     SumScalar::Wide(Some(total)) => assert_eq!(total.to_i128(), i64::MAX as i128 + 1),
//!     other => panic!("unexpected result {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

// Make sure fast / cheap clones on Arc are explicit
#![deny(clippy::clone_on_ref_ptr)]

pub mod accumulator;
pub mod sum;
pub mod wide_int;

pub use accumulator::{
    create_sliding_sum_accumulator, create_sum_accumulator, create_sum_no_overflow, Accumulator,
    ScalarRepr, SlidingSumAccumulator, SumAccumulator, SumScalar,
};
pub use sum::{
    RegularAdd, RunCostModel, SeenValues, StateOp, SumAdd, SumOperation, SumRetract, SumState,
    SumValue, ValueCount, WideAdd, DEFAULT_MAX_BATCH_SIZE, DEFAULT_SMALL_RUN_LIMIT,
};
pub use wide_int::WideInt;

pub use sumfold_common::{Result, SumfoldError};
