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

//! Batch-level SUM accumulators over arrow arrays
//!
//! [`SumAccumulator`] and [`SlidingSumAccumulator`] drive the generic
//! [`SumOperation`] over `PrimitiveArray` batches, honoring each array's
//! validity buffer. [`create_sum_accumulator`] and friends pick the add
//! policy from the input [`DataType`].

use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

use arrow::array::{Array, ArrayRef, AsArray, PrimitiveArray};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type,
    UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use log::debug;

use sumfold_common::{internal_err, internal_sumfold_err, not_impl_err, Result};

use crate::sum::{
    RegularAdd, SeenValues, StateOp, SumAdd, SumOperation, SumRetract, SumState, SumValue,
    ValueCount, WideAdd,
};
use crate::wide_int::WideInt;

/// Scalar values exchanged with the surrounding framework: final results
/// and partial aggregation states. `None` encodes SQL NULL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SumScalar {
    /// A wide integer total; convert via [`WideInt::to_i128`] for
    /// `Decimal128` storage
    Wide(Option<WideInt>),
    Int64(Option<i64>),
    UInt64(Option<u64>),
    Float64(Option<f64>),
}

/// Running-total types that can cross the [`SumScalar`] boundary
pub trait ScalarRepr: SumValue {
    fn to_scalar(value: Option<Self>) -> SumScalar;
    fn from_scalar(scalar: &SumScalar) -> Result<Option<Self>>;
}

macro_rules! scalar_repr {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl ScalarRepr for $t {
            fn to_scalar(value: Option<Self>) -> SumScalar {
                SumScalar::$variant(value)
            }

            fn from_scalar(scalar: &SumScalar) -> Result<Option<Self>> {
                match scalar {
                    SumScalar::$variant(value) => Ok(*value),
                    other => internal_err!(
                        "partial sum state has unexpected type: {other:?}"
                    ),
                }
            }
        }
    )*};
}
scalar_repr!(
    WideInt => Wide,
    i64 => Int64,
    u64 => UInt64,
    f64 => Float64,
);

/// A per-group accumulator driven by the batch executor
pub trait Accumulator: Debug + Send {
    /// Fold every non-null element of `values` into the state
    fn update_batch(&mut self, values: &ArrayRef) -> Result<()>;

    /// Fold a run of `count` copies of the single value in `value`; the
    /// run contributes nothing when that value is null
    fn update_run(&mut self, value: &ArrayRef, count: usize) -> Result<()>;

    /// The partial state to ship to another instance's [`merge_state`]
    ///
    /// [`merge_state`]: Accumulator::merge_state
    fn state(&self) -> Vec<SumScalar>;

    /// Merge a partial state produced by [`state`] on another instance
    ///
    /// [`state`]: Accumulator::state
    fn merge_state(&mut self, state: &[SumScalar]) -> Result<()>;

    /// Remove previously folded values, for sliding window frames
    fn retract_batch(&mut self, _values: &ArrayRef) -> Result<()> {
        internal_err!("retract_batch is only implemented for sliding accumulators")
    }

    fn supports_retract_batch(&self) -> bool {
        false
    }

    /// The final value of the aggregate
    fn evaluate(&self) -> SumScalar;

    /// Allocated size of this accumulator in bytes
    fn size(&self) -> usize;
}

fn as_sum_input<T: ArrowPrimitiveType>(values: &ArrayRef) -> Result<&PrimitiveArray<T>> {
    values.as_primitive_opt::<T>().ok_or_else(|| {
        internal_sumfold_err!(
            "sum accumulator for {} fed a {} array",
            T::DATA_TYPE,
            values.data_type()
        )
    })
}

/// Feed every element of `values` through the driver. The validity
/// buffer is dropped when it marks nothing null, keeping the per-element
/// check out of the common all-valid case.
fn accumulate_array<T, A, Op>(
    state: &mut SumState<A::Accumulator, Op>,
    values: &ArrayRef,
) -> Result<()>
where
    T: ArrowPrimitiveType,
    A: SumAdd<T::Native>,
    Op: StateOp,
{
    let values = as_sum_input::<T>(values)?;
    let data: &[T::Native] = values.values();
    let validity = values.nulls().filter(|nulls| nulls.null_count() > 0);
    for idx in 0..data.len() {
        SumOperation::<A, Op>::operation(state, data, validity, idx);
    }
    Ok(())
}

fn accumulate_run<T, A, Op>(
    state: &mut SumState<A::Accumulator, Op>,
    value: &ArrayRef,
    count: usize,
) -> Result<()>
where
    T: ArrowPrimitiveType,
    A: SumAdd<T::Native>,
    Op: StateOp,
{
    let value = as_sum_input::<T>(value)?;
    if value.len() != 1 {
        return internal_err!(
            "a constant run must be a single-row array, got {} rows",
            value.len()
        );
    }
    let data: &[T::Native] = value.values();
    SumOperation::<A, Op>::constant_operation(state, data, value.nulls(), count);
    Ok(())
}

/// This accumulator computes SUM incrementally, finalizing to NULL when
/// no value was ever folded
pub struct SumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumAdd<T::Native>,
    A::Accumulator: ScalarRepr,
{
    state: SumState<A::Accumulator, SeenValues>,
    _input: PhantomData<T>,
}

impl<T, A> SumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumAdd<T::Native>,
    A::Accumulator: ScalarRepr,
{
    pub fn new() -> Self {
        let mut state = SumState::default();
        SumOperation::<A, SeenValues>::initialize(&mut state);
        Self {
            state,
            _input: PhantomData,
        }
    }
}

impl<T, A> Default for SumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumAdd<T::Native>,
    A::Accumulator: ScalarRepr,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> Debug for SumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumAdd<T::Native>,
    A::Accumulator: ScalarRepr,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SumAccumulator({})", T::DATA_TYPE)
    }
}

impl<T, A> Accumulator for SumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumAdd<T::Native>,
    A::Accumulator: ScalarRepr,
{
    fn update_batch(&mut self, values: &ArrayRef) -> Result<()> {
        accumulate_array::<T, A, SeenValues>(&mut self.state, values)
    }

    fn update_run(&mut self, value: &ArrayRef, count: usize) -> Result<()> {
        accumulate_run::<T, A, SeenValues>(&mut self.state, value, count)
    }

    fn state(&self) -> Vec<SumScalar> {
        vec![self.evaluate()]
    }

    fn merge_state(&mut self, state: &[SumScalar]) -> Result<()> {
        let [scalar] = state else {
            return internal_err!("sum merge expects one state value, got {}", state.len());
        };
        if let Some(value) = <A::Accumulator as ScalarRepr>::from_scalar(scalar)? {
            let partial = SumState {
                value,
                tracker: SeenValues { seen: true },
            };
            SumOperation::<A, SeenValues>::combine(&partial, &mut self.state);
        }
        Ok(())
    }

    fn evaluate(&self) -> SumScalar {
        let value = self.state.tracker.seen.then_some(self.state.value);
        <A::Accumulator as ScalarRepr>::to_scalar(value)
    }

    fn size(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

/// This accumulator incrementally computes sums over a sliding window
///
/// This is separate from [`SumAccumulator`] as it requires additional
/// state: the row count decides when a drained window reads as NULL, and
/// retraction needs an add policy that can also subtract.
pub struct SlidingSumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumRetract<T::Native>,
    A::Accumulator: ScalarRepr,
{
    state: SumState<A::Accumulator, ValueCount>,
    _input: PhantomData<T>,
}

impl<T, A> SlidingSumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumRetract<T::Native>,
    A::Accumulator: ScalarRepr,
{
    pub fn new() -> Self {
        let mut state = SumState::default();
        SumOperation::<A, ValueCount>::initialize(&mut state);
        Self {
            state,
            _input: PhantomData,
        }
    }
}

impl<T, A> Default for SlidingSumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumRetract<T::Native>,
    A::Accumulator: ScalarRepr,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> Debug for SlidingSumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumRetract<T::Native>,
    A::Accumulator: ScalarRepr,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SlidingSumAccumulator({})", T::DATA_TYPE)
    }
}

impl<T, A> Accumulator for SlidingSumAccumulator<T, A>
where
    T: ArrowPrimitiveType + Send,
    A: SumRetract<T::Native>,
    A::Accumulator: ScalarRepr,
{
    fn update_batch(&mut self, values: &ArrayRef) -> Result<()> {
        accumulate_array::<T, A, ValueCount>(&mut self.state, values)
    }

    fn update_run(&mut self, value: &ArrayRef, count: usize) -> Result<()> {
        accumulate_run::<T, A, ValueCount>(&mut self.state, value, count)
    }

    fn state(&self) -> Vec<SumScalar> {
        vec![self.evaluate(), SumScalar::UInt64(Some(self.state.tracker.count))]
    }

    fn merge_state(&mut self, state: &[SumScalar]) -> Result<()> {
        let [scalar, rows] = state else {
            return internal_err!(
                "sliding sum merge expects a value and a row count, got {} values",
                state.len()
            );
        };
        let SumScalar::UInt64(Some(rows)) = rows else {
            return internal_err!("sliding sum merge expects a row count, got {rows:?}");
        };
        if let Some(value) = <A::Accumulator as ScalarRepr>::from_scalar(scalar)? {
            let partial = SumState {
                value,
                tracker: ValueCount { count: *rows },
            };
            SumOperation::<A, ValueCount>::combine(&partial, &mut self.state);
        }
        Ok(())
    }

    fn retract_batch(&mut self, values: &ArrayRef) -> Result<()> {
        let values = as_sum_input::<T>(values)?;
        let data: &[T::Native] = values.values();
        match values.nulls().filter(|nulls| nulls.null_count() > 0) {
            None => {
                for &value in data {
                    A::retract_number(&mut self.state.value, value);
                }
            }
            Some(nulls) => {
                for (idx, &value) in data.iter().enumerate() {
                    if nulls.is_valid(idx) {
                        A::retract_number(&mut self.state.value, value);
                    }
                }
            }
        }
        self.state.tracker.count -= (values.len() - values.null_count()) as u64;
        Ok(())
    }

    fn supports_retract_batch(&self) -> bool {
        true
    }

    fn evaluate(&self) -> SumScalar {
        let value = (self.state.tracker.count != 0).then_some(self.state.value);
        <A::Accumulator as ScalarRepr>::to_scalar(value)
    }

    fn size(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

/// Create the SUM accumulator for values of `data_type`.
///
/// Integer inputs of every width accumulate into a wide total so that
/// overflow escalates into the high limb instead of wrapping; `Float64`
/// accumulates natively. Only a subset of numeric types is supported
/// directly, relying on type coercion upstream for the rest.
pub fn create_sum_accumulator(data_type: &DataType) -> Result<Box<dyn Accumulator>> {
    debug!("creating SUM accumulator for {data_type}");
    Ok(match data_type {
        DataType::Int8 => Box::new(SumAccumulator::<Int8Type, WideAdd>::new()),
        DataType::Int16 => Box::new(SumAccumulator::<Int16Type, WideAdd>::new()),
        DataType::Int32 => Box::new(SumAccumulator::<Int32Type, WideAdd>::new()),
        DataType::Int64 => Box::new(SumAccumulator::<Int64Type, WideAdd>::new()),
        DataType::UInt8 => Box::new(SumAccumulator::<UInt8Type, WideAdd>::new()),
        DataType::UInt16 => Box::new(SumAccumulator::<UInt16Type, WideAdd>::new()),
        DataType::UInt32 => Box::new(SumAccumulator::<UInt32Type, WideAdd>::new()),
        DataType::UInt64 => Box::new(SumAccumulator::<UInt64Type, WideAdd>::new()),
        DataType::Float64 => Box::new(SumAccumulator::<Float64Type, RegularAdd>::new()),
        _ => return not_impl_err!("SUM not supported for {data_type}"),
    })
}

/// Create a SUM accumulator that keeps native arithmetic even for
/// integers, for callers that have proven overflow impossible (e.g. from
/// statistics on the input domain)
pub fn create_sum_no_overflow(data_type: &DataType) -> Result<Box<dyn Accumulator>> {
    debug!("creating no-overflow SUM accumulator for {data_type}");
    Ok(match data_type {
        DataType::Int64 => Box::new(SumAccumulator::<Int64Type, RegularAdd>::new()),
        DataType::UInt64 => Box::new(SumAccumulator::<UInt64Type, RegularAdd>::new()),
        DataType::Float64 => Box::new(SumAccumulator::<Float64Type, RegularAdd>::new()),
        _ => return not_impl_err!("SUM without overflow checks not supported for {data_type}"),
    })
}

/// Create the sliding-window SUM accumulator for values of `data_type`
pub fn create_sliding_sum_accumulator(data_type: &DataType) -> Result<Box<dyn Accumulator>> {
    debug!("creating sliding SUM accumulator for {data_type}");
    Ok(match data_type {
        DataType::Int8 => Box::new(SlidingSumAccumulator::<Int8Type, WideAdd>::new()),
        DataType::Int16 => Box::new(SlidingSumAccumulator::<Int16Type, WideAdd>::new()),
        DataType::Int32 => Box::new(SlidingSumAccumulator::<Int32Type, WideAdd>::new()),
        DataType::Int64 => Box::new(SlidingSumAccumulator::<Int64Type, WideAdd>::new()),
        DataType::UInt8 => Box::new(SlidingSumAccumulator::<UInt8Type, WideAdd>::new()),
        DataType::UInt16 => Box::new(SlidingSumAccumulator::<UInt16Type, WideAdd>::new()),
        DataType::UInt32 => Box::new(SlidingSumAccumulator::<UInt32Type, WideAdd>::new()),
        DataType::UInt64 => Box::new(SlidingSumAccumulator::<UInt64Type, WideAdd>::new()),
        DataType::Float64 => Box::new(SlidingSumAccumulator::<Float64Type, RegularAdd>::new()),
        _ => return not_impl_err!("sliding SUM not supported for {data_type}"),
    })
}
