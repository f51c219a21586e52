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

//! SUM accumulation policies and the generic vectorized driver
//!
//! The pieces compose at compile time: an add policy ([`RegularAdd`] or
//! [`WideAdd`]) decides how one value is folded into the running total,
//! a state policy ([`SeenValues`] or [`ValueCount`]) owns the null/row
//! bookkeeping and partial-state merging, and [`SumOperation`] binds the
//! two into the four operations a vectorized aggregate executor needs.

use std::fmt::Debug;
use std::marker::PhantomData;

use arrow::array::ArrowNativeTypeOp;
use arrow::buffer::NullBuffer;

use crate::wide_int::WideInt;

/// Default upper bound on the number of rows in one input batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 2048;

/// Default run length below which repeating single adds beats a wide
/// multiplication
pub const DEFAULT_SMALL_RUN_LIMIT: usize = 8;

/// Tunable cost-model constants for folding a repeated value into a wide
/// accumulator.
///
/// These influence only which arithmetic executes; every strategy yields
/// bit-identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunCostModel {
    /// Largest batch (and therefore run) the executor will ever submit.
    /// Must be non-zero.
    pub max_batch_size: usize,
    /// Runs shorter than this are folded by repeated single adds
    pub small_run_limit: usize,
}

impl RunCostModel {
    /// The model used by the trait-level constant path
    pub const DEFAULT: Self = Self {
        max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        small_run_limit: DEFAULT_SMALL_RUN_LIMIT,
    };

    /// Values below this bound cannot overflow a `u64` when multiplied by
    /// any permissible run length.
    ///
    /// The bound is checked against the maximum batch size rather than the
    /// runtime count, trading a few unnecessary wide multiplications for a
    /// comparison against a constant. The quotient is still large
    /// (`2^64 / 2048`), so most non-negative inputs qualify.
    pub fn fast_multiply_bound(&self) -> u64 {
        debug_assert!(self.max_batch_size > 0);
        u64::MAX / self.max_batch_size as u64
    }
}

impl Default for RunCostModel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Running-total value types the driver knows how to zero and merge.
///
/// `merge` folds a partial total from another state into `self` with the
/// same wrapping semantics the owning add policy uses.
pub trait SumValue: Debug + Default + Copy + Send {
    fn merge(&mut self, other: Self);
}

macro_rules! native_sum_value {
    ($($t:ty),* $(,)?) => {$(
        impl SumValue for $t {
            fn merge(&mut self, other: Self) {
                *self = self.add_wrapping(other);
            }
        }
    )*};
}
native_sum_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, i128);

impl SumValue for WideInt {
    fn merge(&mut self, other: Self) {
        *self = self.wrapping_add(other);
    }
}

/// Policy folding native input values into a running total
pub trait SumAdd<T> {
    /// The running-total type this policy maintains
    type Accumulator: SumValue;

    /// Fold one value into the total
    fn add_number(acc: &mut Self::Accumulator, input: T);

    /// Fold `input` repeated `count` times into the total
    fn add_constant(acc: &mut Self::Accumulator, input: T, count: usize);
}

/// Add policy extension for accumulators that must also un-fold values,
/// e.g. when a window slides
pub trait SumRetract<T>: SumAdd<T> {
    /// Fold the negation of `input` into the total
    fn retract_number(acc: &mut Self::Accumulator, input: T);
}

/// Adds native-width values directly into a native-width total.
///
/// No overflow handling: the accumulator type is trusted to be wide
/// enough for the caller's numeric domain (floating point, or an integer
/// the caller already widened, such as an `i128` decimal total).
#[derive(Debug)]
pub struct RegularAdd;

impl<T: ArrowNativeTypeOp + SumValue> SumAdd<T> for RegularAdd {
    type Accumulator = T;

    fn add_number(acc: &mut T, input: T) {
        *acc = acc.add_wrapping(input);
    }

    fn add_constant(acc: &mut T, input: T, count: usize) {
        *acc = acc.add_wrapping(input.mul_wrapping(T::usize_as(count)));
    }
}

impl<T: ArrowNativeTypeOp + SumValue> SumRetract<T> for RegularAdd {
    fn retract_number(acc: &mut T, input: T) {
        *acc = acc.sub_wrapping(input);
    }
}

/// Adds native-width integers into a [`WideInt`] total, detecting
/// overflow on every add and carrying into the high limb.
#[derive(Debug)]
pub struct WideAdd;

impl WideAdd {
    /// Add a value encoded as its two's complement 64-bit pattern with an
    /// explicit sign flag.
    ///
    /// `bits` is the sign-extended (signed inputs) or zero-extended
    /// (unsigned inputs) encoding of the addend. Two situations require a
    /// high-limb adjustment:
    ///
    /// 1. the input is non-negative and the low limb wrapped: carry `+1`
    /// 2. the input is negative and the low limb did NOT wrap: borrow `-1`
    ///
    /// Both collapse into the single test below, which is what makes the
    /// pair reproduce true double-width signed addition.
    pub fn add_value(acc: &mut WideInt, bits: u64, non_negative: bool) {
        acc.low = acc.low.wrapping_add(bits);
        let overflow = acc.low < bits;
        if overflow == non_negative {
            acc.high = acc.high.wrapping_add(if non_negative { 1 } else { -1 });
        }
    }

    /// Fold a run of `count` copies of the value encoded by
    /// (`bits`, `non_negative`), choosing among three strategies by cost:
    ///
    /// - if the value times any permissible run length fits a `u64`,
    ///   multiply natively and perform a single [`WideAdd::add_value`]
    /// - for very short runs, repeat the single add
    /// - otherwise promote to [`WideInt`] and add the wide product
    pub fn add_constant_with(
        acc: &mut WideInt,
        bits: u64,
        non_negative: bool,
        count: usize,
        cost: &RunCostModel,
    ) {
        debug_assert!(count <= cost.max_batch_size);
        if non_negative && bits < cost.fast_multiply_bound() {
            Self::add_value(acc, bits * count as u64, true);
        } else if count < cost.small_run_limit {
            for _ in 0..count {
                Self::add_value(acc, bits, non_negative);
            }
        } else {
            let run = WideInt::from_parts(bits, if non_negative { 0 } else { -1 });
            *acc = acc.wrapping_add(run.wrapping_mul_u64(count as u64));
        }
    }
}

macro_rules! wide_add_signed {
    ($($t:ty),* $(,)?) => {$(
        impl SumAdd<$t> for WideAdd {
            type Accumulator = WideInt;

            fn add_number(acc: &mut WideInt, input: $t) {
                Self::add_value(acc, input as i64 as u64, input >= 0);
            }

            fn add_constant(acc: &mut WideInt, input: $t, count: usize) {
                Self::add_constant_with(
                    acc,
                    input as i64 as u64,
                    input >= 0,
                    count,
                    &RunCostModel::DEFAULT,
                );
            }
        }

        impl SumRetract<$t> for WideAdd {
            fn retract_number(acc: &mut WideInt, input: $t) {
                // wrapping_neg maps i64::MIN to its own bit pattern, which
                // with the non-negative flag is read as +2^63, the exact
                // negation
                let bits = (input as i64).wrapping_neg() as u64;
                Self::add_value(acc, bits, input <= 0);
            }
        }
    )*};
}
wide_add_signed!(i8, i16, i32, i64);

macro_rules! wide_add_unsigned {
    ($($t:ty),* $(,)?) => {$(
        impl SumAdd<$t> for WideAdd {
            type Accumulator = WideInt;

            fn add_number(acc: &mut WideInt, input: $t) {
                Self::add_value(acc, input as u64, true);
            }

            fn add_constant(acc: &mut WideInt, input: $t, count: usize) {
                Self::add_constant_with(
                    acc,
                    input as u64,
                    true,
                    count,
                    &RunCostModel::DEFAULT,
                );
            }
        }

        impl SumRetract<$t> for WideAdd {
            fn retract_number(acc: &mut WideInt, input: $t) {
                let bits = (input as u64).wrapping_neg();
                Self::add_value(acc, bits, input == 0);
            }
        }
    )*};
}
wide_add_unsigned!(u8, u16, u32, u64);

/// Per-group accumulation state: the running total plus whatever
/// bookkeeping the state policy owns.
///
/// One instance exists per distinct group key; creation, merging and
/// destruction are driven by the surrounding execution framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumState<V, Op> {
    /// The running total
    pub value: V,
    /// State owned by the [`StateOp`] policy
    pub tracker: Op,
}

/// Bookkeeping policy layered over the running total: owns null/row
/// accounting and the rules for merging two partial states.
pub trait StateOp: Debug + Default + Copy + Send {
    /// Reset the bookkeeping for a freshly initialized state
    fn initialize(&mut self);

    /// Record that `count` values were folded into the state
    fn add_values(&mut self, count: usize);

    /// Merge one partial state into another, value included
    fn combine<V: SumValue>(source: &SumState<V, Self>, target: &mut SumState<V, Self>);
}

/// Tracks whether any value has been folded at all; a sum over zero rows
/// finalizes to NULL rather than zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeenValues {
    /// True once at least one non-null value contributed
    pub seen: bool,
}

impl StateOp for SeenValues {
    fn initialize(&mut self) {
        self.seen = false;
    }

    fn add_values(&mut self, count: usize) {
        self.seen |= count > 0;
    }

    fn combine<V: SumValue>(source: &SumState<V, Self>, target: &mut SumState<V, Self>) {
        target.tracker.seen |= source.tracker.seen;
        target.value.merge(source.value);
    }
}

/// Counts folded rows, for accumulators that retract values and must
/// know when their window has drained.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCount {
    /// Number of values currently folded into the total
    pub count: u64,
}

impl StateOp for ValueCount {
    fn initialize(&mut self) {
        self.count = 0;
    }

    fn add_values(&mut self, count: usize) {
        self.count += count as u64;
    }

    fn combine<V: SumValue>(source: &SumState<V, Self>, target: &mut SumState<V, Self>) {
        target.tracker.count += source.tracker.count;
        target.value.merge(source.value);
    }
}

/// The vectorized SUM driver: binds an add policy `A` and a state policy
/// `Op` into the operations the batch executor invokes.
///
/// All dispatch is resolved at compile time; the only branch in the hot
/// path is the validity check.
#[derive(Debug)]
pub struct SumOperation<A, Op> {
    _policies: PhantomData<(A, Op)>,
}

impl<A, Op: StateOp> SumOperation<A, Op> {
    /// Zero a freshly created state and reset its bookkeeping
    pub fn initialize<V: SumValue>(state: &mut SumState<V, Op>) {
        state.value = V::default();
        state.tracker.initialize();
    }

    /// Fold the batch element at `idx` into the state, skipping it when
    /// the validity mask marks it null
    pub fn operation<T: Copy>(
        state: &mut SumState<A::Accumulator, Op>,
        values: &[T],
        validity: Option<&NullBuffer>,
        idx: usize,
    ) where
        A: SumAdd<T>,
    {
        if let Some(validity) = validity {
            if !validity.is_valid(idx) {
                return;
            }
        }
        state.tracker.add_values(1);
        A::add_number(&mut state.value, values[idx]);
    }

    /// Fold a run of `count` copies of the single value in `values` into
    /// the state; the whole run is skipped when the value is null
    pub fn constant_operation<T: Copy>(
        state: &mut SumState<A::Accumulator, Op>,
        values: &[T],
        validity: Option<&NullBuffer>,
        count: usize,
    ) where
        A: SumAdd<T>,
    {
        if let Some(validity) = validity {
            if !validity.is_valid(0) {
                return;
            }
        }
        state.tracker.add_values(count);
        A::add_constant(&mut state.value, values[0], count);
    }

    /// Merge one partial state into another. Both writers must have
    /// finished; the caller owns that barrier.
    pub fn combine<V: SumValue>(source: &SumState<V, Op>, target: &mut SumState<V, Op>) {
        Op::combine(source, target);
    }

    /// Null inputs are never folded into the total
    pub const fn ignore_null() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_state() -> SumState<WideInt, SeenValues> {
        let mut state = SumState::default();
        SumOperation::<WideAdd, SeenValues>::initialize(&mut state);
        state
    }

    #[test]
    fn add_value_carry_boundary() {
        let mut acc = WideInt::ZERO;
        WideAdd::add_value(&mut acc, u64::MAX, true);
        assert_eq!(acc, WideInt::from_parts(u64::MAX, 0));
        WideAdd::add_value(&mut acc, 1, true);
        assert_eq!(acc, WideInt::from_parts(0, 1));
        assert_eq!(acc.to_i128(), u64::MAX as i128 + 1);
    }

    #[test]
    fn add_value_borrow_boundary() {
        let mut acc = WideInt::ZERO;
        WideAdd::add_value(&mut acc, (-1i64) as u64, false);
        assert_eq!(acc.to_i128(), -1);
        assert_eq!(acc, WideInt::from_parts(u64::MAX, -1));
        WideAdd::add_value(&mut acc, 1, true);
        assert_eq!(acc, WideInt::ZERO);
    }

    #[test]
    fn sign_symmetry_across_carries() {
        // start from a value one step below a carry boundary
        let start = WideInt::from_parts(u64::MAX - 1, 5);
        for x in [3i64, 12345, i64::MAX, i64::MIN + 1] {
            let mut acc = start;
            WideAdd::add_value(&mut acc, x as u64, x >= 0);
            WideAdd::add_value(&mut acc, x.wrapping_neg() as u64, -x >= 0);
            assert_eq!(acc, start, "adding then removing {x}");
        }
    }

    #[test]
    fn retract_inverts_add() {
        for x in [0i64, 3, -3, i64::MAX, i64::MIN] {
            let mut acc = WideInt::from_parts(7, -2);
            let start = acc;
            <WideAdd as SumAdd<i64>>::add_number(&mut acc, x);
            <WideAdd as SumRetract<i64>>::retract_number(&mut acc, x);
            assert_eq!(acc, start, "retracting {x}");
        }
        for x in [0u64, 9, u64::MAX, 1 << 63] {
            let mut acc = WideInt::ZERO;
            <WideAdd as SumAdd<u64>>::add_number(&mut acc, x);
            <WideAdd as SumRetract<u64>>::retract_number(&mut acc, x);
            assert_eq!(acc, WideInt::ZERO, "retracting {x}");
        }
    }

    /// All three constant-run strategies must produce bit-identical
    /// results; force each with a crafted cost model and compare against
    /// the repeated-add oracle.
    #[test]
    fn constant_run_paths_agree() {
        // bound of 1 starves the fast path; limit 0 starves the loop
        let force_small = RunCostModel {
            max_batch_size: usize::MAX,
            small_run_limit: usize::MAX,
        };
        let force_wide = RunCostModel {
            max_batch_size: usize::MAX,
            small_run_limit: 0,
        };

        let cases: &[(i64, usize)] = &[
            (0, 0),
            (7, 1),
            (7, 5),
            (7, 1000),
            (-3, 5),
            (-3, 1000),
            (i64::MAX, 2048),
            (i64::MIN, 2048),
            (1 << 52, 2048),
        ];
        for &(value, count) in cases {
            let bits = value as u64;
            let expected = (value as i128) * (count as i128);

            let mut oracle = WideInt::ZERO;
            for _ in 0..count {
                WideAdd::add_value(&mut oracle, bits, value >= 0);
            }
            assert_eq!(oracle.to_i128(), expected);

            let mut default_path = WideInt::ZERO;
            WideAdd::add_constant_with(
                &mut default_path,
                bits,
                value >= 0,
                count,
                &RunCostModel::DEFAULT,
            );
            assert_eq!(default_path, oracle, "default model for {value} x {count}");

            let mut small_path = WideInt::ZERO;
            WideAdd::add_constant_with(&mut small_path, bits, value >= 0, count, &force_small);
            assert_eq!(small_path, oracle, "small-run path for {value} x {count}");

            let mut wide_path = WideInt::ZERO;
            WideAdd::add_constant_with(&mut wide_path, bits, value >= 0, count, &force_wide);
            assert_eq!(wide_path, oracle, "wide-multiply path for {value} x {count}");
        }
    }

    #[test]
    fn constant_operation_matches_elementwise() {
        let mut run = wide_state();
        SumOperation::<WideAdd, SeenValues>::constant_operation(&mut run, &[-9i64], None, 5);

        let mut elementwise = wide_state();
        for _ in 0..5 {
            SumOperation::<WideAdd, SeenValues>::operation(&mut elementwise, &[-9i64], None, 0);
        }

        assert_eq!(run.value, elementwise.value);
        assert_eq!(run.value.to_i128(), -45);
        assert!(run.tracker.seen);
    }

    #[test]
    fn driver_skips_nulls() {
        let values = [5i64, 999, 7];
        let validity = NullBuffer::from(vec![true, false, true]);

        let mut state = wide_state();
        for idx in 0..values.len() {
            SumOperation::<WideAdd, SeenValues>::operation(
                &mut state,
                &values,
                Some(&validity),
                idx,
            );
        }
        assert_eq!(state.value.to_i128(), 12);

        // a null constant run contributes nothing, not even to bookkeeping
        let all_null = NullBuffer::from(vec![false]);
        let mut null_run = wide_state();
        SumOperation::<WideAdd, SeenValues>::constant_operation(
            &mut null_run,
            &[42i64],
            Some(&all_null),
            100,
        );
        assert_eq!(null_run.value, WideInt::ZERO);
        assert!(!null_run.tracker.seen);

        assert!(SumOperation::<WideAdd, SeenValues>::ignore_null());
    }

    #[test]
    fn combine_equals_single_pass() {
        let batch_a = [1i64, i64::MAX, -7];
        let batch_b = [i64::MAX, 42, -1];

        let mut left = wide_state();
        for idx in 0..batch_a.len() {
            SumOperation::<WideAdd, SeenValues>::operation(&mut left, &batch_a, None, idx);
        }
        let mut right = wide_state();
        for idx in 0..batch_b.len() {
            SumOperation::<WideAdd, SeenValues>::operation(&mut right, &batch_b, None, idx);
        }
        SumOperation::<WideAdd, SeenValues>::combine(&right, &mut left);

        let mut single = wide_state();
        for idx in 0..batch_a.len() {
            SumOperation::<WideAdd, SeenValues>::operation(&mut single, &batch_a, None, idx);
        }
        for idx in 0..batch_b.len() {
            SumOperation::<WideAdd, SeenValues>::operation(&mut single, &batch_b, None, idx);
        }

        assert_eq!(left.value, single.value);
        assert_eq!(left.tracker.seen, single.tracker.seen);
    }

    #[test]
    fn max_plus_one_crosses_into_high_limb() {
        let mut state = wide_state();
        for value in [3i64, -3, i64::MAX] {
            SumOperation::<WideAdd, SeenValues>::operation(&mut state, &[value], None, 0);
        }
        SumOperation::<WideAdd, SeenValues>::operation(&mut state, &[1i64], None, 0);
        assert_eq!(state.value.to_i128(), 9223372036854775808i128);
        assert_eq!(state.value, WideInt::from_parts(1 << 63, 0));
    }

    #[test]
    fn regular_add_wraps_silently() {
        let mut acc = i64::MAX;
        <RegularAdd as SumAdd<i64>>::add_number(&mut acc, 1);
        assert_eq!(acc, i64::MIN);

        let mut float_acc = 0.0f64;
        <RegularAdd as SumAdd<f64>>::add_constant(&mut float_acc, 1.5, 4);
        assert_eq!(float_acc, 6.0);

        // a pre-widened decimal total goes through the narrow policy
        let mut decimal_acc = 0i128;
        <RegularAdd as SumAdd<i128>>::add_constant(&mut decimal_acc, 1_000_000, 2048);
        assert_eq!(decimal_acc, 2_048_000_000);
    }

    #[test]
    fn value_count_tracks_rows() {
        let mut state: SumState<i64, ValueCount> = SumState::default();
        SumOperation::<RegularAdd, ValueCount>::initialize(&mut state);
        SumOperation::<RegularAdd, ValueCount>::constant_operation(&mut state, &[4i64], None, 3);
        SumOperation::<RegularAdd, ValueCount>::operation(&mut state, &[10i64], None, 0);
        assert_eq!(state.value, 22);
        assert_eq!(state.tracker.count, 4);
    }
}
