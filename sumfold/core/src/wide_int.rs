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

//! [`WideInt`]: a signed 128-bit integer emulated as two 64-bit limbs

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign};

/// A signed 128-bit integer represented as an unsigned low limb and a
/// signed high limb.
///
/// The pair encodes a two's complement value of twice the native word
/// width. All arithmetic is explicit carry/borrow logic over the limbs;
/// `i128` appears only in the conversion methods at the API boundary
/// ([`WideInt::from_i128`] / [`WideInt::to_i128`]), which exist for
/// `Decimal128` interop and test oracles.
///
/// Arithmetic wraps at the 128-bit boundary, mirroring the wrapping
/// vocabulary of arrow's native types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WideInt {
    /// Low 64 bits, treated as unsigned
    pub low: u64,
    /// High 64 bits, treated as signed
    pub high: i64,
}

impl WideInt {
    /// The value `0`
    pub const ZERO: Self = Self { low: 0, high: 0 };

    /// The value `1`
    pub const ONE: Self = Self { low: 1, high: 0 };

    /// The smallest representable value, `-2^127`
    pub const MIN: Self = Self {
        low: 0,
        high: i64::MIN,
    };

    /// The largest representable value, `2^127 - 1`
    pub const MAX: Self = Self {
        low: u64::MAX,
        high: i64::MAX,
    };

    /// Assemble a value from its limbs
    pub const fn from_parts(low: u64, high: i64) -> Self {
        Self { low, high }
    }

    /// Create a value from a native `i128`. Boundary conversion only; no
    /// arithmetic path goes through `i128`.
    pub const fn from_i128(v: i128) -> Self {
        Self {
            low: v as u64,
            high: (v >> 64) as i64,
        }
    }

    /// Return the value as a native `i128`. The conversion is exact for
    /// every `WideInt`.
    pub const fn to_i128(self) -> i128 {
        ((self.high as i128) << 64) | (self.low as i128)
    }

    /// Whether the value is strictly below zero
    pub const fn is_negative(self) -> bool {
        self.high < 0
    }

    /// Add with two's complement wraparound at the 128-bit boundary
    pub fn wrapping_add(self, rhs: Self) -> Self {
        let (low, carry) = self.low.overflowing_add(rhs.low);
        let high = self
            .high
            .wrapping_add(rhs.high)
            .wrapping_add(carry as i64);
        Self { low, high }
    }

    /// Subtract with two's complement wraparound at the 128-bit boundary
    pub fn wrapping_sub(self, rhs: Self) -> Self {
        self.wrapping_add(rhs.wrapping_neg())
    }

    /// Two's complement negation; `MIN` maps to itself
    pub fn wrapping_neg(self) -> Self {
        Self {
            low: !self.low,
            high: !self.high,
        }
        .wrapping_add(Self::ONE)
    }

    /// Multiply by an unsigned 64-bit value, keeping the low 128 bits of
    /// the product.
    ///
    /// Schoolbook multiplication over 32-bit half limbs: each partial
    /// product of two halves fits a `u64`, and accumulating a masked limb,
    /// one partial product and a carry never exceeds `u64::MAX`, so no
    /// intermediate needs more than 64 bits. Two's complement makes the
    /// truncated product correct for negative values as well.
    pub fn wrapping_mul_u64(self, rhs: u64) -> Self {
        const MASK: u64 = 0xFFFF_FFFF;

        let a = [
            self.low & MASK,
            self.low >> 32,
            (self.high as u64) & MASK,
            (self.high as u64) >> 32,
        ];
        let b = [rhs & MASK, rhs >> 32];

        let mut acc = [0u64; 4];
        for (j, &bj) in b.iter().enumerate() {
            let mut carry = 0u64;
            for i in 0..(4 - j) {
                let t = acc[i + j] + a[i] * bj + carry;
                acc[i + j] = t & MASK;
                carry = t >> 32;
            }
            // any carry past limb 3 falls outside the 128-bit result
        }

        Self {
            low: acc[0] | (acc[1] << 32),
            high: (acc[2] | (acc[3] << 32)) as i64,
        }
    }
}

impl Add for WideInt {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }
}

impl AddAssign for WideInt {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.wrapping_add(rhs);
    }
}

impl PartialOrd for WideInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WideInt {
    fn cmp(&self, other: &Self) -> Ordering {
        // signed high limb first, then unsigned low limb
        self.high
            .cmp(&other.high)
            .then(self.low.cmp(&other.low))
    }
}

impl Display for WideInt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_i128())
    }
}

macro_rules! wide_from_signed {
    ($($t:ty),* $(,)?) => {$(
        impl From<$t> for WideInt {
            fn from(v: $t) -> Self {
                Self {
                    low: v as i64 as u64,
                    high: if v < 0 { -1 } else { 0 },
                }
            }
        }
    )*};
}
wide_from_signed!(i8, i16, i32, i64);

macro_rules! wide_from_unsigned {
    ($($t:ty),* $(,)?) => {$(
        impl From<$t> for WideInt {
            fn from(v: $t) -> Self {
                Self {
                    low: v as u64,
                    high: 0,
                }
            }
        }
    )*};
}
wide_from_unsigned!(u8, u16, u32, u64);

impl From<i128> for WideInt {
    fn from(v: i128) -> Self {
        Self::from_i128(v)
    }
}

impl From<WideInt> for i128 {
    fn from(v: WideInt) -> Self {
        v.to_i128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[i128] = &[
        0,
        1,
        -1,
        42,
        -42,
        i64::MAX as i128,
        i64::MAX as i128 + 1,
        i64::MIN as i128,
        i64::MIN as i128 - 1,
        u64::MAX as i128,
        u64::MAX as i128 + 1,
        i128::MAX,
        i128::MIN,
        i128::MAX - 17,
        i128::MIN + 17,
    ];

    #[test]
    fn i128_round_trip() {
        for &v in SAMPLES {
            assert_eq!(WideInt::from_i128(v).to_i128(), v, "round trip of {v}");
        }
    }

    #[test]
    fn limb_layout() {
        assert_eq!(WideInt::from_i128(-1), WideInt::from_parts(u64::MAX, -1));
        assert_eq!(
            WideInt::from_i128(u64::MAX as i128 + 1),
            WideInt::from_parts(0, 1)
        );
        assert_eq!(WideInt::MIN.to_i128(), i128::MIN);
        assert_eq!(WideInt::MAX.to_i128(), i128::MAX);
    }

    #[test]
    fn add_matches_i128() {
        for &a in SAMPLES {
            for &b in SAMPLES {
                let got = WideInt::from_i128(a).wrapping_add(WideInt::from_i128(b));
                assert_eq!(
                    got.to_i128(),
                    a.wrapping_add(b),
                    "wrapping_add of {a} and {b}"
                );
            }
        }
    }

    #[test]
    fn sub_and_neg_match_i128() {
        for &a in SAMPLES {
            assert_eq!(
                WideInt::from_i128(a).wrapping_neg().to_i128(),
                a.wrapping_neg(),
                "wrapping_neg of {a}"
            );
            for &b in SAMPLES {
                let got = WideInt::from_i128(a).wrapping_sub(WideInt::from_i128(b));
                assert_eq!(got.to_i128(), a.wrapping_sub(b));
            }
        }
    }

    #[test]
    fn mul_u64_matches_i128() {
        let multipliers = [0u64, 1, 2, 7, 8, 2048, u32::MAX as u64, u64::MAX];
        for &a in SAMPLES {
            for &m in &multipliers {
                let got = WideInt::from_i128(a).wrapping_mul_u64(m);
                assert_eq!(
                    got.to_i128(),
                    a.wrapping_mul(m as i128),
                    "wrapping_mul_u64 of {a} by {m}"
                );
            }
        }
    }

    #[test]
    fn sign_extending_conversions() {
        assert_eq!(WideInt::from(-1i8).to_i128(), -1);
        assert_eq!(WideInt::from(i32::MIN).to_i128(), i32::MIN as i128);
        assert_eq!(WideInt::from(u64::MAX).to_i128(), u64::MAX as i128);
        assert_eq!(WideInt::from(255u8).to_i128(), 255);
        assert_eq!(i128::from(WideInt::from(-9i16)), -9);
        assert_eq!(WideInt::from(i128::MIN), WideInt::MIN);
    }

    #[test]
    fn sign_of_the_high_limb() {
        assert!(WideInt::MIN.is_negative());
        assert!(WideInt::from(-1i64).is_negative());
        assert!(!WideInt::ZERO.is_negative());
        assert!(!WideInt::MAX.is_negative());
        // a huge low limb alone is still a positive value
        assert!(!WideInt::from(u64::MAX).is_negative());
    }

    #[test]
    fn ordering_is_numeric() {
        let mut values: Vec<WideInt> = SAMPLES.iter().map(|&v| WideInt::from_i128(v)).collect();
        values.sort();
        let as_i128: Vec<i128> = values.iter().map(|v| v.to_i128()).collect();
        let mut expected = as_i128.clone();
        expected.sort();
        assert_eq!(as_i128, expected);
    }

    #[test]
    fn display_via_decimal() {
        assert_eq!(
            WideInt::MIN.to_string(),
            "-170141183460469231731687303715884105728"
        );
        assert_eq!(WideInt::from(42i64).to_string(), "42");
        assert_eq!(WideInt::from(-7i32).to_string(), "-7");
    }
}
