// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Moving between tuples of fixed-width fields and a single packed word.
//!
//! A [`FieldLayout`] is an ordered list of field widths. Field `i` sits at
//! an offset equal to the sum of the widths before it, least significant
//! bits first. Zero-width fields occupy no bits and always unpack to 0.
//!
//! The AXI-style messages exchanged with the reordering buffer are built on
//! top of this in the [`axi`] module.

#![forbid(
    unsafe_code, // Do not introduce unsafe code into this crate.
)]
#![deny(
    bare_trait_objects,             // Use the 'dyn' keyword.
    unused_extern_crates,           // Don't add unnecessary dependencies.
)]
#![warn(
    unused_qualifications,  // Please don't clutter code with paths.
)]

pub mod axi;

pub use axi::{
    AxiCodec, AxiDimensions, AxiMessage, BurstType, ReadAddress, ReadData, WriteAddress,
    WriteData, WriteResponse,
};

use bitvec::field::BitField;
use bitvec::order::Lsb0;
use bitvec::view::BitView;
use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::fmt;
use std::ops::Range;

/// Number of bits in the packed container.
pub const CONTAINER_BITS: usize = 64;

/// Mask selecting the low `width` bits of a word.
pub const fn low_mask(width: usize) -> u64 {
    if width >= CONTAINER_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LayoutError {
    /// The fields together need more bits than the container has.
    Overflow { total: usize, capacity: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Overflow { total, capacity } => write!(
                f,
                "ERROR: field layout needs {} bits, container holds {}",
                total, capacity
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

/// A single field descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Field {
    pub width: usize,
    pub offset: usize,
}

impl Field {
    fn bits(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldLayout {
    fields: Vec<Field>,
    width: usize,
}

impl FieldLayout {
    /// Builds a layout from field widths, assigning cumulative offsets.
    ///
    /// Layouts that do not fit in [`CONTAINER_BITS`] are rejected rather
    /// than silently truncated.
    pub fn from_widths(widths: &[usize]) -> Result<Self, LayoutError> {
        let mut offset: usize = 0;
        let mut fields = Vec::with_capacity(widths.len());
        for &width in widths {
            let end = offset
                .checked_add(width)
                .filter(|end| *end <= CONTAINER_BITS)
                .ok_or_else(|| LayoutError::Overflow {
                    total: widths.iter().fold(0, |sum: usize, w| sum.saturating_add(*w)),
                    capacity: CONTAINER_BITS,
                })?;
            fields.push(Field { width, offset });
            offset = end;
        }
        Ok(Self {
            fields,
            width: offset,
        })
    }

    /// Total number of bits used by the layout.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Packs one value per field. Values wider than their field are
    /// truncated to the field width.
    pub fn pack(&self, values: &[u64]) -> u64 {
        assert_eq!(
            values.len(),
            self.fields.len(),
            "Field count mismatch while packing."
        );
        let mut packed = 0u64;
        let bits = packed.view_bits_mut::<Lsb0>();
        for (field, value) in self.fields.iter().zip(values) {
            if field.width == 0 {
                continue;
            }
            bits[field.bits()].store_le(*value & low_mask(field.width));
        }
        packed
    }

    /// Unpacks one value per field. Bits above the layout width are ignored.
    pub fn unpack(&self, packed: u64) -> Vec<u64> {
        let bits = packed.view_bits::<Lsb0>();
        self.fields
            .iter()
            .map(|field| {
                if field.width == 0 {
                    0
                } else {
                    bits[field.bits()].load_le::<u64>()
                }
            })
            .collect()
    }
}

/// General-purpose test that a layout roundtrips in the sense that
///    unpack(pack(x)) == x
/// for field tuples whose values fit their widths.
///
/// Small layouts (under 10 bits) are checked exhaustively; larger ones are
/// sampled 1024 times from a fixed seed.
pub fn test_roundtrips(layout: &FieldLayout) {
    let check = |values: Vec<u64>| {
        let packed = layout.pack(&values);
        assert_eq!(layout.unpack(packed), values, "packed {:#x}", packed);
        assert_eq!(packed & !low_mask(layout.width()), 0);
    };
    if layout.width() < 10 {
        for v in 0..(1u64 << layout.width()) {
            check(layout.unpack(v));
        }
    } else {
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        for _ in 0..1024 {
            check(
                layout
                    .fields()
                    .iter()
                    .map(|field| rng.next_u64() & low_mask(field.width))
                    .collect(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_cumulative() {
        let layout = FieldLayout::from_widths(&[2, 0, 19, 8]).unwrap();
        let offsets: Vec<usize> = layout.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 2, 2, 21]);
        assert_eq!(layout.width(), 29);
    }

    #[test]
    fn zero_width_packs_to_zero() {
        let layout = FieldLayout::from_widths(&[3, 0, 3]).unwrap();
        let packed = layout.pack(&[5, 0xff, 2]);
        assert_eq!(packed, 5 | (2 << 3));
        assert_eq!(layout.unpack(packed), vec![5, 0, 2]);
    }

    #[test]
    fn top_bit_field_keeps_its_value() {
        let layout = FieldLayout::from_widths(&[63, 1]).unwrap();
        let packed = layout.pack(&[0, 1]);
        assert_eq!(packed, 1 << 63);
        assert_eq!(layout.unpack(packed), vec![0, 1]);

        let full = FieldLayout::from_widths(&[64]).unwrap();
        assert_eq!(full.unpack(full.pack(&[u64::MAX])), vec![u64::MAX]);
    }

    #[test]
    fn wide_values_are_truncated() {
        let layout = FieldLayout::from_widths(&[4, 4]).unwrap();
        assert_eq!(layout.pack(&[0x1f, 0x1]), 0x1f);
    }

    #[test]
    fn overflowing_layout_is_rejected() {
        assert_eq!(
            FieldLayout::from_widths(&[32, 32, 1]),
            Err(LayoutError::Overflow {
                total: 65,
                capacity: 64
            })
        );
        assert!(FieldLayout::from_widths(&[65]).is_err());
        assert_eq!(
            FieldLayout::from_widths(&[usize::MAX, 2]),
            Err(LayoutError::Overflow {
                total: usize::MAX,
                capacity: 64
            })
        );
        assert!(FieldLayout::from_widths(&[2, usize::MAX]).is_err());
    }

    #[test]
    #[should_panic]
    fn wrong_field_count_panics() {
        let layout = FieldLayout::from_widths(&[4, 4]).unwrap();
        layout.pack(&[1]);
    }

    #[test]
    fn roundtrips() {
        test_roundtrips(&FieldLayout::from_widths(&[2, 3, 0, 4]).unwrap());
        test_roundtrips(&FieldLayout::from_widths(&[2, 19, 8, 3, 2, 2, 4, 4, 4, 4]).unwrap());
        test_roundtrips(&FieldLayout::from_widths(&[1, 62, 1]).unwrap());
    }

    #[test]
    fn mask() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(3), 0b111);
        assert_eq!(low_mask(64), u64::MAX);
    }
}
