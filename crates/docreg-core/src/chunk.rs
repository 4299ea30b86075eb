//! Chunk allocation for large uploads.

use std::num::NonZeroU64;

use crate::document::NewPart;

/// ⌈size/chunk_size⌉
pub fn part_count(size: u64, chunk_size: NonZeroU64) -> u64 { size.div_ceil(chunk_size.get()) }

/// Split a body of `size` bytes into parts of `chunk_size` bytes.
///
/// Produces parts `1..=⌈size/chunk_size⌉`; every part is `chunk_size` long
/// except the last, which carries the remainder (or a full chunk when `size`
/// is an exact multiple). A zero size yields no parts. `None` when the
/// ordinals would not fit a `u32`.
pub fn allocate(size: u64, chunk_size: NonZeroU64) -> Option<Vec<NewPart>> {
  let chunk = chunk_size.get();
  let count = u32::try_from(part_count(size, chunk_size)).ok()?;
  let parts = (1..=count)
    .map(|ordinal| {
      let expected_size = if ordinal == count && size % chunk != 0 {
        size % chunk
      } else {
        chunk
      };
      NewPart { ordinal, expected_size }
    })
    .collect();
  Some(parts)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sizes(size: u64, chunk: u64) -> Vec<u64> {
    allocate(size, NonZeroU64::new(chunk).unwrap())
      .unwrap()
      .into_iter()
      .map(|p| p.expected_size)
      .collect()
  }

  #[test]
  fn remainder_goes_to_last_part() {
    assert_eq!(sizes(17, 10), [10, 7]);
    let parts = allocate(17, NonZeroU64::new(10).unwrap()).unwrap();
    assert_eq!(parts.iter().map(|p| p.ordinal).collect::<Vec<_>>(), [1, 2]);
  }

  #[test]
  fn exact_multiple_has_full_last_part() {
    assert_eq!(sizes(30, 10), [10, 10, 10]);
  }

  #[test]
  fn smaller_than_one_chunk() {
    assert_eq!(sizes(3, 10), [3]);
  }

  #[test]
  fn zero_size_has_no_parts() {
    assert!(sizes(0, 10).is_empty());
  }

  #[test]
  fn ordinals_past_u32_are_refused() {
    let one = NonZeroU64::MIN;
    assert_eq!(part_count(u64::MAX, one), u64::MAX);
    assert!(allocate(u64::MAX, one).is_none());
    assert!(allocate(u64::from(u32::MAX) + 1, one).is_none());
  }

  #[test]
  fn parts_sum_to_size() {
    for size in [1_u64, 9, 10, 11, 99, 100, 101, 12_345] {
      assert_eq!(sizes(size, 10).iter().sum::<u64>(), size, "size {size}");
    }
  }
}
