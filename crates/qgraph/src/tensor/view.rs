//! Checked reinterpretation of raw byte buffers as typed element slices.

use std::mem::size_of;

/// Views a byte slice as `i8` elements. Always layout-compatible.
pub fn as_i8(bytes: &[u8]) -> &[i8] {
    // i8 and u8 share size and alignment, so the cast is always valid.
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const i8, bytes.len()) }
}

/// Mutable `i8` view over a byte slice.
pub fn as_i8_mut(bytes: &mut [u8]) -> &mut [i8] {
    unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut i8, bytes.len()) }
}

/// Views a byte slice as `i32` elements, asserting length and alignment.
pub fn as_i32(bytes: &[u8]) -> &[i32] {
    bytes_as_slice(bytes)
}

/// Mutable `i32` view over a byte slice, asserting length and alignment.
pub fn as_i32_mut(bytes: &mut [u8]) -> &mut [i32] {
    bytes_as_slice_mut(bytes)
}

/// Views a byte slice as `f32` elements, asserting length and alignment.
pub fn as_f32(bytes: &[u8]) -> &[f32] {
    bytes_as_slice(bytes)
}

/// Mutable `f32` view over a byte slice, asserting length and alignment.
pub fn as_f32_mut(bytes: &mut [u8]) -> &mut [f32] {
    bytes_as_slice_mut(bytes)
}

/// Views a typed constant slice as raw bytes.
pub fn slice_as_bytes<T>(values: &[T]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(values.as_ptr() as *const u8, values.len() * size_of::<T>())
    }
}

fn bytes_as_slice<T>(bytes: &[u8]) -> &[T] {
    assert_layout::<T>(bytes.len(), bytes.as_ptr() as usize);
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const T, bytes.len() / size_of::<T>()) }
}

fn bytes_as_slice_mut<T>(bytes: &mut [u8]) -> &mut [T] {
    assert_layout::<T>(bytes.len(), bytes.as_ptr() as usize);
    unsafe {
        std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut T, bytes.len() / size_of::<T>())
    }
}

fn assert_layout<T>(len: usize, addr: usize) {
    assert_eq!(
        len % size_of::<T>(),
        0,
        "byte length {} is not a multiple of element size {}",
        len,
        size_of::<T>()
    );
    assert_eq!(
        addr % std::mem::align_of::<T>(),
        0,
        "byte buffer is not aligned for element size {}",
        size_of::<T>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i8_view_preserves_bit_patterns() {
        let bytes = [0u8, 255, 128];
        assert_eq!(as_i8(&bytes), &[0, -1, -128]);
    }

    #[test]
    fn i32_view_reads_little_endian_words() {
        let values = [1i32, -2];
        let bytes = slice_as_bytes(&values);
        assert_eq!(as_i32(bytes), &values);
    }
}
