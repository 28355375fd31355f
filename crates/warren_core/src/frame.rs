//! # Frame Layout Compiler
//!
//! A *frame* is one flat byte buffer holding the complete serialized state of
//! the world at one tick. Its layout is compiled once, at world construction:
//! every entity reserves a typed run of bytes and receives a [`FrameSection`]
//! whose offset is fixed for the lifetime of the process.
//!
//! ```text
//! compiler.reserve(&[Long])            -> header    [0, 8)
//! compiler.reserve_multiple(2, AVATAR) -> avatars   [8, 48), [48, 88)
//! compiler.reserve(&[Byte, Vec3])      -> decor     [88, 101)
//! compiler.len()                       -> 101  (frame buffer size)
//! ```
//!
//! Sections never overlap and the buffer size is exactly the sum of all
//! reservations. Reads and writes must mirror the type sequence used at
//! reservation time; the compiler stores no type tags at runtime, so this is
//! a structural contract between the compiler and the entity. Breaking it is
//! a bug, and the cursors fail fast with a panic rather than truncating.

use crate::math::Vec3;
use std::fmt;

/// Primitive slot types a frame layout is compiled from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// One byte, zero or non-zero.
    Bool,
    /// One byte.
    Byte,
    /// Big-endian 16-bit integer.
    Short,
    /// Big-endian 32-bit integer.
    Int,
    /// Big-endian 64-bit integer.
    Long,
    /// IEEE-754 single, big-endian bit pattern.
    Float,
    /// IEEE-754 double, big-endian bit pattern.
    Double,
    /// Three consecutive floats.
    Vec3,
}

impl FrameKind {
    /// Number of bytes one value of this kind occupies in a frame.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            Self::Bool | Self::Byte => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
            Self::Vec3 => 12,
        }
    }
}

/// Compiles typed reservations into fixed byte offsets.
///
/// All reservations must happen before the first frame buffer is allocated;
/// `len()` after the last reservation is the buffer size.
#[derive(Debug, Default)]
pub struct FrameCompiler {
    len: usize,
}

impl FrameCompiler {
    /// Creates an empty layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves one run of typed slots and returns its section.
    pub fn reserve(&mut self, kinds: &[FrameKind]) -> FrameSection {
        let size = kinds.iter().map(|kind| kind.byte_len()).sum();
        let section = FrameSection { offset: self.len, len: size };
        self.len += size;
        section
    }

    /// Reserves `count` identical runs, one section per run.
    pub fn reserve_multiple(&mut self, count: usize, kinds: &[FrameKind]) -> Vec<FrameSection> {
        (0..count).map(|_| self.reserve(kinds)).collect()
    }

    /// Total compiled frame length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True while nothing has been reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A `(offset, length)` view into a frame buffer.
///
/// Sections are plain values; binding to a buffer is done by creating a
/// short-lived [`SectionReader`] or [`SectionWriter`] cursor.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FrameSection {
    offset: usize,
    len: usize,
}

impl FrameSection {
    /// A section spanning an entire buffer of `len` bytes.
    ///
    /// The outer message-encoding layer uses this to borrow the codec for
    /// buffers that are not frames.
    #[must_use]
    pub const fn spanning(len: usize) -> Self {
        Self { offset: 0, len }
    }

    /// Byte offset inside the frame.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for zero-length sections.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Binds a read cursor to `frame`, positioned at the section start.
    ///
    /// # Panics
    /// Panics if the section does not fit inside `frame`.
    #[must_use]
    pub fn reader<'a>(&self, frame: &'a [u8]) -> SectionReader<'a> {
        assert!(
            self.offset + self.len <= frame.len(),
            "section [{}, {}) out of frame range [0, {})",
            self.offset,
            self.offset + self.len,
            frame.len()
        );
        SectionReader { frame, cursor: self.offset, end: self.offset + self.len }
    }

    /// Binds a write cursor to `frame`, positioned at the section start.
    ///
    /// # Panics
    /// Panics if the section does not fit inside `frame`.
    pub fn writer<'a>(&self, frame: &'a mut [u8]) -> SectionWriter<'a> {
        assert!(
            self.offset + self.len <= frame.len(),
            "section [{}, {}) out of frame range [0, {})",
            self.offset,
            self.offset + self.len,
            frame.len()
        );
        SectionWriter { cursor: self.offset, end: self.offset + self.len, frame }
    }
}

impl fmt::Debug for FrameSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameSection[{}, {})", self.offset, self.offset + self.len)
    }
}

/// Reads primitives from one section of a frame, in reservation order.
pub struct SectionReader<'a> {
    frame: &'a [u8],
    cursor: usize,
    end: usize,
}

impl SectionReader<'_> {
    fn next_byte(&mut self) -> u8 {
        assert!(
            self.cursor < self.end,
            "section read cursor ({}) overran its end ({})",
            self.cursor,
            self.end
        );
        let value = self.frame[self.cursor];
        self.cursor += 1;
        value
    }

    /// Reads a boolean (any non-zero byte is true).
    pub fn read_bool(&mut self) -> bool {
        self.next_byte() != 0
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> u8 {
        self.next_byte()
    }

    /// Reads a signed byte.
    pub fn read_i8(&mut self) -> i8 {
        self.next_byte() as i8
    }

    /// Reads a big-endian unsigned 16-bit integer.
    pub fn read_u16(&mut self) -> u16 {
        let hi = u16::from(self.next_byte());
        let lo = u16::from(self.next_byte());
        (hi << 8) | lo
    }

    /// Reads a big-endian signed 16-bit integer.
    pub fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    /// Reads a big-endian unsigned 32-bit integer.
    pub fn read_u32(&mut self) -> u32 {
        let hi = u32::from(self.read_u16());
        let lo = u32::from(self.read_u16());
        (hi << 16) | lo
    }

    /// Reads a big-endian signed 32-bit integer.
    pub fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    /// Reads a big-endian unsigned 64-bit integer.
    pub fn read_u64(&mut self) -> u64 {
        let hi = u64::from(self.read_u32());
        let lo = u64::from(self.read_u32());
        (hi << 32) | lo
    }

    /// Reads a big-endian signed 64-bit integer.
    pub fn read_i64(&mut self) -> i64 {
        self.read_u64() as i64
    }

    /// Reads a float from its big-endian bit pattern.
    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    /// Reads a double from its big-endian bit pattern.
    pub fn read_f64(&mut self) -> f64 {
        f64::from_bits(self.read_u64())
    }

    /// Reads three consecutive floats.
    pub fn read_vec3(&mut self) -> Vec3 {
        Vec3::new(self.read_f32(), self.read_f32(), self.read_f32())
    }

    /// True once the cursor sits exactly at the section end.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.cursor == self.end
    }
}

/// Writes primitives into one section of a frame, in reservation order.
pub struct SectionWriter<'a> {
    frame: &'a mut [u8],
    cursor: usize,
    end: usize,
}

impl SectionWriter<'_> {
    fn push_byte(&mut self, value: u8) {
        assert!(
            self.cursor < self.end,
            "section write cursor ({}) overran its end ({})",
            self.cursor,
            self.end
        );
        self.frame[self.cursor] = value;
        self.cursor += 1;
    }

    /// Writes a boolean as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.push_byte(u8::from(value));
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.push_byte(value);
    }

    /// Writes a signed byte.
    pub fn write_i8(&mut self, value: i8) {
        self.push_byte(value as u8);
    }

    /// Writes a big-endian unsigned 16-bit integer.
    pub fn write_u16(&mut self, value: u16) {
        self.push_byte((value >> 8) as u8);
        self.push_byte(value as u8);
    }

    /// Writes a big-endian signed 16-bit integer.
    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    /// Writes a big-endian unsigned 32-bit integer.
    pub fn write_u32(&mut self, value: u32) {
        self.write_u16((value >> 16) as u16);
        self.write_u16(value as u16);
    }

    /// Writes a big-endian signed 32-bit integer.
    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    /// Writes a big-endian unsigned 64-bit integer.
    pub fn write_u64(&mut self, value: u64) {
        self.write_u32((value >> 32) as u32);
        self.write_u32(value as u32);
    }

    /// Writes a big-endian signed 64-bit integer.
    pub fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    /// Writes a float as its big-endian bit pattern.
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes a double as its big-endian bit pattern.
    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Writes three consecutive floats.
    pub fn write_vec3(&mut self, value: Vec3) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }

    /// True once the cursor sits exactly at the section end.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.cursor == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_kind_byte_lengths() {
        assert_eq!(FrameKind::Bool.byte_len(), 1);
        assert_eq!(FrameKind::Byte.byte_len(), 1);
        assert_eq!(FrameKind::Short.byte_len(), 2);
        assert_eq!(FrameKind::Int.byte_len(), 4);
        assert_eq!(FrameKind::Long.byte_len(), 8);
        assert_eq!(FrameKind::Float.byte_len(), 4);
        assert_eq!(FrameKind::Double.byte_len(), 8);
        assert_eq!(FrameKind::Vec3.byte_len(), 12);
    }

    #[test]
    fn test_reserve_byte_and_vec3() {
        let mut compiler = FrameCompiler::new();
        let section = compiler.reserve(&[FrameKind::Byte, FrameKind::Vec3]);
        assert_eq!(compiler.len(), 13);

        let mut frame = vec![0u8; compiler.len()];
        let mut writer = section.writer(&mut frame);
        writer.write_u8(7);
        writer.write_vec3(Vec3::new(1.0, 2.0, 3.0));
        assert!(writer.is_at_end());

        // Rebind and read the same sequence back.
        let mut reader = section.reader(&frame);
        assert_eq!(reader.read_u8(), 7);
        assert_eq!(reader.read_vec3(), Vec3::new(1.0, 2.0, 3.0));
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_sections_never_overlap() {
        let mut compiler = FrameCompiler::new();
        let header = compiler.reserve(&[FrameKind::Long]);
        let avatars = compiler.reserve_multiple(3, &[FrameKind::Vec3, FrameKind::Float]);
        let decor = compiler.reserve(&[FrameKind::Byte]);

        assert_eq!(header.offset(), 0);
        assert_eq!(avatars[0].offset(), 8);
        assert_eq!(avatars[1].offset(), 24);
        assert_eq!(avatars[2].offset(), 40);
        assert_eq!(decor.offset(), 56);
        assert_eq!(compiler.len(), 57);
    }

    #[test]
    fn test_full_primitive_round_trip() {
        let mut compiler = FrameCompiler::new();
        let section = compiler.reserve(&[
            FrameKind::Bool,
            FrameKind::Byte,
            FrameKind::Short,
            FrameKind::Int,
            FrameKind::Long,
            FrameKind::Float,
            FrameKind::Double,
            FrameKind::Vec3,
        ]);
        let mut frame = vec![0u8; compiler.len()];

        let mut writer = section.writer(&mut frame);
        writer.write_bool(true);
        writer.write_u8(0xAB);
        writer.write_i16(-12345);
        writer.write_i32(-1_000_000_007);
        writer.write_i64(-(1 << 62));
        writer.write_f32(std::f32::consts::PI);
        writer.write_f64(std::f64::consts::E);
        writer.write_vec3(Vec3::new(-1.5, 0.0, 99.25));
        assert!(writer.is_at_end());

        let mut reader = section.reader(&frame);
        assert!(reader.read_bool());
        assert_eq!(reader.read_u8(), 0xAB);
        assert_eq!(reader.read_i16(), -12345);
        assert_eq!(reader.read_i32(), -1_000_000_007);
        assert_eq!(reader.read_i64(), -(1 << 62));
        assert_eq!(reader.read_f32(), std::f32::consts::PI);
        assert_eq!(reader.read_f64(), std::f64::consts::E);
        assert_eq!(reader.read_vec3(), Vec3::new(-1.5, 0.0, 99.25));
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_big_endian_encoding() {
        let section = FrameSection::spanning(4);
        let mut buffer = [0u8; 4];
        section.writer(&mut buffer).write_u32(0x0102_0304);
        assert_eq!(buffer, [1, 2, 3, 4]);
    }

    #[test]
    fn test_randomized_round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
        for _ in 0..100 {
            let values: Vec<u64> = (0..8).map(|_| rng.gen()).collect();
            let mut compiler = FrameCompiler::new();
            let section = compiler.reserve(&[FrameKind::Long; 8]);
            let mut frame = vec![0u8; compiler.len()];

            let mut writer = section.writer(&mut frame);
            for &value in &values {
                writer.write_u64(value);
            }
            let mut reader = section.reader(&frame);
            for &value in &values {
                assert_eq!(reader.read_u64(), value);
            }
            assert!(reader.is_at_end());
        }
    }

    #[test]
    #[should_panic(expected = "overran")]
    fn test_read_past_end_panics() {
        let mut compiler = FrameCompiler::new();
        let section = compiler.reserve(&[FrameKind::Byte]);
        let frame = vec![0u8; compiler.len()];
        let mut reader = section.reader(&frame);
        let _ = reader.read_u8();
        let _ = reader.read_u8();
    }

    #[test]
    #[should_panic(expected = "out of frame range")]
    fn test_binding_to_short_buffer_panics() {
        let mut compiler = FrameCompiler::new();
        let _header = compiler.reserve(&[FrameKind::Long]);
        let section = compiler.reserve(&[FrameKind::Vec3]);
        let frame = vec![0u8; 8];
        let _ = section.reader(&frame);
    }
}
