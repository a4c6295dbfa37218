//! Fixed big-endian cursor-based encoders/decoders. The exclusive
//! serialization primitives used by every wire format in this crate.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub fn write_u8(cursor: &mut Cursor<&mut [u8]>, v: u8) -> std::io::Result<()> {
    cursor.write_u8(v)
}

pub fn write_u16(cursor: &mut Cursor<&mut [u8]>, v: u16) -> std::io::Result<()> {
    cursor.write_u16::<BigEndian>(v)
}

pub fn write_u32(cursor: &mut Cursor<&mut [u8]>, v: u32) -> std::io::Result<()> {
    cursor.write_u32::<BigEndian>(v)
}

pub fn write_u64(cursor: &mut Cursor<&mut [u8]>, v: u64) -> std::io::Result<()> {
    cursor.write_u64::<BigEndian>(v)
}

pub fn read_u8(cursor: &mut Cursor<&[u8]>) -> std::io::Result<u8> {
    cursor.read_u8()
}

pub fn read_u16(cursor: &mut Cursor<&[u8]>) -> std::io::Result<u16> {
    cursor.read_u16::<BigEndian>()
}

pub fn read_u32(cursor: &mut Cursor<&[u8]>) -> std::io::Result<u32> {
    cursor.read_u32::<BigEndian>()
}

pub fn read_u64(cursor: &mut Cursor<&[u8]>) -> std::io::Result<u64> {
    cursor.read_u64::<BigEndian>()
}
