//! Serialization and deserialization of messages between CCP and the datapath.
//!
//! Every message starts with a fixed header:
//!
//! ```text
//! -----------------------------------------------
//! | Msg Type | Len (B)  | Socket id   | payload |
//! | (16 bit) | (16 bit) | (32 bit)    | ...     |
//! -----------------------------------------------
//! ```
//!
//! `Len` counts the header. All integers are little-endian.

use std::io::prelude::*;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{Error, Result};


pub mod create;
pub mod install;
pub mod measure;
pub mod other;
pub mod update_field;

pub const HDR_LENGTH: u32 = 8;

/// Longest name a field may have on the wire.
pub const MAX_NAME_LEN: usize = 255;

fn serialize_header<W: Write>(w: &mut W, typ: u8, len: u32, sid: u32) -> Result<()> {
    if len > u32::from(u16::max_value()) {
        return Err(Error::Serialize(format!("message too long: {} bytes", len)));
    }

    w.write_u16::<LittleEndian>(u16::from(typ))?;
    w.write_u16::<LittleEndian>(len as u16)?;
    w.write_u32::<LittleEndian>(sid)?;
    Ok(())
}

fn deserialize_header<R: Read>(buf: &mut R) -> Result<(u8, u32, u32)> {
    let typ = buf.read_u16::<LittleEndian>()?;
    let len = buf.read_u16::<LittleEndian>()?;
    let sid = buf.read_u32::<LittleEndian>()?;
    if typ > u16::from(u8::max_value()) {
        return Err(Error::Serialize(format!("unknown message type {}", typ)));
    }

    Ok((typ as u8, u32::from(len), sid))
}

/// A message whose header has been parsed but whose payload has not.
pub struct RawMsg<'a> {
    pub typ: u8,
    pub len: u32,
    pub sid: u32,
    bytes: &'a [u8],
}

impl<'a> RawMsg<'a> {
    /// The payload, following the header.
    pub fn get_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn reader(&self) -> Cursor<&'a [u8]> {
        Cursor::new(self.bytes)
    }
}

/// A message that can be written to and read from the wire.
pub trait AsRawMsg {
    /// `(type, total length including the header, socket id)`
    fn get_hdr(&self) -> (u8, u32, u32);
    fn get_u32s<W: Write>(&self, _w: &mut W) -> Result<()> {
        Ok(())
    }
    fn get_bytes<W: Write>(&self, w: &mut W) -> Result<()>;

    fn from_raw_msg(msg: RawMsg) -> Result<Self>
    where
        Self: std::marker::Sized;
}

pub fn serialize<T: AsRawMsg>(m: &T) -> Result<Vec<u8>> {
    let (typ, len, sid) = m.get_hdr();
    let mut msg = Vec::with_capacity(len as usize);
    serialize_header(&mut msg, typ, len, sid)?;
    m.get_u32s(&mut msg)?;
    m.get_bytes(&mut msg)?;
    if msg.len() != len as usize {
        return Err(Error::Serialize(format!(
            "header says {} bytes, wrote {}",
            len,
            msg.len()
        )));
    }

    Ok(msg)
}

pub(crate) fn write_name<W: Write>(w: &mut W, name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Serialize(format!("name too long: {}", name)));
    }

    w.write_u8(name.len() as u8)?;
    w.write_all(name.as_bytes())?;
    Ok(())
}

pub(crate) fn read_name<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u8()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(std::str::from_utf8(&buf)?.to_owned())
}

pub(crate) fn name_len(name: &str) -> u32 {
    1 + name.len() as u32
}

/// Fail unless the reader consumed the whole payload.
pub(crate) fn expect_consumed(c: &Cursor<&[u8]>, what: &str) -> Result<()> {
    let rest = c.get_ref().len() as u64 - c.position();
    if rest != 0 {
        return Err(Error::Serialize(format!(
            "{} message has {} trailing bytes",
            what, rest
        )));
    }

    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub enum Msg {
    Cr(create::Msg),
    Ms(measure::Msg),
    Ins(install::Msg),
    Upd(update_field::Msg),
    Other(other::Msg),
}

impl Msg {
    fn from_raw_msg(m: RawMsg) -> Result<Msg> {
        match m.typ {
            create::CREATE => Ok(Msg::Cr(create::Msg::from_raw_msg(m)?)),
            measure::MEASURE => Ok(Msg::Ms(measure::Msg::from_raw_msg(m)?)),
            install::INSTALL => Ok(Msg::Ins(install::Msg::from_raw_msg(m)?)),
            update_field::UPDATE_FIELD => Ok(Msg::Upd(update_field::Msg::from_raw_msg(m)?)),
            _ => Ok(Msg::Other(other::Msg::from_raw_msg(m)?)),
        }
    }

    /// Parse the first message in `buf`.
    /// Returns the message and the number of bytes it occupied.
    pub fn from_buf(buf: &[u8]) -> Result<(Msg, usize)> {
        let mut c = Cursor::new(buf);
        let (typ, len, sid) = deserialize_header(&mut c)?;
        if len < HDR_LENGTH || len as usize > buf.len() {
            return Err(Error::Serialize(format!(
                "bad message length {} (have {} bytes)",
                len,
                buf.len()
            )));
        }

        let msg = Msg::from_raw_msg(RawMsg {
            typ,
            len,
            sid,
            bytes: &buf[HDR_LENGTH as usize..len as usize],
        })?;
        Ok((msg, len as usize))
    }

    pub fn sid(&self) -> u32 {
        match self {
            Msg::Cr(m) => m.sid,
            Msg::Ms(m) => m.sid,
            Msg::Ins(m) => m.sid,
            Msg::Upd(m) => m.sid,
            Msg::Other(m) => m.sid,
        }
    }
}
