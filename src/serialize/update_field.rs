//! CCP sends this message specifying that the datapath should set the values of the
//! given fields to the given values.

use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{expect_consumed, name_len, read_name, write_name, AsRawMsg, RawMsg, HDR_LENGTH};
use crate::Result;

pub(crate) const UPDATE_FIELD: u8 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    pub num_fields: u8,
    pub fields: Vec<(String, u64)>,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u8, u32, u32) {
        let fields: u32 = self.fields.iter().map(|(n, _)| name_len(n) + 8).sum();
        (UPDATE_FIELD, HDR_LENGTH + 4 + fields, self.sid)
    }

    fn get_u32s<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(u32::from(self.num_fields))?;
        Ok(())
    }

    fn get_bytes<W: Write>(&self, w: &mut W) -> Result<()> {
        for (name, val) in &self.fields {
            write_name(w, name)?;
            w.write_u64::<LittleEndian>(*val)?;
        }

        Ok(())
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        let mut r = msg.reader();
        let num_fields = r.read_u32::<LittleEndian>()?;
        let mut fields = vec![];
        for _ in 0..num_fields.min(u32::from(u8::max_value())) {
            let name = read_name(&mut r)?;
            let val = r.read_u64::<LittleEndian>()?;
            fields.push((name, val));
        }

        expect_consumed(&r, "update_field")?;
        Ok(Msg {
            sid: msg.sid,
            num_fields: fields.len() as u8,
            fields,
        })
    }
}
