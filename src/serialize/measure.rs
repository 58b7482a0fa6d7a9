//! When the datapath program's trigger fires, the datapath sends a Report message
//! containing measurements to CCP. Use the `Scope` returned from compiling the
//! program to query the values.
//!
//! A measure message with no fields tells CCP that the flow has closed.

use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{AsRawMsg, RawMsg, HDR_LENGTH};
use crate::{Error, Result};

pub(crate) const MEASURE: u8 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    pub program_uid: u32,
    // This is a u32 on the wire to keep everything 4-byte-aligned, but a
    // program can never declare more fields than fit in a u8.
    pub num_fields: u8,
    pub fields: Vec<u64>,
}

impl Msg {
    /// The message a datapath sends when the flow goes away.
    pub fn close(sid: u32) -> Self {
        Msg {
            sid,
            program_uid: 0,
            num_fields: 0,
            fields: vec![],
        }
    }
}

fn deserialize_fields(buf: &[u8]) -> Result<Vec<u64>> {
    buf.chunks(8)
        .map(|mut sl| {
            if sl.len() < 8 {
                Err(Error::Serialize(format!("not long enough: {:?}", sl)))
            } else {
                Ok(sl.read_u64::<LittleEndian>()?)
            }
        })
        .collect()
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u8, u32, u32) {
        (
            MEASURE,
            HDR_LENGTH + 8 + u32::from(self.num_fields) * 8,
            self.sid,
        )
    }

    fn get_u32s<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.program_uid)?;
        w.write_u32::<LittleEndian>(u32::from(self.num_fields))?;
        Ok(())
    }

    fn get_bytes<W: Write>(&self, w: &mut W) -> Result<()> {
        for f in &self.fields {
            w.write_u64::<LittleEndian>(*f)?;
        }

        Ok(())
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        let mut r = msg.reader();
        let program_uid = r.read_u32::<LittleEndian>()?;
        let num_fields = r.read_u32::<LittleEndian>()?;
        if num_fields > u32::from(u8::max_value()) {
            return Err(Error::Serialize(format!("too many fields: {}", num_fields)));
        }

        let fields = deserialize_fields(&msg.get_bytes()[8..])?;
        if fields.len() != num_fields as usize {
            return Err(Error::Serialize(format!(
                "measure message claims {} fields, carries {}",
                num_fields,
                fields.len()
            )));
        }

        Ok(Msg {
            sid: msg.sid,
            program_uid,
            num_fields: num_fields as u8,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    macro_rules! check_measure_msg {
        ($id: ident, $sid:expr, $program_uid:expr, $fields:expr) => {
            check_msg!(
                $id,
                super::Msg,
                super::Msg {
                    sid: $sid,
                    program_uid: $program_uid,
                    num_fields: $fields.len() as u8,
                    fields: $fields,
                },
                crate::serialize::Msg::Ms(mes),
                mes
            );
        };
    }

    check_measure_msg!(
        test_measure_1,
        15,
        72,
        vec![424242, 65535, 65530, 200000, 150000]
    );
    check_measure_msg!(
        test_measure_2,
        256,
        19,
        vec![42424242, 65536, 65531, 100000, 50000, 1, 0, u64::max_value()]
    );
    check_measure_msg!(test_measure_close, 7, 0, Vec::<u64>::new());

    #[test]
    fn reject_field_count_mismatch() {
        let m = super::Msg {
            sid: 1,
            program_uid: 3,
            num_fields: 2,
            fields: vec![1, 2],
        };
        let mut buf = crate::serialize::serialize(&m).expect("serialize");
        // claim three fields
        buf[12] = 3;
        assert!(crate::serialize::Msg::from_buf(&buf[..]).is_err());
    }
}
