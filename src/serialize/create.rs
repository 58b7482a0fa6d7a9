//! Message sent from datapath to CCP when a new flow starts.

use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{expect_consumed, AsRawMsg, RawMsg, HDR_LENGTH};
use crate::Result;

pub(crate) const CREATE: u8 = 0;

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    pub init_cwnd: u32,
    pub mss: u32,
    pub src_ip: u32,
    pub src_port: u32,
    pub dst_ip: u32,
    pub dst_port: u32,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u8, u32, u32) {
        (CREATE, HDR_LENGTH + 6 * 4, self.sid)
    }

    fn get_u32s<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.init_cwnd)?;
        w.write_u32::<LittleEndian>(self.mss)?;
        w.write_u32::<LittleEndian>(self.src_ip)?;
        w.write_u32::<LittleEndian>(self.src_port)?;
        w.write_u32::<LittleEndian>(self.dst_ip)?;
        w.write_u32::<LittleEndian>(self.dst_port)?;
        Ok(())
    }

    fn get_bytes<W: Write>(&self, _: &mut W) -> Result<()> {
        Ok(())
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        let mut r = msg.reader();
        let m = Msg {
            sid: msg.sid,
            init_cwnd: r.read_u32::<LittleEndian>()?,
            mss: r.read_u32::<LittleEndian>()?,
            src_ip: r.read_u32::<LittleEndian>()?,
            src_port: r.read_u32::<LittleEndian>()?,
            dst_ip: r.read_u32::<LittleEndian>()?,
            dst_port: r.read_u32::<LittleEndian>()?,
        };
        expect_consumed(&r, "create")?;
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    macro_rules! check_create_msg {
        ($id: ident, $msg: expr) => {
            check_msg!($id, super::Msg, $msg, crate::serialize::Msg::Cr(crm), crm);
        };
    }

    check_create_msg!(
        test_create_1,
        super::Msg {
            sid: 15,
            init_cwnd: 1448 * 10,
            mss: 1448,
            src_ip: 0,
            src_port: 4242,
            dst_ip: 0,
            dst_port: 4242,
        }
    );

    check_create_msg!(
        test_create_2,
        super::Msg {
            sid: 0x7fff_ffff,
            init_cwnd: 0,
            mss: 1460,
            src_ip: 0x0a00_0001,
            src_port: 5000,
            dst_ip: 0x0a00_0002,
            dst_port: 80,
        }
    );

    #[test]
    fn serialize_create_msg() {
        let m = super::Msg {
            sid: 1,
            init_cwnd: 14600,
            mss: 1460,
            src_ip: 0,
            src_port: 0,
            dst_ip: 0,
            dst_port: 0,
        };

        let buf = crate::serialize::serialize(&m).expect("serialize");
        assert_eq!(
            buf,
            vec![
                0, 0,                // CREATE
                32, 0,               // length = 32
                1, 0, 0, 0,          // sock_id = 1
                0x08, 0x39, 0, 0,    // init_cwnd = 14600
                0xb4, 0x05, 0, 0,    // mss = 1460
                0, 0, 0, 0,
                0, 0, 0, 0,
                0, 0, 0, 0,
                0, 0, 0, 0,
            ],
        );
    }
}
