//! CCP sends this message to give a flow its datapath program, together with
//! the initial values of any fields the flow wants set before the first ack.
//! The datapath applies both or neither.

use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{expect_consumed, name_len, read_name, write_name, AsRawMsg, RawMsg, HDR_LENGTH};
use crate::lang::Bin;
use crate::Result;

pub(crate) const INSTALL: u8 = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    pub program_uid: u32,
    pub num_updates: u32,
    pub updates: Vec<(String, u64)>,
    pub instrs: Bin,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u8, u32, u32) {
        let updates: u32 = self.updates.iter().map(|(n, _)| name_len(n) + 8).sum();
        (
            INSTALL,
            HDR_LENGTH + 8 + updates + self.instrs.len_bytes(),
            self.sid,
        )
    }

    fn get_u32s<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.program_uid)?;
        w.write_u32::<LittleEndian>(self.num_updates)?;
        Ok(())
    }

    fn get_bytes<W: Write>(&self, w: &mut W) -> Result<()> {
        for (name, val) in &self.updates {
            write_name(w, name)?;
            w.write_u64::<LittleEndian>(*val)?;
        }

        self.instrs.write_to(w)
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        let mut r = msg.reader();
        let program_uid = r.read_u32::<LittleEndian>()?;
        let num_updates = r.read_u32::<LittleEndian>()?;
        let mut updates = vec![];
        for _ in 0..num_updates {
            let name = read_name(&mut r)?;
            let val = r.read_u64::<LittleEndian>()?;
            updates.push((name, val));
        }

        let instrs = Bin::read_from(&mut r)?;
        expect_consumed(&r, "install")?;
        Ok(Msg {
            sid: msg.sid,
            program_uid,
            num_updates,
            updates,
            instrs,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::lang::{self, Expr, Program, Value};

    fn msg() -> super::Msg {
        let p = Program::new("install")
            .volatile("foo", Value::Num(0))
            .rule("foo", Expr::Num(4));
        let (bin, sc) = lang::compile(&p).expect("compile");
        super::Msg {
            sid: 1,
            program_uid: sc.program_uid,
            num_updates: 1,
            updates: vec![(String::from("Cwnd"), 14600)],
            instrs: bin,
        }
    }

    check_msg!(
        test_install_1,
        super::Msg,
        msg(),
        crate::serialize::Msg::Ins(ins),
        ins
    );

    #[test]
    fn serialize_install_msg() {
        let m = msg();
        let buf: Vec<u8> = crate::serialize::serialize(&m).expect("serialize");
        assert_eq!(
            &buf[..29],
            &[
                2, 0,                                        // INSTALL
                buf[2], buf[3],                              // length
                1, 0, 0, 0,                                  // sock_id = 1
                buf[8], buf[9], buf[10], buf[11],            // program_uid
                1, 0, 0, 0,                                  // num_updates = 1
                4, b'C', b'w', b'n', b'd',                   // "Cwnd"
                0x08, 0x39, 0, 0, 0, 0, 0, 0,                // 14600
            ][..],
        );
        assert_eq!(u16::from(buf[2]) | u16::from(buf[3]) << 8, buf.len() as u16);
    }

    #[test]
    fn reject_bad_program() {
        let m = msg();
        let buf: Vec<u8> = crate::serialize::serialize(&m).expect("serialize");
        let mut broken = buf.clone();
        // the field count of the program
        broken[29] = 200;
        assert!(crate::serialize::Msg::from_buf(&broken[..]).is_err());
    }
}
