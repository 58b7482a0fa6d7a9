//! Binary form of a compiled program, as carried in an install message.
//!
//! ```text
//! u8 num_defs
//!   per def: u8 flags (1 = volatile, 2 = bool) | u8 name_len | name | u64 init
//! u8 num_tmps | u8 reset_micros
//! u32 num_update_instrs | instrs
//! u32 num_cond_instrs   | instrs
//! reg cond_reg
//!
//! instr: u8 op | reg res | reg left | reg right
//! reg:   u8 tag | u64 value
//! ```
//! All integers are little-endian.

use std::io::prelude::*;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::datapath::{Bin, Def, Instr, Reg, MAX_FIELDS, MAX_INSTRS, MAX_TMPS};
use super::prog::{Op, Prim, Value};
use crate::serialize::{read_name, write_name};
use crate::{Error, Result};

const REG_LEN: u32 = 9;
const INSTR_LEN: u32 = 1 + 3 * REG_LEN;

const FLAG_VOLATILE: u8 = 0x1;
const FLAG_BOOL: u8 = 0x2;

fn write_reg<W: Write>(w: &mut W, r: &Reg) -> Result<()> {
    let (tag, val) = match *r {
        Reg::ImmNum(n) => (0u8, n),
        Reg::ImmBool(b) => (1, u64::from(b)),
        Reg::Prim(p) => (2, u64::from(p.id())),
        Reg::Perm(i) => (3, u64::from(i)),
        Reg::Tmp(i) => (4, u64::from(i)),
        Reg::Micros => (5, 0),
        Reg::Cwnd => (6, 0),
        Reg::None => (7, 0),
    };

    w.write_u8(tag)?;
    w.write_u64::<LittleEndian>(val)?;
    Ok(())
}

fn small(val: u64, what: &str) -> Result<u8> {
    if val > u64::from(u8::max_value()) {
        Err(Error::Serialize(format!("{} index out of range: {}", what, val)))
    } else {
        Ok(val as u8)
    }
}

fn read_reg<R: Read>(r: &mut R) -> Result<Reg> {
    let tag = r.read_u8()?;
    let val = r.read_u64::<LittleEndian>()?;
    Ok(match tag {
        0 => Reg::ImmNum(val),
        1 => Reg::ImmBool(val != 0),
        2 => {
            let id = small(val, "primitive")?;
            Reg::Prim(
                Prim::from_id(id)
                    .ok_or_else(|| Error::Serialize(format!("unknown primitive: {}", id)))?,
            )
        }
        3 => Reg::Perm(small(val, "field")?),
        4 => Reg::Tmp(small(val, "temporary")?),
        5 => Reg::Micros,
        6 => Reg::Cwnd,
        7 => Reg::None,
        t => return Err(Error::Serialize(format!("unknown register tag: {}", t))),
    })
}

fn write_instrs<W: Write>(w: &mut W, instrs: &[Instr]) -> Result<()> {
    w.write_u32::<LittleEndian>(instrs.len() as u32)?;
    for i in instrs {
        w.write_u8(i.op.id())?;
        write_reg(w, &i.res)?;
        write_reg(w, &i.left)?;
        write_reg(w, &i.right)?;
    }

    Ok(())
}

fn read_instrs<R: Read>(r: &mut R) -> Result<Vec<Instr>> {
    let n = r.read_u32::<LittleEndian>()? as usize;
    if n > MAX_INSTRS {
        return Err(Error::Serialize(format!("too many instructions: {}", n)));
    }

    let mut instrs = Vec::with_capacity(n);
    for _ in 0..n {
        let op = r.read_u8()?;
        let op = Op::from_id(op).ok_or_else(|| Error::Serialize(format!("unknown op: {}", op)))?;
        let res = read_reg(r)?;
        let left = read_reg(r)?;
        let right = read_reg(r)?;
        instrs.push(Instr {
            res,
            op,
            left,
            right,
        });
    }

    Ok(instrs)
}

impl Bin {
    pub fn len_bytes(&self) -> u32 {
        let defs: u32 = self
            .defs
            .iter()
            .map(|d| 1 + 1 + d.name.len() as u32 + 8)
            .sum();
        1 + defs
            + 2
            + 4
            + self.update.len() as u32 * INSTR_LEN
            + 4
            + self.cond.len() as u32 * INSTR_LEN
            + REG_LEN
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(self.defs.len() as u8)?;
        for d in &self.defs {
            let mut flags = 0u8;
            if d.volatile {
                flags |= FLAG_VOLATILE;
            }

            if let Value::Bool(_) = d.init {
                flags |= FLAG_BOOL;
            }

            w.write_u8(flags)?;
            write_name(w, &d.name)?;
            w.write_u64::<LittleEndian>(d.init.as_u64())?;
        }

        w.write_u8(self.num_tmps)?;
        w.write_u8(u8::from(self.reset_micros))?;
        write_instrs(w, &self.update)?;
        write_instrs(w, &self.cond)?;
        write_reg(w, &self.cond_reg)?;
        Ok(())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len_bytes() as usize);
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Read a program and check every register it references, so that the
    /// datapath never evaluates an out-of-range index.
    pub fn read_from(r: &mut Cursor<&[u8]>) -> Result<Self> {
        let num_defs = r.read_u8()? as usize;
        if num_defs > MAX_FIELDS {
            return Err(Error::Serialize(format!("too many fields: {}", num_defs)));
        }

        let mut defs = Vec::with_capacity(num_defs);
        for _ in 0..num_defs {
            let flags = r.read_u8()?;
            let name = read_name(r)?;
            let init = r.read_u64::<LittleEndian>()?;
            defs.push(Def {
                name,
                volatile: flags & FLAG_VOLATILE != 0,
                init: if flags & FLAG_BOOL != 0 {
                    Value::Bool(init != 0)
                } else {
                    Value::Num(init)
                },
            });
        }

        let num_tmps = r.read_u8()?;
        if num_tmps > MAX_TMPS {
            return Err(Error::Serialize(format!("too many temporaries: {}", num_tmps)));
        }

        let reset_micros = r.read_u8()? != 0;
        let update = read_instrs(r)?;
        let cond = read_instrs(r)?;
        let cond_reg = read_reg(r)?;

        let bin = Bin {
            defs,
            num_tmps,
            update,
            cond,
            cond_reg,
            reset_micros,
        };
        bin.validate()?;
        Ok(bin)
    }

    fn validate(&self) -> Result<()> {
        let check = |r: &Reg, writable: bool| -> Result<()> {
            match *r {
                Reg::Perm(i) if (i as usize) < self.defs.len() => Ok(()),
                Reg::Tmp(i) if i < self.num_tmps => Ok(()),
                Reg::Perm(_) | Reg::Tmp(_) => {
                    Err(Error::Serialize(format!("register out of range: {:?}", r)))
                }
                _ if writable => Err(Error::Serialize(format!(
                    "cannot write to register {:?}",
                    r
                ))),
                _ => Ok(()),
            }
        };

        for i in self.update.iter().chain(self.cond.iter()) {
            check(&i.res, true)?;
            check(&i.left, false)?;
            check(&i.right, false)?;
        }

        check(&self.cond_reg, false)
    }
}
