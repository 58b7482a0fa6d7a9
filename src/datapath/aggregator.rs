//! Evaluates an installed program against every ack.

use super::Primitives;
use crate::lang::{Bin, Instr, Op, Reg};

/// Register file for one evaluation.
struct Regs<'a> {
    fields: &'a mut [u64],
    tmps: &'a mut [u64],
    prims: &'a Primitives,
    micros: u64,
    cwnd: u64,
}

impl<'a> Regs<'a> {
    fn read(&self, r: &Reg) -> u64 {
        match *r {
            Reg::ImmNum(n) => n,
            Reg::ImmBool(b) => u64::from(b),
            Reg::Prim(p) => self.prims.get(p),
            Reg::Perm(i) => self.fields[i as usize],
            Reg::Tmp(i) => self.tmps[i as usize],
            Reg::Micros => self.micros,
            Reg::Cwnd => self.cwnd,
            Reg::None => 0,
        }
    }

    fn write(&mut self, r: &Reg, v: u64) {
        match *r {
            Reg::Perm(i) => self.fields[i as usize] = v,
            Reg::Tmp(i) => self.tmps[i as usize] = v,
            // rejected when the program was decoded
            _ => (),
        }
    }

    fn run(&mut self, instrs: &[Instr]) {
        for i in instrs {
            let l = self.read(&i.left);
            let r = self.read(&i.right);
            let v = match i.op {
                Op::Add => l.saturating_add(r),
                Op::Bind => l,
                Op::Div => l.checked_div(r).unwrap_or(0),
                Op::Equiv => u64::from(l == r),
                Op::Gt => u64::from(l > r),
                Op::Lt => u64::from(l < r),
                Op::Max => l.max(r),
                Op::Min => l.min(r),
                Op::Mul => l.saturating_mul(r),
                Op::Sub => l.saturating_sub(r),
            };

            self.write(&i.res, v);
        }
    }
}

/// The running state of one installed program.
///
/// All buffers are sized when the program is installed; `on_ack` does not
/// allocate.
#[derive(Debug)]
pub struct Aggregator {
    bin: Bin,
    program_uid: u32,
    fields: Vec<u64>,
    tmps: Vec<u64>,
    report: Vec<u64>,
    epoch_start: Option<u64>,
}

impl Aggregator {
    pub fn new(bin: Bin, program_uid: u32) -> Self {
        let fields: Vec<u64> = bin.defs.iter().map(|d| d.init.as_u64()).collect();
        Aggregator {
            tmps: vec![0; bin.num_tmps as usize],
            report: vec![0; fields.len()],
            fields,
            bin,
            program_uid,
            epoch_start: None,
        }
    }

    pub fn program_uid(&self) -> u32 {
        self.program_uid
    }

    pub fn bin(&self) -> &Bin {
        &self.bin
    }

    /// Current value of every field, in declaration order.
    pub fn fields(&self) -> &[u64] {
        &self.fields
    }

    pub fn set_field(&mut self, idx: u8, val: u64) {
        if let Some(f) = self.fields.get_mut(idx as usize) {
            *f = val;
        }
    }

    /// Fold one ack into the fields. Returns the report when the program's
    /// condition fires; volatile fields are reset afterwards.
    ///
    /// The report epoch starts with the first ack after install.
    pub fn on_ack(&mut self, prims: &Primitives, cwnd: u32) -> Option<&[u64]> {
        let start = *self.epoch_start.get_or_insert(prims.now);
        let mut regs = Regs {
            fields: &mut self.fields,
            tmps: &mut self.tmps,
            prims,
            micros: prims.now.saturating_sub(start),
            cwnd: u64::from(cwnd),
        };

        regs.run(&self.bin.update);
        regs.run(&self.bin.cond);
        if regs.read(&self.bin.cond_reg) == 0 {
            return None;
        }

        self.report.copy_from_slice(&self.fields);
        for (f, d) in self.fields.iter_mut().zip(self.bin.defs.iter()) {
            if d.volatile {
                *f = d.init.as_u64();
            }
        }

        if self.bin.reset_micros {
            self.epoch_start = Some(prims.now);
        }

        Some(&self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::Aggregator;
    use crate::datapath::Primitives;
    use crate::lang::{self, Expr, Prim, Program, Value};

    fn agg(p: &Program) -> Aggregator {
        let (bin, sc) = lang::compile(p).expect("compile");
        Aggregator::new(bin, sc.program_uid)
    }

    fn ack(now: u64, acked: u64, rtt: u64) -> Primitives {
        Primitives {
            now,
            bytes_acked: acked,
            rtt_sample_us: rtt,
            ..Default::default()
        }
    }

    #[test]
    fn accumulate_overwrite_extremum() {
        let p = Program::new("t")
            .field("sum", Value::Num(0))
            .field("last", Value::Num(0))
            .field("min", Value::Num(u64::MAX))
            .field("max", Value::Num(0))
            .rule("sum", Expr::add(Expr::field("sum"), Prim::AckBytesAcked.into()))
            .rule("last", Prim::AckBytesAcked.into())
            .rule("min", Expr::min(Expr::field("min"), Prim::FlowRttSampleUs.into()))
            .rule("max", Expr::max(Expr::field("max"), Prim::FlowRttSampleUs.into()));
        let mut a = agg(&p);
        assert!(a.on_ack(&ack(0, 100, 50), 0).is_none());
        assert!(a.on_ack(&ack(1, 200, 30), 0).is_none());
        assert!(a.on_ack(&ack(2, 50, 40), 0).is_none());
        assert_eq!(a.fields(), &[350, 50, 30, 50]);
    }

    #[test]
    fn trigger_on_elapsed_micros() {
        let p = Program::new("t")
            .volatile("acked", Value::Num(0))
            .field("total", Value::Num(0))
            .rule("acked", Expr::add(Expr::field("acked"), Prim::AckBytesAcked.into()))
            .rule("total", Expr::add(Expr::field("total"), Prim::AckBytesAcked.into()))
            .report_when(Expr::gt(Expr::Micros, Prim::FlowRttSampleUs.into()), true);
        let mut a = agg(&p);

        // epoch starts at t=1000
        assert!(a.on_ack(&ack(1000, 10, 100), 0).is_none());
        assert!(a.on_ack(&ack(1100, 10, 100), 0).is_none());
        assert_eq!(a.on_ack(&ack(1101, 10, 100), 0), Some(&[30, 30][..]));

        // volatile field reset, the other one persists, Micros restarted
        assert_eq!(a.fields(), &[0, 30]);
        assert!(a.on_ack(&ack(1150, 5, 100), 0).is_none());
        assert_eq!(a.on_ack(&ack(1202, 5, 100), 0), Some(&[10, 40][..]));
    }

    #[test]
    fn no_reset_keeps_epoch() {
        let p = Program::new("t")
            .field("micros", Value::Num(0))
            .rule("micros", Expr::Micros)
            .report_when(Expr::gt(Expr::Micros, Expr::Num(10)), false);
        let mut a = agg(&p);
        assert!(a.on_ack(&ack(0, 0, 0), 0).is_none());
        assert_eq!(a.on_ack(&ack(11, 0, 0), 0), Some(&[11][..]));
        assert_eq!(a.on_ack(&ack(12, 0, 0), 0), Some(&[12][..]));
    }

    #[test]
    fn reads_cwnd_and_timeout() {
        let p = Program::new("t")
            .field("cwnd", Value::Num(0))
            .field("timeout", Value::Bool(false))
            .rule("cwnd", Expr::Cwnd)
            .rule("timeout", Prim::FlowWasTimeout.into())
            .report_when(Expr::Bool(true), false);
        let mut a = agg(&p);
        let prims = Primitives {
            was_timeout: true,
            ..Default::default()
        };
        assert_eq!(a.on_ack(&prims, 14600), Some(&[14600, 1][..]));
    }

    #[test]
    fn arithmetic_does_not_trap() {
        let p = Program::new("t")
            .field("q", Value::Num(7))
            .field("d", Value::Num(0))
            .rule("q", Expr::div(Expr::field("q"), Prim::AckBytesAcked.into()))
            .rule("d", Expr::sub(Expr::Num(1), Expr::Num(2)));
        let mut a = agg(&p);
        assert!(a.on_ack(&ack(0, 0, 0), 0).is_none());
        assert_eq!(a.fields(), &[0, 0]);
    }
}
