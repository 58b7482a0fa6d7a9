//! The in-memory description of a datapath program.

use std::fmt;

/// A value the datapath exposes for the most recent ack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prim {
    AckBytesAcked,
    AckPacketsAcked,
    AckBytesMisordered,
    AckPacketsMisordered,
    AckLostPktsSample,
    AckEcnPackets,
    AckNow,
    FlowBytesInFlight,
    FlowPacketsInFlight,
    FlowBytesPending,
    FlowRateIncoming,
    FlowRateOutgoing,
    FlowRttSampleUs,
    FlowWasTimeout,
}

const PRIMS: [Prim; 14] = [
    Prim::AckBytesAcked,
    Prim::AckPacketsAcked,
    Prim::AckBytesMisordered,
    Prim::AckPacketsMisordered,
    Prim::AckLostPktsSample,
    Prim::AckEcnPackets,
    Prim::AckNow,
    Prim::FlowBytesInFlight,
    Prim::FlowPacketsInFlight,
    Prim::FlowBytesPending,
    Prim::FlowRateIncoming,
    Prim::FlowRateOutgoing,
    Prim::FlowRttSampleUs,
    Prim::FlowWasTimeout,
];

impl Prim {
    pub fn name(self) -> &'static str {
        match self {
            Prim::AckBytesAcked => "Ack.bytes_acked",
            Prim::AckPacketsAcked => "Ack.packets_acked",
            Prim::AckBytesMisordered => "Ack.bytes_misordered",
            Prim::AckPacketsMisordered => "Ack.packets_misordered",
            Prim::AckLostPktsSample => "Ack.lost_pkts_sample",
            Prim::AckEcnPackets => "Ack.ecn_packets",
            Prim::AckNow => "Ack.now",
            Prim::FlowBytesInFlight => "Flow.bytes_in_flight",
            Prim::FlowPacketsInFlight => "Flow.packets_in_flight",
            Prim::FlowBytesPending => "Flow.bytes_pending",
            Prim::FlowRateIncoming => "Flow.rate_incoming",
            Prim::FlowRateOutgoing => "Flow.rate_outgoing",
            Prim::FlowRttSampleUs => "Flow.rtt_sample_us",
            Prim::FlowWasTimeout => "Flow.was_timeout",
        }
    }

    pub fn from_name(name: &str) -> Option<Prim> {
        PRIMS.iter().copied().find(|p| p.name() == name)
    }

    /// Wire identifier.
    pub fn id(self) -> u8 {
        // PRIMS is ordered by declaration
        PRIMS.iter().position(|p| *p == self).unwrap_or(0) as u8
    }

    pub fn from_id(id: u8) -> Option<Prim> {
        PRIMS.get(id as usize).copied()
    }

    pub fn get_type(self) -> Type {
        match self {
            Prim::FlowWasTimeout => Type::Bool,
            _ => Type::Num,
        }
    }
}

impl fmt::Display for Prim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Num,
}

/// The initial value of a program field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Num(u64),
}

impl Value {
    pub fn get_type(self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Num(_) => Type::Num,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Value::Bool(b) => u64::from(b),
            Value::Num(n) => n,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Bind,
    Div,
    Equiv,
    Gt,
    Lt,
    Max,
    Min,
    Mul,
    Sub,
}

const OPS: [Op; 10] = [
    Op::Add,
    Op::Bind,
    Op::Div,
    Op::Equiv,
    Op::Gt,
    Op::Lt,
    Op::Max,
    Op::Min,
    Op::Mul,
    Op::Sub,
];

impl Op {
    pub fn id(self) -> u8 {
        OPS.iter().position(|o| *o == self).unwrap_or(0) as u8
    }

    pub fn from_id(id: u8) -> Option<Op> {
        OPS.get(id as usize).copied()
    }
}

/// An expression over ack primitives, program fields and the two implicit
/// registers `Micros` (time since the report epoch began) and `Cwnd`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Bool(bool),
    Num(u64),
    Prim(Prim),
    Field(String),
    Micros,
    Cwnd,
    Sexp(Op, Box<Expr>, Box<Expr>),
}

macro_rules! binop {
    ($name: ident, $op: expr) => {
        pub fn $name(left: Expr, right: Expr) -> Expr {
            Expr::Sexp($op, Box::new(left), Box::new(right))
        }
    };
}

impl Expr {
    pub fn field(name: &str) -> Expr {
        Expr::Field(name.to_owned())
    }

    binop!(add, Op::Add);
    binop!(sub, Op::Sub);
    binop!(mul, Op::Mul);
    binop!(div, Op::Div);
    binop!(min, Op::Min);
    binop!(max, Op::Max);
    binop!(gt, Op::Gt);
    binop!(lt, Op::Lt);
    binop!(equiv, Op::Equiv);
}

impl From<Prim> for Expr {
    fn from(p: Prim) -> Expr {
        Expr::Prim(p)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    /// Volatile fields go back to `init` right after each report is sent.
    pub volatile: bool,
    pub init: Value,
}

/// `field := expr`, evaluated on every ack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub field: String,
    pub expr: Expr,
}

/// When `cond` holds after the rules ran, the datapath sends a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    pub cond: Expr,
    pub reset_micros: bool,
}

/// A datapath program: ordered field declarations, ordered per-ack rules and
/// a single report trigger.
///
/// ```
/// use ccp_aimd::lang::{Expr, Prim, Program, Value};
///
/// let p = Program::new("minrtt")
///     .field("minrtt", Value::Num(u64::MAX))
///     .rule("minrtt", Expr::min(Expr::field("minrtt"), Prim::FlowRttSampleUs.into()))
///     .report_when(Expr::gt(Expr::Micros, Expr::Num(42_000)), true);
/// assert_eq!(p.fields.len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub rules: Vec<Rule>,
    pub trigger: Trigger,
}

impl Program {
    /// A program with no fields that never reports.
    pub fn new(name: &str) -> Self {
        Program {
            name: name.to_owned(),
            fields: vec![],
            rules: vec![],
            trigger: Trigger {
                cond: Expr::Bool(false),
                reset_micros: false,
            },
        }
    }

    pub fn field(mut self, name: &str, init: Value) -> Self {
        self.fields.push(FieldDecl {
            name: name.to_owned(),
            volatile: false,
            init,
        });
        self
    }

    pub fn volatile(mut self, name: &str, init: Value) -> Self {
        self.fields.push(FieldDecl {
            name: name.to_owned(),
            volatile: true,
            init,
        });
        self
    }

    pub fn rule(mut self, field: &str, expr: Expr) -> Self {
        self.rules.push(Rule {
            field: field.to_owned(),
            expr,
        });
        self
    }

    pub fn report_when(mut self, cond: Expr, reset_micros: bool) -> Self {
        self.trigger = Trigger { cond, reset_micros };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{Op, Prim};

    #[test]
    fn prim_names() {
        assert_eq!(
            Prim::from_name("Flow.rtt_sample_us"),
            Some(Prim::FlowRttSampleUs)
        );
        assert_eq!(Prim::from_name("Flow.nonexistent"), None);
        for id in 0..14 {
            let p = Prim::from_id(id).expect("valid prim id");
            assert_eq!(p.id(), id);
            assert_eq!(Prim::from_name(p.name()), Some(p));
        }
        assert_eq!(Prim::from_id(14), None);
    }

    #[test]
    fn op_ids() {
        assert_eq!(Op::from_id(Op::Max.id()), Some(Op::Max));
        assert_eq!(Op::from_id(200), None);
    }
}
