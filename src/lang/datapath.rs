use std::collections::HashMap;

use super::prog::{Expr, Op, Program, Type, Value};
use super::Prim;
use crate::{Error, Result};

/// Upper bound on temporaries a single rule may use.
pub const MAX_TMPS: u8 = 16;
/// Upper bound on fields a program may declare.
pub const MAX_FIELDS: usize = 64;
/// Upper bound on instructions in either the update block or the condition.
pub const MAX_INSTRS: usize = 256;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Reg {
    ImmNum(u64),
    ImmBool(bool),
    Prim(Prim),
    Perm(u8),
    Tmp(u8),
    Micros,
    Cwnd,
    None,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instr {
    pub res: Reg,
    pub op: Op,
    pub left: Reg,
    pub right: Reg,
}

/// A field as the datapath sees it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Def {
    pub name: String,
    pub volatile: bool,
    pub init: Value,
}

/// A compiled program: straight-line instructions the datapath evaluates on
/// every ack, followed by the report condition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bin {
    pub defs: Vec<Def>,
    pub num_tmps: u8,
    pub update: Vec<Instr>,
    pub cond: Vec<Instr>,
    pub cond_reg: Reg,
    pub reset_micros: bool,
}

/// Maps the names of a program's fields to their position in a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub program_uid: u32,
    pub program_name: String,
    named: HashMap<String, (u8, Type)>,
}

impl Scope {
    fn new(program_name: &str) -> Self {
        Scope {
            program_uid: 0,
            program_name: program_name.to_owned(),
            named: HashMap::new(),
        }
    }

    /// Look up a field. Both `acked` and `Report.acked` name the same field.
    pub fn get(&self, name: &str) -> Option<&(u8, Type)> {
        let name = name.strip_prefix("Report.").unwrap_or(name);
        self.named.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn num_fields(&self) -> usize {
        self.named.len()
    }

    fn new_perm(&mut self, name: &str, t: Type) -> Result<u8> {
        if self.named.contains_key(name) {
            return Err(Error::Compile(format!("field {} defined twice", name)));
        }

        if self.named.len() >= MAX_FIELDS {
            return Err(Error::Compile(format!(
                "too many fields: at most {} allowed",
                MAX_FIELDS
            )));
        }

        let id = self.named.len() as u8;
        self.named.insert(name.to_owned(), (id, t));
        Ok(id)
    }
}

struct Tmps {
    next: u8,
    high_water: u8,
}

impl Tmps {
    fn new_tmp(&mut self) -> Result<Reg> {
        if self.next >= MAX_TMPS {
            return Err(Error::Compile(String::from(
                "expression too deep: out of temporaries",
            )));
        }

        let r = Reg::Tmp(self.next);
        self.next += 1;
        self.high_water = self.high_water.max(self.next);
        Ok(r)
    }

    fn clear_tmps(&mut self) {
        self.next = 0;
    }
}

/// Given a single Expr, return
/// a Vec<Instr> that evaluates that Expr
/// a Reg in which the result is stored, and its type.
///
/// The left argument is evaluated first.
fn compile_expr(e: &Expr, scope: &Scope, tmps: &mut Tmps) -> Result<(Vec<Instr>, Reg, Type)> {
    match *e {
        Expr::Bool(b) => Ok((vec![], Reg::ImmBool(b), Type::Bool)),
        Expr::Num(n) => Ok((vec![], Reg::ImmNum(n), Type::Num)),
        Expr::Prim(p) => Ok((vec![], Reg::Prim(p), p.get_type())),
        Expr::Micros => Ok((vec![], Reg::Micros, Type::Num)),
        Expr::Cwnd => Ok((vec![], Reg::Cwnd, Type::Num)),
        Expr::Field(ref name) => match scope.get(name) {
            Some(&(idx, t)) => Ok((vec![], Reg::Perm(idx), t)),
            None => Err(Error::Compile(format!("unknown field: {}", name))),
        },
        Expr::Sexp(o, ref left_expr, ref right_expr) => {
            let (mut instrs, left, left_type) = compile_expr(left_expr, scope, tmps)?;
            let (mut right_instrs, right, right_type) = compile_expr(right_expr, scope, tmps)?;
            instrs.append(&mut right_instrs);

            let res_type = match o {
                Op::Add | Op::Div | Op::Max | Op::Min | Op::Mul | Op::Sub => Type::Num,
                Op::Equiv | Op::Gt | Op::Lt => Type::Bool,
                Op::Bind => {
                    return Err(Error::Compile(String::from(
                        "bind is only allowed at the top level of a rule",
                    )))
                }
            };

            // operands of every supported operator are numbers
            if left_type != Type::Num || right_type != Type::Num {
                return Err(Error::Compile(format!(
                    "{:?} expected (Num, Num), got ({:?}, {:?})",
                    o, left_type, right_type
                )));
            }

            let res = tmps.new_tmp()?;
            instrs.push(Instr {
                res: res.clone(),
                op: o,
                left,
                right,
            });

            Ok((instrs, res, res_type))
        }
    }
}

/// Lower `field := expr` into instructions that leave the result in the field.
fn compile_rule(field: &str, expr: &Expr, scope: &Scope, tmps: &mut Tmps) -> Result<Vec<Instr>> {
    let (idx, field_type) = match scope.get(field) {
        Some(&f) => f,
        None => return Err(Error::Compile(format!("assignment to unknown field: {}", field))),
    };

    let (mut instrs, reg, t) = compile_expr(expr, scope, tmps)?;
    if t != field_type {
        return Err(Error::Compile(format!(
            "cannot assign {:?} to {} of type {:?}",
            t, field, field_type
        )));
    }

    // if the last instruction computed into a temporary, write the field directly
    if let Reg::Tmp(_) = reg {
        if let Some(last) = instrs.last_mut() {
            if last.res == reg {
                last.res = Reg::Perm(idx);
                return Ok(instrs);
            }
        }
    }

    instrs.push(Instr {
        res: Reg::Perm(idx),
        op: Op::Bind,
        left: reg,
        right: Reg::None,
    });
    Ok(instrs)
}

impl Bin {
    /// Type-check `p` and lower it. The returned `Scope` carries a program id
    /// derived from the compiled bytes.
    pub fn compile_prog(p: &Program) -> Result<(Self, Scope)> {
        let mut scope = Scope::new(&p.name);
        let mut defs = Vec::with_capacity(p.fields.len());
        for f in &p.fields {
            scope.new_perm(&f.name, f.init.get_type())?;
            defs.push(Def {
                name: f.name.clone(),
                volatile: f.volatile,
                init: f.init,
            });
        }

        let mut tmps = Tmps {
            next: 0,
            high_water: 0,
        };

        let mut update = vec![];
        for r in &p.rules {
            tmps.clear_tmps();
            update.append(&mut compile_rule(&r.field, &r.expr, &scope, &mut tmps)?);
        }

        tmps.clear_tmps();
        let (cond, cond_reg, cond_type) = compile_expr(&p.trigger.cond, &scope, &mut tmps)?;
        if cond_type != Type::Bool {
            return Err(Error::Compile(format!(
                "report condition must be Bool, got {:?}",
                cond_type
            )));
        }

        if update.len() > MAX_INSTRS || cond.len() > MAX_INSTRS {
            return Err(Error::Compile(format!(
                "program too long: at most {} instructions per block",
                MAX_INSTRS
            )));
        }

        let bin = Bin {
            defs,
            num_tmps: tmps.high_water,
            update,
            cond,
            cond_reg,
            reset_micros: p.trigger.reset_micros,
        };

        scope.program_uid = program_uid(&p.name, &bin.serialize()?);
        Ok((bin, scope))
    }

    /// Index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<u8> {
        let name = name.strip_prefix("Report.").unwrap_or(name);
        self.defs.iter().position(|d| d.name == name).map(|i| i as u8)
    }
}

// FNV-1a over the program name and its compiled form.
fn program_uid(name: &str, bin: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in name.as_bytes().iter().chain(bin.iter()) {
        h ^= u32::from(*b);
        h = h.wrapping_mul(0x0100_0193);
    }

    if h == 0 {
        1
    } else {
        h
    }
}

#[cfg(test)]
mod tests {
    use super::{Bin, Instr, Reg};
    use crate::lang::{Expr, Op, Prim, Program, Value};

    fn counter() -> Program {
        Program::new("counter")
            .volatile("acked", Value::Num(0))
            .rule(
                "acked",
                Expr::add(Expr::field("acked"), Prim::AckBytesAcked.into()),
            )
            .report_when(Expr::gt(Expr::Micros, Expr::Num(1000)), true)
    }

    #[test]
    fn compile_counter() {
        let (bin, sc) = Bin::compile_prog(&counter()).expect("compile");
        assert_eq!(
            bin.update,
            vec![Instr {
                res: Reg::Perm(0),
                op: Op::Add,
                left: Reg::Perm(0),
                right: Reg::Prim(Prim::AckBytesAcked),
            }]
        );
        assert_eq!(
            bin.cond,
            vec![Instr {
                res: Reg::Tmp(0),
                op: Op::Gt,
                left: Reg::Micros,
                right: Reg::ImmNum(1000),
            }]
        );
        assert_eq!(bin.cond_reg, Reg::Tmp(0));
        assert_eq!(bin.num_tmps, 1);
        assert!(sc.has("Report.acked"));
        assert!(sc.has("acked"));
        assert_ne!(sc.program_uid, 0);
    }

    #[test]
    fn plain_assignment_binds() {
        let p = Program::new("bind")
            .field("rtt", Value::Num(0))
            .rule("rtt", Prim::FlowRttSampleUs.into());
        let (bin, _) = Bin::compile_prog(&p).expect("compile");
        assert_eq!(
            bin.update,
            vec![Instr {
                res: Reg::Perm(0),
                op: Op::Bind,
                left: Reg::Prim(Prim::FlowRttSampleUs),
                right: Reg::None,
            }]
        );
    }

    #[test]
    fn nested_expression_uses_temporaries() {
        let p = Program::new("nested")
            .field("x", Value::Num(0))
            .rule(
                "x",
                Expr::max(
                    Expr::add(Expr::field("x"), Expr::Num(1)),
                    Expr::mul(Expr::Num(2), Expr::Cwnd),
                ),
            );
        let (bin, _) = Bin::compile_prog(&p).expect("compile");
        assert_eq!(bin.update.len(), 3);
        assert_eq!(bin.update[2].res, Reg::Perm(0));
        assert_eq!(bin.num_tmps, 3);
    }

    #[test]
    fn uid_depends_on_program() {
        let (_, a) = Bin::compile_prog(&counter()).expect("compile");
        let (_, b) = Bin::compile_prog(&counter()).expect("compile");
        let (_, c) = Bin::compile_prog(&counter().field("extra", Value::Num(0))).expect("compile");
        assert_eq!(a.program_uid, b.program_uid);
        assert_ne!(a.program_uid, c.program_uid);
    }

    #[test]
    fn type_errors() {
        let unknown = Program::new("t").rule("nope", Expr::Num(1));
        assert!(Bin::compile_prog(&unknown).is_err());

        let mismatch = Program::new("t")
            .field("flag", Value::Bool(false))
            .rule("flag", Expr::Num(1));
        assert!(Bin::compile_prog(&mismatch).is_err());

        let bool_arith = Program::new("t")
            .field("x", Value::Num(0))
            .rule("x", Expr::add(Expr::Bool(true), Expr::Num(1)));
        assert!(Bin::compile_prog(&bool_arith).is_err());

        let num_cond = Program::new("t").report_when(Expr::Num(1), false);
        assert!(Bin::compile_prog(&num_cond).is_err());

        let dup = Program::new("t")
            .field("x", Value::Num(0))
            .field("x", Value::Num(1));
        assert!(Bin::compile_prog(&dup).is_err());
    }

    #[test]
    fn too_deep() {
        let mut e = Expr::Num(0);
        for _ in 0..20 {
            e = Expr::add(Expr::Num(1), e);
        }
        // right-nested: every level holds a temporary until the outermost add
        let p = Program::new("deep").field("x", Value::Num(0)).rule("x", e);
        assert!(Bin::compile_prog(&p).is_err());
    }
}
