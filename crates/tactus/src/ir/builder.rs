use crate::ir::{Expr, Netlist, Stmt, VarId};

pub(crate) fn var_ref(var: VarId) -> Expr {
    Expr::VarRef(var)
}

pub(crate) fn bit_const(value: u64) -> Expr {
    Expr::Const { value, width: 1 }
}

pub(crate) fn uint_const(value: u64) -> Expr {
    Expr::Const { value, width: 32 }
}

/// `var = val`, with the constant sized to the variable's type.
pub(crate) fn set_var(netlist: &Netlist, var: VarId, val: u64) -> Stmt {
    Stmt::Assign {
        lhs: Expr::VarRef(var),
        rhs: Expr::Const {
            value: val,
            width: netlist.var(var).dtype.width(),
        },
    }
}

/// `vec.at(index)` trigger flag reference.
pub(crate) fn vec_at(vec: VarId, index: u32) -> Expr {
    Expr::MethodCall {
        recv: Box::new(Expr::VarRef(vec)),
        name: "at".to_string(),
        args: vec![uint_const(index as u64)],
    }
}

/// `vec.any()` -- true when any trigger flag is set.
pub(crate) fn vec_any(vec: VarId) -> Expr {
    Expr::MethodCall {
        recv: Box::new(Expr::VarRef(vec)),
        name: "any".to_string(),
        args: Vec::new(),
    }
}
