use std::fmt;

mod builder;
pub(crate) use builder::{bit_const, set_var, uint_const, var_ref, vec_any, vec_at};

/// Scope identifier
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

/// Variable identifier
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VarId(pub usize);

/// Generated function identifier
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FuncId(pub usize);

/// Sensitivity tree identifier
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SenTreeId(pub usize);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

impl fmt::Display for SenTreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sen{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bit,
    UInt32,
    Logic { width: u32 },
    TriggerVec { width: u32 },
    Event,
}

impl DType {
    pub fn width(&self) -> u32 {
        match self {
            DType::Bit | DType::Event => 1,
            DType::UInt32 => 32,
            DType::Logic { width } | DType::TriggerVec { width } => *width,
        }
    }

    pub fn is_trigger_vec(&self) -> bool {
        matches!(self, DType::TriggerVec { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub scope: ScopeId,
    pub dtype: DType,
    /// Top-level module port that feeds the design.
    pub is_input: bool,
    /// Written from foreign code through a DPI export.
    pub written_by_dpi: bool,
    /// SystemC emitter must declare this input sc_sensitive.
    pub sc_sensitive: bool,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub name: String,
    pub parent: Option<ScopeId>,
    pub actives: Vec<ActiveBlock>,
    pub funcs: Vec<FuncId>,
}

/// A body of statements paired with the sensitivity list that runs it.
#[derive(Debug, Clone)]
pub struct ActiveBlock {
    pub sense: SenTreeId,
    pub stmts: Vec<Stmt>,
}

impl ActiveBlock {
    pub fn new(sense: SenTreeId, stmts: Vec<Stmt>) -> Self {
        Self { sense, stmts }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Static,
    Initial,
    Final,
    Combo,
    Illegal,
    Changed,
    Hybrid,
    BothEdge,
    PosEdge,
    NegEdge,
    Event,
    True,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Static => "static",
            EdgeKind::Initial => "initial",
            EdgeKind::Final => "final",
            EdgeKind::Combo => "*",
            EdgeKind::Illegal => "illegal",
            EdgeKind::Changed => "changed",
            EdgeKind::Hybrid => "hybrid",
            EdgeKind::BothEdge => "edge",
            EdgeKind::PosEdge => "posedge",
            EdgeKind::NegEdge => "negedge",
            EdgeKind::Event => "event",
            EdgeKind::True => "true",
        };
        write!(f, "{}", s)
    }
}

/// One sensitivity term: an edge kind and the sensed expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenItem {
    pub edge: EdgeKind,
    pub expr: Option<Expr>,
}

impl SenItem {
    pub fn new(edge: EdgeKind, expr: Expr) -> Self {
        Self {
            edge,
            expr: Some(expr),
        }
    }

    pub fn bare(edge: EdgeKind) -> Self {
        Self { edge, expr: None }
    }
}

/// A disjunction of sensitivity terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenTree {
    pub items: Vec<SenItem>,
}

impl SenTree {
    pub fn new(items: Vec<SenItem>) -> Self {
        Self { items }
    }

    pub fn single(item: SenItem) -> Self {
        Self { items: vec![item] }
    }

    fn has_edge(&self, edge: EdgeKind) -> bool {
        self.items.iter().any(|i| i.edge == edge)
    }

    pub fn has_static(&self) -> bool {
        self.has_edge(EdgeKind::Static)
    }

    pub fn has_initial(&self) -> bool {
        self.has_edge(EdgeKind::Initial)
    }

    pub fn has_final(&self) -> bool {
        self.has_edge(EdgeKind::Final)
    }

    pub fn has_combo(&self) -> bool {
        self.has_edge(EdgeKind::Combo)
    }

    pub fn has_hybrid(&self) -> bool {
        self.has_edge(EdgeKind::Hybrid)
    }

    /// True when any term is an edge or event over a runtime value.
    pub fn has_clocked(&self) -> bool {
        self.items.iter().any(|i| {
            matches!(
                i.edge,
                EdgeKind::Changed
                    | EdgeKind::BothEdge
                    | EdgeKind::PosEdge
                    | EdgeKind::NegEdge
                    | EdgeKind::Event
            )
        })
    }

    pub fn has_true(&self) -> bool {
        self.has_edge(EdgeKind::True)
    }
}

/// Expression sum type. Structural equality and hashing are load-bearing:
/// the sensitivity expression builder dedups shadow variables by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    VarRef(VarId),
    Const { value: u64, width: u32 },
    Eq(Box<Expr>, Box<Expr>),
    Neq(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Bit 0 select, used to truncate edge expressions to a single bit.
    Lsb(Box<Expr>),
    MethodCall {
        recv: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn node_count(&self) -> usize {
        match self {
            Expr::VarRef(_) | Expr::Const { .. } => 1,
            Expr::Eq(l, r)
            | Expr::Neq(l, r)
            | Expr::Gt(l, r)
            | Expr::Add(l, r)
            | Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::Xor(l, r) => 1 + l.node_count() + r.node_count(),
            Expr::Not(e) | Expr::Lsb(e) => 1 + e.node_count(),
            Expr::MethodCall { recv, args, .. } => {
                1 + recv.node_count() + args.iter().map(Expr::node_count).sum::<usize>()
            }
        }
    }

    pub fn for_each_var(&self, f: &mut impl FnMut(VarId)) {
        match self {
            Expr::VarRef(v) => f(*v),
            Expr::Const { .. } => {}
            Expr::Eq(l, r)
            | Expr::Neq(l, r)
            | Expr::Gt(l, r)
            | Expr::Add(l, r)
            | Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::Xor(l, r) => {
                l.for_each_var(f);
                r.for_each_var(f);
            }
            Expr::Not(e) | Expr::Lsb(e) => e.for_each_var(f),
            Expr::MethodCall { recv, args, .. } => {
                recv.for_each_var(f);
                for a in args {
                    a.for_each_var(f);
                }
            }
        }
    }

    pub fn map_var_refs(&mut self, f: &mut impl FnMut(VarId) -> VarId) {
        match self {
            Expr::VarRef(v) => *v = f(*v),
            Expr::Const { .. } => {}
            Expr::Eq(l, r)
            | Expr::Neq(l, r)
            | Expr::Gt(l, r)
            | Expr::Add(l, r)
            | Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::Xor(l, r) => {
                l.map_var_refs(f);
                r.map_var_refs(f);
            }
            Expr::Not(e) | Expr::Lsb(e) => e.map_var_refs(f),
            Expr::MethodCall { recv, args, .. } => {
                recv.map_var_refs(f);
                for a in args {
                    a.map_var_refs(f);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::VarRef(v) => write!(f, "{}", v),
            Expr::Const { value, .. } => write!(f, "{}", value),
            Expr::Eq(l, r) => write!(f, "({} == {})", l, r),
            Expr::Neq(l, r) => write!(f, "({} != {})", l, r),
            Expr::Gt(l, r) => write!(f, "({} > {})", l, r),
            Expr::Add(l, r) => write!(f, "({} + {})", l, r),
            Expr::And(l, r) => write!(f, "({} & {})", l, r),
            Expr::Or(l, r) => write!(f, "({} | {})", l, r),
            Expr::Xor(l, r) => write!(f, "({} ^ {})", l, r),
            Expr::Not(e) => write!(f, "(~{})", e),
            Expr::Lsb(e) => write!(f, "{}[0]", e),
            Expr::MethodCall { recv, name, args } => {
                write!(f, "{}.{}(", recv, name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Statement sum type. `Text` is the escape hatch into the emitter's layer
/// (preprocessor guards and the runtime FATAL line stay opaque strings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assign { lhs: Expr, rhs: Expr },
    AssignDly { lhs: Expr, rhs: Expr },
    AssignPre { lhs: Expr, rhs: Expr },
    If {
        cond: Expr,
        then_stmts: Vec<Stmt>,
        else_stmts: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    /// Procedure wrapper around a body; unwrapped when moved into functions.
    Block(Vec<Stmt>),
    Call(FuncId),
    MethodCall {
        recv: Expr,
        name: String,
        args: Vec<Expr>,
    },
    Text(String),
}

impl Stmt {
    pub fn node_count(&self) -> usize {
        match self {
            Stmt::Assign { lhs, rhs }
            | Stmt::AssignDly { lhs, rhs }
            | Stmt::AssignPre { lhs, rhs } => 1 + lhs.node_count() + rhs.node_count(),
            Stmt::If {
                cond,
                then_stmts,
                else_stmts,
            } => {
                1 + cond.node_count()
                    + then_stmts.iter().map(Stmt::node_count).sum::<usize>()
                    + else_stmts.iter().map(Stmt::node_count).sum::<usize>()
            }
            Stmt::While { cond, body } => {
                1 + cond.node_count() + body.iter().map(Stmt::node_count).sum::<usize>()
            }
            Stmt::Block(stmts) => 1 + stmts.iter().map(Stmt::node_count).sum::<usize>(),
            Stmt::Call(_) | Stmt::Text(_) => 1,
            Stmt::MethodCall { recv, args, .. } => {
                1 + recv.node_count() + args.iter().map(Expr::node_count).sum::<usize>()
            }
        }
    }

    pub fn for_each_var(&self, f: &mut impl FnMut(VarId)) {
        match self {
            Stmt::Assign { lhs, rhs }
            | Stmt::AssignDly { lhs, rhs }
            | Stmt::AssignPre { lhs, rhs } => {
                lhs.for_each_var(f);
                rhs.for_each_var(f);
            }
            Stmt::If {
                cond,
                then_stmts,
                else_stmts,
            } => {
                cond.for_each_var(f);
                for s in then_stmts.iter().chain(else_stmts) {
                    s.for_each_var(f);
                }
            }
            Stmt::While { cond, body } => {
                cond.for_each_var(f);
                for s in body {
                    s.for_each_var(f);
                }
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    s.for_each_var(f);
                }
            }
            Stmt::Call(_) | Stmt::Text(_) => {}
            Stmt::MethodCall { recv, args, .. } => {
                recv.for_each_var(f);
                for a in args {
                    a.for_each_var(f);
                }
            }
        }
    }

    pub fn map_var_refs(&mut self, f: &mut impl FnMut(VarId) -> VarId) {
        match self {
            Stmt::Assign { lhs, rhs }
            | Stmt::AssignDly { lhs, rhs }
            | Stmt::AssignPre { lhs, rhs } => {
                lhs.map_var_refs(f);
                rhs.map_var_refs(f);
            }
            Stmt::If {
                cond,
                then_stmts,
                else_stmts,
            } => {
                cond.map_var_refs(f);
                for s in then_stmts.iter_mut().chain(else_stmts) {
                    s.map_var_refs(f);
                }
            }
            Stmt::While { cond, body } => {
                cond.map_var_refs(f);
                for s in body {
                    s.map_var_refs(f);
                }
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    s.map_var_refs(f);
                }
            }
            Stmt::Call(_) | Stmt::Text(_) => {}
            Stmt::MethodCall { recv, args, .. } => {
                recv.map_var_refs(f);
                for a in args {
                    a.map_var_refs(f);
                }
            }
        }
    }

    /// Variables assigned by blocking, delayed or pre assignments.
    pub fn collect_writes(&self, out: &mut crate::HashSet<VarId>) {
        match self {
            Stmt::Assign { lhs, .. }
            | Stmt::AssignDly { lhs, .. }
            | Stmt::AssignPre { lhs, .. } => {
                if let Expr::VarRef(v) = lhs {
                    out.insert(*v);
                }
            }
            Stmt::If {
                then_stmts,
                else_stmts,
                ..
            } => {
                for s in then_stmts.iter().chain(else_stmts) {
                    s.collect_writes(out);
                }
            }
            Stmt::While { body, .. } => {
                for s in body {
                    s.collect_writes(out);
                }
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    s.collect_writes(out);
                }
            }
            _ => {}
        }
    }

    /// Variables whose value flows into this statement.
    pub fn collect_reads(&self, out: &mut crate::HashSet<VarId>) {
        match self {
            Stmt::Assign { rhs, .. }
            | Stmt::AssignDly { rhs, .. }
            | Stmt::AssignPre { rhs, .. } => rhs.for_each_var(&mut |v| {
                out.insert(v);
            }),
            Stmt::If {
                cond,
                then_stmts,
                else_stmts,
            } => {
                cond.for_each_var(&mut |v| {
                    out.insert(v);
                });
                for s in then_stmts.iter().chain(else_stmts) {
                    s.collect_reads(out);
                }
            }
            Stmt::While { cond, body } => {
                cond.for_each_var(&mut |v| {
                    out.insert(v);
                });
                for s in body {
                    s.collect_reads(out);
                }
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    s.collect_reads(out);
                }
            }
            Stmt::Call(_) | Stmt::Text(_) => {}
            Stmt::MethodCall { recv, args, .. } => {
                recv.for_each_var(&mut |v| {
                    out.insert(v);
                });
                for a in args {
                    a.for_each_var(&mut |v| {
                        out.insert(v);
                    });
                }
            }
        }
    }

    /// True when the blocking assignment target is one of the given variables.
    pub fn writes_blocking_to(&self, vars: &crate::HashSet<VarId>) -> bool {
        match self {
            Stmt::Assign { lhs, .. } => {
                matches!(lhs, Expr::VarRef(v) if vars.contains(v))
            }
            Stmt::If {
                then_stmts,
                else_stmts,
                ..
            } => then_stmts
                .iter()
                .chain(else_stmts)
                .any(|s| s.writes_blocking_to(vars)),
            Stmt::While { body, .. } | Stmt::Block(body) => {
                body.iter().any(|s| s.writes_blocking_to(vars))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { lhs, rhs } => write!(f, "{} = {};", lhs, rhs),
            Stmt::AssignDly { lhs, rhs } => write!(f, "{} <= {};", lhs, rhs),
            Stmt::AssignPre { lhs, rhs } => write!(f, "{} <=pre {};", lhs, rhs),
            Stmt::If {
                cond,
                then_stmts,
                else_stmts,
            } => {
                write!(f, "if ({}) {{ ", cond)?;
                for s in then_stmts {
                    write!(f, "{} ", s)?;
                }
                write!(f, "}}")?;
                if !else_stmts.is_empty() {
                    write!(f, " else {{ ")?;
                    for s in else_stmts {
                        write!(f, "{} ", s)?;
                    }
                    write!(f, "}}")?;
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                write!(f, "while ({}) {{ ", cond)?;
                for s in body {
                    write!(f, "{} ", s)?;
                }
                write!(f, "}}")
            }
            Stmt::Block(stmts) => {
                write!(f, "begin ")?;
                for s in stmts {
                    write!(f, "{} ", s)?;
                }
                write!(f, "end")
            }
            Stmt::Call(id) => write!(f, "{}();", id),
            Stmt::MethodCall { recv, name, args } => {
                write!(f, "{}.{}(", recv, name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ");")
            }
            Stmt::Text(text) => write!(f, "{}", text.trim_end()),
        }
    }
}

/// A generated callable.
#[derive(Debug, Clone)]
pub struct Func {
    pub name: String,
    pub scope: ScopeId,
    pub stmts: Vec<Stmt>,
    /// Cold path; the emitter may place it out of line.
    pub slow: bool,
    pub entry_point: bool,
    /// Eligible for the multi-worker emitter.
    pub parallel: bool,
    /// Preprocessor guard wrapping the whole function body.
    pub ifdef: Option<String>,
}

impl Func {
    pub fn node_count(&self) -> usize {
        self.stmts.iter().map(Stmt::node_count).sum()
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func {} {{", self.name)?;
        for s in &self.stmts {
            writeln!(f, "  {}", s)?;
        }
        write!(f, "}}")
    }
}

/// Root of the flattened design.
#[derive(Debug, Clone)]
pub struct Netlist {
    pub scopes: Vec<Scope>,
    pub vars: Vec<Var>,
    pub funcs: Vec<Func>,
    pub sen_trees: Vec<SenTree>,
    pub top_scope: ScopeId,
    pub eval_fn: Option<FuncId>,
    /// Remembered separately for the later liveness pass.
    pub eval_nba_fn: Option<FuncId>,
    pub dpi_export_trigger: Option<VarId>,
    pub top_file: String,
    pub top_line: u32,
}

impl Netlist {
    pub fn new(top_name: &str, file: &str, line: u32) -> Self {
        Self {
            scopes: vec![Scope {
                name: top_name.to_string(),
                parent: None,
                actives: Vec::new(),
                funcs: Vec::new(),
            }],
            vars: Vec::new(),
            funcs: Vec::new(),
            sen_trees: Vec::new(),
            top_scope: ScopeId(0),
            eval_fn: None,
            eval_nba_fn: None,
            dpi_export_trigger: None,
            top_file: file.to_string(),
            top_line: line,
        }
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Var {
        &mut self.vars[id.0]
    }

    pub fn func(&self, id: FuncId) -> &Func {
        &self.funcs[id.0]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Func {
        &mut self.funcs[id.0]
    }

    pub fn sen_tree(&self, id: SenTreeId) -> &SenTree {
        &self.sen_trees[id.0]
    }

    pub fn add_scope(&mut self, name: &str, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            name: name.to_string(),
            parent: Some(parent),
            actives: Vec::new(),
            funcs: Vec::new(),
        });
        id
    }

    pub fn add_var(&mut self, scope: ScopeId, name: &str, dtype: DType) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(Var {
            name: name.to_string(),
            scope,
            dtype,
            is_input: false,
            written_by_dpi: false,
            sc_sensitive: false,
        });
        id
    }

    /// Creates a synthesized variable in the top scope.
    pub fn create_temp(&mut self, name: &str, dtype: DType) -> VarId {
        self.add_var(self.top_scope, name, dtype)
    }

    pub fn add_func(&mut self, func: Func) -> FuncId {
        let id = FuncId(self.funcs.len());
        let scope = func.scope;
        self.funcs.push(func);
        self.scopes[scope.0].funcs.push(id);
        id
    }

    pub fn add_sen_tree(&mut self, tree: SenTree) -> SenTreeId {
        let id = SenTreeId(self.sen_trees.len());
        self.sen_trees.push(tree);
        id
    }

    pub fn find_func(&self, name: &str) -> Option<FuncId> {
        self.funcs
            .iter()
            .position(|func| func.name == name)
            .map(FuncId)
    }

    /// Scope name with hierarchy separators flattened, usable in identifiers.
    pub fn scope_dotless_name(&self, id: ScopeId) -> String {
        self.scope(id).name.replace('.', "__")
    }

    /// Renders an expression with variable names resolved, for debug output.
    pub fn expr_text(&self, expr: &Expr) -> String {
        match expr {
            Expr::VarRef(v) => self.var(*v).name.clone(),
            Expr::Const { value, .. } => value.to_string(),
            Expr::Eq(l, r) => format!("({} == {})", self.expr_text(l), self.expr_text(r)),
            Expr::Neq(l, r) => format!("({} != {})", self.expr_text(l), self.expr_text(r)),
            Expr::Gt(l, r) => format!("({} > {})", self.expr_text(l), self.expr_text(r)),
            Expr::Add(l, r) => format!("({} + {})", self.expr_text(l), self.expr_text(r)),
            Expr::And(l, r) => format!("({} & {})", self.expr_text(l), self.expr_text(r)),
            Expr::Or(l, r) => format!("({} | {})", self.expr_text(l), self.expr_text(r)),
            Expr::Xor(l, r) => format!("({} ^ {})", self.expr_text(l), self.expr_text(r)),
            Expr::Not(e) => format!("(~{})", self.expr_text(e)),
            Expr::Lsb(e) => format!("{}[0]", self.expr_text(e)),
            Expr::MethodCall { recv, name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.expr_text(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}.{}({})", self.expr_text(recv), name, args)
            }
        }
    }

    /// Bit width of an expression, used to size shadow variables.
    pub fn expr_width(&self, expr: &Expr) -> u32 {
        match expr {
            Expr::VarRef(v) => self.var(*v).dtype.width(),
            Expr::Const { width, .. } => *width,
            Expr::Eq(..) | Expr::Neq(..) | Expr::Gt(..) => 1,
            Expr::Add(l, r) | Expr::And(l, r) | Expr::Or(l, r) | Expr::Xor(l, r) => {
                self.expr_width(l).max(self.expr_width(r))
            }
            Expr::Not(e) => self.expr_width(e),
            Expr::Lsb(_) => 1,
            Expr::MethodCall { .. } => 1,
        }
    }

    /// Verilog-form rendering of a sensitivity tree, for trigger dump text.
    pub fn sen_tree_text(&self, id: SenTreeId) -> String {
        let terms = self
            .sen_tree(id)
            .items
            .iter()
            .map(|item| match &item.expr {
                Some(expr) => format!("{} {}", item.edge, self.expr_text(expr)),
                None => item.edge.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" or ");
        format!("@({})", terms)
    }

    /// Structural consistency check over all cross-references.
    pub fn validate(&self) -> Result<(), String> {
        for (i, scope) in self.scopes.iter().enumerate() {
            for active in &scope.actives {
                if active.sense.0 >= self.sen_trees.len() {
                    return Err(format!("scope{}: dangling sensitivity {}", i, active.sense));
                }
            }
            for func in &scope.funcs {
                if func.0 >= self.funcs.len() {
                    return Err(format!("scope{}: dangling function {}", i, func));
                }
            }
        }
        for var in &self.vars {
            if var.scope.0 >= self.scopes.len() {
                return Err(format!("variable '{}': dangling scope", var.name));
            }
        }
        let mut result = Ok(());
        for func in &self.funcs {
            if func.scope.0 >= self.scopes.len() {
                return Err(format!("function '{}': dangling scope", func.name));
            }
            for stmt in &func.stmts {
                self.validate_stmt(&func.name, stmt, &mut result);
            }
        }
        result
    }

    fn validate_stmt(&self, func: &str, stmt: &Stmt, result: &mut Result<(), String>) {
        if result.is_err() {
            return;
        }
        if let Stmt::Call(id) = stmt {
            if id.0 >= self.funcs.len() {
                *result = Err(format!("function '{}': dangling call {}", func, id));
                return;
            }
        }
        let mut bad = None;
        stmt.for_each_var(&mut |v| {
            if v.0 >= self.vars.len() {
                bad = Some(v);
            }
        });
        if let Some(v) = bad {
            *result = Err(format!("function '{}': dangling variable {}", func, v));
            return;
        }
        match stmt {
            Stmt::If {
                then_stmts,
                else_stmts,
                ..
            } => {
                for s in then_stmts.iter().chain(else_stmts) {
                    self.validate_stmt(func, s, result);
                }
            }
            Stmt::While { body, .. } | Stmt::Block(body) => {
                for s in body {
                    self.validate_stmt(func, s, result);
                }
            }
            _ => {}
        }
    }
}
