mod debug;
mod ir;
mod order;
mod sched;

pub use debug::TraceOptions;
pub(crate) use fxhash::FxHashMap as HashMap;
pub(crate) use fxhash::FxHashSet as HashSet;
pub use ir::{
    ActiveBlock, DType, EdgeKind, Expr, Func, FuncId, Netlist, Scope, ScopeId, SenItem, SenTree,
    SenTreeId, Stmt, Var, VarId,
};
pub use order::order;
pub use sched::{
    LogicByScope, LogicClasses, LogicRegions, LogicReplicas, SchedError, SchedOptions, SchedStats,
    schedule,
};
