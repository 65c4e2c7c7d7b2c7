//! Typed, SSA-style intermediate representation for Lyra and the lowering
//! pass that produces it from the type-annotated AST.
//!
//! The IR is backend-neutral: explicit basic blocks, typed value arenas,
//! stack slots, and memoized struct layouts, independent of any specific
//! backend API. The module owns every function, value, and layout; the rest
//! of the compiler holds opaque indices into it, never pointers.

mod lower;
mod module;

pub use lower::IrGenerator;
pub use module::{
    BinOp, BlockId, CastKind, CmpCond, ExternalFn, Inst, IrBlock, IrFunction, IrModule, IrSlot,
    IrType, LayoutTable, SlotId, StructLayout, Terminator, ValueId,
};
