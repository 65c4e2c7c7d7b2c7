//! IR data model: modules, functions, blocks, instructions, and layouts.

use std::collections::BTreeMap;
use std::fmt;

/// Index of an SSA value within its function's value arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Index of a stack slot within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

/// A machine-level value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    /// 1-bit integer (booleans).
    I1,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Untyped byte pointer.
    Ptr,
    Void,
    /// A struct layout registered in the module's [`LayoutTable`], referred
    /// to by its canonical name.
    Struct(String),
}

impl IrType {
    pub fn is_integer(&self) -> bool {
        matches!(self, IrType::I1 | IrType::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    /// Bit width of integer types; used to pick between widening and
    /// narrowing casts.
    pub fn int_bits(&self) -> Option<u32> {
        match self {
            IrType::I1 => Some(1),
            IrType::I64 => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::I1 => write!(f, "i1"),
            IrType::I64 => write!(f, "i64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Ptr => write!(f, "ptr"),
            IrType::Void => write!(f, "void"),
            IrType::Struct(name) => write!(f, "%{name}"),
        }
    }
}

/// A named struct layout for a composite runtime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<IrType>,
}

/// Struct layouts memoized by canonical type name, created once per module
/// on first use.
#[derive(Debug, Default)]
pub struct LayoutTable {
    layouts: BTreeMap<String, StructLayout>,
}

impl LayoutTable {
    pub fn get(&self, name: &str) -> Option<&StructLayout> {
        self.layouts.get(name)
    }

    /// Fetch the layout for `name`, building its field list on first use.
    pub fn get_or_insert_with(
        &mut self,
        name: &str,
        fields: impl FnOnce() -> Vec<IrType>,
    ) -> &StructLayout {
        self.layouts
            .entry(name.to_string())
            .or_insert_with(|| StructLayout {
                name: name.to_string(),
                fields: fields(),
            })
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StructLayout> {
        self.layouts.values()
    }
}

/// Integer/float comparison condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpCond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    IAdd,
    ISub,
    IMul,
    IDiv,
    IRem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
    ICmp(CmpCond),
    FCmp(CmpCond),
    BAnd,
    BOr,
}

/// An implicit numeric conversion. The destination value's type names the
/// target; the kind names the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    SignExtend,
    Truncate,
    FloatExtend,
    FloatTruncate,
    IntToFloat,
    FloatToInt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    ConstInt {
        dest: ValueId,
        value: i64,
    },
    ConstFloat {
        dest: ValueId,
        value: f64,
    },
    ConstBool {
        dest: ValueId,
        value: bool,
    },
    /// Typed null pointer.
    ConstNull {
        dest: ValueId,
    },
    /// Decoded string bytes including the trailing terminator.
    ConstStr {
        dest: ValueId,
        bytes: Vec<u8>,
    },
    /// Address of a module-level function (lambdas, function references).
    FuncAddr {
        dest: ValueId,
        name: String,
    },
    Load {
        dest: ValueId,
        slot: SlotId,
    },
    Store {
        slot: SlotId,
        value: ValueId,
    },
    Binary {
        dest: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cast {
        dest: ValueId,
        kind: CastKind,
        value: ValueId,
    },
    Call {
        /// Absent for void calls.
        dest: Option<ValueId>,
        callee: String,
        args: Vec<ValueId>,
    },
}

impl Inst {
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            Inst::ConstInt { dest, .. }
            | Inst::ConstFloat { dest, .. }
            | Inst::ConstBool { dest, .. }
            | Inst::ConstNull { dest }
            | Inst::ConstStr { dest, .. }
            | Inst::FuncAddr { dest, .. }
            | Inst::Load { dest, .. }
            | Inst::Binary { dest, .. }
            | Inst::Cast { dest, .. } => Some(*dest),
            Inst::Call { dest, .. } => *dest,
            Inst::Store { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<ValueId>),
    Unreachable,
}

#[derive(Debug, Default)]
pub struct IrBlock {
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
}

/// One stack slot: a function-local memory cell for a mutable variable.
///
/// Slots live on the function rather than in an instruction stream, which
/// makes them entry-block allocations by construction — every slot
/// dominates every use no matter where the declaration appeared textually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrSlot {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: IrType,
    /// `blocks[0]` is the entry block.
    pub blocks: Vec<IrBlock>,
    pub slots: Vec<IrSlot>,
    values: Vec<IrType>,
}

impl IrFunction {
    /// Create a function with an open entry block. Parameters occupy the
    /// first `params.len()` entries of the value arena.
    pub fn new(name: impl Into<String>, params: Vec<IrType>, ret: IrType) -> Self {
        let values = params.clone();
        Self {
            name: name.into(),
            params,
            ret,
            blocks: vec![IrBlock::default()],
            slots: Vec::new(),
            values,
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// The SSA value bound to parameter `index`.
    pub fn param_value(&self, index: usize) -> ValueId {
        debug_assert!(index < self.params.len());
        ValueId(index as u32)
    }

    pub fn new_value(&mut self, ty: IrType) -> ValueId {
        self.values.push(ty);
        ValueId(self.values.len() as u32 - 1)
    }

    pub fn value_type(&self, value: ValueId) -> &IrType {
        &self.values[value.0 as usize]
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(IrBlock::default());
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn new_slot(&mut self, name: impl Into<String>, ty: IrType) -> SlotId {
        self.slots.push(IrSlot {
            name: name.into(),
            ty,
        });
        SlotId(self.slots.len() as u32 - 1)
    }

    pub fn slot_type(&self, slot: SlotId) -> &IrType {
        &self.slots[slot.0 as usize].ty
    }

    pub fn block(&self, block: BlockId) -> &IrBlock {
        &self.blocks[block.0 as usize]
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.block(block).terminator.is_some()
    }

    /// Append an instruction. Appends into a terminated block are dropped:
    /// they are unreachable code after a `return`.
    pub fn push(&mut self, block: BlockId, inst: Inst) {
        let block = &mut self.blocks[block.0 as usize];
        if block.terminator.is_none() {
            block.insts.push(inst);
        }
    }

    /// Set a block's terminator. The first terminator wins; later ones are
    /// unreachable and dropped.
    pub fn terminate(&mut self, block: BlockId, terminator: Terminator) {
        let block = &mut self.blocks[block.0 as usize];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }
}

/// An externally-declared function at the IR boundary (runtime library and
/// FFI collaborators). Bodies are never embedded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFn {
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: IrType,
}

/// A lowered compilation unit: functions, external declarations, and the
/// memoized struct layouts for composite runtime types.
#[derive(Debug, Default)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
    pub externals: Vec<ExternalFn>,
    pub layouts: LayoutTable,
}

impl IrModule {
    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_occupy_the_value_arena_head() {
        let mut func = IrFunction::new("f", vec![IrType::I64, IrType::F64], IrType::Void);
        assert_eq!(func.param_value(0), ValueId(0));
        assert_eq!(func.value_type(ValueId(1)), &IrType::F64);
        let extra = func.new_value(IrType::I1);
        assert_eq!(extra, ValueId(2));
        assert_eq!(func.value_count(), 3);
    }

    #[test]
    fn layout_memoization_builds_once() {
        let mut layouts = LayoutTable::default();
        let mut built = 0;
        layouts.get_or_insert_with("list<int>", || {
            built += 1;
            vec![IrType::Ptr, IrType::I64, IrType::I64]
        });
        layouts.get_or_insert_with("list<int>", || {
            built += 1;
            vec![]
        });
        assert_eq!(built, 1);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts.get("list<int>").unwrap().fields.len(), 3);
    }

    #[test]
    fn appends_after_a_terminator_are_dropped() {
        let mut func = IrFunction::new("f", vec![], IrType::Void);
        let entry = func.entry();
        func.terminate(entry, Terminator::Return(None));
        let dest = func.new_value(IrType::I64);
        func.push(entry, Inst::ConstInt { dest, value: 1 });
        func.terminate(entry, Terminator::Unreachable);

        assert!(func.block(entry).insts.is_empty());
        assert_eq!(
            func.block(entry).terminator,
            Some(Terminator::Return(None))
        );
    }
}
