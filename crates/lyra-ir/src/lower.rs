//! Lowering from the type-annotated AST to the typed IR module.
//!
//! Every lowering function returns a tagged result: `Ok(Some(value))` for a
//! well-typed value, `Ok(None)` for a diagnosed failure (callers
//! short-circuit their dependent code), and `Err(FunctionAbort)` when a
//! fatal internal inconsistency stops the current function's lowering.
//! A `None` result must never be consumed as if it were a value.

use lyra_ast::{
    BinaryOp, ClassDecl, Expr, ExprKind, FunctionDecl, LiteralKind, MatchArm, Param, Pattern,
    PatternKind, Stmt, StmtKind, Token, UnaryOp,
};
use lyra_diag::{ErrorCode, ErrorHandler};
use lyra_types::{BasicKind, Type};
use rustc_hash::FxHashMap;

use crate::module::{
    BinOp, BlockId, CastKind, CmpCond, ExternalFn, Inst, IrFunction, IrModule, IrType, SlotId,
    Terminator, ValueId,
};

/// A fatal inconsistency was diagnosed; abandon the current function's
/// lowering (the pass itself continues with the next function).
#[derive(Debug, Clone, Copy)]
pub struct FunctionAbort;

type Lowered = Result<Option<ValueId>, FunctionAbort>;

/// Per-function lowering state: the function under construction, the block
/// receiving instructions, and the flat name → slot table (no nested-scope
/// shadowing at this level).
struct FuncCtx {
    func: IrFunction,
    current: BlockId,
    symbols: FxHashMap<String, SlotId>,
}

impl FuncCtx {
    fn new(func: IrFunction) -> Self {
        let current = func.entry();
        Self {
            func,
            current,
            symbols: FxHashMap::default(),
        }
    }

    fn push(&mut self, inst: Inst) {
        self.func.push(self.current, inst);
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.func.terminate(self.current, terminator);
    }
}

/// Lowers a checked module's statements into an [`IrModule`].
pub struct IrGenerator<'a> {
    errors: &'a ErrorHandler,
    module: IrModule,
    signatures: FxHashMap<String, (Vec<IrType>, IrType)>,
    lambda_count: u32,
}

impl<'a> IrGenerator<'a> {
    pub fn new(errors: &'a ErrorHandler) -> Self {
        Self {
            errors,
            module: IrModule::default(),
            signatures: FxHashMap::default(),
            lambda_count: 0,
        }
    }

    pub fn finish(self) -> IrModule {
        self.module
    }

    /// Declare an externally-provided function (runtime library or FFI).
    pub fn declare_external(&mut self, name: &str, params: Vec<IrType>, ret: IrType) {
        if self.signatures.contains_key(name) {
            return;
        }
        self.signatures
            .insert(name.to_string(), (params.clone(), ret.clone()));
        self.module.externals.push(ExternalFn {
            name: name.to_string(),
            params,
            ret,
        });
    }

    /// Lower a module: named functions become IR functions; remaining
    /// top-level statements are collected into a synthesized `main`.
    pub fn lower_module(&mut self, stmts: &[Stmt]) {
        // Signatures first, so call sites may precede definitions.
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Function(decl) => self.declare_signature(&decl.name, decl, false),
                StmtKind::Class(decl) => {
                    for method in &decl.methods {
                        self.declare_signature(
                            &format!("{}.{}", decl.name, method.name),
                            method,
                            true,
                        );
                    }
                }
                StmtKind::Impl(decl) => {
                    for method in &decl.methods {
                        self.declare_signature(
                            &format!("{}.{}", decl.target.canonical(), method.name),
                            method,
                            true,
                        );
                    }
                }
                _ => {}
            }
        }

        let mut main = FuncCtx::new(IrFunction::new("main", vec![], IrType::Void));
        let mut main_aborted = false;
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Function(decl) => self.lower_named_function(&decl.name, decl, false),
                StmtKind::Class(decl) => self.lower_class(decl),
                StmtKind::Impl(decl) => {
                    for method in &decl.methods {
                        self.lower_named_function(
                            &format!("{}.{}", decl.target.canonical(), method.name),
                            method,
                            true,
                        );
                    }
                }
                StmtKind::Trait(_) => {}
                _ if main_aborted => {}
                _ => {
                    if self.lower_stmt(&mut main, stmt).is_err() {
                        main_aborted = true;
                    }
                }
            }
        }
        main.terminate(Terminator::Return(None));
        self.module.functions.push(main.func);
        tracing::debug!(
            functions = self.module.functions.len(),
            layouts = self.module.layouts.len(),
            "lowering finished"
        );
    }

    fn declare_signature(&mut self, name: &str, decl: &FunctionDecl, with_self: bool) {
        let mut params = Vec::new();
        if with_self {
            params.push(IrType::Ptr);
        }
        for param in &decl.params {
            let Ok(ty) = self.map_type(Some(&param.ty), &param.token) else {
                return;
            };
            params.push(ty);
        }
        let Ok(ret) = self.map_type(Some(&decl.ret), &decl.body.token) else {
            return;
        };
        self.signatures.insert(name.to_string(), (params, ret));
    }

    /// Lower one named function. Resolution failures abort this function
    /// only — the partial function is discarded and the pass continues.
    fn lower_named_function(&mut self, name: &str, decl: &FunctionDecl, with_self: bool) {
        let mut params: Vec<(String, IrType)> = Vec::new();
        if with_self {
            params.push(("self".to_string(), IrType::Ptr));
        }
        for param in &decl.params {
            let Ok(ty) = self.map_type(Some(&param.ty), &param.token) else {
                return;
            };
            params.push((param.name.clone(), ty));
        }
        let Ok(ret) = self.map_type(Some(&decl.ret), &decl.body.token) else {
            return;
        };

        let func = IrFunction::new(
            name,
            params.iter().map(|(_, ty)| ty.clone()).collect(),
            ret,
        );
        let mut ctx = FuncCtx::new(func);

        // One slot per parameter, stored on entry: parameters and locals
        // are indistinguishable to all subsequent lowering.
        for (index, (param_name, ty)) in params.iter().enumerate() {
            let slot = ctx.func.new_slot(param_name.clone(), ty.clone());
            ctx.symbols.insert(param_name.clone(), slot);
            let value = ctx.func.param_value(index);
            ctx.push(Inst::Store { slot, value });
        }

        if self.lower_stmt(&mut ctx, &decl.body).is_err() {
            return;
        }

        if !ctx.func.is_terminated(ctx.current) {
            if ctx.func.ret == IrType::Void {
                ctx.terminate(Terminator::Return(None));
            } else {
                ctx.terminate(Terminator::Unreachable);
            }
        }
        self.module.functions.push(ctx.func);
    }

    /// Classes contribute a struct layout for their fields plus one IR
    /// function per method (with an opaque `self` pointer).
    fn lower_class(&mut self, decl: &ClassDecl) {
        let mut fields = Vec::new();
        for field in &decl.fields {
            let Ok(ty) = self.map_type(Some(&field.ty), &field.token) else {
                return;
            };
            fields.push(ty);
        }
        self.module
            .layouts
            .get_or_insert_with(&decl.name, || fields);
        for method in &decl.methods {
            self.lower_named_function(&format!("{}.{}", decl.name, method.name), method, true);
        }
    }

    // -- Type mapping -------------------------------------------------------

    /// Map a semantic type to its IR representation.
    ///
    /// A missing or still-unknown type here is an internal consistency
    /// violation (the checker either annotated the node or the driver
    /// should not have run lowering): diagnosed as fatal, aborting the
    /// current function.
    fn map_type(&mut self, ty: Option<&Type>, token: &Token) -> Result<IrType, FunctionAbort> {
        let Some(ty) = ty else {
            self.fatal_unresolved(token, "expression reached lowering without a resolved type");
            return Err(FunctionAbort);
        };
        Ok(match ty {
            Type::Basic(kind) => match kind {
                BasicKind::Int => IrType::I64,
                BasicKind::Float => IrType::F64,
                BasicKind::Float32 => IrType::F32,
                BasicKind::Bool => IrType::I1,
                BasicKind::Str => IrType::Ptr,
                BasicKind::Char => IrType::I64,
                BasicKind::Void => IrType::Void,
                BasicKind::Unknown => {
                    self.fatal_unresolved(token, "unresolved type reached lowering");
                    return Err(FunctionAbort);
                }
                BasicKind::Array
                | BasicKind::Map
                | BasicKind::Function
                | BasicKind::Class
                | BasicKind::Interface
                | BasicKind::Pointer
                | BasicKind::Reference => IrType::Ptr,
            },
            Type::Generic { name, .. } => match name.as_str() {
                "list" => self.struct_type(ty, vec![IrType::Ptr, IrType::I64, IrType::I64]),
                "dict" => self.struct_type(ty, vec![IrType::Ptr, IrType::I64, IrType::I64]),
                "string" => self.struct_type(ty, vec![IrType::Ptr, IrType::I64]),
                // Other runtime generics (channels, user types) stay opaque.
                _ => IrType::Ptr,
            },
            Type::Function { .. } => IrType::Ptr,
            Type::Option(_) | Type::Result { .. } | Type::Nullable(_) => IrType::Ptr,
        })
    }

    fn struct_type(&mut self, ty: &Type, fields: Vec<IrType>) -> IrType {
        let name = ty.canonical();
        self.module.layouts.get_or_insert_with(&name, || fields);
        IrType::Struct(name)
    }

    // -- Statements ---------------------------------------------------------

    fn lower_stmt(&mut self, ctx: &mut FuncCtx, stmt: &Stmt) -> Result<(), FunctionAbort> {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                for child in stmts {
                    self.lower_stmt(ctx, child)?;
                }
                Ok(())
            }

            StmtKind::Var {
                name,
                declared,
                init,
            } => {
                let ty = declared
                    .as_ref()
                    .or_else(|| init.as_ref().and_then(|e| e.ty.as_ref()));
                let ir_ty = self.map_type(ty, &stmt.token)?;
                let slot = ctx.func.new_slot(name.clone(), ir_ty.clone());
                ctx.symbols.insert(name.clone(), slot);
                if let Some(init) = init {
                    let Some(value) = self.lower_expr(ctx, init)? else {
                        return Ok(());
                    };
                    // On mismatch the slot is left unstored.
                    let Some(value) = self.coerce(ctx, value, &ir_ty, &stmt.token, "initializer")
                    else {
                        return Ok(());
                    };
                    ctx.push(Inst::Store { slot, value });
                }
                Ok(())
            }

            StmtKind::Function(decl) => {
                self.declare_signature(&decl.name, decl, false);
                self.lower_named_function(&decl.name, decl, false);
                Ok(())
            }

            StmtKind::Class(decl) => {
                self.lower_class(decl);
                Ok(())
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(ctx, condition, then_branch, else_branch.as_deref()),

            StmtKind::While { condition, body } => self.lower_while(ctx, condition, body),

            StmtKind::For { .. } => {
                // Iterator lowering needs the runtime library's protocol.
                self.warn_unimplemented(&stmt.token, "for-loop lowering");
                Ok(())
            }

            StmtKind::Return(value) => {
                match value {
                    None => ctx.terminate(Terminator::Return(None)),
                    Some(expr) => {
                        let Some(value) = self.lower_expr(ctx, expr)? else {
                            return Ok(());
                        };
                        let ret_ty = ctx.func.ret.clone();
                        let Some(value) =
                            self.coerce(ctx, value, &ret_ty, &stmt.token, "return value")
                        else {
                            return Ok(());
                        };
                        ctx.terminate(Terminator::Return(Some(value)));
                    }
                }
                Ok(())
            }

            StmtKind::Import { .. } => {
                self.warn_unimplemented(&stmt.token, "import lowering");
                Ok(())
            }

            StmtKind::Match { scrutinee, arms } => self.lower_match(ctx, scrutinee, arms),

            StmtKind::Trait(_) => Ok(()),

            StmtKind::Impl(decl) => {
                for method in &decl.methods {
                    self.lower_named_function(
                        &format!("{}.{}", decl.target.canonical(), method.name),
                        method,
                        true,
                    );
                }
                Ok(())
            }

            StmtKind::Select { .. } => {
                self.warn_unimplemented(&stmt.token, "select lowering");
                Ok(())
            }

            StmtKind::Expression(expr) => {
                self.lower_expr(ctx, expr)?;
                Ok(())
            }
        }
    }

    fn lower_if(
        &mut self,
        ctx: &mut FuncCtx,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<(), FunctionAbort> {
        let Some(cond) = self.lower_expr(ctx, condition)? else {
            return Ok(());
        };
        let then_block = ctx.func.new_block();
        let else_block = else_branch.map(|_| ctx.func.new_block());
        let merge = ctx.func.new_block();

        ctx.terminate(Terminator::Branch {
            cond,
            then_block,
            else_block: else_block.unwrap_or(merge),
        });

        ctx.current = then_block;
        self.lower_stmt(ctx, then_branch)?;
        ctx.terminate(Terminator::Jump(merge));

        if let (Some(else_block), Some(else_branch)) = (else_block, else_branch) {
            ctx.current = else_block;
            self.lower_stmt(ctx, else_branch)?;
            ctx.terminate(Terminator::Jump(merge));
        }

        ctx.current = merge;
        Ok(())
    }

    fn lower_while(
        &mut self,
        ctx: &mut FuncCtx,
        condition: &Expr,
        body: &Stmt,
    ) -> Result<(), FunctionAbort> {
        let header = ctx.func.new_block();
        let body_block = ctx.func.new_block();
        let exit = ctx.func.new_block();

        ctx.terminate(Terminator::Jump(header));
        ctx.current = header;
        let Some(cond) = self.lower_expr(ctx, condition)? else {
            ctx.terminate(Terminator::Jump(exit));
            ctx.current = exit;
            return Ok(());
        };
        ctx.terminate(Terminator::Branch {
            cond,
            then_block: body_block,
            else_block: exit,
        });

        ctx.current = body_block;
        self.lower_stmt(ctx, body)?;
        ctx.terminate(Terminator::Jump(header));

        ctx.current = exit;
        Ok(())
    }

    /// Match lowering: equality-test branch chains for literal, wildcard,
    /// and variable arms (and or-patterns over them). Destructuring arms
    /// are a seam for later extension.
    fn lower_match(
        &mut self,
        ctx: &mut FuncCtx,
        scrutinee: &Expr,
        arms: &[MatchArm],
    ) -> Result<(), FunctionAbort> {
        let Some(value) = self.lower_expr(ctx, scrutinee)? else {
            return Ok(());
        };
        let merge = ctx.func.new_block();

        for arm in arms {
            match self.pattern_test(ctx, &arm.pattern, value)? {
                None => continue,
                Some(PatternTest::Always) => {
                    self.lower_stmt(ctx, &arm.body)?;
                    ctx.terminate(Terminator::Jump(merge));
                    // Later arms are unreachable behind an unconditional
                    // match.
                    ctx.current = merge;
                    return Ok(());
                }
                Some(PatternTest::Cond(cond)) => {
                    let body_block = ctx.func.new_block();
                    let next_block = ctx.func.new_block();
                    ctx.terminate(Terminator::Branch {
                        cond,
                        then_block: body_block,
                        else_block: next_block,
                    });
                    ctx.current = body_block;
                    self.lower_stmt(ctx, &arm.body)?;
                    ctx.terminate(Terminator::Jump(merge));
                    ctx.current = next_block;
                }
            }
        }

        ctx.terminate(Terminator::Jump(merge));
        ctx.current = merge;
        Ok(())
    }

    /// Build the match test for one pattern against the scrutinee value.
    /// `None` means the pattern form is not lowered yet (diagnosed).
    fn pattern_test(
        &mut self,
        ctx: &mut FuncCtx,
        pattern: &Pattern,
        scrutinee: ValueId,
    ) -> Result<Option<PatternTest>, FunctionAbort> {
        match &pattern.kind {
            PatternKind::Wildcard => Ok(Some(PatternTest::Always)),

            PatternKind::Variable(name) => {
                let ty = ctx.func.value_type(scrutinee).clone();
                let slot = ctx.func.new_slot(name.clone(), ty);
                ctx.symbols.insert(name.clone(), slot);
                ctx.push(Inst::Store {
                    slot,
                    value: scrutinee,
                });
                Ok(Some(PatternTest::Always))
            }

            PatternKind::Literal { kind, value } => {
                let Some(constant) =
                    self.lower_literal(ctx, *kind, value, &pattern.token)?
                else {
                    return Ok(None);
                };
                let scrutinee_ty = ctx.func.value_type(scrutinee).clone();
                let op = if scrutinee_ty.is_float() {
                    BinOp::FCmp(CmpCond::Eq)
                } else {
                    BinOp::ICmp(CmpCond::Eq)
                };
                let dest = ctx.func.new_value(IrType::I1);
                ctx.push(Inst::Binary {
                    dest,
                    op,
                    lhs: scrutinee,
                    rhs: constant,
                });
                Ok(Some(PatternTest::Cond(dest)))
            }

            PatternKind::Or(left, right) => {
                let left_test = self.pattern_test(ctx, left, scrutinee)?;
                let right_test = self.pattern_test(ctx, right, scrutinee)?;
                Ok(match (left_test, right_test) {
                    (None, _) | (_, None) => None,
                    (Some(PatternTest::Always), _) | (_, Some(PatternTest::Always)) => {
                        Some(PatternTest::Always)
                    }
                    (Some(PatternTest::Cond(a)), Some(PatternTest::Cond(b))) => {
                        let dest = ctx.func.new_value(IrType::I1);
                        ctx.push(Inst::Binary {
                            dest,
                            op: BinOp::BOr,
                            lhs: a,
                            rhs: b,
                        });
                        Some(PatternTest::Cond(dest))
                    }
                })
            }

            PatternKind::Constructor { .. }
            | PatternKind::Tuple(_)
            | PatternKind::Struct { .. } => {
                self.warn_unimplemented(&pattern.token, "destructuring pattern lowering");
                Ok(None)
            }
        }
    }

    // -- Expressions --------------------------------------------------------

    fn lower_expr(&mut self, ctx: &mut FuncCtx, expr: &Expr) -> Lowered {
        let token = &expr.token;
        match &expr.kind {
            ExprKind::Literal { kind, value } => self.lower_literal(ctx, *kind, value, token),

            ExprKind::Variable(name) => match ctx.symbols.get(name) {
                Some(&slot) => {
                    let ty = ctx.func.slot_type(slot).clone();
                    let dest = ctx.func.new_value(ty);
                    ctx.push(Inst::Load { dest, slot });
                    Ok(Some(dest))
                }
                None => {
                    self.error_at(
                        ErrorCode::T002UndefinedVariable,
                        format!("undefined variable `{name}`"),
                        token,
                    );
                    Ok(None)
                }
            },

            ExprKind::Assign { name, value } => {
                let Some(value) = self.lower_expr(ctx, value)? else {
                    return Ok(None);
                };
                let Some(&slot) = ctx.symbols.get(name) else {
                    self.error_at(
                        ErrorCode::T002UndefinedVariable,
                        format!("assignment to undefined variable `{name}`"),
                        token,
                    );
                    return Ok(None);
                };
                let target = ctx.func.slot_type(slot).clone();
                let Some(value) = self.coerce(ctx, value, &target, token, "assignment") else {
                    return Ok(None);
                };
                ctx.push(Inst::Store { slot, value });
                Ok(Some(value))
            }

            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(ctx, *op, lhs, rhs, token),

            ExprKind::Unary { op, operand } => self.lower_unary(ctx, *op, operand, token),

            ExprKind::Call { callee, args } => self.lower_call(ctx, callee, args, token),

            ExprKind::Array(_) => {
                self.warn_unimplemented(token, "list literal lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }

            ExprKind::Dict(_) => {
                self.warn_unimplemented(token, "dict literal lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }

            ExprKind::Lambda { params, ret, body } => {
                let name = format!("lambda_{}", self.lambda_count);
                self.lambda_count += 1;
                self.lower_lambda(&name, params, ret, body);
                let dest = ctx.func.new_value(IrType::Ptr);
                ctx.push(Inst::FuncAddr { dest, name });
                Ok(Some(dest))
            }

            ExprKind::Await(inner) => {
                self.lower_expr(ctx, inner)?;
                self.warn_unimplemented(token, "await lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }

            ExprKind::OptionSome(inner) | ExprKind::ResultOk(inner) | ExprKind::ResultErr(inner) => {
                self.lower_expr(ctx, inner)?;
                self.warn_unimplemented(token, "option/result construction lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }

            ExprKind::OptionNone => {
                self.warn_unimplemented(token, "option/result construction lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }

            ExprKind::ChannelSend { channel, value } => {
                self.lower_expr(ctx, channel)?;
                self.lower_expr(ctx, value)?;
                self.warn_unimplemented(token, "channel send lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }

            ExprKind::ChannelReceive(channel) => {
                self.lower_expr(ctx, channel)?;
                self.warn_unimplemented(token, "channel receive lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }

            ExprKind::Go(inner) => {
                self.lower_expr(ctx, inner)?;
                self.warn_unimplemented(token, "goroutine launch lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }

            ExprKind::Move(inner) => {
                self.lower_expr(ctx, inner)?;
                self.warn_unimplemented(token, "move lowering");
                Ok(Some(self.null_placeholder(ctx)))
            }
        }
    }

    fn lower_lambda(&mut self, name: &str, params: &[Param], ret: &Type, body: &Stmt) {
        let decl = FunctionDecl {
            name: name.to_string(),
            params: params.to_vec(),
            ret: ret.clone(),
            body: Box::new(body.clone()),
            is_async: false,
        };
        self.declare_signature(name, &decl, false);
        self.lower_named_function(name, &decl, false);
    }

    /// Literal lowering: numeric lexemes parsed base 10, strings stripped
    /// of quotes and escape-decoded, booleans and nil as 1-bit and null
    /// constants.
    fn lower_literal(
        &mut self,
        ctx: &mut FuncCtx,
        kind: LiteralKind,
        value: &str,
        token: &Token,
    ) -> Lowered {
        match kind {
            LiteralKind::Integer => match value.parse::<i64>() {
                Ok(parsed) => {
                    let dest = ctx.func.new_value(IrType::I64);
                    ctx.push(Inst::ConstInt {
                        dest,
                        value: parsed,
                    });
                    Ok(Some(dest))
                }
                Err(_) => {
                    self.error_at(
                        ErrorCode::L003InvalidNumberFormat,
                        format!("integer literal `{value}` is out of range"),
                        token,
                    );
                    Ok(None)
                }
            },
            LiteralKind::Float => match value.parse::<f64>() {
                Ok(parsed) => {
                    let dest = ctx.func.new_value(IrType::F64);
                    ctx.push(Inst::ConstFloat {
                        dest,
                        value: parsed,
                    });
                    Ok(Some(dest))
                }
                Err(_) => {
                    self.error_at(
                        ErrorCode::L003InvalidNumberFormat,
                        format!("float literal `{value}` is malformed"),
                        token,
                    );
                    Ok(None)
                }
            },
            LiteralKind::Boolean => {
                let dest = ctx.func.new_value(IrType::I1);
                ctx.push(Inst::ConstBool {
                    dest,
                    value: value == "true",
                });
                Ok(Some(dest))
            }
            LiteralKind::Str => {
                let dest = ctx.func.new_value(IrType::Ptr);
                ctx.push(Inst::ConstStr {
                    dest,
                    bytes: decode_string_literal(value),
                });
                Ok(Some(dest))
            }
            LiteralKind::Nil => Ok(Some(self.null_placeholder(ctx))),
        }
    }

    fn lower_unary(
        &mut self,
        ctx: &mut FuncCtx,
        op: UnaryOp,
        operand: &Expr,
        token: &Token,
    ) -> Lowered {
        let Some(value) = self.lower_expr(ctx, operand)? else {
            return Ok(None);
        };
        let ty = ctx.func.value_type(value).clone();
        match op {
            UnaryOp::Neg if ty == IrType::I64 => {
                let zero = ctx.func.new_value(IrType::I64);
                ctx.push(Inst::ConstInt {
                    dest: zero,
                    value: 0,
                });
                let dest = ctx.func.new_value(IrType::I64);
                ctx.push(Inst::Binary {
                    dest,
                    op: BinOp::ISub,
                    lhs: zero,
                    rhs: value,
                });
                Ok(Some(dest))
            }
            UnaryOp::Neg if ty.is_float() => {
                let zero = ctx.func.new_value(ty.clone());
                ctx.push(Inst::ConstFloat {
                    dest: zero,
                    value: 0.0,
                });
                let dest = ctx.func.new_value(ty);
                ctx.push(Inst::Binary {
                    dest,
                    op: BinOp::FSub,
                    lhs: zero,
                    rhs: value,
                });
                Ok(Some(dest))
            }
            UnaryOp::Not if ty == IrType::I1 => {
                let falsy = ctx.func.new_value(IrType::I1);
                ctx.push(Inst::ConstBool {
                    dest: falsy,
                    value: false,
                });
                let dest = ctx.func.new_value(IrType::I1);
                ctx.push(Inst::Binary {
                    dest,
                    op: BinOp::ICmp(CmpCond::Eq),
                    lhs: value,
                    rhs: falsy,
                });
                Ok(Some(dest))
            }
            _ => {
                self.error_at(
                    ErrorCode::T006InvalidOperator,
                    format!("unary operator cannot be applied to `{ty}`"),
                    token,
                );
                Ok(None)
            }
        }
    }

    fn lower_binary(
        &mut self,
        ctx: &mut FuncCtx,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        token: &Token,
    ) -> Lowered {
        let Some(lhs) = self.lower_expr(ctx, lhs)? else {
            return Ok(None);
        };
        let Some(rhs) = self.lower_expr(ctx, rhs)? else {
            return Ok(None);
        };
        let lhs_ty = ctx.func.value_type(lhs).clone();
        let rhs_ty = ctx.func.value_type(rhs).clone();

        if op.is_logical() {
            if lhs_ty != IrType::I1 || rhs_ty != IrType::I1 {
                self.error_at(
                    ErrorCode::T006InvalidOperator,
                    format!("logical operator requires `i1` operands, got `{lhs_ty}` and `{rhs_ty}`"),
                    token,
                );
                return Ok(None);
            }
            let ir_op = if op == BinaryOp::And {
                BinOp::BAnd
            } else {
                BinOp::BOr
            };
            let dest = ctx.func.new_value(IrType::I1);
            ctx.push(Inst::Binary {
                dest,
                op: ir_op,
                lhs,
                rhs,
            });
            return Ok(Some(dest));
        }

        if op.is_comparison() {
            // Pointer identity for Eq/Ne; numeric comparison otherwise.
            if lhs_ty == IrType::Ptr
                && rhs_ty == IrType::Ptr
                && matches!(op, BinaryOp::Eq | BinaryOp::Ne)
            {
                let dest = ctx.func.new_value(IrType::I1);
                ctx.push(Inst::Binary {
                    dest,
                    op: BinOp::ICmp(cmp_cond(op)),
                    lhs,
                    rhs,
                });
                return Ok(Some(dest));
            }
            let Some((lhs, rhs, is_float)) = self.unify_numeric(ctx, lhs, rhs, token)? else {
                return Ok(None);
            };
            let ir_op = if is_float {
                BinOp::FCmp(cmp_cond(op))
            } else {
                BinOp::ICmp(cmp_cond(op))
            };
            let dest = ctx.func.new_value(IrType::I1);
            ctx.push(Inst::Binary {
                dest,
                op: ir_op,
                lhs,
                rhs,
            });
            return Ok(Some(dest));
        }

        // String concatenation goes through the runtime library.
        if op == BinaryOp::Add && lhs_ty == IrType::Ptr && rhs_ty == IrType::Ptr {
            self.declare_external(
                "lyra_string_concat",
                vec![IrType::Ptr, IrType::Ptr],
                IrType::Ptr,
            );
            let dest = ctx.func.new_value(IrType::Ptr);
            ctx.push(Inst::Call {
                dest: Some(dest),
                callee: "lyra_string_concat".to_string(),
                args: vec![lhs, rhs],
            });
            return Ok(Some(dest));
        }

        let Some((lhs, rhs, is_float)) = self.unify_numeric(ctx, lhs, rhs, token)? else {
            return Ok(None);
        };
        let ir_op = match (op, is_float) {
            (BinaryOp::Add, false) => BinOp::IAdd,
            (BinaryOp::Sub, false) => BinOp::ISub,
            (BinaryOp::Mul, false) => BinOp::IMul,
            (BinaryOp::Div, false) => BinOp::IDiv,
            (BinaryOp::Rem, false) => BinOp::IRem,
            (BinaryOp::Add, true) => BinOp::FAdd,
            (BinaryOp::Sub, true) => BinOp::FSub,
            (BinaryOp::Mul, true) => BinOp::FMul,
            (BinaryOp::Div, true) => BinOp::FDiv,
            (BinaryOp::Rem, true) => BinOp::FRem,
            _ => {
                self.error_at(
                    ErrorCode::C002CodegenError,
                    format!("operator `{}` has no numeric lowering", op.as_str()),
                    token,
                );
                return Ok(None);
            }
        };
        let result_ty = ctx.func.value_type(lhs).clone();
        let dest = ctx.func.new_value(result_ty);
        ctx.push(Inst::Binary {
            dest,
            op: ir_op,
            lhs,
            rhs,
        });
        Ok(Some(dest))
    }

    /// Bring two operands to a common numeric type, promoting integers to
    /// floats via a signed conversion when the kinds are mixed.
    fn unify_numeric(
        &mut self,
        ctx: &mut FuncCtx,
        lhs: ValueId,
        rhs: ValueId,
        token: &Token,
    ) -> Result<Option<(ValueId, ValueId, bool)>, FunctionAbort> {
        let lhs_ty = ctx.func.value_type(lhs).clone();
        let rhs_ty = ctx.func.value_type(rhs).clone();

        if lhs_ty == rhs_ty && lhs_ty.is_integer() {
            return Ok(Some((lhs, rhs, false)));
        }
        if lhs_ty == rhs_ty && lhs_ty.is_float() {
            return Ok(Some((lhs, rhs, true)));
        }

        if lhs_ty.is_integer() && rhs_ty.is_integer() {
            // Differing integer widths: sign-extend the narrower side.
            let (narrow, wide_ty) = if lhs_ty.int_bits() < rhs_ty.int_bits() {
                (lhs, rhs_ty)
            } else {
                (rhs, lhs_ty)
            };
            let widened = ctx.func.new_value(wide_ty);
            ctx.push(Inst::Cast {
                dest: widened,
                kind: CastKind::SignExtend,
                value: narrow,
            });
            return Ok(Some(if narrow == lhs {
                (widened, rhs, false)
            } else {
                (lhs, widened, false)
            }));
        }

        let either_float = lhs_ty.is_float() || rhs_ty.is_float();
        let either_numeric =
            (lhs_ty.is_integer() || lhs_ty.is_float()) && (rhs_ty.is_integer() || rhs_ty.is_float());
        if either_float && either_numeric {
            let target = if lhs_ty == IrType::F64 || rhs_ty == IrType::F64 {
                IrType::F64
            } else {
                IrType::F32
            };
            let lhs = self.promote_to_float(ctx, lhs, &target);
            let rhs = self.promote_to_float(ctx, rhs, &target);
            return Ok(Some((lhs, rhs, true)));
        }

        self.error_at(
            ErrorCode::T006InvalidOperator,
            format!("operands `{lhs_ty}` and `{rhs_ty}` have no common numeric type"),
            token,
        );
        Ok(None)
    }

    fn promote_to_float(&mut self, ctx: &mut FuncCtx, value: ValueId, target: &IrType) -> ValueId {
        let ty = ctx.func.value_type(value).clone();
        if ty == *target {
            return value;
        }
        let kind = if ty.is_integer() {
            CastKind::IntToFloat
        } else {
            CastKind::FloatExtend
        };
        let dest = ctx.func.new_value(target.clone());
        ctx.push(Inst::Cast {
            dest,
            kind,
            value,
        });
        dest
    }

    fn lower_call(
        &mut self,
        ctx: &mut FuncCtx,
        callee: &Expr,
        args: &[Expr],
        token: &Token,
    ) -> Lowered {
        let ExprKind::Variable(name) = &callee.kind else {
            self.warn_unimplemented(token, "indirect call lowering");
            return Ok(Some(self.null_placeholder(ctx)));
        };
        let Some((param_tys, ret_ty)) = self.signatures.get(name).cloned() else {
            self.error_at(
                ErrorCode::T003UndefinedFunction,
                format!("call to undefined function `{name}`"),
                token,
            );
            return Ok(None);
        };
        if param_tys.len() != args.len() {
            self.error_at(
                ErrorCode::T007InvalidCall,
                format!(
                    "`{name}` expects {} argument(s), got {}",
                    param_tys.len(),
                    args.len()
                ),
                token,
            );
            return Ok(None);
        }

        let mut lowered_args = Vec::with_capacity(args.len());
        for (arg, param_ty) in args.iter().zip(&param_tys) {
            let Some(value) = self.lower_expr(ctx, arg)? else {
                return Ok(None);
            };
            let Some(value) = self.coerce(ctx, value, param_ty, token, "argument") else {
                return Ok(None);
            };
            lowered_args.push(value);
        }

        let dest = (ret_ty != IrType::Void).then(|| ctx.func.new_value(ret_ty));
        ctx.push(Inst::Call {
            dest,
            callee: name.clone(),
            args: lowered_args,
        });
        Ok(dest)
    }

    // -- Casts and helpers --------------------------------------------------

    /// Implicit cast policy: conversions between numeric types that differ
    /// only in width/kind within the same family (integer-to-integer
    /// sign-extension/truncation, float-to-float extension/truncation).
    /// Any other mismatch is a hard error — never a silent coercion — and
    /// yields `None` so the caller leaves the target unstored.
    fn coerce(
        &mut self,
        ctx: &mut FuncCtx,
        value: ValueId,
        target: &IrType,
        token: &Token,
        what: &str,
    ) -> Option<ValueId> {
        let source = ctx.func.value_type(value).clone();
        if source == *target {
            return Some(value);
        }
        if source.is_integer() && target.is_integer() {
            let kind = if source.int_bits() < target.int_bits() {
                CastKind::SignExtend
            } else {
                CastKind::Truncate
            };
            let dest = ctx.func.new_value(target.clone());
            ctx.push(Inst::Cast { dest, kind, value });
            return Some(dest);
        }
        if source.is_float() && target.is_float() {
            let kind = if source == IrType::F32 {
                CastKind::FloatExtend
            } else {
                CastKind::FloatTruncate
            };
            let dest = ctx.func.new_value(target.clone());
            ctx.push(Inst::Cast { dest, kind, value });
            return Some(dest);
        }
        self.error_at(
            ErrorCode::T001TypeMismatch,
            format!("{what} type `{source}` does not match target type `{target}`"),
            token,
        );
        None
    }

    fn null_placeholder(&mut self, ctx: &mut FuncCtx) -> ValueId {
        let dest = ctx.func.new_value(IrType::Ptr);
        ctx.push(Inst::ConstNull { dest });
        dest
    }

    fn error_at(&self, code: ErrorCode, message: String, token: &Token) {
        self.errors
            .error(code, message, token.file, token.line, token.column);
    }

    fn fatal_unresolved(&self, token: &Token, message: &str) {
        self.errors.fatal(
            ErrorCode::C003UnresolvedTypeInLowering,
            message.to_string(),
            token.file,
            token.line,
            token.column,
        );
    }

    fn warn_unimplemented(&self, token: &Token, what: &str) {
        self.errors.warning(
            ErrorCode::C001NotImplemented,
            format!("{what} is not implemented yet"),
            token.file,
            token.line,
            token.column,
        );
    }
}

enum PatternTest {
    /// Matches unconditionally (wildcard/variable patterns).
    Always,
    /// Matches when the 1-bit condition value is true.
    Cond(ValueId),
}

fn cmp_cond(op: BinaryOp) -> CmpCond {
    match op {
        BinaryOp::Eq => CmpCond::Eq,
        BinaryOp::Ne => CmpCond::Ne,
        BinaryOp::Lt => CmpCond::Lt,
        BinaryOp::Le => CmpCond::Le,
        BinaryOp::Gt => CmpCond::Gt,
        BinaryOp::Ge => CmpCond::Ge,
        _ => CmpCond::Eq,
    }
}

/// Strip the surrounding quotes and decode backslash escapes.
///
/// Recognized escapes: `\n`, `\t`, `\r`, `\\`, `\"`, `\'`. Any other
/// escaped character passes both the backslash and the character through
/// unchanged. The result carries a trailing NUL terminator.
fn decode_string_literal(raw: &str) -> Vec<u8> {
    let inner = match (raw.chars().next(), raw.chars().last()) {
        (Some(first), Some(last))
            if raw.len() >= 2 && (first == '"' || first == '\'') && last == first =>
        {
            &raw[1..raw.len() - 1]
        }
        _ => raw,
    };

    let mut bytes = Vec::with_capacity(inner.len() + 1);
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => bytes.push(b'\n'),
                Some('t') => bytes.push(b'\t'),
                Some('r') => bytes.push(b'\r'),
                Some('\\') => bytes.push(b'\\'),
                Some('"') => bytes.push(b'"'),
                Some('\'') => bytes.push(b'\''),
                Some(other) => {
                    bytes.push(b'\\');
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
                None => bytes.push(b'\\'),
            }
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    bytes.push(0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra_ast::TokenKind;
    use lyra_check::TypeChecker;
    use lyra_diag::Severity;
    use lyra_types::TraitRegistry;

    fn tok(kind: TokenKind) -> Token {
        Token::synthetic(kind)
    }

    fn int_lit(value: i64) -> Expr {
        Expr::new(
            ExprKind::Literal {
                kind: LiteralKind::Integer,
                value: value.to_string(),
            },
            tok(TokenKind::Int),
        )
    }

    fn str_lit(raw: &str) -> Expr {
        Expr::new(
            ExprKind::Literal {
                kind: LiteralKind::Str,
                value: raw.to_string(),
            },
            tok(TokenKind::Str),
        )
    }

    fn var(name: &str) -> Expr {
        Expr::new(ExprKind::Variable(name.to_string()), tok(TokenKind::Identifier))
    }

    fn let_stmt(name: &str, declared: Option<Type>, init: Option<Expr>) -> Stmt {
        Stmt::new(
            StmtKind::Var {
                name: name.to_string(),
                declared,
                init,
            },
            tok(TokenKind::Let),
        )
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            tok(TokenKind::Plus),
        )
    }

    /// Check the module first (annotating types in place), then lower it.
    fn check_and_lower(stmts: &mut Vec<Stmt>) -> (IrModule, ErrorHandler) {
        let errors = ErrorHandler::new();
        let mut traits = TraitRegistry::new();
        TypeChecker::new(&errors, &mut traits).check_module(stmts);
        assert!(!errors.has_errors(), "unexpected check errors: {:?}", errors.errors());
        let mut generator = IrGenerator::new(&errors);
        generator.lower_module(stmts);
        (generator.finish(), errors)
    }

    fn main_insts(module: &IrModule) -> Vec<Inst> {
        module
            .function("main")
            .expect("synthesized main")
            .blocks
            .iter()
            .flat_map(|b| b.insts.iter().cloned())
            .collect()
    }

    #[test]
    fn declaration_chain_lowers_to_slots_and_arithmetic() {
        let mut stmts = vec![
            let_stmt("x", Some(Type::INT), Some(int_lit(5))),
            let_stmt("y", None, Some(binary(BinaryOp::Add, var("x"), int_lit(1)))),
        ];
        let (module, _) = check_and_lower(&mut stmts);
        let main = module.function("main").unwrap();

        assert_eq!(main.slots.len(), 2);
        assert_eq!(main.slots[0].name, "x");
        assert_eq!(main.slots[1].name, "y");
        assert!(main.slots.iter().all(|s| s.ty == IrType::I64));

        let insts = main_insts(&module);
        let stores = insts
            .iter()
            .filter(|i| matches!(i, Inst::Store { .. }))
            .count();
        assert_eq!(stores, 2);
        assert!(insts.iter().any(|i| matches!(i, Inst::Load { .. })));
        assert!(
            insts
                .iter()
                .any(|i| matches!(i, Inst::Binary { op: BinOp::IAdd, .. }))
        );
    }

    #[test]
    fn string_escapes_decode_with_terminator() {
        let mut stmts = vec![let_stmt(
            "s",
            Some(Type::STRING),
            Some(str_lit(r#""a\nb""#)),
        )];
        let (module, _) = check_and_lower(&mut stmts);
        let insts = main_insts(&module);
        let Some(Inst::ConstStr { bytes, .. }) =
            insts.iter().find(|i| matches!(i, Inst::ConstStr { .. }))
        else {
            panic!("no string constant lowered");
        };
        assert_eq!(bytes, &vec![b'a', b'\n', b'b', 0]);
    }

    #[test]
    fn unknown_escape_passes_through_unchanged() {
        assert_eq!(
            decode_string_literal(r#""a\zb""#),
            vec![b'a', b'\\', b'z', b'b', 0]
        );
        assert_eq!(decode_string_literal(r#"'it\'s'"#), vec![b'i', b't', b'\'', b's', 0]);
        assert_eq!(decode_string_literal(r#""\t\r""#), vec![b'\t', b'\r', 0]);
    }

    #[test]
    fn float32_widens_to_float64_with_a_cast() {
        let decl = FunctionDecl {
            name: "widen".to_string(),
            params: vec![Param {
                name: "narrow".to_string(),
                ty: Type::FLOAT32,
                token: tok(TokenKind::Identifier),
            }],
            ret: Type::VOID,
            body: Box::new(Stmt::new(
                StmtKind::Block(vec![let_stmt("wide", Some(Type::FLOAT), Some(var("narrow")))]),
                tok(TokenKind::Indent),
            )),
            is_async: false,
        };
        let mut stmts = vec![Stmt::new(StmtKind::Function(decl), tok(TokenKind::Def))];
        let (module, _) = check_and_lower(&mut stmts);

        let widen = module.function("widen").unwrap();
        assert_eq!(widen.params, vec![IrType::F32]);
        assert_eq!(widen.slots[0].ty, IrType::F32);
        assert_eq!(widen.slots[1].ty, IrType::F64);
        let insts: Vec<_> = widen.blocks.iter().flat_map(|b| b.insts.iter()).collect();
        assert!(insts.iter().any(|i| matches!(
            i,
            Inst::Cast {
                kind: CastKind::FloatExtend,
                ..
            }
        )));
    }

    #[test]
    fn string_into_int_slot_is_one_diagnostic_and_no_store() {
        // Built with types pre-annotated (bypassing the checker) to observe
        // the IR stage's own mismatch policy.
        let mut init = str_lit(r#""oops""#);
        init.ty = Some(Type::STRING);
        let stmts = vec![let_stmt("n", Some(Type::INT), Some(init))];

        let errors = ErrorHandler::new();
        let mut generator = IrGenerator::new(&errors);
        generator.lower_module(&stmts);
        let module = generator.finish();

        assert_eq!(errors.error_count(), 1);
        assert_eq!(errors.errors()[0].code.code(), "T001");
        let insts = main_insts(&module);
        assert!(
            !insts.iter().any(|i| matches!(i, Inst::Store { .. })),
            "mismatched initializer must leave the slot unstored"
        );
    }

    #[test]
    fn undefined_reads_and_writes_are_single_nonfatal_diagnostics() {
        let stmts = vec![
            Stmt::new(
                StmtKind::Expression(var("missing")),
                tok(TokenKind::Identifier),
            ),
            Stmt::new(
                StmtKind::Expression(Expr::new(
                    ExprKind::Assign {
                        name: "also_missing".to_string(),
                        value: Box::new(int_lit(1)),
                    },
                    tok(TokenKind::Equal),
                )),
                tok(TokenKind::Equal),
            ),
        ];
        let errors = ErrorHandler::new();
        let mut generator = IrGenerator::new(&errors);
        generator.lower_module(&stmts);
        let recorded = errors.errors();
        assert_eq!(recorded.len(), 2);
        assert!(recorded.iter().all(|d| d.code.code() == "T002"));
        assert!(!errors.has_fatal_errors());
    }

    #[test]
    fn composite_layouts_are_memoized_per_canonical_type() {
        let mut stmts = vec![
            let_stmt("a", Some(Type::generic("list", vec![Type::INT])), None),
            let_stmt("b", Some(Type::generic("list", vec![Type::INT])), None),
            let_stmt("c", Some(Type::generic("list", vec![Type::FLOAT])), None),
            let_stmt(
                "d",
                Some(Type::generic("dict", vec![Type::STRING, Type::INT])),
                None,
            ),
            let_stmt("e", Some(Type::generic("string", vec![])), None),
        ];
        let (module, _) = check_and_lower(&mut stmts);

        assert_eq!(module.layouts.len(), 4);
        assert_eq!(
            module.layouts.get("list<int>").unwrap().fields,
            vec![IrType::Ptr, IrType::I64, IrType::I64]
        );
        assert_eq!(
            module.layouts.get("dict<string, int>").unwrap().fields,
            vec![IrType::Ptr, IrType::I64, IrType::I64]
        );
        assert_eq!(
            module.layouts.get("string").unwrap().fields,
            vec![IrType::Ptr, IrType::I64]
        );
    }

    #[test]
    fn functions_get_parameter_slots_and_calls_lower() {
        let decl = FunctionDecl {
            name: "add_one".to_string(),
            params: vec![Param {
                name: "n".to_string(),
                ty: Type::INT,
                token: tok(TokenKind::Identifier),
            }],
            ret: Type::INT,
            body: Box::new(Stmt::new(
                StmtKind::Return(Some(binary(BinaryOp::Add, var("n"), int_lit(1)))),
                tok(TokenKind::Return),
            )),
            is_async: false,
        };
        let mut stmts = vec![
            Stmt::new(StmtKind::Function(decl), tok(TokenKind::Def)),
            let_stmt(
                "r",
                None,
                Some(Expr::new(
                    ExprKind::Call {
                        callee: Box::new(var("add_one")),
                        args: vec![int_lit(41)],
                    },
                    tok(TokenKind::LeftParen),
                )),
            ),
        ];
        let (module, _) = check_and_lower(&mut stmts);

        let add_one = module.function("add_one").unwrap();
        assert_eq!(add_one.params, vec![IrType::I64]);
        assert_eq!(add_one.ret, IrType::I64);
        assert_eq!(add_one.slots.len(), 1);
        assert_eq!(add_one.slots[0].name, "n");
        // Entry block stores the incoming parameter into its slot.
        assert!(matches!(
            add_one.blocks[0].insts.first(),
            Some(Inst::Store { .. })
        ));

        let insts = main_insts(&module);
        assert!(insts.iter().any(|i| matches!(
            i,
            Inst::Call { callee, dest: Some(_), .. } if callee == "add_one"
        )));
    }

    #[test]
    fn call_to_undefined_function_is_nonfatal() {
        let stmts = vec![Stmt::new(
            StmtKind::Expression(Expr::new(
                ExprKind::Call {
                    callee: Box::new(var("nowhere")),
                    args: vec![],
                },
                tok(TokenKind::LeftParen),
            )),
            tok(TokenKind::Identifier),
        )];
        let errors = ErrorHandler::new();
        let mut generator = IrGenerator::new(&errors);
        generator.lower_module(&stmts);
        assert_eq!(errors.errors()[0].code.code(), "T003");
        assert!(!errors.has_fatal_errors());
    }

    #[test]
    fn if_and_while_build_branch_structure() {
        let mut stmts = vec![
            let_stmt("x", Some(Type::INT), Some(int_lit(0))),
            Stmt::new(
                StmtKind::While {
                    condition: binary(BinaryOp::Lt, var("x"), int_lit(10)),
                    body: Box::new(Stmt::new(
                        StmtKind::Expression(Expr::new(
                            ExprKind::Assign {
                                name: "x".to_string(),
                                value: Box::new(binary(BinaryOp::Add, var("x"), int_lit(1))),
                            },
                            tok(TokenKind::Equal),
                        )),
                        tok(TokenKind::Identifier),
                    )),
                },
                tok(TokenKind::While),
            ),
        ];
        let (module, _) = check_and_lower(&mut stmts);
        let main = module.function("main").unwrap();
        // entry + header + body + exit
        assert!(main.blocks.len() >= 4);
        let branches = main
            .blocks
            .iter()
            .filter(|b| matches!(b.terminator, Some(Terminator::Branch { .. })))
            .count();
        assert_eq!(branches, 1);
    }

    #[test]
    fn match_lowers_literal_arms_to_equality_chains() {
        let arms = vec![
            MatchArm {
                pattern: Pattern::new(
                    PatternKind::Literal {
                        kind: LiteralKind::Integer,
                        value: "1".to_string(),
                    },
                    tok(TokenKind::Int),
                ),
                body: Stmt::new(StmtKind::Block(vec![]), tok(TokenKind::Indent)),
            },
            MatchArm {
                pattern: Pattern::new(PatternKind::Wildcard, tok(TokenKind::Identifier)),
                body: Stmt::new(StmtKind::Block(vec![]), tok(TokenKind::Indent)),
            },
        ];
        let mut stmts = vec![
            let_stmt("x", Some(Type::INT), Some(int_lit(2))),
            Stmt::new(
                StmtKind::Match {
                    scrutinee: var("x"),
                    arms,
                },
                tok(TokenKind::Match),
            ),
        ];
        let (module, errors) = check_and_lower(&mut stmts);
        assert!(!errors.has_errors());
        let insts = main_insts(&module);
        assert!(insts.iter().any(|i| matches!(
            i,
            Inst::Binary {
                op: BinOp::ICmp(CmpCond::Eq),
                ..
            }
        )));
    }

    #[test]
    fn unfinished_constructs_emit_placeholder_and_warning() {
        let mut stmts = vec![let_stmt(
            "xs",
            None,
            Some(Expr::new(
                ExprKind::Array(vec![int_lit(1)]),
                tok(TokenKind::LeftBracket),
            )),
        )];
        let (module, errors) = check_and_lower(&mut stmts);

        let warnings: Vec<_> = errors
            .errors()
            .into_iter()
            .filter(|d| d.severity == Severity::Warning && d.code.code() == "C001")
            .collect();
        assert_eq!(warnings.len(), 1);
        let insts = main_insts(&module);
        assert!(insts.iter().any(|i| matches!(i, Inst::ConstNull { .. })));
    }

    #[test]
    fn unresolved_type_is_fatal_and_aborts_main_lowering() {
        // No declared type, no initializer annotation: the checker never
        // ran, so lowering hits the internal-consistency violation.
        let stmts = vec![
            let_stmt("x", None, None),
            let_stmt("y", Some(Type::INT), Some(int_lit(1))),
        ];
        let errors = ErrorHandler::new();
        let mut generator = IrGenerator::new(&errors);
        generator.lower_module(&stmts);
        let module = generator.finish();

        assert!(errors.has_fatal_errors());
        // Lowering of the synthesized main stopped at the fatal error.
        let insts = main_insts(&module);
        assert!(insts.is_empty());
    }

    #[test]
    fn string_concat_declares_the_runtime_external() {
        let mut stmts = vec![let_stmt(
            "s",
            None,
            Some(binary(
                BinaryOp::Add,
                str_lit(r#""a""#),
                str_lit(r#""b""#),
            )),
        )];
        let (module, _) = check_and_lower(&mut stmts);
        assert!(
            module
                .externals
                .iter()
                .any(|e| e.name == "lyra_string_concat")
        );
    }

    #[test]
    fn lambda_lowers_to_module_function_and_address() {
        let mut stmts = vec![let_stmt(
            "f",
            None,
            Some(Expr::new(
                ExprKind::Lambda {
                    params: vec![],
                    ret: Type::INT,
                    body: Box::new(Stmt::new(
                        StmtKind::Return(Some(int_lit(7))),
                        tok(TokenKind::Return),
                    )),
                },
                tok(TokenKind::Lambda),
            )),
        )];
        let (module, _) = check_and_lower(&mut stmts);
        assert!(module.function("lambda_0").is_some());
        let insts = main_insts(&module);
        assert!(insts.iter().any(|i| matches!(i, Inst::FuncAddr { .. })));
    }
}
