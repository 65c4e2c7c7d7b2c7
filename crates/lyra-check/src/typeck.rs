//! The AST type checker.

use lyra_ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, ImplDecl, LiteralKind, Pattern, PatternKind, Stmt,
    StmtKind, Token, TraitDecl, UnaryOp,
};
use lyra_diag::{ErrorCode, ErrorHandler};
use lyra_types::{Trait, TraitImpl, TraitMethod, TraitRegistry, Type};
use rustc_hash::FxHashMap;

/// One-pass type checker over a module's statements.
///
/// Holds a lexical scope stack for variable types and feeds the shared
/// trait registry from `trait`/`impl` declarations. All diagnostics go to
/// the shared handler; the checker itself never fails.
pub struct TypeChecker<'a> {
    errors: &'a ErrorHandler,
    traits: &'a mut TraitRegistry,
    scopes: Vec<FxHashMap<String, Type>>,
    return_types: Vec<Type>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(errors: &'a ErrorHandler, traits: &'a mut TraitRegistry) -> Self {
        Self {
            errors,
            traits,
            scopes: vec![FxHashMap::default()],
            return_types: Vec::new(),
        }
    }

    /// Check a whole module. Top-level functions are declared up front so
    /// call sites may precede definitions; top-level code returns `void`.
    pub fn check_module(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts.iter() {
            if let StmtKind::Function(decl) = &stmt.kind {
                self.declare_function(decl);
            }
        }
        self.return_types.push(Type::VOID);
        for stmt in stmts.iter_mut() {
            self.check_stmt(stmt);
        }
        self.return_types.pop();
        tracing::debug!(errors = self.errors.error_count(), "type checking finished");
    }

    // -- Statements ---------------------------------------------------------

    pub fn check_stmt(&mut self, stmt: &mut Stmt) {
        let token = stmt.token.clone();
        match &mut stmt.kind {
            StmtKind::Block(stmts) => {
                self.scopes.push(FxHashMap::default());
                for child in stmts {
                    self.check_stmt(child);
                }
                self.scopes.pop();
            }

            StmtKind::Var {
                name,
                declared,
                init,
            } => {
                let init_ty = init.as_mut().map(|e| self.check_expr(e));
                let ty = match (declared.as_ref(), init_ty) {
                    (Some(declared), Some(init_ty)) => {
                        if !init_ty.is_assignable_to(declared) {
                            self.error_at(
                                ErrorCode::T001TypeMismatch,
                                format!(
                                    "cannot initialize `{name}`: expected `{declared}`, got `{init_ty}`"
                                ),
                                &token,
                            );
                        }
                        declared.clone()
                    }
                    (Some(declared), None) => declared.clone(),
                    (None, Some(init_ty)) => init_ty,
                    (None, None) => {
                        self.error_at(
                            ErrorCode::T032CannotInferType,
                            format!(
                                "cannot infer a type for `{name}` without a declared type or initializer"
                            ),
                            &token,
                        );
                        Type::UNKNOWN
                    }
                };
                self.define(name.clone(), ty);
            }

            StmtKind::Function(decl) => {
                self.declare_function(decl);
                self.check_function(decl);
            }

            StmtKind::Class(decl) => {
                let class_ty = Type::generic(decl.name.clone(), vec![]);
                self.define(decl.name.clone(), class_ty.clone());
                for method in &mut decl.methods {
                    self.scopes.push(FxHashMap::default());
                    self.define("self".to_string(), class_ty.clone());
                    for field in &decl.fields {
                        self.define(field.name.clone(), field.ty.clone());
                    }
                    self.check_function(method);
                    self.scopes.pop();
                }
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.check_expr(condition);
                if !cond_ty.is_assignable_to(&Type::BOOL) {
                    self.error_at(
                        ErrorCode::T001TypeMismatch,
                        format!("`if` condition must be `bool`, got `{cond_ty}`"),
                        &condition.token,
                    );
                }
                self.check_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch);
                }
            }

            StmtKind::While { condition, body } => {
                let cond_ty = self.check_expr(condition);
                if !cond_ty.is_assignable_to(&Type::BOOL) {
                    self.error_at(
                        ErrorCode::T001TypeMismatch,
                        format!("`while` condition must be `bool`, got `{cond_ty}`"),
                        &condition.token,
                    );
                }
                self.check_stmt(body);
            }

            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let iter_ty = self.check_expr(iterable);
                let elem_ty = match &iter_ty {
                    Type::Generic { name, args } if name == "array" && args.len() == 1 => {
                        args[0].clone()
                    }
                    Type::Basic(lyra_types::BasicKind::Str) => Type::CHAR,
                    _ => Type::UNKNOWN,
                };
                self.scopes.push(FxHashMap::default());
                self.define(binding.clone(), elem_ty);
                self.check_stmt(body);
                self.scopes.pop();
            }

            StmtKind::Return(value) => {
                let value_ty = value
                    .as_mut()
                    .map(|e| self.check_expr(e))
                    .unwrap_or(Type::VOID);
                let expected = self.return_types.last().cloned().unwrap_or(Type::VOID);
                if !value_ty.is_assignable_to(&expected) {
                    self.error_at(
                        ErrorCode::T014InvalidReturnType,
                        format!("return type mismatch: expected `{expected}`, got `{value_ty}`"),
                        &token,
                    );
                }
            }

            // Imports are resolved by the driver before checking.
            StmtKind::Import { .. } => {}

            StmtKind::Match { scrutinee, arms } => {
                let scrutinee_ty = self.check_expr(scrutinee);
                for arm in arms {
                    self.scopes.push(FxHashMap::default());
                    self.check_pattern(&arm.pattern, &scrutinee_ty);
                    self.check_stmt(&mut arm.body);
                    self.scopes.pop();
                }
            }

            StmtKind::Trait(decl) => self.check_trait_decl(decl, &token),

            StmtKind::Impl(decl) => self.check_impl_decl(decl, &token),

            StmtKind::Select { arms } => {
                for (operation, body) in arms {
                    self.check_expr(operation);
                    self.check_stmt(body);
                }
                self.warn_unimplemented("select statement", &token);
            }

            StmtKind::Expression(expr) => {
                self.check_expr(expr);
            }
        }
    }

    fn declare_function(&mut self, decl: &FunctionDecl) {
        let ty = Type::function(
            decl.params.iter().map(|p| p.ty.clone()).collect(),
            decl.ret.clone(),
        );
        self.define(decl.name.clone(), ty);
    }

    fn check_function(&mut self, decl: &mut FunctionDecl) {
        self.scopes.push(FxHashMap::default());
        for param in &decl.params {
            self.define(param.name.clone(), param.ty.clone());
        }
        self.return_types.push(decl.ret.clone());
        self.check_stmt(&mut decl.body);
        self.return_types.pop();
        self.scopes.pop();
    }

    // -- Expressions --------------------------------------------------------

    /// Check one expression, record its type on the node, and return it.
    /// Diagnosed failures yield the `unknown` placeholder, never an absent
    /// type.
    pub fn check_expr(&mut self, expr: &mut Expr) -> Type {
        let token = expr.token.clone();
        let ty = match &mut expr.kind {
            ExprKind::Literal { kind, .. } => match kind {
                LiteralKind::Integer => Type::INT,
                LiteralKind::Float => Type::FLOAT,
                LiteralKind::Boolean => Type::BOOL,
                LiteralKind::Str => Type::STRING,
                LiteralKind::Nil => Type::VOID,
            },

            ExprKind::Variable(name) => match self.lookup(name) {
                Some(ty) => ty,
                None => {
                    self.error_at(
                        ErrorCode::T002UndefinedVariable,
                        format!("undefined variable `{name}`"),
                        &token,
                    );
                    Type::UNKNOWN
                }
            },

            ExprKind::Assign { name, value } => {
                let value_ty = self.check_expr(value);
                match self.lookup(name) {
                    None => {
                        self.error_at(
                            ErrorCode::T002UndefinedVariable,
                            format!("assignment to undefined variable `{name}`"),
                            &token,
                        );
                        Type::UNKNOWN
                    }
                    Some(target) => {
                        if !value_ty.is_assignable_to(&target) {
                            self.error_at(
                                ErrorCode::T001TypeMismatch,
                                format!(
                                    "cannot assign `{value_ty}` to `{name}` of type `{target}`"
                                ),
                                &token,
                            );
                        }
                        target
                    }
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.check_binary(op, lhs, rhs, &token)
            }

            ExprKind::Unary { op, operand } => {
                let op = *op;
                let operand_ty = self.check_expr(operand);
                match op {
                    _ if operand_ty.is_unknown() => Type::UNKNOWN,
                    UnaryOp::Neg if operand_ty.is_numeric() => operand_ty,
                    UnaryOp::Not if operand_ty == Type::BOOL => Type::BOOL,
                    _ => {
                        let name = match op {
                            UnaryOp::Neg => "-",
                            UnaryOp::Not => "not",
                        };
                        self.error_at(
                            ErrorCode::T006InvalidOperator,
                            format!("operator `{name}` cannot be applied to `{operand_ty}`"),
                            &token,
                        );
                        Type::UNKNOWN
                    }
                }
            }

            ExprKind::Call { callee, args } => {
                let callee_ty = self.check_expr(callee);
                let arg_tys: Vec<Type> = args.iter_mut().map(|a| self.check_expr(a)).collect();
                match callee_ty {
                    Type::Function { params, ret } => {
                        if params.len() != arg_tys.len() {
                            self.error_at(
                                ErrorCode::T007InvalidCall,
                                format!(
                                    "expected {} argument(s), got {}",
                                    params.len(),
                                    arg_tys.len()
                                ),
                                &token,
                            );
                        } else {
                            for (index, (param, arg)) in
                                params.iter().zip(&arg_tys).enumerate()
                            {
                                if !arg.is_assignable_to(param) {
                                    self.error_at(
                                        ErrorCode::T007InvalidCall,
                                        format!(
                                            "argument {}: expected `{param}`, got `{arg}`",
                                            index + 1
                                        ),
                                        &token,
                                    );
                                }
                            }
                        }
                        *ret
                    }
                    ty if ty.is_unknown() => Type::UNKNOWN,
                    ty => {
                        self.error_at(
                            ErrorCode::T007InvalidCall,
                            format!("`{ty}` is not callable"),
                            &token,
                        );
                        Type::UNKNOWN
                    }
                }
            }

            ExprKind::Array(elements) => {
                let elem_ty = self.infer_element_type(elements, &token);
                Type::array(elem_ty)
            }

            ExprKind::Dict(entries) => {
                if entries.is_empty() {
                    // Permissive default, mirroring the empty-array rule.
                    Type::map(Type::STRING, Type::INT)
                } else {
                    let mut keys = Vec::new();
                    let mut values = Vec::new();
                    for (key, value) in entries.iter_mut() {
                        keys.push(self.check_expr(key));
                        values.push(self.check_expr(value));
                    }
                    let key_ty = Self::fold_widened(keys);
                    let value_ty = Self::fold_widened(values);
                    let (key_ty, value_ty) = match (key_ty, value_ty) {
                        (Some(k), Some(v)) => (k, v),
                        _ => {
                            self.error_at(
                                ErrorCode::T001TypeMismatch,
                                "dictionary literal has inconsistent entry types".to_string(),
                                &token,
                            );
                            (Type::UNKNOWN, Type::UNKNOWN)
                        }
                    };
                    Type::map(key_ty, value_ty)
                }
            }

            ExprKind::Lambda { params, ret, body } => {
                self.scopes.push(FxHashMap::default());
                for param in params.iter() {
                    self.define(param.name.clone(), param.ty.clone());
                }
                self.return_types.push(ret.clone());
                self.check_stmt(body);
                self.return_types.pop();
                self.scopes.pop();
                Type::function(params.iter().map(|p| p.ty.clone()).collect(), ret.clone())
            }

            ExprKind::Await(inner) => self.check_expr(inner),

            ExprKind::OptionSome(inner) => Type::option(self.check_expr(inner)),
            ExprKind::OptionNone => Type::option(Type::UNKNOWN),
            ExprKind::ResultOk(inner) => Type::result(self.check_expr(inner), Type::UNKNOWN),
            ExprKind::ResultErr(inner) => Type::result(Type::UNKNOWN, self.check_expr(inner)),

            ExprKind::ChannelSend { channel, value } => {
                let channel_ty = self.check_expr(channel);
                let value_ty = self.check_expr(value);
                if let Type::Generic { name, args } = &channel_ty
                    && name == "channel"
                    && args.len() == 1
                    && !value_ty.is_assignable_to(&args[0])
                {
                    self.error_at(
                        ErrorCode::T001TypeMismatch,
                        format!(
                            "cannot send value of type `{value_ty}` to channel of type `{channel_ty}`"
                        ),
                        &token,
                    );
                }
                self.warn_unimplemented("channel send", &token);
                Type::VOID
            }

            ExprKind::ChannelReceive(channel) => {
                let channel_ty = self.check_expr(channel);
                self.warn_unimplemented("channel receive", &token);
                match channel_ty {
                    Type::Generic { name, mut args } if name == "channel" && args.len() == 1 => {
                        args.remove(0)
                    }
                    _ => Type::UNKNOWN,
                }
            }

            ExprKind::Go(inner) => {
                self.check_expr(inner);
                if !matches!(inner.kind, ExprKind::Call { .. }) {
                    self.error_at(
                        ErrorCode::T007InvalidCall,
                        "goroutine launch requires a function call".to_string(),
                        &token,
                    );
                }
                self.warn_unimplemented("goroutine launch", &token);
                Type::VOID
            }

            ExprKind::Move(inner) => {
                self.check_expr(inner);
                self.warn_unimplemented("move expression", &token);
                Type::VOID
            }
        };
        expr.ty = Some(ty.clone());
        ty
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        lhs: &mut Expr,
        rhs: &mut Expr,
        token: &Token,
    ) -> Type {
        let lhs_ty = self.check_expr(lhs);
        let rhs_ty = self.check_expr(rhs);

        if op.is_logical() {
            if !(lhs_ty.is_unknown() || lhs_ty == Type::BOOL)
                || !(rhs_ty.is_unknown() || rhs_ty == Type::BOOL)
            {
                self.error_at(
                    ErrorCode::T006InvalidOperator,
                    format!(
                        "operator `{}` requires `bool` operands, got `{lhs_ty}` and `{rhs_ty}`",
                        op.as_str()
                    ),
                    token,
                );
            }
            return Type::BOOL;
        }

        if op.is_comparison() {
            if !lhs_ty.is_assignable_to(&rhs_ty) && !rhs_ty.is_assignable_to(&lhs_ty) {
                self.error_at(
                    ErrorCode::T006InvalidOperator,
                    format!(
                        "operator `{}` cannot compare `{lhs_ty}` with `{rhs_ty}`",
                        op.as_str()
                    ),
                    token,
                );
            }
            return Type::BOOL;
        }

        if lhs_ty.is_unknown() || rhs_ty.is_unknown() {
            return Type::UNKNOWN;
        }
        if op == BinaryOp::Add && lhs_ty == Type::STRING && rhs_ty == Type::STRING {
            return Type::STRING;
        }
        if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
            // int widens to float; float32 widens to float.
            return if lhs_ty == Type::FLOAT || rhs_ty == Type::FLOAT {
                Type::FLOAT
            } else if lhs_ty == Type::FLOAT32 || rhs_ty == Type::FLOAT32 {
                Type::FLOAT32
            } else {
                Type::INT
            };
        }

        self.error_at(
            ErrorCode::T006InvalidOperator,
            format!(
                "operator `{}` cannot be applied to `{lhs_ty}` and `{rhs_ty}`",
                op.as_str()
            ),
            token,
        );
        Type::UNKNOWN
    }

    /// Array-literal element inference: the first element seeds the running
    /// type; later elements either fit it, widen it, or (once) diagnose a
    /// mismatch and stop widening. Empty literals default to `int`.
    fn infer_element_type(&mut self, elements: &mut [Expr], token: &Token) -> Type {
        let mut running: Option<Type> = None;
        for element in elements.iter_mut() {
            let element_ty = self.check_expr(element);
            match &running {
                None => running = Some(element_ty),
                Some(current) => {
                    if element_ty.is_assignable_to(current) {
                        // keep the running type
                    } else if current.is_assignable_to(&element_ty) {
                        running = Some(element_ty);
                    } else {
                        self.error_at(
                            ErrorCode::T001TypeMismatch,
                            "array literal has inconsistent element types".to_string(),
                            token,
                        );
                        break;
                    }
                }
            }
        }
        running.unwrap_or(Type::INT)
    }

    /// Fold the array-literal widening rule over an already-checked list
    /// of types; `None` marks an inconsistent position.
    fn fold_widened(types: Vec<Type>) -> Option<Type> {
        let mut running: Option<Type> = None;
        for ty in types {
            match &running {
                None => running = Some(ty),
                Some(current) => {
                    if ty.is_assignable_to(current) {
                        // keep
                    } else if current.is_assignable_to(&ty) {
                        running = Some(ty);
                    } else {
                        return None;
                    }
                }
            }
        }
        running
    }

    // -- Patterns -----------------------------------------------------------

    /// Bind a pattern's variables into the current scope and validate it
    /// against the scrutinee type where one is known.
    fn check_pattern(&mut self, pattern: &Pattern, scrutinee: &Type) {
        match &pattern.kind {
            PatternKind::Wildcard => {}

            PatternKind::Literal { kind, .. } => {
                let literal_ty = match kind {
                    LiteralKind::Integer => Type::INT,
                    LiteralKind::Float => Type::FLOAT,
                    LiteralKind::Boolean => Type::BOOL,
                    LiteralKind::Str => Type::STRING,
                    LiteralKind::Nil => Type::VOID,
                };
                if !literal_ty.is_assignable_to(scrutinee)
                    && !scrutinee.is_assignable_to(&literal_ty)
                {
                    self.error_at(
                        ErrorCode::T001TypeMismatch,
                        format!(
                            "pattern of type `{literal_ty}` cannot match scrutinee of type `{scrutinee}`"
                        ),
                        &pattern.token,
                    );
                }
            }

            PatternKind::Variable(name) => {
                self.define(name.clone(), scrutinee.clone());
            }

            PatternKind::Constructor { name, args } => match (name.as_str(), scrutinee) {
                ("Some", Type::Option(inner)) if args.len() == 1 => {
                    self.check_pattern(&args[0], inner);
                }
                ("Ok", Type::Result { ok, .. }) if args.len() == 1 => {
                    self.check_pattern(&args[0], ok);
                }
                ("Err", Type::Result { err, .. }) if args.len() == 1 => {
                    self.check_pattern(&args[0], err);
                }
                _ => {
                    for arg in args {
                        self.check_pattern(arg, &Type::UNKNOWN);
                    }
                }
            },

            PatternKind::Tuple(elements) => {
                for element in elements {
                    self.check_pattern(element, &Type::UNKNOWN);
                }
            }

            PatternKind::Struct { fields, .. } => {
                for (_, field_pattern) in fields {
                    self.check_pattern(field_pattern, &Type::UNKNOWN);
                }
            }

            PatternKind::Or(left, right) => {
                // Policy: both alternatives must bind identical variable
                // sets; disagreeing arms are diagnosed once per or-pattern.
                if left.bound_variables() != right.bound_variables() {
                    self.error_at(
                        ErrorCode::M001OrPatternBindings,
                        "or-pattern alternatives must bind the same variables".to_string(),
                        &pattern.token,
                    );
                }
                self.check_pattern(left, scrutinee);
                self.check_pattern(right, scrutinee);
            }
        }
    }

    // -- Traits -------------------------------------------------------------

    fn check_trait_decl(&mut self, decl: &TraitDecl, token: &Token) {
        let mut definition = Trait::new(decl.name.clone());
        for parent in &decl.parents {
            if self.traits.trait_def(parent).is_none() {
                self.error_at(
                    ErrorCode::T017IncompleteTraitImpl,
                    format!("trait `{}` inherits from unknown trait `{parent}`", decl.name),
                    token,
                );
            }
            definition.add_parent(parent.clone());
        }
        for method in &decl.methods {
            definition.add_method(TraitMethod {
                name: method.name.clone(),
                params: method.params.clone(),
                ret: method.ret.clone(),
                has_default: method.has_default,
            });
        }
        for associated in &decl.associated_types {
            definition.add_associated_type(associated.clone());
        }
        if !self.traits.register_trait(definition) {
            self.error_at(
                ErrorCode::M002DuplicateDefinition,
                format!("trait `{}` is already defined", decl.name),
                token,
            );
        }
    }

    fn check_impl_decl(&mut self, decl: &mut ImplDecl, token: &Token) {
        if self.traits.trait_def(&decl.trait_name).is_none() {
            self.error_at(
                ErrorCode::T017IncompleteTraitImpl,
                format!("implementation of unknown trait `{}`", decl.trait_name),
                token,
            );
        } else {
            let mut implementation = TraitImpl::new(decl.trait_name.clone(), &decl.target);
            for method in &decl.methods {
                implementation.add_method(TraitMethod {
                    name: method.name.clone(),
                    params: method.params.iter().map(|p| p.ty.clone()).collect(),
                    ret: method.ret.clone(),
                    has_default: false,
                });
            }
            for (name, ty) in &decl.associated_types {
                implementation.add_associated_type(name.clone(), ty.clone());
            }

            // Completeness is recomputed against the registry, inherited
            // requirements included.
            let (missing_methods, missing_associated) =
                self.traits.missing_requirements(&implementation);
            for name in &missing_methods {
                self.error_at(
                    ErrorCode::T017IncompleteTraitImpl,
                    format!(
                        "implementation of `{}` for `{}` is missing method `{name}`",
                        decl.trait_name, implementation.target
                    ),
                    token,
                );
            }
            for name in &missing_associated {
                self.error_at(
                    ErrorCode::T017IncompleteTraitImpl,
                    format!(
                        "implementation of `{}` for `{}` is missing associated type `{name}`",
                        decl.trait_name, implementation.target
                    ),
                    token,
                );
            }
            self.traits.register_impl(implementation);
        }

        let target = decl.target.clone();
        for method in &mut decl.methods {
            self.scopes.push(FxHashMap::default());
            self.define("self".to_string(), target.clone());
            self.check_function(method);
            self.scopes.pop();
        }
    }

    // -- Scope and diagnostics ----------------------------------------------

    fn define(&mut self, name: String, ty: Type) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name, ty);
    }

    fn lookup(&self, name: &str) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    fn error_at(&self, code: ErrorCode, message: String, token: &Token) {
        self.errors
            .error(code, message, token.file, token.line, token.column);
    }

    fn warn_unimplemented(&self, what: &str, token: &Token) {
        self.errors.warning(
            ErrorCode::C001NotImplemented,
            format!("{what} is not implemented yet"),
            token.file,
            token.line,
            token.column,
        );
    }
}
