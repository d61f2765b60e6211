// lower.rs — AST to unit definitions
//
// Replays each unit declaration's statements through a `UnitBuilder`, in
// source order, so names resolve exactly as the builder API resolves them.
// A unit stops at its first error; that error becomes a diagnostic and the
// unit is dropped. Other units are lowered independently.
//
// Preconditions: `program` parsed without errors.
// Postconditions: every returned `UnitDef` passed `UnitBuilder::finish`.
// Failure modes: builder errors (E01xx-E03xx), missing or repeated `out`
//                (E0304), duplicate unit names (E0307).
// Side effects: none.

use std::collections::HashMap;

use crate::ast::*;
use crate::builder::{Operand, UnitBuilder, UnitDef};
use crate::diag::{codes, Diagnostic};
use crate::error::GenError;
use crate::id::NodeId;
use crate::node::ValueType;

// ── Output types ────────────────────────────────────────────────────────────

/// A lowered unit with the span of its declaration.
#[derive(Debug, Clone)]
pub struct LoweredUnit {
    pub def: UnitDef,
    pub span: Span,
}

pub struct LowerResult {
    pub units: Vec<LoweredUnit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LowerResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn lower(program: &Program) -> LowerResult {
    let mut units = Vec::new();
    let mut diagnostics = Vec::new();
    let mut seen: HashMap<&str, Span> = HashMap::new();

    for decl in &program.units {
        if let Some(&first) = seen.get(decl.name.name.as_str()) {
            diagnostics.push(
                Diagnostic::error(
                    decl.name.span,
                    format!("unit '{}' is declared more than once", decl.name.name),
                )
                .with_code(codes::E0307)
                .with_related(first, "first declared here"),
            );
            continue;
        }
        seen.insert(&decl.name.name, decl.name.span);

        match UnitCtx::new(decl).lower() {
            Ok(def) => units.push(LoweredUnit {
                def,
                span: decl.span,
            }),
            Err(diag) => diagnostics.push(diag),
        }
    }

    LowerResult { units, diagnostics }
}

// ── Internal context ────────────────────────────────────────────────────────

type Lowered<T> = Result<T, Diagnostic>;

fn at(span: Span) -> impl FnOnce(GenError) -> Diagnostic {
    move |err| Diagnostic::error(span, err.to_string()).with_code(err.code())
}

fn value_type(ty: &Option<Ident>) -> Option<ValueType> {
    ty.as_ref().map(|id| ValueType::parse(&id.name))
}

struct UnitCtx<'a> {
    decl: &'a UnitDecl,
    builder: UnitBuilder,
    output: Option<(NodeId, Span)>,
}

impl<'a> UnitCtx<'a> {
    fn new(decl: &'a UnitDecl) -> Self {
        Self {
            decl,
            builder: UnitBuilder::new(decl.name.name.clone()),
            output: None,
        }
    }

    fn lower(mut self) -> Lowered<UnitDef> {
        for stmt in &self.decl.body {
            self.lower_stmt(stmt)?;
        }
        let decl = self.decl;
        let Some((output, _)) = self.output else {
            return Err(Diagnostic::error(
                decl.name.span,
                format!("unit '{}' has no `out` statement", decl.name.name),
            )
            .with_code(codes::E0304));
        };
        self.builder
            .finish(output, decl.category, decl.commutative)
            .map_err(at(decl.name.span))
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Lowered<()> {
        let b = &mut self.builder;
        match &stmt.kind {
            StmtKind::Param { name, ty, rates } => {
                let ty = value_type(ty).unwrap_or(ValueType::Sample);
                b.param(&name.name, ty, *rates).map_err(at(name.span))?;
            }
            StmtKind::Extern { name, ty } => {
                let ty = value_type(ty).unwrap_or(ValueType::Sample);
                b.symbol(&name.name, ty).map_err(at(name.span))?;
            }
            StmtKind::Let { name, value } => {
                let value = self.lower_expr(value)?;
                self.builder.bind(&name.name, value).map_err(at(name.span))?;
            }
            StmtKind::Var { name, ty, value } => {
                let value = self.lower_expr(value)?;
                self.builder
                    .var(&name.name, value, value_type(ty))
                    .map_err(at(name.span))?;
            }
            StmtKind::State { name, ty, init } => {
                let init = self.lower_expr(init)?;
                self.builder
                    .state(&name.name, init, value_type(ty))
                    .map_err(at(name.span))?;
            }
            StmtKind::Next { state, value } => {
                let value = self.lower_expr(value)?;
                self.builder
                    .next(state.name.as_str(), value)
                    .map_err(at(state.span))?;
            }
            StmtKind::OutputRate(name) => {
                b.use_output_rate(name.name.as_str()).map_err(at(name.span))?;
            }
            StmtKind::NoInterp(name) => {
                b.no_interpolate(name.name.as_str()).map_err(at(name.span))?;
            }
            StmtKind::On {
                param,
                state,
                value,
            } => {
                let value = self.lower_expr(value)?;
                self.builder
                    .on_write(param.name.as_str(), state.name.as_str(), value)
                    .map_err(at(stmt.span))?;
            }
            StmtKind::Out(expr) => {
                if let Some((_, first)) = self.output {
                    return Err(Diagnostic::error(
                        stmt.span,
                        format!("unit '{}' has more than one `out`", self.decl.name.name),
                    )
                    .with_code(codes::E0304)
                    .with_related(first, "first output here"));
                }
                let id = self.lower_expr(expr)?;
                self.output = Some((id, stmt.span));
            }
        }
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> Lowered<NodeId> {
        let b = &mut self.builder;
        let result = match &expr.kind {
            ExprKind::Int(v) => b.operand(*v),
            ExprKind::Float(v) => b.operand(*v),
            ExprKind::Name(name) => b.operand(name.as_str()),
            // Negative literals stay literals.
            ExprKind::Neg(inner) => match inner.kind {
                ExprKind::Int(v) => b.operand(-v),
                ExprKind::Float(v) => b.operand(-v),
                _ => {
                    let x = self.lower_expr(inner)?;
                    self.builder.neg(x)
                }
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                self.builder.binary(*op, lhs, rhs)
            }
            ExprKind::Index { target, index } => {
                let target = self.lower_expr(target)?;
                let index = self.lower_expr(index)?;
                self.builder.subscript(target, index)
            }
            ExprKind::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.lower_expr(arg).map(Operand::from))
                    .collect::<Lowered<Vec<_>>>()?;
                self.builder.call(&func.name, args)
            }
        };
        result.map_err(at(expr.span))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
