//! Read access to minijinja's parsed template tree.
//!
//! Only the node kinds a template entity can reasonably use are opened up;
//! everything else is reported as opaque so callers can be conservative.

use minijinja::machinery::{self, ast};

pub(crate) use ast::{CallArg, Expr, Stmt};

use super::SyntaxReason;
use super::env::{FILTERS, FUNCTIONS, TEMPLATE_NAME};

pub(crate) fn parse(source: &str) -> Result<Stmt<'_>, minijinja::Error> {
    machinery::parse(source, TEMPLATE_NAME, Default::default(), Default::default())
}

/// Expressions and statement bodies directly owned by `stmt`, or `None` for
/// an opaque statement.
pub(crate) fn stmt_parts<'a, 's>(stmt: &'a Stmt<'s>) -> Option<(Vec<&'a Expr<'s>>, Vec<&'a [Stmt<'s>]>)> {
    let parts = match stmt {
        Stmt::Template(node) => (Vec::new(), vec![node.children.as_slice()]),
        Stmt::EmitRaw(_) => (Vec::new(), Vec::new()),
        Stmt::EmitExpr(node) => (vec![&node.expr], Vec::new()),
        Stmt::IfCond(node) => (
            vec![&node.expr],
            vec![node.true_body.as_slice(), node.false_body.as_slice()],
        ),
        Stmt::ForLoop(node) => (
            [Some(&node.iter), node.filter_expr.as_ref()].into_iter().flatten().collect(),
            vec![node.body.as_slice(), node.else_body.as_slice()],
        ),
        Stmt::WithBlock(node) => (
            node.assignments.iter().map(|(_, value)| value).collect(),
            vec![node.body.as_slice()],
        ),
        Stmt::Set(node) => (vec![&node.expr], Vec::new()),
        Stmt::SetBlock(node) => (node.filter.iter().collect(), vec![node.body.as_slice()]),
        Stmt::FilterBlock(node) => (vec![&node.filter], vec![node.body.as_slice()]),
        _ => return None,
    };
    Some(parts)
}

/// Expression of a call argument, whatever its form.
pub(crate) fn arg_expr<'a, 's>(arg: &'a CallArg<'s>) -> &'a Expr<'s> {
    match arg {
        CallArg::Pos(expr) | CallArg::Kwarg(_, expr) | CallArg::PosSplat(expr) | CallArg::KwargSplat(expr) => expr,
    }
}

/// Positional arguments, or `None` when any argument is splatted.
pub(crate) fn positional<'a, 's>(args: &'a [CallArg<'s>]) -> Option<Vec<&'a Expr<'s>>> {
    let mut found = Vec::new();
    for arg in args {
        match arg {
            CallArg::Pos(expr) => found.push(expr),
            CallArg::Kwarg(..) => {}
            CallArg::PosSplat(_) | CallArg::KwargSplat(_) => return None,
        }
    }
    Some(found)
}

/// Sub-expressions of `expr`, or `None` for an opaque expression.
pub(crate) fn expr_children<'a, 's>(expr: &'a Expr<'s>) -> Option<Vec<&'a Expr<'s>>> {
    let children = match expr {
        Expr::Var(_) | Expr::Const(_) => Vec::new(),
        Expr::UnaryOp(node) => vec![&node.expr],
        Expr::BinOp(node) => vec![&node.left, &node.right],
        Expr::IfExpr(node) => [Some(&node.test_expr), Some(&node.true_expr), node.false_expr.as_ref()]
            .into_iter()
            .flatten()
            .collect(),
        Expr::GetAttr(node) => vec![&node.expr],
        Expr::GetItem(node) => vec![&node.expr, &node.subscript_expr],
        Expr::Slice(node) => [Some(&node.expr), node.start.as_ref(), node.stop.as_ref(), node.step.as_ref()]
            .into_iter()
            .flatten()
            .collect(),
        Expr::Filter(node) => node.expr.iter().chain(node.args.iter().map(arg_expr)).collect(),
        Expr::Test(node) => std::iter::once(&node.expr)
            .chain(node.args.iter().map(arg_expr))
            .collect(),
        Expr::Call(node) => std::iter::once(&node.expr)
            .chain(node.args.iter().map(arg_expr))
            .collect(),
        Expr::List(node) => node.items.iter().collect(),
        Expr::Map(node) => node.keys.iter().chain(&node.values).collect(),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(children)
}

/// String literal value of `expr`.
pub(crate) fn const_str<'a>(expr: &'a Expr<'_>) -> Option<&'a str> {
    match expr {
        Expr::Const(node) => node.value.as_str(),
        _ => None,
    }
}

/// Reject calls to functions and filters templates cannot use, and calls
/// with the wrong number of arguments.
pub(crate) fn check(stmt: &Stmt<'_>) -> Result<(), SyntaxReason> {
    let Some((exprs, bodies)) = stmt_parts(stmt) else {
        return Ok(());
    };
    exprs.into_iter().try_for_each(check_expr)?;
    bodies.into_iter().flatten().try_for_each(check)
}

fn check_expr(expr: &Expr<'_>) -> Result<(), SyntaxReason> {
    match expr {
        Expr::Call(node) => {
            if let Expr::Var(var) = &node.expr {
                let known = FUNCTIONS.iter().find(|(name, ..)| *name == var.id);
                let Some(&(name, min, max)) = known else {
                    return Err(SyntaxReason::UnknownFunction(var.id.to_string()));
                };
                check_arity(name, min, max, &node.args)?;
            }
        }
        Expr::Filter(node) => {
            let known = FILTERS.iter().find(|(name, ..)| *name == node.name);
            let Some(&(name, min, max)) = known else {
                return Err(SyntaxReason::UnknownFilter(node.name.to_string()));
            };
            check_arity(name, min, max, &node.args)?;
        }
        _ => {}
    }
    expr_children(expr)
        .unwrap_or_default()
        .into_iter()
        .try_for_each(check_expr)
}

fn check_arity(name: &str, min: usize, max: usize, args: &[CallArg<'_>]) -> Result<(), SyntaxReason> {
    match positional(args) {
        Some(found) if found.len() < min || found.len() > max => Err(SyntaxReason::Arity {
            name: name.to_string(),
            min,
            max,
            got: found.len(),
        }),
        _ => Ok(()),
    }
}
