//! Small AST analyses used by the evaluator.
use std::collections::BTreeMap;

use crate::compiler::ast;

/// Collects the blocks a list of statements defines.
///
/// Blocks can be nested in control structures and other blocks in which
/// case they still participate in template inheritance.  The child-most
/// definition of a block must end up at layer 0 which is why the caller
/// appends the returned bodies in document order.
pub fn collect_blocks<'t, 'source>(
    stmts: &'t [ast::Stmt<'source>],
    rv: &mut BTreeMap<&'source str, &'t [ast::Stmt<'source>]>,
) {
    for stmt in stmts {
        match stmt {
            ast::Stmt::Template(tmpl) => collect_blocks(&tmpl.children, rv),
            ast::Stmt::Block(block) => {
                rv.entry(block.name).or_insert(&block.body);
                collect_blocks(&block.body, rv);
            }
            ast::Stmt::ForLoop(for_loop) => {
                collect_blocks(&for_loop.body, rv);
                collect_blocks(&for_loop.else_body, rv);
            }
            ast::Stmt::IfCond(if_cond) => {
                collect_blocks(&if_cond.true_body, rv);
                collect_blocks(&if_cond.false_body, rv);
            }
            ast::Stmt::WithBlock(with_block) => collect_blocks(&with_block.body, rv),
            ast::Stmt::AutoEscape(auto_escape) => collect_blocks(&auto_escape.body, rv),
            ast::Stmt::FilterBlock(filter_block) => collect_blocks(&filter_block.body, rv),
            _ => {}
        }
    }
}

/// Checks if a macro body references the special `caller` variable.
pub fn references_caller(stmts: &[ast::Stmt<'_>]) -> bool {
    stmts.iter().any(stmt_references_caller)
}

fn stmt_references_caller(stmt: &ast::Stmt<'_>) -> bool {
    match stmt {
        ast::Stmt::Template(tmpl) => references_caller(&tmpl.children),
        ast::Stmt::EmitExpr(emit) => expr_references_caller(&emit.expr),
        ast::Stmt::EmitRaw(_) => false,
        ast::Stmt::ForLoop(for_loop) => {
            expr_references_caller(&for_loop.iter)
                || for_loop
                    .filter_expr
                    .as_ref()
                    .map_or(false, expr_references_caller)
                || references_caller(&for_loop.body)
                || references_caller(&for_loop.else_body)
        }
        ast::Stmt::IfCond(if_cond) => {
            expr_references_caller(&if_cond.expr)
                || references_caller(&if_cond.true_body)
                || references_caller(&if_cond.false_body)
        }
        ast::Stmt::WithBlock(with_block) => {
            with_block
                .assignments
                .iter()
                .any(|(_, expr)| expr_references_caller(expr))
                || references_caller(&with_block.body)
        }
        ast::Stmt::Set(set) => expr_references_caller(&set.expr),
        ast::Stmt::SetBlock(set_block) => references_caller(&set_block.body),
        ast::Stmt::AutoEscape(auto_escape) => references_caller(&auto_escape.body),
        ast::Stmt::FilterBlock(filter_block) => references_caller(&filter_block.body),
        ast::Stmt::Block(block) => references_caller(&block.body),
        ast::Stmt::Extends(_) | ast::Stmt::Include(_) => false,
        ast::Stmt::Import(_) | ast::Stmt::FromImport(_) => false,
        ast::Stmt::Macro(_) => false,
        ast::Stmt::CallBlock(call_block) => call_args_reference_caller(&call_block.call.args),
        ast::Stmt::Do(do_stmt) => {
            expr_references_caller(&do_stmt.call.expr)
                || call_args_reference_caller(&do_stmt.call.args)
        }
        ast::Stmt::Continue(_) | ast::Stmt::Break(_) => false,
    }
}

fn call_args_reference_caller(args: &[ast::CallArg<'_>]) -> bool {
    args.iter().any(|arg| match arg {
        ast::CallArg::Pos(expr)
        | ast::CallArg::Kwarg(_, expr)
        | ast::CallArg::PosSplat(expr)
        | ast::CallArg::KwargSplat(expr) => expr_references_caller(expr),
    })
}

fn expr_references_caller(expr: &ast::Expr<'_>) -> bool {
    let mut found = false;
    walk_expr_names(expr, &mut |name| found = found || name == "caller");
    found
}

/// Collects the variable names an expression references.
pub fn referenced_names<'source>(expr: &ast::Expr<'source>) -> Vec<&'source str> {
    let mut rv = Vec::new();
    walk_expr_names(expr, &mut |name| {
        if !rv.contains(&name) {
            rv.push(name);
        }
    });
    rv
}

fn walk_expr_names<'source>(expr: &ast::Expr<'source>, f: &mut dyn FnMut(&'source str)) {
    match expr {
        ast::Expr::Var(var) => f(var.id),
        ast::Expr::Const(_) => {}
        ast::Expr::Slice(slice) => {
            walk_expr_names(&slice.expr, f);
            for expr in [&slice.start, &slice.stop, &slice.step].into_iter().flatten() {
                walk_expr_names(expr, f);
            }
        }
        ast::Expr::UnaryOp(op) => walk_expr_names(&op.expr, f),
        ast::Expr::BinOp(op) => {
            walk_expr_names(&op.left, f);
            walk_expr_names(&op.right, f);
        }
        ast::Expr::IfExpr(if_expr) => {
            walk_expr_names(&if_expr.test_expr, f);
            walk_expr_names(&if_expr.true_expr, f);
            if let Some(ref false_expr) = if_expr.false_expr {
                walk_expr_names(false_expr, f);
            }
        }
        ast::Expr::Filter(filter) => {
            if let Some(ref expr) = filter.expr {
                walk_expr_names(expr, f);
            }
            walk_call_arg_names(&filter.args, f);
        }
        ast::Expr::Test(test) => {
            walk_expr_names(&test.expr, f);
            walk_call_arg_names(&test.args, f);
        }
        ast::Expr::GetAttr(attr) => walk_expr_names(&attr.expr, f),
        ast::Expr::GetItem(item) => {
            walk_expr_names(&item.expr, f);
            walk_expr_names(&item.subscript_expr, f);
        }
        ast::Expr::Call(call) => {
            walk_expr_names(&call.expr, f);
            walk_call_arg_names(&call.args, f);
        }
        ast::Expr::List(list) => {
            for item in &list.items {
                walk_expr_names(item, f);
            }
        }
        ast::Expr::Map(map) => {
            for expr in map.keys.iter().chain(map.values.iter()) {
                walk_expr_names(expr, f);
            }
        }
    }
}

fn walk_call_arg_names<'source>(args: &[ast::CallArg<'source>], f: &mut dyn FnMut(&'source str)) {
    for arg in args {
        match arg {
            ast::CallArg::Pos(expr)
            | ast::CallArg::Kwarg(_, expr)
            | ast::CallArg::PosSplat(expr)
            | ast::CallArg::KwargSplat(expr) => walk_expr_names(expr, f),
        }
    }
}
