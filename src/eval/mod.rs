use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::compiler::ast;
use crate::compiler::meta;
use crate::compiler::tokens::Span;
use crate::environment::Environment;
use crate::error::{DebugInfo, Error, ErrorKind};
use crate::output::{CaptureMode, Output};
use crate::template::CompiledTemplate;
use crate::utils::AutoEscape;
use crate::value::{ops, Object, ObjectRepr, Value, ValueMap, ValueRepr};

mod cancel;
mod context;
mod fuel;
mod loop_object;
mod macro_object;
mod module_object;
mod state;

pub use self::cancel::CancelHandle;
pub use self::state::State;

pub(crate) use self::context::{Context, Frame};
pub(crate) use self::state::{BlockStack, MacroDef};

use self::loop_object::LoopIter;
use self::macro_object::Macro;
use self::module_object::Module;

// the cost of a single include against the stack limit.
const INCLUDE_RECURSION_COST: usize = 10;

// the cost of a single macro call against the stack limit.
pub(crate) const MACRO_RECURSION_COST: usize = 4;

/// How a list of statements finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
}

/// The tree walking evaluator.
pub(crate) struct Evaluator<'env> {
    env: &'env Environment<'env>,
}

/// Proxy object the name `self` resolves to.
///
/// Attribute access hands out block references which render the named
/// block of the current template when called.
#[derive(Debug)]
struct SelfObject;

impl Object for SelfObject {
    fn repr(&self) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        Some(Value::from_object(BlockRef {
            name: Arc::from(name),
        }))
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<self>")
    }
}

/// A callable that renders a block of the current template.
#[derive(Debug)]
struct BlockRef {
    name: Arc<str>,
}

impl Object for BlockRef {
    fn repr(&self) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        if !args.is_empty() {
            return Err(Error::new(
                ErrorKind::TooManyArguments,
                "block call takes no arguments",
            ));
        }
        let mut sub_state = state.fork();
        let mut rv = String::new();
        {
            let mut out = Output::with_string(&mut rv);
            ok!(Evaluator::new(state.env())
                .call_block(&self.name, &mut sub_state, &mut out)
                .map_err(|err| {
                    Error::new(ErrorKind::EvalBlock, format!("error in block {:?}", self.name))
                        .with_source(err)
                }));
        }
        Ok(wrap_captured(rv, state.auto_escape()))
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<block {}>", self.name)
    }
}

fn wrap_captured(rv: String, auto_escape: AutoEscape) -> Value {
    if !matches!(auto_escape, AutoEscape::None) {
        Value::from_safe_string(rv)
    } else {
        Value::from(rv)
    }
}

impl<'env> Evaluator<'env> {
    /// Creates a new evaluator.
    pub fn new(env: &'env Environment<'env>) -> Evaluator<'env> {
        Evaluator { env }
    }

    /// Evaluates a template as the root of a render.
    pub fn eval_template<'t>(
        &self,
        state: &mut State<'t, 'env>,
        tmpl: &'t CompiledTemplate<'env>,
        out: &mut Output,
    ) -> Result<(), Error> {
        state.loaded_templates.insert(tmpl.name);
        self.register_blocks(state, tmpl);
        self.eval_template_stmts(state, tmpl.children(), out)
    }

    /// Registers the blocks a template defines as child-most layers.
    fn register_blocks<'t>(&self, state: &mut State<'t, 'env>, tmpl: &'t CompiledTemplate<'env>) {
        let mut blocks = BTreeMap::new();
        meta::collect_blocks(tmpl.children(), &mut blocks);
        for (name, body) in blocks {
            state
                .blocks
                .entry(name)
                .or_insert_with(|| BlockStack::new(body, tmpl));
        }
    }

    /// Evaluates statements and keeps following `extends` chains.
    ///
    /// An `extends` statement merges the parent blocks, stashes the parent
    /// away and discards the remaining output of the current template.  Once
    /// the statement list is exhausted the root ancestor is the only
    /// template whose statements actually produce output.
    fn eval_template_stmts<'t>(
        &self,
        state: &mut State<'t, 'env>,
        stmts: &'t [ast::Stmt<'env>],
        out: &mut Output,
    ) -> Result<(), Error> {
        let mut stmts = stmts;
        loop {
            ok!(self.eval_stmts(state, stmts, out));
            match state.pending_parent.take() {
                Some(parent) => {
                    out.end_capture(AutoEscape::None);
                    state.in_parent = true;
                    state.template = Some(parent);
                    stmts = parent.children();
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Renders a template in place of the current one (include/import).
    fn eval_nested_template<'t>(
        &self,
        state: &mut State<'t, 'env>,
        tmpl: &'t CompiledTemplate<'env>,
        out: &mut Output,
    ) -> Result<(), Error> {
        let old_template = mem::replace(&mut state.template, Some(tmpl));
        let old_blocks = state.blocks.clone();
        let old_loaded = state.loaded_templates.clone();
        let old_escape = mem::replace(&mut state.auto_escape, self.env.initial_auto_escape(tmpl.name));
        let old_pending = state.pending_parent.take();
        let old_in_parent = mem::replace(&mut state.in_parent, false);
        state.loaded_templates.insert(tmpl.name);
        self.register_blocks(state, tmpl);
        let rv = self.eval_template_stmts(state, tmpl.children(), out);
        state.in_parent = old_in_parent;
        state.pending_parent = old_pending;
        state.auto_escape = old_escape;
        state.loaded_templates = old_loaded;
        state.blocks = old_blocks;
        state.template = old_template;
        rv
    }

    /// Evaluates a list of statements.
    pub fn eval_stmts<'t>(
        &self,
        state: &mut State<'t, 'env>,
        stmts: &'t [ast::Stmt<'env>],
        out: &mut Output,
    ) -> Result<Flow, Error> {
        for stmt in stmts {
            match ok!(self.eval_stmt(state, stmt, out)) {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_stmt<'t>(
        &self,
        state: &mut State<'t, 'env>,
        stmt: &'t ast::Stmt<'env>,
        out: &mut Output,
    ) -> Result<Flow, Error> {
        if let Err(err) = state.track_step() {
            return Err(self.attach_info(err, state, stmt.span(), None));
        }
        self.eval_stmt_impl(state, stmt, out)
            .map_err(|err| self.attach_info(err, state, stmt.span(), None))
    }

    fn eval_stmt_impl<'t>(
        &self,
        state: &mut State<'t, 'env>,
        stmt: &'t ast::Stmt<'env>,
        out: &mut Output,
    ) -> Result<Flow, Error> {
        Ok(match stmt {
            ast::Stmt::Template(tmpl) => {
                return self.eval_stmts(state, &tmpl.children, out);
            }
            ast::Stmt::EmitRaw(raw) => {
                ok!(out.write_str(raw.raw).map_err(Error::from));
                Flow::Normal
            }
            ast::Stmt::EmitExpr(emit) => {
                let value = ok!(self.eval_expr(state, &emit.expr));
                ok!(self.env.format(&value, state, out));
                Flow::Normal
            }
            ast::Stmt::ForLoop(for_loop) => {
                let iter_value = ok!(self.eval_expr(state, &for_loop.iter));
                // depth propagates when the enclosing loop is recursive
                let depth = state
                    .ctx
                    .current_loop()
                    .filter(|x| x.recurse.is_some())
                    .map_or(0, |x| x.object.depth + 1);
                return self.eval_for_loop(state, for_loop, iter_value, depth, out);
            }
            ast::Stmt::IfCond(if_cond) => {
                let value = ok!(self.eval_expr(state, &if_cond.expr));
                let truthy = ok!(state.undefined_behavior().is_true(&value));
                return self.eval_stmts(
                    state,
                    if truthy {
                        &if_cond.true_body
                    } else {
                        &if_cond.false_body
                    },
                    out,
                );
            }
            ast::Stmt::WithBlock(with_block) => {
                ok!(state.ctx.push_frame(Frame::default()));
                let mut rv = Ok(());
                for (target, expr) in &with_block.assignments {
                    rv = self
                        .eval_expr(state, expr)
                        .and_then(|value| self.bind_target(state, target, value));
                    if rv.is_err() {
                        break;
                    }
                }
                let flow = match rv {
                    Ok(()) => self.eval_stmts(state, &with_block.body, out),
                    Err(err) => Err(err),
                };
                state.ctx.pop_frame();
                return flow;
            }
            ast::Stmt::Set(set) => {
                let value = ok!(self.eval_expr(state, &set.expr));
                ok!(self.bind_target(state, &set.target, value));
                Flow::Normal
            }
            ast::Stmt::SetBlock(set_block) => {
                out.begin_capture(CaptureMode::Capture);
                let flow = match self.eval_stmts(state, &set_block.body, out) {
                    Ok(flow) => flow,
                    Err(err) => {
                        out.end_capture(AutoEscape::None);
                        return Err(err);
                    }
                };
                let mut value = out.end_capture(state.auto_escape);
                if let Some(ast::Expr::Filter(ref filter)) = set_block.filter {
                    value = ok!(self.eval_filter_chain(state, filter, Some(value)));
                }
                ok!(self.bind_target(state, &set_block.target, value));
                flow
            }
            ast::Stmt::AutoEscape(auto_escape) => {
                let value = ok!(self.eval_expr(state, &auto_escape.enabled));
                let new_escape = ok!(self.derive_auto_escape(value, state.auto_escape));
                let old_escape = mem::replace(&mut state.auto_escape, new_escape);
                let rv = self.eval_stmts(state, &auto_escape.body, out);
                state.auto_escape = old_escape;
                return rv;
            }
            ast::Stmt::FilterBlock(filter_block) => {
                out.begin_capture(CaptureMode::Capture);
                let flow = match self.eval_stmts(state, &filter_block.body, out) {
                    Ok(flow) => flow,
                    Err(err) => {
                        out.end_capture(AutoEscape::None);
                        return Err(err);
                    }
                };
                let value = out.end_capture(state.auto_escape);
                let value = match filter_block.filter {
                    ast::Expr::Filter(ref filter) => {
                        ok!(self.eval_filter_chain(state, filter, Some(value)))
                    }
                    _ => value,
                };
                ok!(self.env.format(&value, state, out));
                flow
            }
            ast::Stmt::Block(block) => {
                // block tags of a template that is in the process of being
                // replaced by a parent do not render; the parent decides.
                if state.pending_parent.is_none() && !out.is_discarding() {
                    if state.blocks.contains_key(block.name) {
                        ok!(self.call_block(block.name, state, out));
                    } else {
                        // blocks an included template brings along render
                        // against their own body
                        ok!(state.ctx.push_frame(Frame::default()));
                        let rv = self.eval_stmts(state, &block.body, out);
                        state.ctx.pop_frame();
                        ok!(rv);
                    }
                }
                Flow::Normal
            }
            ast::Stmt::Extends(extends) => {
                if state.pending_parent.is_some() {
                    return Err(Error::new(
                        ErrorKind::InvalidOperation,
                        "tried to extend a second time in a template",
                    ));
                }
                let name_val = ok!(self.eval_expr(state, &extends.name));
                let name = ok!(name_val.as_str().ok_or_else(|| Error::new(
                    ErrorKind::InvalidOperation,
                    "template name was not a string",
                )));
                if state.loaded_templates.contains(name) {
                    return Err(Error::new(
                        ErrorKind::InvalidOperation,
                        format!(
                            "cycle in template inheritance. {name:?} was referenced more than once"
                        ),
                    ));
                }
                let tmpl = ok!(state.get_template(name));
                state.loaded_templates.insert(tmpl.name);
                ok!(state.ctx.incr_depth(INCLUDE_RECURSION_COST));
                let mut blocks = BTreeMap::new();
                meta::collect_blocks(tmpl.children(), &mut blocks);
                for (name, body) in blocks {
                    state
                        .blocks
                        .entry(name)
                        .or_default()
                        .append_layer(body, tmpl);
                }
                state.pending_parent = Some(tmpl);
                out.begin_capture(CaptureMode::Discard);
                Flow::Normal
            }
            ast::Stmt::Include(include) => {
                ok!(self.eval_include(state, include, out));
                Flow::Normal
            }
            ast::Stmt::Import(import) => {
                let module = ok!(self.eval_module(state, &import.expr));
                ok!(self.bind_target(state, &import.name, module));
                Flow::Normal
            }
            ast::Stmt::FromImport(from_import) => {
                let module = ok!(self.eval_module(state, &from_import.expr));
                for (name, alias) in &from_import.names {
                    let value = match *name {
                        ast::Expr::Var(ref var) => module
                            .downcast_object_ref::<Module>()
                            .and_then(|x| x.get_export(var.id))
                            .unwrap_or(Value::UNDEFINED),
                        _ => Value::UNDEFINED,
                    };
                    ok!(self.bind_target(state, alias.as_ref().unwrap_or(name), value));
                }
                Flow::Normal
            }
            ast::Stmt::Macro(macro_decl) => {
                let value = ok!(self.declare_macro(state, macro_decl));
                // a parent layer only contributes macros the child does not
                // have already
                let skip = state.in_parent && state.ctx.exports().contains_key(macro_decl.name);
                if !skip {
                    state.ctx.store(macro_decl.name, value.clone());
                    state
                        .macro_table
                        .lock()
                        .unwrap()
                        .insert(macro_decl.name.to_string(), value);
                }
                Flow::Normal
            }
            ast::Stmt::CallBlock(call_block) => {
                let caller = ok!(self.declare_macro(state, &call_block.macro_decl));
                let value = ok!(self.eval_call(state, &call_block.call, Some(caller)));
                ok!(self.env.format(&value, state, out));
                Flow::Normal
            }
            ast::Stmt::Do(do_stmt) => {
                ok!(self.eval_call(state, &do_stmt.call, None));
                Flow::Normal
            }
            ast::Stmt::Continue(_) => Flow::Continue,
            ast::Stmt::Break(_) => Flow::Break,
        })
    }

    fn eval_for_loop<'t>(
        &self,
        state: &mut State<'t, 'env>,
        for_loop: &'t ast::Spanned<ast::ForLoop<'env>>,
        iter_value: Value,
        depth: usize,
        out: &mut Output,
    ) -> Result<Flow, Error> {
        ok!(state.undefined_behavior().assert_iterable(&iter_value));
        let recurse = for_loop.recursive.then_some(for_loop);

        // One-shot iterators are pulled lazily so that a `break` leaves the
        // remaining items in the shared cursor.  Loops that filter or
        // recurse need the whole item list up front.
        let loop_state = if !for_loop.recursive && for_loop.filter_expr.is_none() {
            if let ValueRepr::Iterator(ref iter) = iter_value.0 {
                Some(loop_object::LoopState::new(
                    LoopIter::Shared(iter.clone()),
                    None,
                    depth,
                    recurse,
                ))
            } else {
                None
            }
        } else {
            None
        };
        let loop_state = match loop_state {
            Some(loop_state) => loop_state,
            None => {
                let mut items: Vec<Value> = ok!(iter_value.try_iter()).collect();
                if let Some(ref filter_expr) = for_loop.filter_expr {
                    let mut filtered = Vec::with_capacity(items.len());
                    for item in items {
                        ok!(state.ctx.push_frame(Frame::default()));
                        let rv = self
                            .bind_target(state, &for_loop.target, item.clone())
                            .and_then(|_| self.eval_expr(state, filter_expr))
                            .and_then(|cond| state.undefined_behavior().is_true(&cond));
                        state.ctx.pop_frame();
                        if ok!(rv) {
                            filtered.push(item);
                        }
                    }
                    items = filtered;
                }
                let len = items.len();
                loop_object::LoopState::new(LoopIter::Items(items.into_iter()), Some(len), depth, recurse)
            }
        };

        ok!(state.ctx.push_frame(Frame {
            current_loop: Some(loop_state),
            ..Frame::default()
        }));
        let mut iterated = false;
        let rv = loop {
            let item = match state.ctx.current_loop().unwrap().next() {
                Some(item) => item,
                None => break Ok(()),
            };
            iterated = true;
            if let Err(err) = item
                .validate()
                .and_then(|item| self.bind_target(state, &for_loop.target, item))
            {
                break Err(err);
            }
            match self.eval_stmts(state, &for_loop.body, out) {
                Ok(Flow::Break) => break Ok(()),
                Ok(_) => {}
                Err(err) => break Err(err),
            }
        };
        state.ctx.pop_frame();
        ok!(rv);

        if !iterated && !for_loop.else_body.is_empty() {
            ok!(state.ctx.push_frame(Frame::default()));
            let rv = self.eval_stmts(state, &for_loop.else_body, out);
            state.ctx.pop_frame();
            return rv;
        }
        Ok(Flow::Normal)
    }

    /// Binds a value to an assignment target.
    ///
    /// Targets can be plain names, nested tuples or (for `set`) dotted
    /// attribute paths.  Tuple unpacking requires exact length matches.
    /// Attribute assignment on a target that does not support mutation is
    /// a silent no-op.
    fn bind_target<'t>(
        &self,
        state: &mut State<'t, 'env>,
        target: &'t ast::Expr<'env>,
        value: Value,
    ) -> Result<(), Error> {
        match target {
            ast::Expr::Var(var) => {
                state.ctx.store(var.id, value);
                Ok(())
            }
            ast::Expr::List(list) => {
                let values: Vec<Value> = ok!(value.try_iter()).collect();
                if values.len() != list.items.len() {
                    return Err(Error::new(
                        ErrorKind::InvalidOperation,
                        format!(
                            "cannot unpack: sequence of wrong length (expected {}, got {})",
                            list.items.len(),
                            values.len()
                        ),
                    ));
                }
                for (target, value) in list.items.iter().zip(values) {
                    ok!(self.bind_target(state, target, value));
                }
                Ok(())
            }
            ast::Expr::GetAttr(attr) => {
                let obj = ok!(self.eval_expr(state, &attr.expr));
                if let Some(obj) = obj.as_object() {
                    let _ = obj.set_attr(attr.name, value);
                }
                Ok(())
            }
            _ => Err(Error::new(
                ErrorKind::SyntaxError,
                "invalid assignment target",
            )),
        }
    }

    /// Evaluates an expression.
    pub fn eval_expr<'t>(
        &self,
        state: &mut State<'t, 'env>,
        expr: &'t ast::Expr<'env>,
    ) -> Result<Value, Error> {
        if let Err(err) = state.track_step() {
            return Err(self.attach_info(err, state, expr.span(), Some(expr)));
        }
        self.eval_expr_impl(state, expr)
            .map_err(|err| self.attach_info(err, state, expr.span(), Some(expr)))
    }

    fn eval_expr_impl<'t>(
        &self,
        state: &mut State<'t, 'env>,
        expr: &'t ast::Expr<'env>,
    ) -> Result<Value, Error> {
        Ok(match expr {
            ast::Expr::Var(var) => {
                if var.id == "self" {
                    Value::from_object(SelfObject)
                } else {
                    match state.lookup(var.id) {
                        Some(value) => ok!(value.validate()),
                        None => Value::UNDEFINED,
                    }
                }
            }
            ast::Expr::Const(constant) => constant.value.clone(),
            ast::Expr::UnaryOp(op) => {
                let value = ok!(self.eval_expr(state, &op.expr));
                match op.op {
                    // `not` never fails, not even on strict undefined values
                    ast::UnaryOpKind::Not => Value::from(!value.is_true()),
                    ast::UnaryOpKind::Neg => ok!(ops::neg(&value)),
                }
            }
            ast::Expr::BinOp(op) => return self.eval_bin_op(state, op),
            ast::Expr::IfExpr(if_expr) => {
                let value = ok!(self.eval_expr(state, &if_expr.test_expr));
                if ok!(state.undefined_behavior().is_true(&value)) {
                    ok!(self.eval_expr(state, &if_expr.true_expr))
                } else {
                    match if_expr.false_expr {
                        Some(ref false_expr) => ok!(self.eval_expr(state, false_expr)),
                        None => Value::SILENT_UNDEFINED,
                    }
                }
            }
            ast::Expr::Filter(filter) => return self.eval_filter_chain(state, filter, None),
            ast::Expr::Test(test) => {
                let value = ok!(self.eval_expr(state, &test.expr));
                let args = ok!(self.eval_call_args(state, &test.args, None));
                let test_fn = ok!(self.env.get_test(test.name).ok_or_else(|| Error::new(
                    ErrorKind::UnknownTest,
                    format!("test {} is unknown", test.name),
                )));
                Value::from(ok!(test_fn.perform(state, &value, &args)))
            }
            ast::Expr::GetAttr(attr) => {
                let value = ok!(self.eval_expr(state, &attr.expr));
                match value.get_attr_fast(attr.name) {
                    Some(rv) => ok!(rv.validate()),
                    None => ok!(state.undefined_behavior().handle_undefined(&value)),
                }
            }
            ast::Expr::GetItem(item) => {
                let value = ok!(self.eval_expr(state, &item.expr));
                let key = ok!(self.eval_expr(state, &item.subscript_expr));
                match value.get_item_opt(&key) {
                    Some(rv) => ok!(rv.validate()),
                    None => ok!(state.undefined_behavior().handle_undefined(&value)),
                }
            }
            ast::Expr::Slice(slice) => {
                let value = ok!(self.eval_expr(state, &slice.expr));
                ok!(state.undefined_behavior().assert_iterable(&value));
                let start = match slice.start {
                    Some(ref expr) => ok!(self.eval_expr(state, expr)),
                    None => Value::from(()),
                };
                let stop = match slice.stop {
                    Some(ref expr) => ok!(self.eval_expr(state, expr)),
                    None => Value::from(()),
                };
                let step = match slice.step {
                    Some(ref expr) => ok!(self.eval_expr(state, expr)),
                    None => Value::from(()),
                };
                ok!(ops::slice(value, start, stop, step))
            }
            ast::Expr::Call(call) => return self.eval_call(state, call, None),
            ast::Expr::List(list) => match list.as_const() {
                Some(value) => value,
                None => {
                    let mut items = Vec::with_capacity(list.items.len());
                    for item in &list.items {
                        items.push(ok!(self.eval_expr(state, item)));
                    }
                    Value::from(items)
                }
            },
            ast::Expr::Map(map) => match map.as_const() {
                Some(value) => value,
                None => {
                    let mut rv = ValueMap::new();
                    for (key, value) in map.keys.iter().zip(map.values.iter()) {
                        let key = ok!(self.eval_expr(state, key));
                        let value = ok!(self.eval_expr(state, value));
                        let key = match key.as_str() {
                            Some(key) => Arc::from(key),
                            None => Arc::from(key.to_string()),
                        };
                        rv.insert(key, value);
                    }
                    Value::from_map(rv)
                }
            },
        })
    }

    fn eval_bin_op<'t>(
        &self,
        state: &mut State<'t, 'env>,
        op: &'t ast::Spanned<ast::BinOp<'env>>,
    ) -> Result<Value, Error> {
        // short circuiting operators return the deciding operand like
        // Python does
        match op.op {
            ast::BinOpKind::ScAnd => {
                let left = ok!(self.eval_expr(state, &op.left));
                return if !ok!(state.undefined_behavior().is_true(&left)) {
                    Ok(left)
                } else {
                    self.eval_expr(state, &op.right)
                };
            }
            ast::BinOpKind::ScOr => {
                let left = ok!(self.eval_expr(state, &op.left));
                return if ok!(state.undefined_behavior().is_true(&left)) {
                    Ok(left)
                } else {
                    self.eval_expr(state, &op.right)
                };
            }
            _ => {}
        }

        let left = ok!(self.eval_expr(state, &op.left));
        let right = ok!(self.eval_expr(state, &op.right));
        match op.op {
            ast::BinOpKind::Eq => Ok(Value::from(left == right)),
            ast::BinOpKind::Ne => Ok(Value::from(left != right)),
            ast::BinOpKind::Lt => ops::cmp(&left, &right)
                .map(|x| Value::from(x == std::cmp::Ordering::Less)),
            ast::BinOpKind::Lte => ops::cmp(&left, &right)
                .map(|x| Value::from(x != std::cmp::Ordering::Greater)),
            ast::BinOpKind::Gt => ops::cmp(&left, &right)
                .map(|x| Value::from(x == std::cmp::Ordering::Greater)),
            ast::BinOpKind::Gte => ops::cmp(&left, &right)
                .map(|x| Value::from(x != std::cmp::Ordering::Less)),
            ast::BinOpKind::Add => ops::add(&left, &right),
            ast::BinOpKind::Sub => ops::sub(&left, &right),
            ast::BinOpKind::Mul => ops::mul(&left, &right),
            ast::BinOpKind::Div => ops::div(&left, &right),
            ast::BinOpKind::FloorDiv => ops::int_div(&left, &right),
            ast::BinOpKind::Rem => ops::rem(&left, &right),
            ast::BinOpKind::Pow => ops::pow(&left, &right),
            ast::BinOpKind::Concat => Ok(ops::string_concat(&left, &right)),
            ast::BinOpKind::In => {
                // the in operator can fail when the container is a strict
                // undefined value
                ok!(state.undefined_behavior().assert_iterable(&right));
                ops::contains(&right, &left)
            }
            ast::BinOpKind::ScAnd | ast::BinOpKind::ScOr => unreachable!(),
        }
    }

    fn eval_filter_chain<'t>(
        &self,
        state: &mut State<'t, 'env>,
        filter: &'t ast::Spanned<ast::Filter<'env>>,
        seed: Option<Value>,
    ) -> Result<Value, Error> {
        let value = match (&filter.expr, seed) {
            (Some(ast::Expr::Filter(inner)), seed @ Some(_)) => {
                ok!(self.eval_filter_chain(state, inner, seed))
            }
            (Some(expr), _) => ok!(self.eval_expr(state, expr)),
            (None, Some(seed)) => seed,
            (None, None) => Value::UNDEFINED,
        };
        let args = ok!(self.eval_call_args(state, &filter.args, None));
        let filter_fn = ok!(self.env.get_filter(filter.name).ok_or_else(|| Error::new(
            ErrorKind::UnknownFilter,
            format!("filter {} is unknown", filter.name),
        )));
        filter_fn.apply_to(state, &value, &args)
    }

    /// Evaluates call arguments into a value list.
    ///
    /// Keyword arguments of all flavors are merged and passed as trailing
    /// kwargs value, matching what callable values expect.
    fn eval_call_args<'t>(
        &self,
        state: &mut State<'t, 'env>,
        args: &'t [ast::CallArg<'env>],
        extra_kwarg: Option<(&'static str, Value)>,
    ) -> Result<Vec<Value>, Error> {
        let mut rv = Vec::with_capacity(args.len());
        let mut kwargs: Option<ValueMap> = None;
        for arg in args {
            match arg {
                ast::CallArg::Pos(expr) => rv.push(ok!(self.eval_expr(state, expr))),
                ast::CallArg::Kwarg(name, expr) => {
                    let value = ok!(self.eval_expr(state, expr));
                    kwargs
                        .get_or_insert_with(ValueMap::new)
                        .insert(Arc::from(*name), value);
                }
                ast::CallArg::PosSplat(expr) => {
                    let value = ok!(self.eval_expr(state, expr));
                    ok!(state.undefined_behavior().assert_iterable(&value));
                    for item in ok!(value.try_iter()) {
                        rv.push(item);
                    }
                }
                ast::CallArg::KwargSplat(expr) => {
                    let value = ok!(self.eval_expr(state, expr));
                    match value.as_map() {
                        Some(map) => {
                            let kwargs = kwargs.get_or_insert_with(ValueMap::new);
                            for (key, value) in map.iter() {
                                kwargs.insert(key.clone(), value.clone());
                            }
                        }
                        None => {
                            return Err(Error::new(
                                ErrorKind::InvalidOperation,
                                format!(
                                    "attempted to apply keyword arguments from non map (got {})",
                                    value.kind()
                                ),
                            ))
                        }
                    }
                }
            }
        }
        if let Some((name, value)) = extra_kwarg {
            kwargs
                .get_or_insert_with(ValueMap::new)
                .insert(Arc::from(name), value);
        }
        if let Some(kwargs) = kwargs {
            rv.push(Value::from_kwargs(kwargs));
        }
        Ok(rv)
    }

    fn eval_call<'t>(
        &self,
        state: &mut State<'t, 'env>,
        call: &'t ast::Spanned<ast::Call<'env>>,
        caller: Option<Value>,
    ) -> Result<Value, Error> {
        match call.identify_call() {
            ast::CallType::Function(name) => {
                if name == "super" {
                    if !call.args.is_empty() {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            "super() takes no arguments",
                        ));
                    }
                    self.perform_super(state)
                } else if name == "loop" {
                    let args = ok!(self.eval_call_args(state, &call.args, None));
                    if args.len() != 1 {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            "loop() takes one argument",
                        ));
                    }
                    self.recurse_loop(state, args.into_iter().next().unwrap())
                } else {
                    match state.lookup(name) {
                        Some(func) => {
                            let args = ok!(self.eval_call_args(state, &call.args, caller.map(|v| ("caller", v))));
                            func.call(state, &args)
                        }
                        None => Err(Error::new(
                            ErrorKind::UnknownFunction,
                            format!("{name} is unknown"),
                        )),
                    }
                }
            }
            ast::CallType::Block(name) => {
                let mut rv = String::new();
                {
                    let mut out = Output::with_string(&mut rv);
                    ok!(self.call_block(name, state, &mut out));
                }
                Ok(wrap_captured(rv, state.auto_escape))
            }
            ast::CallType::Method(expr, name) => {
                let value = ok!(self.eval_expr(state, expr));
                let args = ok!(self.eval_call_args(state, &call.args, caller.map(|v| ("caller", v))));
                value.call_method(state, name, &args)
            }
            ast::CallType::Object(expr) => {
                let value = ok!(self.eval_expr(state, expr));
                let args = ok!(self.eval_call_args(state, &call.args, caller.map(|v| ("caller", v))));
                value.call(state, &args)
            }
        }
    }

    /// Renders a block at its current layer.
    pub(crate) fn call_block<'t>(
        &self,
        name: &str,
        state: &mut State<'t, 'env>,
        out: &mut Output,
    ) -> Result<(), Error> {
        let (name, body, tmpl) = match state.blocks.get_key_value(name) {
            Some((name, block_stack)) => {
                let (body, tmpl) = block_stack.body();
                (*name, body, tmpl)
            }
            None => {
                return Err(Error::new(
                    ErrorKind::UnknownBlock,
                    format!("block '{name}' not found"),
                ))
            }
        };
        let old_block = state.current_block.replace(name);
        let old_template = mem::replace(&mut state.template, Some(tmpl));
        ok!(state.ctx.push_frame(Frame::default()));
        let rv = self.eval_stmts(state, body, out);
        state.ctx.pop_frame();
        state.template = old_template;
        state.current_block = old_block;
        rv.map(|_| ())
    }

    /// Renders the parent layer of the current block to a string.
    fn perform_super<'t>(&self, state: &mut State<'t, 'env>) -> Result<Value, Error> {
        let name = ok!(state.current_block.ok_or_else(|| {
            Error::new(ErrorKind::InvalidOperation, "cannot super outside of block")
        }));

        if !state.blocks.get_mut(name).unwrap().push() {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "no parent block exists",
            ));
        }
        let (body, tmpl) = state.blocks.get(name).unwrap().body();
        let old_template = mem::replace(&mut state.template, Some(tmpl));

        let mut rv_string = String::new();
        let rv = match state.ctx.push_frame(Frame::default()) {
            Ok(()) => {
                let mut out = Output::with_string(&mut rv_string);
                let rv = self.eval_stmts(state, body, &mut out);
                state.ctx.pop_frame();
                rv.map(|_| ())
            }
            Err(err) => Err(err),
        };
        state.template = old_template;
        state.blocks.get_mut(name).unwrap().pop();

        ok!(rv.map_err(|err| {
            Error::new(ErrorKind::EvalBlock, "error in super block").with_source(err)
        }));
        Ok(wrap_captured(rv_string, state.auto_escape))
    }

    /// Re-enters the innermost recursive loop with a new iterable.
    fn recurse_loop<'t>(
        &self,
        state: &mut State<'t, 'env>,
        iterable: Value,
    ) -> Result<Value, Error> {
        let (for_loop, depth) = match state.ctx.current_loop() {
            Some(loop_state) if loop_state.recurse.is_some() => {
                (loop_state.recurse.unwrap(), loop_state.object.depth + 1)
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "cannot recurse outside of recursive loop",
                ))
            }
        };
        let mut rv_string = String::new();
        {
            let mut out = Output::with_string(&mut rv_string);
            ok!(self.eval_for_loop(state, for_loop, iterable, depth, &mut out));
        }
        Ok(wrap_captured(rv_string, state.auto_escape))
    }

    fn derive_auto_escape(
        &self,
        value: Value,
        current: AutoEscape,
    ) -> Result<AutoEscape, Error> {
        match (value.as_str(), value == Value::from(true)) {
            (Some("html"), _) => Ok(AutoEscape::Html),
            (Some("json"), _) => Ok(AutoEscape::Json),
            (Some("none"), _) | (None, false) => Ok(AutoEscape::None),
            (None, true) => Ok(if matches!(current, AutoEscape::None) {
                AutoEscape::Html
            } else {
                current
            }),
            _ => Err(Error::new(
                ErrorKind::InvalidOperation,
                "invalid value to autoescape tag",
            )),
        }
    }

    /// Renders an included template with the current scope and tables.
    fn eval_include<'t>(
        &self,
        state: &mut State<'t, 'env>,
        include: &'t ast::Include<'env>,
        out: &mut Output,
    ) -> Result<(), Error> {
        let name_val = ok!(self.eval_expr(state, &include.name));
        let choices: Vec<Value> = if matches!(
            name_val.kind(),
            crate::value::ValueKind::Seq | crate::value::ValueKind::Iterator
        ) {
            ok!(name_val.try_iter()).collect()
        } else {
            vec![name_val.clone()]
        };

        let mut templates_tried = vec![];
        for choice in choices {
            let name = ok!(choice.as_str().ok_or_else(|| Error::new(
                ErrorKind::InvalidOperation,
                "template name was not a string",
            )));
            let tmpl = match state.get_template(name) {
                Ok(tmpl) => tmpl,
                Err(err) => {
                    if err.kind() == ErrorKind::TemplateNotFound {
                        templates_tried.push(choice);
                        continue;
                    } else {
                        return Err(Error::new(
                            ErrorKind::BadInclude,
                            format!("error in {name:?}"),
                        )
                        .with_source(err));
                    }
                }
            };

            ok!(state.ctx.incr_depth(INCLUDE_RECURSION_COST));
            // the included template gets a shallow copy of the innermost
            // scope so its assignments stay local
            ok!(state.ctx.push_frame(Frame {
                locals: state.ctx.current_locals().clone(),
                ..Frame::default()
            }));
            let rv = self.eval_nested_template(state, tmpl, out);
            state.ctx.pop_frame();
            state.ctx.decr_depth(INCLUDE_RECURSION_COST);
            return rv.map_err(|err| {
                if err.kind() == ErrorKind::TemplateNotFound {
                    err
                } else {
                    Error::new(ErrorKind::BadInclude, format!("error in {:?}", tmpl.name))
                        .with_source(err)
                }
            });
        }

        if !templates_tried.is_empty() && !include.ignore_missing {
            Err(Error::new(
                ErrorKind::TemplateNotFound,
                if templates_tried.len() == 1 {
                    format!(
                        "tried to include non-existing template {:?}",
                        templates_tried[0]
                    )
                } else {
                    format!(
                        "tried to include one of multiple templates, none of which existed {}",
                        Value::from(templates_tried)
                    )
                },
            ))
        } else {
            // when every candidate was missing and `ignore missing` was set
            // the include renders nothing
            Ok(())
        }
    }

    /// Evaluates a template as module and returns the module value.
    ///
    /// The template is fully evaluated with discarded output; its top level
    /// assignments and macros become the module exports.
    fn eval_module<'t>(
        &self,
        state: &mut State<'t, 'env>,
        name_expr: &'t ast::Expr<'env>,
    ) -> Result<Value, Error> {
        let name_val = ok!(self.eval_expr(state, name_expr));
        let name = ok!(name_val.as_str().ok_or_else(|| Error::new(
            ErrorKind::InvalidOperation,
            "template name was not a string",
        )));
        let tmpl = ok!(state.get_template(name));
        ok!(state.ctx.incr_depth(INCLUDE_RECURSION_COST));
        ok!(state.ctx.push_frame(Frame::default()));
        let mut sink = String::new();
        let rv = {
            let mut out = Output::with_string(&mut sink);
            out.begin_capture(CaptureMode::Discard);
            self.eval_nested_template(state, tmpl, &mut out)
        };
        let exports = state.ctx.take_current_locals();
        state.ctx.pop_frame();
        state.ctx.decr_depth(INCLUDE_RECURSION_COST);
        ok!(rv);

        let mut values = ValueMap::new();
        for (key, value) in exports {
            values.insert(Arc::from(key), value);
        }
        Ok(Value::from_object(Module::new(
            Arc::from(tmpl.name),
            values,
        )))
    }

    /// Declares a macro and returns the macro value.
    ///
    /// The macro closes over a snapshot of the scopes visible at its
    /// definition site.  Lookups inside the macro body consult that
    /// snapshot first and the per render macro table afterwards which is
    /// how self-recursive macros find themselves.
    fn declare_macro<'t>(
        &self,
        state: &mut State<'t, 'env>,
        macro_decl: &'t ast::Spanned<ast::Macro<'env>>,
    ) -> Result<Value, Error> {
        let closure = Value::from_map(state.ctx.snapshot_for_closure());
        let caller_reference = meta::references_caller(&macro_decl.body);
        let mut arg_names = Vec::with_capacity(macro_decl.args.len());
        for arg in &macro_decl.args {
            match arg {
                ast::Expr::Var(var) => arg_names.push(var.id),
                _ => {
                    return Err(Error::new(
                        ErrorKind::SyntaxError,
                        "invalid macro argument",
                    ))
                }
            }
        }
        let template = ok!(state.template.ok_or_else(|| Error::new(
            ErrorKind::InvalidOperation,
            "cannot declare macros outside of templates",
        )));
        let macro_ref_id = {
            let mut macros = state.macros.lock().unwrap();
            macros.push(MacroDef {
                name: macro_decl.name,
                arg_names: arg_names.clone(),
                defaults: &macro_decl.defaults[..],
                body: &macro_decl.body[..],
                closure,
                caller_reference,
                template,
            });
            macros.len() - 1
        };
        Ok(Value::from_object(Macro {
            name: Arc::from(macro_decl.name),
            arg_spec: arg_names.into_iter().map(Arc::from).collect(),
            macro_ref_id,
            state_id: state.id,
            caller_reference,
        }))
    }

    /// Enriches an error with location and debug information.
    #[cold]
    fn attach_info(
        &self,
        mut err: Error,
        state: &State,
        span: Span,
        expr: Option<&ast::Expr>,
    ) -> Error {
        if err.line().is_none() {
            err.set_filename_and_span(state.name(), span);
        }
        if self.env.debug() && err.debug_info().is_none() {
            let mut referenced_locals = Vec::new();
            if let Some(expr) = expr {
                for name in meta::referenced_names(expr) {
                    if let Some(value) = state.lookup(name) {
                        referenced_locals.push((name.to_string(), value));
                    }
                }
            }
            if let Some(source) = state.template_source() {
                err.attach_template_source(source);
            }
            err.attach_debug_info(DebugInfo {
                template_source: state.template_source().map(|x| x.to_string()),
                referenced_locals,
            });
        }
        err
    }
}
