use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::eval::context::{Context, Frame};
use crate::eval::{Evaluator, State, MACRO_RECURSION_COST};
use crate::output::Output;
use crate::utils::AutoEscape;
use crate::value::{Kwargs, Object, ObjectRepr, Value};

/// A macro value created by a `{% macro %}` tag or a call block.
///
/// Because values need to be `'static` the macro object cannot hold a
/// reference to the body that declared it.  Instead the body, defaults and
/// the captured closure live in the state under an index, paired with the
/// state id to catch macros that leak out of their render.
pub(crate) struct Macro {
    pub name: Arc<str>,
    pub arg_spec: Vec<Arc<str>>,
    pub macro_ref_id: usize,
    pub state_id: isize,
    pub caller_reference: bool,
}

impl fmt::Debug for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<macro {}>", self.name)
    }
}

impl Object for Macro {
    fn repr(&self) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name.clone())),
            "arguments" => Some(Value::from(
                self.arg_spec
                    .iter()
                    .map(|x| Value::from(x.clone()))
                    .collect::<Vec<_>>(),
            )),
            "caller" => Some(Value::from(self.caller_reference)),
            _ => None,
        }
    }

    fn call(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        if state.id != self.state_id {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "cannot call this macro. template state went away.",
            ));
        }

        let (args, kwargs) = Kwargs::extract(args);

        let caller = if kwargs.has("caller") {
            Some(ok!(kwargs.get::<Value>("caller")))
        } else {
            None
        };
        if caller.is_some() && !self.caller_reference {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("macro '{}' takes no caller", self.name),
            ));
        }

        if args.len() > self.arg_spec.len() {
            return Err(Error::from(ErrorKind::TooManyArguments));
        }

        let mut arg_values = Vec::with_capacity(self.arg_spec.len());
        for (idx, name) in self.arg_spec.iter().enumerate() {
            let kwarg = if kwargs.has(name) {
                Some(ok!(kwargs.get::<Value>(name)))
            } else {
                None
            };
            arg_values.push(match (args.get(idx), kwarg) {
                (Some(_), Some(_)) => {
                    return Err(Error::new(
                        ErrorKind::TooManyArguments,
                        format!("duplicate argument `{name}`"),
                    ))
                }
                (Some(arg), None) => arg.clone(),
                (None, Some(kwarg)) => kwarg,
                (None, None) => Value::UNDEFINED,
            });
        }
        ok!(kwargs.assert_all_used());

        let def = state.macros.lock().unwrap()[self.macro_ref_id].clone();

        let mut ctx = Context::new_with_frame(state.env(), Frame::new(state.ctx.clone_base()));
        ok!(ctx.push_frame(Frame::new(def.closure.clone())));
        ok!(ctx.push_frame(Frame::default()));
        ok!(ctx.incr_depth(state.ctx.depth() + MACRO_RECURSION_COST));

        let mut sub_state = State {
            ctx,
            current_block: None,
            auto_escape: state.auto_escape(),
            template: Some(def.template),
            blocks: Default::default(),
            loaded_templates: Default::default(),
            pending_parent: None,
            in_parent: false,
            id: state.id,
            macros: state.macros.clone(),
            macro_table: state.macro_table.clone(),
            temps: state.temps.clone(),
            fuel_tracker: state.fuel_tracker.clone(),
            cancel: state.cancel.clone(),
        };

        let evaluator = Evaluator::new(state.env());

        // bind arguments with defaults for trailing unbound names
        let defaults_offset = def.arg_names.len() - def.defaults.len();
        for (idx, name) in def.arg_names.iter().copied().enumerate() {
            let mut value = arg_values[idx].clone();
            if value.is_undefined() && idx >= defaults_offset {
                value = ok!(evaluator.eval_expr(&mut sub_state, &def.defaults[idx - defaults_offset]));
            }
            sub_state.ctx.store(name, value);
        }
        if let Some(caller) = caller {
            sub_state.ctx.store("caller", caller);
        }

        let mut rv = String::new();
        let mut out = Output::with_string(&mut rv);
        ok!(evaluator.eval_stmts(&mut sub_state, def.body, &mut out));

        // If the macro itself did not fail, the rendered result is a string
        // which is safe when escaping was active during the render.
        Ok(if !matches!(state.auto_escape(), AutoEscape::None) {
            Value::from_safe_string(rv)
        } else {
            Value::from(rv)
        })
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
