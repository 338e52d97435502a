//! This module contains the call-shaped portion of the tracer's dispatch:
//! the three call encodings of the instruction set, the resolution of what a
//! callee actually is, and the attribute loads that produce callees.
//!
//! All three encodings normalise to the same triple of callee, positional
//! arguments and keyword arguments before anything is captured, so the
//! decision of whether a call is traceable is made in exactly one place.

use std::iter;

use crate::{
    error::trace::Error,
    graph::{ArgValue, CallTarget, Operation},
    host::ConstValue,
    registry::Resolved,
    tracer::Tracer,
    value::{SymbolicValue, ValueData},
};

impl Tracer<'_> {
    /// Executes the plain call encoding: `argc` positional arguments sit
    /// above the callee.
    pub(super) fn call_function(&mut self, argc: usize) -> Result<(), Error> {
        let args = self.stack.popn(argc)?;
        let callee = self.stack.pop()?;

        self.dispatch_call(callee, args, Vec::new())
    }

    /// Executes the keyword call encoding: a constant tuple on top of the
    /// stack names the trailing arguments of the `argc` values below it.
    pub(super) fn call_function_kw(&mut self, argc: usize) -> Result<(), Error> {
        let names_value = self.stack.pop()?;
        let names = keyword_names(&names_value)?;
        if names.is_empty() || names.len() > argc {
            return Err(Error::MalformedKeywordNames {
                found: format!("a tuple of {} names for {argc} values", names.len()),
            });
        }

        let mut args = self.stack.popn(argc)?;
        let callee = self.stack.pop()?;
        let values = args.split_off(argc - names.len());

        let mut kwargs = Vec::with_capacity(names.len());
        for (name, value) in names.into_iter().zip(values) {
            if kwargs.iter().any(|(existing, _): &(String, _)| *existing == name) {
                return Err(Error::DuplicateKeyword { name });
            }
            kwargs.push((name, value));
        }

        self.dispatch_call(callee, args, kwargs)
    }

    /// Executes the unpacked call encoding: a sequence of positional
    /// arguments and, when the flag's lowest bit is set, a mapping of keyword
    /// arguments.
    pub(super) fn call_function_ex(&mut self, flag: usize) -> Result<(), Error> {
        let keywords = match flag {
            0 => None,
            1 => Some(self.stack.pop()?),
            other => {
                return Err(Error::unsupported(format!("CALL_FUNCTION_EX flag {other}")));
            }
        };
        let positional = self.stack.pop()?;
        let callee = self.stack.pop()?;

        let ValueData::Container { items: args, .. } = &positional.data else {
            return Err(Error::MalformedCallUnpack {
                expected: "sequence",
                found:    positional.kind_name().into(),
            });
        };
        let kwargs = match &keywords {
            None => Vec::new(),
            Some(value) => unpacked_keywords(value)?,
        };

        self.dispatch_call(callee, args.clone(), kwargs)
    }

    /// Resolves what `callee` is and captures the call into the graph,
    /// pushing an array backed by the new node.
    ///
    /// # Errors
    ///
    /// Aborts when the callee is not a whitelisted callable, a deferred
    /// method, or an allowed component, or when an argument has no graph
    /// form.
    pub(super) fn dispatch_call(
        &mut self,
        callee: SymbolicValue,
        args: Vec<SymbolicValue>,
        kwargs: Vec<(String, SymbolicValue)>,
    ) -> Result<(), Error> {
        let inputs = iter::once(&callee)
            .chain(args.iter())
            .chain(kwargs.iter().map(|(_, value)| value));
        let (support, guards) = SymbolicValue::propagate(inputs);

        let node = match &callee.data {
            ValueData::Callable { function } => self.graph.create_op(
                Operation::Call {
                    target: CallTarget::Function(function.clone()),
                },
                lower_arguments(&args)?,
                lower_keywords(&kwargs)?,
            )?,
            ValueData::Attribute { base, name } => {
                let mut lowered = Vec::with_capacity(args.len() + 1);
                lowered.push(lower_argument(base)?);
                lowered.extend(lower_arguments(&args)?);
                self.graph.create_op(
                    Operation::MethodCall {
                        method: name.clone(),
                    },
                    lowered,
                    lower_keywords(&kwargs)?,
                )?
            }
            ValueData::Component { path } => {
                let Resolved::Component(component) = self.registry.resolve(path)? else {
                    return Err(Error::UnknownComponentPath {
                        path: path.to_string(),
                    });
                };
                if !self.allowlist.allows_component_class(&component.class) {
                    return Err(Error::unsupported(format!(
                        "custom sub-component `{}`",
                        component.class.name
                    )));
                }
                self.graph.create_op(
                    Operation::ComponentCall { path: path.clone() },
                    lower_arguments(&args)?,
                    lower_keywords(&kwargs)?,
                )?
            }
            _ => {
                return Err(Error::unsupported(format!(
                    "calling a {}",
                    callee.kind_name()
                )));
            }
        };

        self.stack.push(SymbolicValue::array(node, support, guards))
    }

    /// Executes an attribute load on the top of the stack.
    ///
    /// # Errors
    ///
    /// Aborts when the base value has no attribute model, and fails when a
    /// component path or callable member does not resolve.
    pub(super) fn load_attribute(&mut self, name: &str) -> Result<(), Error> {
        let base = self.stack.pop()?;
        let (support, guards) = SymbolicValue::propagate([&base]);

        let value = match &base.data {
            ValueData::Component { path } => {
                let child = path.child(name);
                match self.registry.resolve(&child)? {
                    Resolved::Component(_) => {
                        SymbolicValue::new(support, guards, ValueData::Component { path: child })
                    }
                    Resolved::Array(_) => {
                        let node = self.graph.create_op(
                            Operation::GetAttr { path: child },
                            Vec::new(),
                            Vec::new(),
                        )?;
                        SymbolicValue::array(node, support, guards)
                    }
                    Resolved::Const(constant) => {
                        return Err(Error::unsupported(format!(
                            "component attribute `{child}` of kind {}",
                            constant.kind_name()
                        )));
                    }
                }
            }
            ValueData::Array { .. } => SymbolicValue::new(
                support,
                guards,
                ValueData::Attribute {
                    base: Box::new(base.clone()),
                    name: name.into(),
                },
            ),
            ValueData::Callable { function } => {
                let member =
                    function
                        .member(name)
                        .ok_or_else(|| Error::UnknownCallableMember {
                            name:   function.name.clone(),
                            member: name.into(),
                        })?;
                SymbolicValue::new(
                    support,
                    guards,
                    ValueData::Callable {
                        function: member.clone(),
                    },
                )
            }
            _ => {
                return Err(Error::unsupported(format!(
                    "attribute access on a {}",
                    base.kind_name()
                )));
            }
        };

        self.stack.push(value)
    }
}

/// Extracts the names of the keyword call encoding's name tuple.
fn keyword_names(value: &SymbolicValue) -> Result<Vec<String>, Error> {
    match value.as_constant() {
        Some(ConstValue::Tuple(items)) => items
            .iter()
            .map(|item| match item {
                ConstValue::Str(name) => Ok(name.clone()),
                other => Err(Error::MalformedKeywordNames {
                    found: format!("a name of kind {}", other.kind_name()),
                }),
            })
            .collect(),
        Some(other) => Err(Error::MalformedKeywordNames {
            found: format!("a value of kind {}", other.kind_name()),
        }),
        None => Err(Error::MalformedKeywordNames {
            found: format!("a value of kind {}", value.kind_name()),
        }),
    }
}

/// Extracts the keyword arguments from the unpacked call encoding's mapping.
fn unpacked_keywords(value: &SymbolicValue) -> Result<Vec<(String, SymbolicValue)>, Error> {
    let ValueData::Mapping { entries } = &value.data else {
        return Err(Error::MalformedCallUnpack {
            expected: "mapping",
            found:    value.kind_name().into(),
        });
    };

    entries
        .iter()
        .map(|(key, value)| match key {
            ConstValue::Str(name) => Ok((name.clone(), value.clone())),
            other => Err(Error::MalformedKeywordNames {
                found: format!("a key of kind {}", other.kind_name()),
            }),
        })
        .collect()
}

/// Lowers `value` to a graph argument.
///
/// # Errors
///
/// Aborts when the value's shape has no graph-argument form.
fn lower_argument(value: &SymbolicValue) -> Result<ArgValue, Error> {
    value
        .to_argument()
        .ok_or_else(|| Error::unsupported(format!("a {} argument", value.kind_name())))
}

/// Lowers a positional argument list.
fn lower_arguments(values: &[SymbolicValue]) -> Result<Vec<ArgValue>, Error> {
    values.iter().map(lower_argument).collect()
}

/// Lowers a keyword argument list, preserving the supplied order.
fn lower_keywords(kwargs: &[(String, SymbolicValue)]) -> Result<Vec<(String, ArgValue)>, Error> {
    kwargs
        .iter()
        .map(|(name, value)| Ok((name.clone(), lower_argument(value)?)))
        .collect()
}
