use std::fmt;

use apollo_compiler::ast;
use apollo_compiler::executable;
use apollo_compiler::Name;

use crate::spec::input::Variables;

/// Whether a selection is part of the response.
///
/// `@skip` and `@include` with a literal argument are decided when the plan
/// is compiled. With a variable argument they are kept here and evaluated
/// for each request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Yes,
    No,
    /// `@include(if: $name)`
    Include(Name),
    /// `@skip(if: $name)`
    Skip(Name),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    /// Reads `@skip` and `@include` from a directive list.
    pub(crate) fn parse(directives: &executable::DirectiveList) -> Self {
        let include = directives
            .get("include")
            .and_then(|directive| directive.specified_argument_by_name("if"))
            .map(|value| match value.as_ref() {
                ast::Value::Boolean(false) => Condition::No,
                ast::Value::Variable(name) => Condition::Include(name.clone()),
                _ => Condition::Yes,
            })
            .unwrap_or(Condition::Yes);
        let skip = directives
            .get("skip")
            .and_then(|directive| directive.specified_argument_by_name("if"))
            .map(|value| match value.as_ref() {
                ast::Value::Boolean(true) => Condition::No,
                ast::Value::Variable(name) => Condition::Skip(name.clone()),
                _ => Condition::Yes,
            })
            .unwrap_or(Condition::Yes);
        include.and(skip)
    }

    pub fn and(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::No, _) | (_, Condition::No) => Condition::No,
            (Condition::Yes, other) | (other, Condition::Yes) => other,
            (left, right) if left == right => left,
            (Condition::All(mut left), Condition::All(right)) => {
                left.extend(right);
                Condition::All(left)
            }
            (Condition::All(mut all), other) | (other, Condition::All(mut all)) => {
                all.push(other);
                Condition::All(all)
            }
            (left, right) => Condition::All(vec![left, right]),
        }
    }

    pub fn or(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::Yes, _) | (_, Condition::Yes) => Condition::Yes,
            (Condition::No, other) | (other, Condition::No) => other,
            (left, right) if left == right => left,
            (Condition::Any(mut left), Condition::Any(right)) => {
                left.extend(right);
                Condition::Any(left)
            }
            (Condition::Any(mut any), other) | (other, Condition::Any(mut any)) => {
                any.push(other);
                Condition::Any(any)
            }
            (left, right) => Condition::Any(vec![left, right]),
        }
    }

    /// Whether the condition depends on variables.
    pub fn is_variable(&self) -> bool {
        !matches!(self, Condition::Yes | Condition::No)
    }

    pub(crate) fn eval(&self, variables: &Variables) -> bool {
        // variable conditions that cannot be read (unset, or failed coercion)
        // neither skip nor exclude the selection
        match self {
            Condition::Yes => true,
            Condition::No => false,
            Condition::Include(name) => variables
                .get(name.as_str())
                .and_then(|value| value.as_bool())
                .unwrap_or(true),
            Condition::Skip(name) => !variables
                .get(name.as_str())
                .and_then(|value| value.as_bool())
                .unwrap_or(false),
            Condition::All(conditions) => conditions.iter().all(|c| c.eval(variables)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.eval(variables)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, conditions: &[Condition], separator: &str| {
            write!(f, "(")?;
            for (index, condition) in conditions.iter().enumerate() {
                if index > 0 {
                    write!(f, " {separator} ")?;
                }
                write!(f, "{condition}")?;
            }
            write!(f, ")")
        };
        match self {
            Condition::Yes => write!(f, "true"),
            Condition::No => write!(f, "false"),
            Condition::Include(name) => write!(f, "${name}"),
            Condition::Skip(name) => write!(f, "!${name}"),
            Condition::All(conditions) => join(f, conditions, "&&"),
            Condition::Any(conditions) => join(f, conditions, "||"),
        }
    }
}
