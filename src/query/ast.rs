//! Compiled representation of path expressions.
//!
//! A path expression such as `/Chassis[*]/Sensors[Reading>40]` compiles into
//! one [`CompiledStep`] per segment. Steps are immutable once produced and
//! are shared read-only by every run of a plan.

use std::fmt;

/// How a step selects nodes relative to the current context node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Child property with this exact (case-sensitive) name.
    Child(String),
    /// Every child of an object or every member of a collection (`*`).
    Wildcard,
    /// Recorded parent of the context node (`..`).
    Ancestor,
    /// The context node itself (`.`).
    Current,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Child(name) => f.write_str(name),
            Selector::Wildcard => f.write_str("*"),
            Selector::Ancestor => f.write_str(".."),
            Selector::Current => f.write_str("."),
        }
    }
}

/// Dotted property path used inside predicates, already split into segments.
///
/// `Status.State` addresses the `State` member of the `Status` object while
/// `@odata\.id` addresses the single key `@odata.id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropertyPath(pub Vec<String>);

impl PropertyPath {
    /// Returns the path segments in lookup order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.replace('.', "\\."))?;
        }
        Ok(())
    }
}

/// Relational operator of a comparison term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Operator spelling as accepted by the parser.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Parses an operator spelling.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }
}

/// Literal on the right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// `null`
    Null,
    /// `true` or `false`.
    Bool(bool),
    /// Any numeric literal; integers compare exactly up to 2^53.
    Number(f64),
    /// Quoted or bare-word string.
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        }
    }
}

/// Single predicate term.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateTerm {
    /// `*`: keeps every node.
    SelectAll,
    /// Zero-based position within the node set produced by the step.
    Index(usize),
    /// `last` / `last()`: final position within the node set.
    Last,
    /// `[Prop]`: keeps nodes on which the property path resolves.
    Exists(PropertyPath),
    /// `Prop<op>Literal`.
    Compare {
        /// Property looked up on the node.
        property: PropertyPath,
        /// Relational operator.
        op: CompareOp,
        /// Right-hand literal.
        value: Literal,
    },
}

impl PredicateTerm {
    /// True when the term can be decided from position alone.
    pub fn is_positional(&self) -> bool {
        matches!(
            self,
            PredicateTerm::SelectAll | PredicateTerm::Index(_) | PredicateTerm::Last
        )
    }
}

impl fmt::Display for PredicateTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateTerm::SelectAll => f.write_str("*"),
            PredicateTerm::Index(idx) => write!(f, "{idx}"),
            PredicateTerm::Last => f.write_str("last()"),
            PredicateTerm::Exists(path) => write!(f, "{path}"),
            PredicateTerm::Compare {
                property,
                op,
                value,
            } => write!(f, "{property}{}{value}", op.symbol()),
        }
    }
}

/// Boolean combination of predicate terms. `and` binds tighter than `or`.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Single term.
    Term(PredicateTerm),
    /// All branches must hold.
    And(Vec<Predicate>),
    /// At least one branch must hold.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// True when every term is positional, so evaluation never needs node
    /// contents.
    pub fn is_positional(&self) -> bool {
        match self {
            Predicate::Term(term) => term.is_positional(),
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().all(Predicate::is_positional)
            }
        }
    }

    fn fmt_joined(parts: &[Predicate], sep: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, part) in parts.iter().enumerate() {
            if idx > 0 {
                f.write_str(sep)?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Term(term) => write!(f, "{term}"),
            Predicate::And(parts) => Predicate::fmt_joined(parts, " and ", f),
            Predicate::Or(parts) => Predicate::fmt_joined(parts, " or ", f),
        }
    }
}

/// One compiled segment of a path expression.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledStep {
    /// Node selection relative to the context node.
    pub selector: Selector,
    /// Optional filter applied to the nodes the selector produced.
    pub predicate: Option<Predicate>,
}

impl CompiledStep {
    /// Step with no predicate.
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            predicate: None,
        }
    }

    /// Attaches a predicate.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl fmt::Display for CompiledStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.selector)?;
        if let Some(predicate) = &self.predicate {
            write!(f, "[{predicate}]")?;
        }
        Ok(())
    }
}

/// Renders compiled steps back into canonical path form.
pub fn render_steps(steps: &[CompiledStep]) -> String {
    let mut out = String::new();
    for step in steps {
        out.push('/');
        out.push_str(&step.to_string());
    }
    out
}
