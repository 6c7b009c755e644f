//! Shape of the rule tree.

use core::fmt;

/// Position of a node in the rule document, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

impl Location {
    /// Creates a location from line and column numbers.
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.line, self.column)
    }
}

/// The whole rule document: an ordered list of accounts.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Accounts in declaration order.
    pub accounts: Vec<Account>,
}

/// One mail account: endpoint, credentials, capability flags and the
/// mailboxes to process on it.
#[derive(Debug, Clone, Default)]
pub struct Account {
    /// Server address, `host` or `host:port`.
    pub host: String,
    /// Dial without transport security.
    pub no_tls: bool,
    /// Never try the LOGIN command.
    pub no_simple_login: bool,
    /// Never try SASL PLAIN.
    pub no_sasl_plain: bool,
    /// Never try SASL EXTERNAL.
    pub no_sasl_external: bool,
    /// Login name.
    pub username: String,
    /// Login secret.
    pub password: String,
    /// Authorization identity for the SASL mechanisms.
    pub identity: String,
    /// Mailboxes in declaration order.
    pub mailboxes: Vec<Mailbox>,
}

/// One mailbox and the rules applied to it.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    /// Mailbox name, as the server knows it.
    pub name: String,
    /// Rules in declaration order.
    pub rules: Vec<Rule>,
}

/// One rule: preconditions selecting messages, actions applied to the
/// matches.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    /// Search criteria; all must hold. Empty selects every message.
    pub preconditions: Vec<Precondition>,
    /// Actions in document order.
    pub actions: Vec<Action>,
    /// Position of the rule node.
    pub location: Location,
}

/// One action entry of a rule.
#[derive(Debug, Clone)]
pub struct Action {
    /// Action kind, e.g. `move`. Validated by the executor.
    pub kind: String,
    /// Arguments in declaration order.
    pub args: Vec<ValueNode>,
    /// Position of the action key.
    pub location: Location,
}

/// One search criterion, possibly a NOT/OR combinator.
#[derive(Debug, Clone)]
pub struct Precondition {
    /// Search field tag. Validated by the compiler.
    pub field: String,
    /// Arguments in declaration order.
    pub values: Vec<ValueNode>,
    /// Position of the precondition node.
    pub location: Location,
}

/// One argument of a precondition or action, with its position.
#[derive(Debug, Clone)]
pub struct ValueNode {
    /// The argument itself.
    pub value: Value,
    /// Position of the argument node.
    pub location: Location,
}

/// An argument: a raw scalar, decoded later once the field kind is known,
/// or a nested precondition under a combinator.
#[derive(Debug, Clone)]
pub enum Value {
    /// A nested precondition (NOT/OR operand).
    Nested(Precondition),
    /// Raw scalar text.
    Scalar(String),
}
