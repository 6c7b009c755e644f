//! Builds the rule tree from a YAML document.
//!
//! Parsing proper is delegated to [`marked_yaml`], which keeps a
//! line/column marker on every node; this module only walks the parsed
//! nodes into the [`model`](super::model) shape. Scalars under
//! preconditions and actions are kept as raw text: only the compiler
//! knows which type a field expects.

use std::fs;
use std::io;
use std::path::Path;

use marked_yaml::types::{MarkedMappingNode, MarkedScalarNode, MarkedSequenceNode, Node};

use super::model::{
    Account, Action, Config, Location, Mailbox, Precondition, Rule, Value, ValueNode,
};

/// Loads the rule document at the given path.
pub fn load(document_path: &Path) -> Result<Config, Error> {
    let text = fs::read_to_string(document_path).map_err(Error::Read)?;
    from_str(&text)
}

/// Builds the rule tree from document text.
pub fn from_str(text: &str) -> Result<Config, Error> {
    if text.trim().is_empty() {
        return Ok(Config::default());
    }

    let root = marked_yaml::parse_yaml(0, text).map_err(Error::Parse)?;
    let mut accounts = Vec::new();
    for (key, value) in mapping(&root)?.iter() {
        if &**key == "accounts" {
            for node in sequence(value)?.iter() {
                accounts.push(account(node)?);
            }
        }
    }
    Ok(Config { accounts })
}

/// Reads the location marker of a node.
fn location(node: &Node) -> Location {
    node.span()
        .start()
        .map_or_else(Location::default, |marker| Location::new(marker.line(), marker.column()))
}

/// Reads the location marker of a mapping key.
fn key_location(key: &MarkedScalarNode) -> Location {
    key.span()
        .start()
        .map_or_else(Location::default, |marker| Location::new(marker.line(), marker.column()))
}

/// Expects a mapping node.
fn mapping(node: &Node) -> Result<&MarkedMappingNode, Error> {
    node.as_mapping()
        .ok_or(Error::Unexpected { expected: "a mapping", location: location(node) })
}

/// Expects a sequence node.
fn sequence(node: &Node) -> Result<&MarkedSequenceNode, Error> {
    node.as_sequence()
        .ok_or(Error::Unexpected { expected: "a sequence", location: location(node) })
}

/// Expects a scalar node and returns its raw text.
fn scalar(node: &Node) -> Result<&str, Error> {
    node.as_scalar()
        .map(|scalar| &**scalar)
        .ok_or(Error::Unexpected { expected: "a scalar", location: location(node) })
}

/// Expects a boolean scalar.
fn flag(node: &Node) -> Result<bool, Error> {
    match scalar(node)? {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::Unexpected { expected: "a boolean", location: location(node) }),
    }
}

/// Walks one account node.
fn account(node: &Node) -> Result<Account, Error> {
    let mut host = None;
    let mut parsed = Account::default();
    for (key, value) in mapping(node)?.iter() {
        match &**key {
            "host" => host = Some(scalar(value)?.to_owned()),
            "notls" => parsed.no_tls = flag(value)?,
            "nosimplelogin" => parsed.no_simple_login = flag(value)?,
            "nosaslplain" => parsed.no_sasl_plain = flag(value)?,
            "nosaslexternal" => parsed.no_sasl_external = flag(value)?,
            "username" => parsed.username = scalar(value)?.to_owned(),
            "password" => parsed.password = scalar(value)?.to_owned(),
            "identity" => parsed.identity = scalar(value)?.to_owned(),
            "mailboxes" => {
                for mailbox_node in sequence(value)?.iter() {
                    parsed.mailboxes.push(mailbox(mailbox_node)?);
                }
            }
            _ => (),
        }
    }
    parsed.host = host.ok_or(Error::Missing { key: "host", location: location(node) })?;
    Ok(parsed)
}

/// Walks one mailbox node.
fn mailbox(node: &Node) -> Result<Mailbox, Error> {
    let mut name = None;
    let mut rules = Vec::new();
    for (key, value) in mapping(node)?.iter() {
        match &**key {
            "name" => name = Some(scalar(value)?.to_owned()),
            "rules" => {
                for rule_node in sequence(value)?.iter() {
                    rules.push(rule(rule_node)?);
                }
            }
            _ => (),
        }
    }
    let name = name.ok_or(Error::Missing { key: "name", location: location(node) })?;
    Ok(Mailbox { name, rules })
}

/// Walks one rule node.
fn rule(node: &Node) -> Result<Rule, Error> {
    let mut parsed = Rule { location: location(node), ..Rule::default() };
    for (key, value) in mapping(node)?.iter() {
        match &**key {
            "preconditions" => {
                for precondition_node in sequence(value)?.iter() {
                    parsed.preconditions.push(precondition(precondition_node)?);
                }
            }
            "action" => {
                for (kind, args_node) in mapping(value)?.iter() {
                    let mut args = Vec::new();
                    for arg_node in sequence(args_node)?.iter() {
                        args.push(value_node(arg_node)?);
                    }
                    parsed.actions.push(Action {
                        kind: kind.to_string(),
                        args,
                        location: key_location(kind),
                    });
                }
            }
            _ => (),
        }
    }
    Ok(parsed)
}

/// Walks one precondition node.
fn precondition(node: &Node) -> Result<Precondition, Error> {
    let mut field = None;
    let mut values = Vec::new();
    for (key, value) in mapping(node)?.iter() {
        match &**key {
            "field" => field = Some(scalar(value)?.to_owned()),
            "values" => {
                for argument_node in sequence(value)?.iter() {
                    values.push(value_node(argument_node)?);
                }
            }
            _ => (),
        }
    }
    let field = field.ok_or(Error::Missing { key: "field", location: location(node) })?;
    Ok(Precondition { field, values, location: location(node) })
}

/// Walks one argument node: a raw scalar, or a nested precondition.
fn value_node(node: &Node) -> Result<ValueNode, Error> {
    let value = match node {
        Node::Scalar(text) => Value::Scalar(text.to_string()),
        Node::Mapping(_) => Value::Nested(precondition(node)?),
        Node::Sequence(_) => {
            return Err(Error::Unexpected {
                expected: "a scalar or a nested precondition",
                location: location(node),
            });
        }
    };
    Ok(ValueNode { value, location: location(node) })
}

/// Errors that may occur while loading the rule document.
#[derive(Debug)]
pub enum Error {
    /// A required key is absent.
    Missing {
        /// The absent key.
        key: &'static str,
        /// Position of the incomplete node.
        location: Location,
    },
    /// The document is not valid YAML.
    Parse(marked_yaml::LoadError),
    /// The document file could not be read.
    Read(io::Error),
    /// A node has the wrong shape.
    Unexpected {
        /// What the loader needed at this position.
        expected: &'static str,
        /// Position of the offending node.
        location: Location,
    },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Missing { key, location } => {
                write!(f, "{location}: missing required key {key}")
            }
            Self::Parse(error) => write!(f, "invalid rule document: {error}"),
            Self::Read(error) => write!(f, "failed to read rule document: {error}"),
            Self::Unexpected { expected, location } => {
                write!(f, "{location}: expected {expected}")
            }
        }
    }
}
