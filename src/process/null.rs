//! Validation-only processors.
//!
//! Every operation succeeds without doing anything, so a traversal
//! through these surfaces every document problem (unknown fields,
//! arity mismatches, undecodable values, unknown actions) before any
//! network session exists.

use super::{AccountProcessor, ConfigProcessor, Error, MailboxProcessor, RuleProcessor};
use crate::compiler::TokenCollector;
use crate::document::Account;

/// Top of the no-op hierarchy.
#[derive(Debug, Default)]
pub struct NullConfigProcessor;

impl ConfigProcessor for NullConfigProcessor {
    type Account = NullAccountProcessor;

    fn new_account_processor(&self) -> NullAccountProcessor {
        NullAccountProcessor
    }
}

/// Accepts any account without connecting anywhere.
#[derive(Debug, Default)]
pub struct NullAccountProcessor;

impl AccountProcessor for NullAccountProcessor {
    type Mailbox = NullMailboxProcessor;

    fn connect(&mut self, _account: &Account) -> Result<(), Error> {
        Ok(())
    }

    fn new_mailbox_processor(&self) -> NullMailboxProcessor {
        NullMailboxProcessor
    }

    fn logout(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Accepts any mailbox without selecting it.
#[derive(Debug, Default)]
pub struct NullMailboxProcessor;

impl MailboxProcessor for NullMailboxProcessor {
    type Rule = NullRuleProcessor;

    fn select_mailbox(&mut self, _name: &str) -> Result<(), Error> {
        Ok(())
    }

    fn new_rule_processor(&self) -> NullRuleProcessor {
        NullRuleProcessor
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Discards tokens and accepts every operation.
#[derive(Debug, Default)]
pub struct NullRuleProcessor;

impl TokenCollector for NullRuleProcessor {
    fn append(&mut self, _token: String) {}
}

impl RuleProcessor for NullRuleProcessor {
    fn search(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn move_to(&mut self, _destination: &str) -> Result<(), Error> {
        Ok(())
    }

    fn mark_src_for_del(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
