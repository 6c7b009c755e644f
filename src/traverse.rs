//! Walks the rule tree through a processor hierarchy.
//!
//! The walk is generic over the processor roles, so the same code drives
//! both passes: first through the no-op processors to validate the whole
//! document, then, only if nothing surfaced, through the live ones.
//! Errors are gathered per level in declaration order; a failed entry
//! step (connect, select, search) short-circuits its own subtree only,
//! and the scoped releases (close, logout) always run once their entry
//! step succeeded.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::actions;
use crate::compiler;
use crate::document::{Account, Config, Mailbox, Rule};
use crate::errors::{ErrorList, Result};
use crate::process::null::NullConfigProcessor;
use crate::process::{AccountProcessor, ConfigProcessor, MailboxProcessor, RuleProcessor};

/// Runs the two passes: validation through the no-op processors, then the
/// live traversal, which only starts if the document came out clean.
pub fn run(config: &Config, live: &impl ConfigProcessor, now: DateTime<Utc>) -> Result {
    info!("validating the rule document");
    process_config(config, &NullConfigProcessor, now)?;

    info!("processing accounts");
    process_config(config, live, now)
}

/// Walks every account of the document.
pub fn process_config(
    config: &Config,
    processor: &impl ConfigProcessor,
    now: DateTime<Utc>,
) -> Result {
    let mut errors = ErrorList::new();
    for account in &config.accounts {
        let mut account_processor = processor.new_account_processor();
        errors.absorb(process_account(&mut account_processor, account, now));
    }
    errors.into_result()
}

/// Walks one account: connect, mailboxes, logout.
fn process_account(
    processor: &mut impl AccountProcessor,
    account: &Account,
    now: DateTime<Utc>,
) -> Result {
    processor.connect(account)?;

    // The loop absorbs every mailbox error, so once connected the only
    // exit runs through logout.
    let mut errors = ErrorList::new();
    for mailbox in &account.mailboxes {
        let mut mailbox_processor = processor.new_mailbox_processor();
        errors.absorb(process_mailbox(&mut mailbox_processor, mailbox, now));
    }
    errors.absorb(processor.logout());
    errors.into_result()
}

/// Walks one mailbox: select, rules, close.
fn process_mailbox(
    processor: &mut impl MailboxProcessor,
    mailbox: &Mailbox,
    now: DateTime<Utc>,
) -> Result {
    processor.select_mailbox(&mailbox.name)?;

    // Same shape as the account level: once selected, every exit runs
    // through close, which erases the messages flagged for deletion.
    let mut errors = ErrorList::new();
    for rule in &mailbox.rules {
        let mut rule_processor = processor.new_rule_processor();
        errors.absorb(process_rule(&mut rule_processor, rule, now));
    }
    errors.absorb(processor.close());
    errors.into_result()
}

/// Walks one rule: compile the preconditions, search, act.
fn process_rule(
    processor: &mut impl RuleProcessor,
    rule: &Rule,
    now: DateTime<Utc>,
) -> Result {
    let mut errors = ErrorList::new();
    for precondition in &rule.preconditions {
        if let Err(error) = compiler::compile(precondition, processor, now) {
            errors.push(error);
        }
    }
    if !errors.is_empty() {
        return errors.into_result();
    }

    processor.search()?;
    actions::execute(&rule.actions, processor)
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    use chrono::{DateTime, TimeZone as _, Utc};

    use super::{process_config, run};
    use crate::compiler::TokenCollector;
    use crate::document::{
        Account, Action, Config, Location, Mailbox, Precondition, Rule, Value, ValueNode,
    };
    use crate::errors::Error;
    use crate::process::{
        self, AccountProcessor, ConfigProcessor, MailboxProcessor, RuleProcessor,
    };

    /// Shared call log, one entry per processor operation.
    type Log = Rc<RefCell<Vec<String>>>;

    /// What the scripted processors should reject.
    #[derive(Debug, Clone, Copy, Default)]
    struct Script {
        fail_connect_to: Option<&'static str>,
        fail_select_of: Option<&'static str>,
        fail_search: bool,
    }

    fn scripted_failure() -> process::Error {
        process::Error::Dial(io::Error::new(io::ErrorKind::Other, "scripted failure"))
    }

    struct ScriptedConfig {
        log: Log,
        script: Script,
    }

    impl ScriptedConfig {
        fn new(script: Script) -> Self {
            Self { log: Rc::new(RefCell::new(Vec::new())), script }
        }

        fn log(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl ConfigProcessor for ScriptedConfig {
        type Account = ScriptedAccount;

        fn new_account_processor(&self) -> ScriptedAccount {
            ScriptedAccount { log: Rc::clone(&self.log), script: self.script }
        }
    }

    struct ScriptedAccount {
        log: Log,
        script: Script,
    }

    impl AccountProcessor for ScriptedAccount {
        type Mailbox = ScriptedMailbox;

        fn connect(&mut self, account: &Account) -> Result<(), process::Error> {
            self.log.borrow_mut().push(format!("connect {}", account.host));
            if self.script.fail_connect_to == Some(account.host.as_str()) {
                return Err(scripted_failure());
            }
            Ok(())
        }

        fn new_mailbox_processor(&self) -> ScriptedMailbox {
            ScriptedMailbox { log: Rc::clone(&self.log), script: self.script }
        }

        fn logout(&mut self) -> Result<(), process::Error> {
            self.log.borrow_mut().push("logout".to_owned());
            Ok(())
        }
    }

    struct ScriptedMailbox {
        log: Log,
        script: Script,
    }

    impl MailboxProcessor for ScriptedMailbox {
        type Rule = ScriptedRule;

        fn select_mailbox(&mut self, name: &str) -> Result<(), process::Error> {
            self.log.borrow_mut().push(format!("select {name}"));
            if self.script.fail_select_of == Some(name) {
                return Err(scripted_failure());
            }
            Ok(())
        }

        fn new_rule_processor(&self) -> ScriptedRule {
            ScriptedRule { log: Rc::clone(&self.log), script: self.script }
        }

        fn close(&mut self) -> Result<(), process::Error> {
            self.log.borrow_mut().push("close".to_owned());
            Ok(())
        }
    }

    struct ScriptedRule {
        log: Log,
        script: Script,
    }

    impl TokenCollector for ScriptedRule {
        fn append(&mut self, token: String) {
            self.log.borrow_mut().push(format!("append {token}"));
        }
    }

    impl RuleProcessor for ScriptedRule {
        fn search(&mut self) -> Result<(), process::Error> {
            self.log.borrow_mut().push("search".to_owned());
            if self.script.fail_search {
                return Err(scripted_failure());
            }
            Ok(())
        }

        fn move_to(&mut self, destination: &str) -> Result<(), process::Error> {
            self.log.borrow_mut().push(format!("move {destination}"));
            Ok(())
        }

        fn mark_src_for_del(&mut self) -> Result<(), process::Error> {
            self.log.borrow_mut().push("mark".to_owned());
            Ok(())
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        match Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0) {
            chrono::LocalResult::Single(instant) => instant,
            _ => unreachable!("fixed instant is unambiguous"),
        }
    }

    fn precondition(field: &str) -> Precondition {
        Precondition { field: field.to_owned(), values: Vec::new(), location: Location::new(1, 1) }
    }

    fn move_rule(field: &str, destination: &str) -> Rule {
        Rule {
            preconditions: vec![precondition(field)],
            actions: vec![Action {
                kind: "move".to_owned(),
                args: vec![ValueNode {
                    value: Value::Scalar(destination.to_owned()),
                    location: Location::new(1, 1),
                }],
                location: Location::new(1, 1),
            }],
            location: Location::new(1, 1),
        }
    }

    fn mailbox(name: &str, rules: Vec<Rule>) -> Mailbox {
        Mailbox { name: name.to_owned(), rules }
    }

    fn account(host: &str, mailboxes: Vec<Mailbox>) -> Account {
        Account { host: host.to_owned(), mailboxes, ..Account::default() }
    }

    #[test]
    fn failed_select_spares_sibling_mailboxes_and_the_logout() {
        let config = Config {
            accounts: vec![account(
                "imap.example.org",
                vec![
                    mailbox("Broken", vec![move_rule("SEEN", "Archive")]),
                    mailbox("INBOX", vec![move_rule("SEEN", "Archive")]),
                ],
            )],
        };
        let processor =
            ScriptedConfig::new(Script { fail_select_of: Some("Broken"), ..Script::default() });

        let result = process_config(&config, &processor, fixed_now());

        // Exactly one error: the select failure, not an aggregate.
        assert!(matches!(result, Err(Error::Session(process::Error::Dial(_)))));
        assert_eq!(
            processor.log(),
            [
                "connect imap.example.org",
                "select Broken",
                "select INBOX",
                "append SEEN",
                "search",
                "move Archive",
                "mark",
                "close",
                "logout",
            ]
        );
    }

    #[test]
    fn failed_connect_spares_sibling_accounts() {
        let config = Config {
            accounts: vec![
                account("down.example.org", vec![mailbox("INBOX", Vec::new())]),
                account("up.example.org", vec![mailbox("INBOX", Vec::new())]),
            ],
        };
        let processor = ScriptedConfig::new(Script {
            fail_connect_to: Some("down.example.org"),
            ..Script::default()
        });

        let result = process_config(&config, &processor, fixed_now());

        assert!(matches!(result, Err(Error::Session(process::Error::Dial(_)))));
        // No mailbox work and no logout on the dead account; full walk on
        // its sibling.
        assert_eq!(
            processor.log(),
            [
                "connect down.example.org",
                "connect up.example.org",
                "select INBOX",
                "close",
                "logout",
            ]
        );
    }

    #[test]
    fn failed_search_skips_the_action_phase_only() {
        let config = Config {
            accounts: vec![account(
                "imap.example.org",
                vec![mailbox("INBOX", vec![move_rule("SEEN", "Archive")])],
            )],
        };
        let processor =
            ScriptedConfig::new(Script { fail_search: true, ..Script::default() });

        let result = process_config(&config, &processor, fixed_now());

        assert!(matches!(result, Err(Error::Session(process::Error::Dial(_)))));
        assert_eq!(
            processor.log(),
            [
                "connect imap.example.org",
                "select INBOX",
                "append SEEN",
                "search",
                "close",
                "logout",
            ]
        );
    }

    #[test]
    fn compile_errors_gather_across_mailboxes_and_skip_the_search() {
        let config = Config {
            accounts: vec![account(
                "imap.example.org",
                vec![
                    mailbox("INBOX", vec![move_rule("FOO", "Archive")]),
                    mailbox("Lists", vec![move_rule("BAR", "Archive")]),
                ],
            )],
        };
        let processor = ScriptedConfig::new(Script::default());

        match process_config(&config, &processor, fixed_now()) {
            Err(Error::Aggregate(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected two gathered errors, got {other:?}"),
        }
        // Both rules stop before their search and action phase.
        assert_eq!(
            processor.log(),
            [
                "connect imap.example.org",
                "select INBOX",
                "close",
                "select Lists",
                "close",
                "logout",
            ]
        );
    }

    #[test]
    fn validation_failure_keeps_the_live_pass_dark() {
        // One valid rule and one broken rule: the live processors must
        // still never be driven.
        let config = Config {
            accounts: vec![account(
                "imap.example.org",
                vec![mailbox(
                    "INBOX",
                    vec![move_rule("SEEN", "Archive"), move_rule("FOO", "Archive")],
                )],
            )],
        };
        let live = ScriptedConfig::new(Script::default());

        let result = run(&config, &live, fixed_now());

        assert!(matches!(result, Err(Error::Compile(_))));
        assert!(live.log().is_empty());
    }

    #[test]
    fn clean_validation_reaches_the_live_pass() {
        let config = Config {
            accounts: vec![account(
                "imap.example.org",
                vec![mailbox("INBOX", vec![move_rule("SEEN", "Archive")])],
            )],
        };
        let live = ScriptedConfig::new(Script::default());

        assert!(run(&config, &live, fixed_now()).is_ok());
        assert_eq!(
            live.log(),
            [
                "connect imap.example.org",
                "select INBOX",
                "append SEEN",
                "search",
                "move Archive",
                "mark",
                "close",
                "logout",
            ]
        );
    }
}
