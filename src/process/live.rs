//! Processors performing the real IMAP operations.
//!
//! One network session is opened per account and shared down the
//! subtree; only one mailbox is selected on it at a time. The wire
//! protocol itself is the [`imap`] crate's business, transport security
//! is [`native_tls`]'s.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::rc::Rc;

use imap::{Authenticator, Client, Session};
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, warn};

use super::{AccountProcessor, ConfigProcessor, Error, MailboxProcessor, RuleProcessor};
use crate::compiler::TokenCollector;
use crate::document::Account;
use crate::settings::Settings;

/// Default port for sessions under transport security.
const SECURE_PORT: u16 = 993;

/// Default port for plain sessions.
const PLAIN_PORT: u16 = 143;

/// A session stream, encrypted or not, chosen per account.
enum Transport {
    /// Plain TCP, for accounts that opted out of transport security.
    Plain(TcpStream),
    /// TLS over TCP.
    Tls(Box<TlsStream<TcpStream>>),
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf),
            Self::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.write(buf),
            Self::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.flush(),
            Self::Tls(stream) => stream.flush(),
        }
    }
}

/// The account session, shared between the processors of one subtree.
type SharedSession = Rc<RefCell<Session<Transport>>>;

/// SASL EXTERNAL: the transport already proved who we are; the exchange
/// only names the authorization identity.
struct SaslExternal<'a> {
    /// Authorization identity, possibly empty.
    identity: &'a str,
}

impl Authenticator for SaslExternal<'_> {
    type Response = String;

    fn process(&self, _challenge: &[u8]) -> String {
        self.identity.to_owned()
    }
}

/// SASL PLAIN: identity, login name and secret in one NUL-separated
/// response.
struct SaslPlain<'a> {
    /// Authorization identity, possibly empty.
    identity: &'a str,
    /// Login name.
    username: &'a str,
    /// Login secret.
    password: &'a str,
}

impl Authenticator for SaslPlain<'_> {
    type Response = String;

    fn process(&self, _challenge: &[u8]) -> String {
        format!("{}\x00{}\x00{}", self.identity, self.username, self.password)
    }
}

/// Splits `host` or `host:port`, falling back to the scheme's default
/// port.
fn endpoint(host: &str, no_tls: bool) -> (&str, u16) {
    let default_port = if no_tls { PLAIN_PORT } else { SECURE_PORT };
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name, port),
            Err(_) => (host, default_port),
        },
        None => (host, default_port),
    }
}

/// Renders accumulated tokens into one search query.
///
/// Tokens that are empty or contain spaces, quotes or backslashes are
/// sent as quoted strings; everything else goes through verbatim.
fn render_query(tokens: &[String]) -> String {
    let mut query = String::new();
    for token in tokens {
        if !query.is_empty() {
            query.push(' ');
        }
        let needs_quoting =
            token.is_empty() || token.chars().any(|c| c == ' ' || c == '"' || c == '\\');
        if needs_quoting {
            query.push('"');
            for c in token.chars() {
                if c == '"' || c == '\\' {
                    query.push('\\');
                }
                query.push(c);
            }
            query.push('"');
        } else {
            query.push_str(token);
        }
    }
    query
}

/// Renders sorted message ids as a sequence set, compressing runs into
/// ranges: `[1, 2, 3, 5, 7, 8]` becomes `1:3,5,7:8`.
fn sequence_set(ids: &[u32]) -> String {
    fn flush(start: u32, end: u32, set: &mut String) {
        use core::fmt::Write as _;

        if !set.is_empty() {
            set.push(',');
        }
        if start == end {
            let _ = write!(set, "{start}");
        } else {
            let _ = write!(set, "{start}:{end}");
        }
    }

    let mut set = String::new();
    let mut ids = ids.iter().copied();
    let Some(mut start) = ids.next() else {
        return set;
    };
    let mut end = start;

    for id in ids {
        if id == end.wrapping_add(1) {
            end = id;
        } else {
            flush(start, end, &mut set);
            start = id;
            end = id;
        }
    }
    flush(start, end, &mut set);
    set
}

/// Top of the live hierarchy; owns the TLS configuration built from the
/// trust store.
pub struct LiveConfigProcessor {
    /// Connector with the trust store's extra roots.
    tls: TlsConnector,
}

impl LiveConfigProcessor {
    /// Creates the processor around a ready TLS connector.
    #[must_use]
    pub const fn new(tls: TlsConnector) -> Self {
        Self { tls }
    }
}

impl ConfigProcessor for LiveConfigProcessor {
    type Account = LiveAccountProcessor;

    fn new_account_processor(&self) -> LiveAccountProcessor {
        LiveAccountProcessor { tls: self.tls.clone(), session: None, control: None }
    }
}

/// Owns the session of one account subtree.
pub struct LiveAccountProcessor {
    /// Connector used to secure the dial.
    tls: TlsConnector,
    /// The authenticated session, once [`connect`](Self::connect)
    /// succeeded.
    session: Option<SharedSession>,
    /// A second handle on the raw socket, kept to arm the logout
    /// deadline.
    control: Option<TcpStream>,
}

impl LiveAccountProcessor {
    /// Tries the enabled authentication schemes in order until one
    /// produces an authenticated session.
    fn authenticate(
        &self,
        mut client: Client<Transport>,
        account: &Account,
    ) -> Result<Session<Transport>, Error> {
        if !account.no_sasl_external {
            match client.authenticate("EXTERNAL", &SaslExternal { identity: &account.identity }) {
                Ok(session) => return Ok(session),
                Err((error, rejected)) => {
                    warn!(host = %account.host, "sasl external: {error}");
                    client = rejected;
                }
            }
        }

        if !account.no_sasl_plain {
            let authenticator = SaslPlain {
                identity: &account.identity,
                username: &account.username,
                password: &account.password,
            };
            match client.authenticate("PLAIN", &authenticator) {
                Ok(session) => return Ok(session),
                Err((error, rejected)) => {
                    warn!(host = %account.host, "sasl plain: {error}");
                    client = rejected;
                }
            }
        }

        if !account.no_simple_login {
            match client.login(&account.username, &account.password) {
                Ok(session) => return Ok(session),
                Err((error, _rejected)) => {
                    warn!(host = %account.host, "login: {error}");
                }
            }
        }

        Err(Error::AuthenticationFailed { host: account.host.clone() })
    }
}

impl AccountProcessor for LiveAccountProcessor {
    type Mailbox = LiveMailboxProcessor;

    fn connect(&mut self, account: &Account) -> Result<(), Error> {
        let (domain, port) = endpoint(&account.host, account.no_tls);
        let tcp = TcpStream::connect((domain, port)).map_err(Error::Dial)?;
        let control = tcp.try_clone().map_err(Error::Dial)?;

        let transport = if account.no_tls {
            Transport::Plain(tcp)
        } else {
            let stream = self.tls.connect(domain, tcp).map_err(Error::Handshake)?;
            Transport::Tls(Box::new(stream))
        };

        let mut client = Client::new(transport);
        client.read_greeting().map_err(Error::Greeting)?;
        debug!(host = %account.host, port, "connected");

        let session = self.authenticate(client, account)?;
        self.session = Some(Rc::new(RefCell::new(session)));
        self.control = Some(control);
        Ok(())
    }

    fn new_mailbox_processor(&self) -> LiveMailboxProcessor {
        LiveMailboxProcessor { session: self.session.clone() }
    }

    fn logout(&mut self) -> Result<(), Error> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        if let Some(control) = self.control.take() {
            if let Err(error) = control.set_read_timeout(Some(Settings::LOGOUT_TIMEOUT)) {
                debug!("could not arm the logout deadline: {error}");
            }
        }
        session.borrow_mut().logout().map_err(Error::Imap)
    }
}

/// Drives one mailbox on the account session.
pub struct LiveMailboxProcessor {
    /// The account session, absent if the account never connected.
    session: Option<SharedSession>,
}

impl LiveMailboxProcessor {
    /// Returns the session, or [`Error::NotConnected`] when the account
    /// never reached the authenticated state.
    fn session(&self) -> Result<&SharedSession, Error> {
        self.session.as_ref().ok_or(Error::NotConnected)
    }
}

impl MailboxProcessor for LiveMailboxProcessor {
    type Rule = LiveRuleProcessor;

    fn select_mailbox(&mut self, name: &str) -> Result<(), Error> {
        self.session()?
            .borrow_mut()
            .select(name)
            .map(|_mailbox| ())
            .map_err(Error::Imap)
    }

    fn new_rule_processor(&self) -> LiveRuleProcessor {
        LiveRuleProcessor {
            session: self.session.clone(),
            tokens: Vec::new(),
            matches: Vec::new(),
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        self.session()?.borrow_mut().close().map_err(Error::Imap)
    }
}

/// Accumulates one rule's search tokens and acts on the matches.
pub struct LiveRuleProcessor {
    /// The account session, absent if the account never connected.
    session: Option<SharedSession>,
    /// Compiled search tokens, in emission order.
    tokens: Vec<String>,
    /// Message ids matched by [`search`](RuleProcessor::search), sorted.
    matches: Vec<u32>,
}

impl LiveRuleProcessor {
    /// Returns the session, or [`Error::NotConnected`] when the account
    /// never reached the authenticated state.
    fn session(&self) -> Result<&SharedSession, Error> {
        self.session.as_ref().ok_or(Error::NotConnected)
    }
}

impl TokenCollector for LiveRuleProcessor {
    fn append(&mut self, token: String) {
        self.tokens.push(token);
    }
}

impl RuleProcessor for LiveRuleProcessor {
    fn search(&mut self) -> Result<(), Error> {
        let query = if self.tokens.is_empty() {
            "ALL".to_owned()
        } else {
            render_query(&self.tokens)
        };
        let matched = self.session()?.borrow_mut().search(&query).map_err(Error::Imap)?;
        self.matches = matched.into_iter().collect();
        self.matches.sort_unstable();
        debug!(query = %query, matched = self.matches.len(), "searched");
        Ok(())
    }

    fn move_to(&mut self, destination: &str) -> Result<(), Error> {
        if self.matches.is_empty() {
            return Ok(());
        }
        let set = sequence_set(&self.matches);
        self.session()?.borrow_mut().copy(&set, destination).map_err(Error::Imap)
    }

    fn mark_src_for_del(&mut self) -> Result<(), Error> {
        if self.matches.is_empty() {
            return Ok(());
        }
        let set = sequence_set(&self.matches);
        self.session()?
            .borrow_mut()
            .store(&set, "+FLAGS.SILENT (\\Deleted)")
            .map(|_updates| ())
            .map_err(Error::Imap)
    }
}

#[cfg(test)]
mod test {
    use imap::Authenticator as _;

    use super::{PLAIN_PORT, SECURE_PORT, SaslPlain, endpoint, render_query, sequence_set};

    #[test]
    fn endpoint_defaults_depend_on_the_scheme() {
        assert_eq!(endpoint("imap.example.org", false), ("imap.example.org", SECURE_PORT));
        assert_eq!(endpoint("imap.example.org", true), ("imap.example.org", PLAIN_PORT));
        assert_eq!(endpoint("imap.example.org:1993", false), ("imap.example.org", 1993));
    }

    #[test]
    fn query_rendering_quotes_awkward_tokens() {
        let tokens = ["SUBJECT", "hello world", "FROM", "a@b", ""]
            .map(str::to_owned)
            .to_vec();
        assert_eq!(render_query(&tokens), r#"SUBJECT "hello world" FROM a@b """#);
    }

    #[test]
    fn query_rendering_escapes_quotes() {
        let tokens = ["TEXT", r#"say "hi""#].map(str::to_owned).to_vec();
        assert_eq!(render_query(&tokens), r#"TEXT "say \"hi\"""#);
    }

    #[test]
    fn sequence_sets_compress_runs() {
        assert_eq!(sequence_set(&[]), "");
        assert_eq!(sequence_set(&[7]), "7");
        assert_eq!(sequence_set(&[1, 2, 3, 5, 7, 8]), "1:3,5,7:8");
    }

    #[test]
    fn plain_exchange_is_nul_separated() {
        let authenticator = SaslPlain { identity: "admin", username: "bob", password: "secret" };
        assert_eq!(authenticator.process(b""), "admin\0bob\0secret");
    }
}
