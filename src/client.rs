//! IMAP account connector and session

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use futures::StreamExt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{ExtractorError, Result};
use crate::models::Account;

/// Raw RFC 5322 bytes of one fetched message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub uid: u32,
    pub bytes: Vec<u8>,
}

/// Opens authenticated sessions for configured accounts
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self, account: &Account) -> Result<Box<dyn MailSession>>;
}

/// An authenticated session against one account
#[async_trait]
pub trait MailSession: Send {
    /// Select a mailbox read-write and return its message count
    async fn select(&mut self, mailbox: &str) -> Result<u32>;

    /// UIDs matching an IMAP search expression, in no particular order
    async fn search(&mut self, criteria: &str) -> Result<Vec<u32>>;

    /// Full message bodies for the given UIDs, without setting `\Seen`
    async fn fetch(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>>;

    async fn logout(self: Box<Self>) -> Result<()>;
}

/// Resolve an account's credential reference to a password
pub fn resolve_password(account: &Account) -> Result<String> {
    match (&account.password, &account.password_env) {
        (Some(password), _) => Ok(password.clone()),
        (None, Some(var)) => std::env::var(var).map_err(|_| {
            ExtractorError::auth(
                &account.id,
                format!("environment variable '{}' is not set", var),
            )
        }),
        (None, None) => Err(ExtractorError::auth(&account.id, "no credential configured")),
    }
}

/// `1,2,3` style UID set
fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Production connector speaking IMAP over TLS (or plain TCP when `tls = false`)
#[derive(Clone)]
pub struct ImapConnector {
    connect_timeout: Duration,
    tls: TlsConnector,
}

impl ImapConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            connect_timeout,
            tls: TlsConnector::from(Arc::new(config)),
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(Duration::from_secs(config.connect_timeout_secs))
    }

    async fn open(&self, account: &Account, password: &str) -> Result<Box<dyn MailSession>> {
        let tcp = TcpStream::connect((account.host.as_str(), account.port))
            .await
            .map_err(|e| {
                ExtractorError::connection(
                    &account.id,
                    format!("TCP connect to {} failed: {}", account.endpoint(), e),
                )
            })?;

        if !account.tls {
            warn!("Account '{}' uses plaintext IMAP; the password is sent unencrypted", account.id);
            return login(account, password, tcp.compat()).await;
        }

        let server_name = ServerName::try_from(account.host.clone()).map_err(|e| {
            ExtractorError::connection(
                &account.id,
                format!("invalid server name '{}': {}", account.host, e),
            )
        })?;

        let stream = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| {
                ExtractorError::connection(&account.id, format!("TLS handshake failed: {}", e))
            })?;

        login(account, password, stream.compat()).await
    }
}

impl Default for ImapConnector {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::default())
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    async fn connect(&self, account: &Account) -> Result<Box<dyn MailSession>> {
        let password = resolve_password(account)?;

        debug!("Connecting to {} for account '{}'", account.endpoint(), account.id);
        let session = tokio::time::timeout(self.connect_timeout, self.open(account, &password))
            .await
            .map_err(|_| {
                ExtractorError::connection(
                    &account.id,
                    format!("timed out after {}s", self.connect_timeout.as_secs()),
                )
            })??;

        info!("Connected to account '{}'", account.id);
        Ok(session)
    }
}

async fn login<T>(account: &Account, password: &str, stream: T) -> Result<Box<dyn MailSession>>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send + 'static,
{
    let client = async_imap::Client::new(stream);
    let session = client
        .login(&account.username, password)
        .await
        .map_err(|(e, _)| ExtractorError::auth(&account.id, format!("LOGIN rejected: {}", e)))?;

    Ok(Box::new(ImapSession {
        account: account.id.clone(),
        session,
    }))
}

struct ImapSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    account: String,
    session: async_imap::Session<T>,
}

impl<T> ImapSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    fn failed(&self, command: &str, error: impl std::fmt::Display) -> ExtractorError {
        ExtractorError::connection(&self.account, format!("{} failed: {}", command, error))
    }
}

#[async_trait]
impl<T> MailSession for ImapSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let selected = self
            .session
            .select(mailbox)
            .await
            .map_err(|e| self.failed("SELECT", e))?;
        Ok(selected.exists)
    }

    async fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        let uids = self
            .session
            .uid_search(criteria)
            .await
            .map_err(|e| self.failed("UID SEARCH", e))?;
        Ok(uids.into_iter().collect())
    }

    async fn fetch(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut fetched = Vec::with_capacity(uids.len());
        let mut failure = None;
        {
            let mut stream = self
                .session
                .uid_fetch(uid_set(uids), "(UID BODY.PEEK[])")
                .await
                .map_err(|e| {
                    ExtractorError::connection(&self.account, format!("UID FETCH failed: {}", e))
                })?;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(fetch) => match (fetch.uid, fetch.body()) {
                        (Some(uid), Some(body)) => fetched.push(RawMessage {
                            uid,
                            bytes: body.to_vec(),
                        }),
                        (uid, _) => debug!("Ignoring FETCH response without body (uid {:?})", uid),
                    },
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(self.failed("UID FETCH", e)),
            None => Ok(fetched),
        }
    }

    async fn logout(mut self: Box<Self>) -> Result<()> {
        let account = self.account.clone();
        self.session
            .logout()
            .await
            .map_err(|e| ExtractorError::connection(account, format!("LOGOUT failed: {}", e)))
    }
}
