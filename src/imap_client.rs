use async_imap::Session;
use async_native_tls::{TlsConnector, TlsStream};
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::config::ImapConfig;
use crate::email::RawMessage;
use crate::error::MailboxError;

/// Without a watermark only this many of the newest messages are listed.
pub const COLD_START_LIMIT: usize = 100;

type Result<T> = std::result::Result<T, MailboxError>;

/// Read access to one mailbox folder.
///
/// Implemented by `ImapClient` in production and by in-memory fakes in tests.
pub trait Mailbox: Send {
    /// UIDs strictly greater than `lower_bound`, ascending. Without a bound,
    /// the `COLD_START_LIMIT` highest UIDs.
    fn list_ids(&mut self, lower_bound: Option<u32>) -> BoxFuture<'_, Result<Vec<u32>>>;

    /// Downloads every requested message; any failure fails the whole call.
    fn fetch_raw<'a>(&'a mut self, ids: &'a [u32]) -> BoxFuture<'a, Result<BTreeMap<u32, RawMessage>>>;

    /// Highest UID currently in the folder, `None` when it is empty.
    fn latest_id(&mut self) -> BoxFuture<'_, Result<Option<u32>>>;
}

/// Applies the `list_ids` contract to whatever UIDs the server returned:
/// server-side `UID n:*` searches are inclusive and always return the
/// highest message, so results are filtered again here.
pub fn select_new_ids(mut uids: Vec<u32>, lower_bound: Option<u32>) -> Vec<u32> {
    uids.sort_unstable();
    uids.dedup();
    match lower_bound {
        Some(bound) => uids.into_iter().filter(|uid| *uid > bound).collect(),
        None => {
            let skip = uids.len().saturating_sub(COLD_START_LIMIT);
            uids.split_off(skip)
        }
    }
}

pub struct ImapClient {
    session: Session<TlsStream<Compat<TcpStream>>>,
    timeout: Duration,
}

impl ImapClient {
    /// Opens a TLS session, logs in and selects the configured folder.
    pub async fn connect(config: &ImapConfig) -> Result<Self> {
        let timeout = config.timeout();
        info!("Connecting to IMAP server {}:{}", config.host, config.port);

        let tcp_stream = with_timeout(
            timeout,
            "connect",
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await?
        .map_err(|e| MailboxError::Connection(e.to_string()))?;

        // Wrap for futures-io compatibility
        let tcp_stream_compat = tcp_stream.compat();

        let tls = TlsConnector::new();
        let tls_stream =
            with_timeout(timeout, "TLS handshake", tls.connect(&config.host, tcp_stream_compat))
                .await??;

        let client = async_imap::Client::new(tls_stream);

        let mut session = with_timeout(
            timeout,
            "login",
            client.login(&config.username, &config.password),
        )
        .await?
        .map_err(|(e, _client)| MailboxError::Auth(e.to_string()))?;

        let mailbox = with_timeout(timeout, "select", session.select(&config.folder))
            .await?
            .map_err(|e| MailboxError::Protocol(format!("cannot select {}: {}", config.folder, e)))?;

        info!(
            "IMAP session established, {} holds {} message(s)",
            config.folder, mailbox.exists
        );

        Ok(ImapClient { session, timeout })
    }

    async fn search_uids(&mut self, query: &str) -> Result<Vec<u32>> {
        debug!("UID SEARCH {}", query);
        let uids = with_timeout(self.timeout, "search", self.session.uid_search(query))
            .await?
            .map_err(|e| MailboxError::Protocol(e.to_string()))?;
        Ok(uids.into_iter().collect())
    }

    async fn list_ids_inner(&mut self, lower_bound: Option<u32>) -> Result<Vec<u32>> {
        let query = match lower_bound {
            Some(uid) => format!("UID {}:*", uid.saturating_add(1)),
            None => "ALL".to_string(),
        };
        let found = self.search_uids(&query).await?;
        let ids = select_new_ids(found, lower_bound);

        match lower_bound {
            Some(uid) => info!("Found {} message(s) with UID > {}: {:?}", ids.len(), uid, ids),
            None => info!(
                "No watermark, limiting to the {} most recent message(s): {} found",
                COLD_START_LIMIT,
                ids.len()
            ),
        }
        Ok(ids)
    }

    async fn fetch_raw_inner(&mut self, ids: &[u32]) -> Result<BTreeMap<u32, RawMessage>> {
        let mut messages = BTreeMap::new();
        if ids.is_empty() {
            return Ok(messages);
        }

        let uid_set = ids
            .iter()
            .map(|uid| uid.to_string())
            .collect::<Vec<_>>()
            .join(",");
        debug!("Fetching {} message(s): {}", ids.len(), uid_set);

        let timeout = self.timeout;
        let session = &mut self.session;
        let fetches = with_timeout(timeout, "fetch", async move {
            // BODY.PEEK[] leaves the \Seen flag alone
            let stream = session
                .uid_fetch(&uid_set, "(UID BODY.PEEK[])")
                .await
                .map_err(|e| MailboxError::Protocol(e.to_string()))?;
            Ok::<_, MailboxError>(stream.collect::<Vec<_>>().await)
        })
        .await??;

        for fetch in fetches {
            let fetch = fetch.map_err(|e| MailboxError::Protocol(e.to_string()))?;
            match (fetch.uid, fetch.body()) {
                (Some(uid), Some(body)) => {
                    messages.insert(uid, RawMessage::new(uid, body.to_vec()));
                }
                _ => warn!("Ignoring fetch response without UID or body"),
            }
        }

        if let Some(missing) = ids.iter().find(|uid| !messages.contains_key(uid)) {
            return Err(MailboxError::MissingMessage(*missing));
        }

        debug!("Fetched {} message(s)", messages.len());
        Ok(messages)
    }

    async fn latest_id_inner(&mut self) -> Result<Option<u32>> {
        Ok(self.search_uids("ALL").await?.into_iter().max())
    }

    /// Number of messages in the selected folder, for the status probe.
    pub async fn message_count(&mut self) -> Result<usize> {
        Ok(self.search_uids("ALL").await?.len())
    }

    pub async fn list_folders(&mut self) -> Result<Vec<String>> {
        let session = &mut self.session;
        let names = with_timeout(self.timeout, "list", async move {
            let stream = session
                .list(Some(""), Some("*"))
                .await
                .map_err(|e| MailboxError::Protocol(e.to_string()))?;
            Ok::<_, MailboxError>(stream.collect::<Vec<_>>().await)
        })
        .await??;

        names
            .into_iter()
            .map(|name| {
                name.map(|n| n.name().to_string())
                    .map_err(|e| MailboxError::Protocol(e.to_string()))
            })
            .collect()
    }

    pub async fn logout(mut self) -> Result<()> {
        info!("Logging out from IMAP server");
        with_timeout(self.timeout, "logout", self.session.logout())
            .await?
            .map_err(|e| MailboxError::Protocol(e.to_string()))
    }
}

impl Mailbox for ImapClient {
    fn list_ids(&mut self, lower_bound: Option<u32>) -> BoxFuture<'_, Result<Vec<u32>>> {
        Box::pin(self.list_ids_inner(lower_bound))
    }

    fn fetch_raw<'a>(&'a mut self, ids: &'a [u32]) -> BoxFuture<'a, Result<BTreeMap<u32, RawMessage>>> {
        Box::pin(self.fetch_raw_inner(ids))
    }

    fn latest_id(&mut self) -> BoxFuture<'_, Result<Option<u32>>> {
        Box::pin(self.latest_id_inner())
    }
}

async fn with_timeout<F: Future>(limit: Duration, operation: &str, fut: F) -> Result<F::Output> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| MailboxError::Timeout(limit.as_secs(), operation.to_string()))
}
